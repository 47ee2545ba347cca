//! Response aggregation for discovery style lookups.
//!
//! A discovery service (multicast DNS, a platform service-discovery daemon)
//! answers one request with a stream of notifications, each carrying a single
//! record or a family-scoped error for IPv4 or IPv6, plus a "more coming"
//! flag. [`Aggregator`] folds that stream into one terminal [`LookupResult`]:
//!
//! - a request is complete once every requested family has reported and the
//!   current notification does not announce more records;
//! - a family-scoped error only marks its family as reported, the request
//!   keeps waiting for the other family;
//! - a malformed notification or a fatal service error completes the request
//!   with an error, discarding the records gathered so far;
//! - once complete, the service handle is released and the callback invoked,
//!   each exactly once. Later notifications are ignored;
//! - records of a family the request did not ask for are dropped;
//! - a request abandoned before completion still releases its handle and
//!   fails with a broken pipe error.
//!
//! The aggregator itself is a plain state machine driven through `&mut self`.
//! Services delivering notifications from arbitrary threads go through
//! [`ReplySink`], which serializes delivery for one request.

use core::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  Family, Ip,
  resolver::{Addresses, Callback, LookupResult, ResolveError},
  utils::invalid_data,
};

mod service;
pub use service::*;

/// A set of address families.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "Vec<Family>", into = "Vec<Family>"))]
pub struct Families(u8);

impl Families {
  /// No family.
  pub const NONE: Self = Self(0);
  /// IPv4 only.
  pub const V4: Self = Self(1);
  /// IPv6 only.
  pub const V6: Self = Self(1 << 1);
  /// Both IPv4 and IPv6.
  pub const ALL: Self = Self(Self::V4.0 | Self::V6.0);

  #[inline]
  const fn bit(family: Family) -> u8 {
    match family {
      Family::V4 => Self::V4.0,
      Family::V6 => Self::V6.0,
    }
  }

  /// Returns `true` if `family` is in the set.
  #[inline]
  pub const fn contains(&self, family: Family) -> bool {
    self.0 & Self::bit(family) != 0
  }

  /// Returns `true` if every family of `other` is in the set.
  #[inline]
  pub const fn is_superset(&self, other: Self) -> bool {
    self.0 & other.0 == other.0
  }

  /// Adds `family` to the set, returns `true` if it was not present.
  #[inline]
  pub fn insert(&mut self, family: Family) -> bool {
    let added = !self.contains(family);
    self.0 |= Self::bit(family);
    added
  }

  /// Returns the set with `family` added, in builder pattern.
  #[inline]
  pub const fn with(self, family: Family) -> Self {
    Self(self.0 | Self::bit(family))
  }

  /// Returns the number of families in the set.
  #[inline]
  pub const fn len(&self) -> usize {
    self.0.count_ones() as usize
  }

  /// Returns `true` if the set is empty.
  #[inline]
  pub const fn is_empty(&self) -> bool {
    self.0 == 0
  }

  /// Iterates over the families in the set.
  pub fn iter(&self) -> impl Iterator<Item = Family> + use<> {
    let this = *self;
    [Family::V4, Family::V6]
      .into_iter()
      .filter(move |f| this.contains(*f))
  }
}

impl From<Family> for Families {
  #[inline]
  fn from(family: Family) -> Self {
    Self::NONE.with(family)
  }
}

impl From<Vec<Family>> for Families {
  fn from(families: Vec<Family>) -> Self {
    families.into_iter().fold(Self::NONE, Self::with)
  }
}

impl From<Families> for Vec<Family> {
  fn from(families: Families) -> Self {
    families.iter().collect()
  }
}

/// The payload of one discovery notification.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Answer<'a> {
  /// One resolved address, raw network-order bytes.
  Address(&'a [u8]),
  /// The service has no record of this family for the host.
  NoRecords,
}

/// One notification of a discovery service, as it came off the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Reply<'a> {
  family: u16,
  answer: Answer<'a>,
  more_coming: bool,
}

impl<'a> Reply<'a> {
  /// A record for the raw family tag `family`.
  #[inline]
  pub const fn address(family: u16, bytes: &'a [u8], more_coming: bool) -> Self {
    Self {
      family,
      answer: Answer::Address(bytes),
      more_coming,
    }
  }

  /// A family-scoped error for the raw family tag `family`.
  #[inline]
  pub const fn no_records(family: u16, more_coming: bool) -> Self {
    Self {
      family,
      answer: Answer::NoRecords,
      more_coming,
    }
  }

  /// A record carrying an already parsed [`Ip`].
  #[inline]
  pub fn ip(ip: &'a Ip, more_coming: bool) -> Self {
    Self::address(ip.family().tag(), ip.octets(), more_coming)
  }

  /// Returns the raw family tag.
  #[inline]
  pub const fn family(&self) -> u16 {
    self.family
  }

  /// Returns the payload.
  #[inline]
  pub const fn answer(&self) -> Answer<'a> {
    self.answer
  }

  /// Returns `true` if the service announced more notifications for this request.
  #[inline]
  pub const fn more_coming(&self) -> bool {
    self.more_coming
  }
}

/// A notification the aggregator could not make sense of.
///
/// Surfaces as an [`InvalidData`](std::io::ErrorKind::InvalidData)
/// [`ResolveError::Transport`] error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
  /// The family tag is neither `AF_INET` nor `AF_INET6`.
  #[error("unknown address family tag {0}")]
  UnknownFamily(u16),
  /// The address length does not match the family.
  #[error("{family} address has an invalid length of {len} bytes")]
  AddressLength {
    /// The family of the record.
    family: Family,
    /// The length of the address carried by the record.
    len: usize,
  },
}

/// What the engine decided after one event.
#[derive(Debug)]
pub enum Transition {
  /// Not complete yet.
  Pending,
  /// The request just completed with this outcome.
  Complete(LookupResult),
  /// The request was already complete, the event was dropped.
  Ignored,
}

/// The per-request state of a discovery lookup.
#[derive(Debug, Clone)]
pub struct AggregationState {
  requested: Families,
  reported: Families,
  records: Vec<Ip>,
  completed: bool,
}

impl AggregationState {
  /// Creates the state for a request asking for `requested` families.
  ///
  /// An empty set asks for both families.
  pub fn new(requested: Families) -> Self {
    Self {
      requested: if requested.is_empty() {
        Families::ALL
      } else {
        requested
      },
      reported: Families::NONE,
      records: Vec::new(),
      completed: false,
    }
  }

  /// Returns the families the request waits for.
  #[inline]
  pub const fn requested(&self) -> Families {
    self.requested
  }

  /// Returns the families which reported a record or a family-scoped error.
  #[inline]
  pub const fn reported(&self) -> Families {
    self.reported
  }

  /// Returns the records accepted so far, in arrival order.
  #[inline]
  pub fn records(&self) -> &[Ip] {
    &self.records
  }

  /// Returns `true` once the terminal outcome was decided.
  #[inline]
  pub const fn is_completed(&self) -> bool {
    self.completed
  }

  /// Applies one notification.
  ///
  /// A well-formed notification for a family the request did not ask for is
  /// dropped; its `more_coming` flag still counts.
  pub fn on_reply(&mut self, reply: Reply<'_>) -> Transition {
    if self.completed {
      return Transition::Ignored;
    }

    if let Err(e) = self.accept(&reply) {
      return self.on_failure(ResolveError::Transport(invalid_data(e)));
    }

    if !reply.more_coming && self.reported.is_superset(self.requested) {
      let records = mem::take(&mut self.records);
      return self.complete(Addresses::new(records));
    }
    Transition::Pending
  }

  /// Applies a fatal, non family-scoped error. Accepted records are discarded.
  pub fn on_failure(&mut self, err: ResolveError) -> Transition {
    if self.completed {
      return Transition::Ignored;
    }
    self.records.clear();
    self.complete(Err(err))
  }

  fn accept(&mut self, reply: &Reply<'_>) -> Result<(), ReplyError> {
    let family = Family::from_tag(reply.family).ok_or(ReplyError::UnknownFamily(reply.family))?;
    if let Answer::Address(bytes) = reply.answer {
      let ip = Ip::from_bytes(family, bytes).ok_or(ReplyError::AddressLength {
        family,
        len: bytes.len(),
      })?;
      if !self.requested.contains(family) {
        #[cfg(feature = "tracing")]
        tracing::trace!(
          target: "name_resolver.discovery",
          family = %family,
          "dropping a record of a family the request did not ask for"
        );
        return Ok(());
      }
      self.records.push(ip);
    }
    if self.requested.contains(family) {
      self.reported.insert(family);
    }
    Ok(())
  }

  #[inline]
  fn complete(&mut self, res: LookupResult) -> Transition {
    self.completed = true;
    Transition::Complete(res)
  }
}

/// The native handle of one in-flight discovery request.
pub trait ServiceHandle: Send + 'static {
  /// Stops the request and frees its resources.
  ///
  /// The aggregator owning the handle calls this exactly once, after the
  /// request completed or was abandoned, and always before the callback.
  fn release(self);
}

/// What an [`Aggregator`] did with an event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Progress {
  /// The request is still waiting for more notifications.
  Pending,
  /// The request completed with this event.
  Completed,
  /// The request had already completed, the event was dropped.
  Ignored,
}

enum Slot<H> {
  Vacant,
  Held(H),
  Released,
}

struct Completion<H> {
  handle: Option<H>,
  delivery: Option<(Callback, LookupResult)>,
}

impl<H: ServiceHandle> Completion<H> {
  fn finish(self) {
    if let Some(handle) = self.handle {
      #[cfg(feature = "tracing")]
      tracing::debug!(target: "name_resolver.discovery", "releasing discovery handle");
      handle.release();
    }
    if let Some((cb, res)) = self.delivery {
      cb(res);
    }
  }
}

type Step<H> = (Progress, Option<Completion<H>>);

fn settle<H: ServiceHandle>((progress, completion): Step<H>) -> Progress {
  if let Some(completion) = completion {
    completion.finish();
  }
  progress
}

/// Drives one discovery request to its terminal outcome.
///
/// Owns the request's [`ServiceHandle`] and the caller's callback. On
/// completion the handle is released first, then the callback invoked with
/// the outcome; each happens exactly once. If the request completes before
/// the handle is attached, the outcome is held back until the handle arrives
/// (or [`Aggregator::abort`] says it never will).
///
/// Dropping an aggregator that has not delivered its outcome releases the
/// handle and fails the request with a
/// [`BrokenPipe`](std::io::ErrorKind::BrokenPipe) transport error.
pub struct Aggregator<H: ServiceHandle> {
  state: AggregationState,
  handle: Slot<H>,
  callback: Option<Callback>,
  parked: Option<LookupResult>,
}

impl<H: ServiceHandle> core::fmt::Debug for Aggregator<H> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Aggregator")
      .field("state", &self.state)
      .field("attached", &matches!(self.handle, Slot::Held(_)))
      .finish()
  }
}

impl<H: ServiceHandle> Aggregator<H> {
  /// Creates an aggregator waiting for `families`, delivering to `callback`.
  pub fn new(families: Families, callback: Callback) -> Self {
    Self {
      state: AggregationState::new(families),
      handle: Slot::Vacant,
      callback: Some(callback),
      parked: None,
    }
  }

  /// Returns the aggregation state.
  #[inline]
  pub fn state(&self) -> &AggregationState {
    &self.state
  }

  /// Returns `true` once the terminal outcome was decided.
  #[inline]
  pub fn is_completed(&self) -> bool {
    self.state.is_completed()
  }

  /// Hands the request's native handle to the aggregator.
  pub fn attach(&mut self, handle: H) {
    settle(self.attach_step(handle));
  }

  /// Feeds one notification.
  pub fn on_reply(&mut self, reply: Reply<'_>) -> Progress {
    settle(self.reply_step(reply))
  }

  /// Feeds a fatal, non family-scoped error.
  pub fn on_failure(&mut self, err: ResolveError) -> Progress {
    settle(self.failure_step(err))
  }

  /// Gives up on the request: no handle will be attached.
  ///
  /// An outcome held back for the handle is delivered now, otherwise the
  /// request fails with `err`.
  pub fn abort(&mut self, err: ResolveError) -> Progress {
    settle(self.abort_step(err))
  }

  fn reply_step(&mut self, reply: Reply<'_>) -> Step<H> {
    let transition = self.state.on_reply(reply);
    self.step(transition)
  }

  fn failure_step(&mut self, err: ResolveError) -> Step<H> {
    let transition = self.state.on_failure(err);
    self.step(transition)
  }

  fn attach_step(&mut self, handle: H) -> Step<H> {
    match self.handle {
      Slot::Vacant => match self.parked.take() {
        Some(result) => {
          self.handle = Slot::Released;
          (Progress::Completed, Some(self.completion(Some(handle), result)))
        }
        None => {
          self.handle = Slot::Held(handle);
          (Progress::Pending, None)
        }
      },
      Slot::Released => (Progress::Ignored, Some(Completion {
        handle: Some(handle),
        delivery: None,
      })),
      Slot::Held(_) => {
        #[cfg(feature = "tracing")]
        tracing::warn!(
          target: "name_resolver.discovery",
          "a discovery handle is already attached, releasing the new one"
        );
        (Progress::Ignored, Some(Completion {
          handle: Some(handle),
          delivery: None,
        }))
      }
    }
  }

  fn abort_step(&mut self, err: ResolveError) -> Step<H> {
    let result = match self.parked.take() {
      Some(result) => Some(result),
      None => match self.state.on_failure(err) {
        Transition::Complete(result) => Some(result),
        _ => None,
      },
    };
    let handle = self.take_handle();
    match result {
      Some(result) => (Progress::Completed, Some(self.completion(handle, result))),
      None => (Progress::Ignored, handle.map(|handle| Completion {
        handle: Some(handle),
        delivery: None,
      })),
    }
  }

  fn step(&mut self, transition: Transition) -> Step<H> {
    match transition {
      Transition::Pending => (Progress::Pending, None),
      Transition::Ignored => {
        #[cfg(feature = "tracing")]
        tracing::trace!(
          target: "name_resolver.discovery",
          "ignoring notification for a completed request"
        );
        (Progress::Ignored, None)
      }
      Transition::Complete(result) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(
          target: "name_resolver.discovery",
          reported = self.state.reported().len(),
          ok = result.is_ok(),
          "discovery request completed"
        );
        if matches!(self.handle, Slot::Vacant) {
          self.parked = Some(result);
          return (Progress::Completed, None);
        }
        let handle = self.take_handle();
        (Progress::Completed, Some(self.completion(handle, result)))
      }
    }
  }

  fn take_handle(&mut self) -> Option<H> {
    match mem::replace(&mut self.handle, Slot::Released) {
      Slot::Held(handle) => Some(handle),
      _ => None,
    }
  }

  fn completion(&mut self, handle: Option<H>, result: LookupResult) -> Completion<H> {
    Completion {
      handle,
      delivery: self.callback.take().map(|cb| (cb, result)),
    }
  }
}

impl<H: ServiceHandle> Drop for Aggregator<H> {
  fn drop(&mut self) {
    let step = self.abort_step(ResolveError::Transport(std::io::Error::new(
      std::io::ErrorKind::BrokenPipe,
      "discovery request abandoned before completion",
    )));
    #[cfg(feature = "tracing")]
    if step.0 == Progress::Completed {
      tracing::debug!(
        target: "name_resolver.discovery",
        "discovery request dropped before its outcome was delivered"
      );
    }
    settle(step);
  }
}

/// A shareable entry point into one request's [`Aggregator`].
///
/// Notifications are applied one at a time; the handle release and the
/// callback run after the internal lock is dropped. When the last sink is
/// dropped the aggregator goes with it.
pub struct ReplySink<H: ServiceHandle> {
  inner: Arc<Mutex<Aggregator<H>>>,
}

impl<H: ServiceHandle> Clone for ReplySink<H> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<H: ServiceHandle> core::fmt::Debug for ReplySink<H> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_tuple("ReplySink").finish()
  }
}

impl<H: ServiceHandle> ReplySink<H> {
  /// Wraps `aggregator`.
  pub fn new(aggregator: Aggregator<H>) -> Self {
    Self {
      inner: Arc::new(Mutex::new(aggregator)),
    }
  }

  /// Delivers one notification.
  pub fn deliver(&self, reply: Reply<'_>) -> Progress {
    let step = self.inner.lock().reply_step(reply);
    settle(step)
  }

  /// Delivers a fatal, non family-scoped error.
  pub fn fail(&self, err: ResolveError) -> Progress {
    let step = self.inner.lock().failure_step(err);
    settle(step)
  }

  /// Hands the request's native handle to the aggregator.
  pub fn attach(&self, handle: H) {
    let step = self.inner.lock().attach_step(handle);
    settle(step);
  }

  /// Gives up on the request, see [`Aggregator::abort`].
  pub fn abort(&self, err: ResolveError) -> Progress {
    let step = self.inner.lock().abort_step(err);
    settle(step)
  }

  /// Returns `true` once the terminal outcome was decided.
  pub fn is_completed(&self) -> bool {
    self.inner.lock().is_completed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use std::{
    io,
    sync::atomic::{AtomicUsize, Ordering},
  };

  #[derive(Debug, Default)]
  struct Counters {
    releases: AtomicUsize,
    callbacks: AtomicUsize,
  }

  struct CountedHandle(Arc<Counters>);

  impl ServiceHandle for CountedHandle {
    fn release(self) {
      self.0.releases.fetch_add(1, Ordering::SeqCst);
    }
  }

  type Outcome = Arc<Mutex<Option<LookupResult>>>;

  fn aggregator(families: Families) -> (Aggregator<CountedHandle>, Arc<Counters>, Outcome) {
    let counters = Arc::new(Counters::default());
    let outcome: Outcome = Arc::default();
    let (c, o) = (counters.clone(), outcome.clone());
    let mut aggregator = Aggregator::new(
      families,
      Box::new(move |res: LookupResult| {
        c.callbacks.fetch_add(1, Ordering::SeqCst);
        *o.lock() = Some(res);
      }),
    );
    aggregator.attach(CountedHandle(counters.clone()));
    (aggregator, counters, outcome)
  }

  const V4: Ip = Ip::V4([192, 168, 1, 10]);
  const V4_2: Ip = Ip::V4([192, 168, 1, 11]);
  const V6: Ip = Ip::V6([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10]);

  fn v4_missing(more: bool) -> Reply<'static> {
    Reply::no_records(Family::V4.tag(), more)
  }

  fn v6_missing(more: bool) -> Reply<'static> {
    Reply::no_records(Family::V6.tag(), more)
  }

  fn addrs(outcome: &Outcome) -> Vec<Ip> {
    outcome
      .lock()
      .take()
      .expect("no outcome")
      .expect("lookup failed")
      .into_vec()
  }

  #[test]
  fn test_both_records() {
    let (mut agg, counters, outcome) = aggregator(Families::ALL);
    assert_eq!(agg.on_reply(Reply::ip(&V4, false)), Progress::Pending);
    assert_eq!(counters.releases.load(Ordering::SeqCst), 0);
    assert_eq!(agg.on_reply(Reply::ip(&V6, false)), Progress::Completed);
    assert_eq!(addrs(&outcome), vec![V4, V6]);
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_arrival_order_is_kept() {
    let (mut agg, _, outcome) = aggregator(Families::ALL);
    agg.on_reply(Reply::ip(&V6, false));
    agg.on_reply(Reply::ip(&V4, false));
    assert_eq!(addrs(&outcome), vec![V6, V4]);
  }

  #[test]
  fn test_both_families_missing() {
    let (mut agg, counters, outcome) = aggregator(Families::ALL);
    assert_eq!(agg.on_reply(v4_missing(false)), Progress::Pending);
    assert_eq!(agg.on_reply(v6_missing(false)), Progress::Completed);
    let res = outcome.lock().take().unwrap();
    assert!(res.unwrap_err().is_name_not_found());
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_first_family_error_is_not_fatal() {
    let (mut agg, _, outcome) = aggregator(Families::ALL);
    assert_eq!(agg.on_reply(v4_missing(false)), Progress::Pending);
    assert!(!agg.is_completed());
    assert_eq!(agg.on_reply(Reply::ip(&V6, false)), Progress::Completed);
    assert_eq!(addrs(&outcome), vec![V6]);
  }

  #[test]
  fn test_same_family_error_twice_keeps_waiting() {
    let (mut agg, counters, _) = aggregator(Families::ALL);
    assert_eq!(agg.on_reply(v4_missing(false)), Progress::Pending);
    assert_eq!(agg.on_reply(v4_missing(false)), Progress::Pending);
    assert_eq!(counters.releases.load(Ordering::SeqCst), 0);
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_more_coming_then_error() {
    let (mut agg, counters, outcome) = aggregator(Families::ALL);
    assert_eq!(agg.on_reply(Reply::ip(&V4, true)), Progress::Pending);
    assert_eq!(agg.on_reply(Reply::ip(&V4_2, false)), Progress::Pending);
    assert_eq!(agg.on_reply(v6_missing(false)), Progress::Completed);
    assert_eq!(addrs(&outcome), vec![V4, V4_2]);
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_more_coming_delays_completion() {
    let (mut agg, _, outcome) = aggregator(Families::ALL);
    agg.on_reply(Reply::ip(&V4, false));
    assert_eq!(agg.on_reply(Reply::ip(&V6, true)), Progress::Pending);
    assert_eq!(agg.state().reported(), Families::ALL);
    assert_eq!(agg.on_reply(Reply::ip(&V4_2, false)), Progress::Completed);
    assert_eq!(addrs(&outcome), vec![V4, V6, V4_2]);
  }

  #[test]
  fn test_duplicate_terminal_notifications() {
    let (mut agg, counters, _) = aggregator(Families::ALL);
    agg.on_reply(Reply::ip(&V4, false));
    assert_eq!(agg.on_reply(Reply::ip(&V6, false)), Progress::Completed);
    assert_eq!(agg.on_reply(Reply::ip(&V6, false)), Progress::Ignored);
    assert_eq!(agg.on_reply(v6_missing(false)), Progress::Ignored);
    assert_eq!(
      agg.on_failure(ResolveError::Unsupported),
      Progress::Ignored
    );
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_unknown_family_is_fatal() {
    let (mut agg, counters, outcome) = aggregator(Families::ALL);
    agg.on_reply(Reply::ip(&V4, false));
    assert_eq!(
      agg.on_reply(Reply::address(u16::MAX, &[1, 2, 3, 4], false)),
      Progress::Completed
    );
    let err = outcome.lock().take().unwrap().unwrap_err();
    match err {
      ResolveError::Transport(e) => {
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
        let inner = e.get_ref().and_then(|e| e.downcast_ref::<ReplyError>());
        assert_eq!(inner, Some(&ReplyError::UnknownFamily(u16::MAX)));
      }
      e => panic!("unexpected error: {e}"),
    }
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    assert!(agg.state().records().is_empty());
  }

  #[test]
  fn test_address_length_mismatch_is_fatal() {
    let (mut agg, counters, outcome) = aggregator(Families::ALL);
    assert_eq!(
      agg.on_reply(Reply::address(Family::V6.tag(), &[1, 2, 3, 4], true)),
      Progress::Completed
    );
    assert!(matches!(
      outcome.lock().take(),
      Some(Err(ResolveError::Transport(_)))
    ));
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_fatal_error_discards_records() {
    let (mut agg, counters, outcome) = aggregator(Families::ALL);
    agg.on_reply(Reply::ip(&V4, true));
    assert_eq!(
      agg.on_failure(ResolveError::Unsupported),
      Progress::Completed
    );
    assert!(matches!(
      outcome.lock().take(),
      Some(Err(ResolveError::Unsupported))
    ));
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_single_family_request() {
    let (mut agg, _, outcome) = aggregator(Families::V4);
    assert_eq!(agg.on_reply(Reply::ip(&V4, false)), Progress::Completed);
    assert_eq!(addrs(&outcome), vec![V4]);
  }

  fn unattached(families: Families) -> (Aggregator<CountedHandle>, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let c = counters.clone();
    let agg = Aggregator::<CountedHandle>::new(
      families,
      Box::new(move |_: LookupResult| {
        // the handle always goes first
        assert_eq!(c.releases.load(Ordering::SeqCst), 1);
        c.callbacks.fetch_add(1, Ordering::SeqCst);
      }),
    );
    (agg, counters)
  }

  #[test]
  fn test_completion_before_attach() {
    let (mut agg, counters) = unattached(Families::ALL);
    assert_eq!(
      agg.on_failure(ResolveError::NameNotFound),
      Progress::Completed
    );
    assert!(agg.is_completed());
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 0);
    assert_eq!(counters.releases.load(Ordering::SeqCst), 0);

    agg.attach(CountedHandle(counters.clone()));
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 1);

    drop(agg);
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_abort_delivers_held_outcome() {
    let counters = Arc::new(Counters::default());
    let outcome: Outcome = Arc::default();
    let (c, o) = (counters.clone(), outcome.clone());
    let mut agg = Aggregator::<CountedHandle>::new(
      Families::V4,
      Box::new(move |res: LookupResult| {
        c.callbacks.fetch_add(1, Ordering::SeqCst);
        *o.lock() = Some(res);
      }),
    );
    agg.on_reply(Reply::ip(&V4, false));
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 0);

    assert_eq!(agg.abort(ResolveError::Unsupported), Progress::Completed);
    assert_eq!(addrs(&outcome), vec![V4]);
    assert_eq!(agg.abort(ResolveError::Unsupported), Progress::Ignored);
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_second_attach_releases_newcomer() {
    let (mut agg, counters, _) = aggregator(Families::ALL);
    agg.attach(CountedHandle(counters.clone()));
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    agg.on_reply(v4_missing(false));
    agg.on_reply(v6_missing(false));
    assert_eq!(counters.releases.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_dropped_sink_releases_and_fails() {
    let (agg, counters, outcome) = aggregator(Families::ALL);
    let sink = ReplySink::new(agg);
    assert_eq!(sink.deliver(Reply::ip(&Ip::V4_LOOPBACK, false)), Progress::Pending);
    drop(sink);

    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 1);
    match outcome.lock().take() {
      Some(Err(ResolveError::Transport(e))) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
      res => panic!("unexpected outcome: {res:?}"),
    }
  }

  #[test]
  fn test_dropped_after_completion_is_quiet() {
    let (mut agg, counters, outcome) = aggregator(Families::V4);
    assert_eq!(agg.on_reply(Reply::ip(&V4, false)), Progress::Completed);
    drop(agg);
    assert_eq!(addrs(&outcome), vec![V4]);
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    assert_eq!(counters.callbacks.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_unrequested_family_is_dropped() {
    let (mut agg, _, outcome) = aggregator(Families::V4);
    assert_eq!(agg.on_reply(Reply::ip(&V6, true)), Progress::Pending);
    assert_eq!(agg.state().reported(), Families::NONE);
    assert!(agg.state().records().is_empty());
    assert_eq!(agg.on_reply(Reply::ip(&V4, true)), Progress::Pending);
    // the trailing stray still closes the batch
    assert_eq!(agg.on_reply(Reply::ip(&V6, false)), Progress::Completed);
    assert_eq!(addrs(&outcome), vec![V4]);
  }

  #[test]
  fn test_sink_across_threads() {
    let counters = Arc::new(Counters::default());
    let (tx, rx) = std::sync::mpsc::channel();
    let sink = ReplySink::new(Aggregator::new(
      Families::ALL,
      Box::new(move |res: LookupResult| {
        tx.send(res).unwrap();
      }),
    ));
    sink.attach(CountedHandle(counters.clone()));

    let v4 = sink.clone();
    std::thread::spawn(move || {
      v4.deliver(Reply::ip(&V4, true));
      v4.deliver(Reply::ip(&V4_2, false));
    })
    .join()
    .unwrap();
    assert!(!sink.is_completed());

    let v6 = sink.clone();
    std::thread::spawn(move || {
      v6.deliver(Reply::ip(&V6, false));
      v6.deliver(Reply::ip(&V6, false));
    })
    .join()
    .unwrap();

    assert!(sink.is_completed());
    let res = rx.recv().unwrap().unwrap();
    assert_eq!(res.as_slice(), &[V4, V4_2, V6]);
    assert!(rx.try_recv().is_err());
    assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_families() {
    let mut families = Families::NONE;
    assert!(families.is_empty());
    assert!(families.insert(Family::V6));
    assert!(!families.insert(Family::V6));
    assert_eq!(families, Families::V6);
    assert_eq!(families.len(), 1);
    assert!(!families.is_superset(Families::ALL));
    families.insert(Family::V4);
    assert_eq!(families, Families::ALL);
    assert_eq!(families.iter().collect::<Vec<_>>(), vec![Family::V4, Family::V6]);
    assert_eq!(Families::from(Family::V4), Families::V4);
    assert_eq!(AggregationState::new(Families::NONE).requested(), Families::ALL);
  }

  #[cfg(feature = "serde")]
  #[test]
  fn test_families_serde() {
    let json = serde_json::to_string(&Families::ALL).unwrap();
    assert_eq!(json, r#"["V4","V6"]"#);
    let back: Families = serde_json::from_str(&json).unwrap();
    assert_eq!(back, Families::ALL);
  }
}
