use core::{fmt, future::Future, ops::Deref};
use std::sync::Arc;

use cheap_clone::CheapClone;
use futures::future::BoxFuture;

use crate::Ip;

mod error;
mod impls;
mod lookup;

pub use error::ResolveError;
pub use impls::*;
pub use lookup::Lookup;

/// The outcome of one lookup.
pub type LookupResult = Result<Addresses, ResolveError>;

/// The completion handler handed to a callback-style lookup.
///
/// Being `FnOnce`, a backend can invoke it at most once; the contract requires
/// it to be invoked exactly once.
pub type Callback = Box<dyn FnOnce(LookupResult) + Send + 'static>;

type LookupFn = dyn Fn(&str, Callback) + Send + Sync + 'static;
type AsyncLookupFn = dyn Fn(&str) -> BoxFuture<'static, LookupResult> + Send + Sync + 'static;

/// A non-empty list of resolved addresses, in the order the backend discovered them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Addresses(Vec<Ip>);

impl Addresses {
  /// Creates a new [`Addresses`].
  ///
  /// An empty list is never a successful outcome, so it is turned into
  /// [`ResolveError::NameNotFound`].
  #[inline]
  pub fn new(addrs: Vec<Ip>) -> Result<Self, ResolveError> {
    if addrs.is_empty() {
      Err(ResolveError::NameNotFound)
    } else {
      Ok(Self(addrs))
    }
  }

  /// Returns the first discovered address.
  #[inline]
  pub fn first(&self) -> Ip {
    self.0[0]
  }

  /// Returns the addresses as a slice.
  #[inline]
  pub fn as_slice(&self) -> &[Ip] {
    &self.0
  }

  /// Consumes the list and returns the inner vector.
  #[inline]
  pub fn into_vec(self) -> Vec<Ip> {
    self.0
  }
}

impl Deref for Addresses {
  type Target = [Ip];

  #[inline]
  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl From<Ip> for Addresses {
  #[inline]
  fn from(ip: Ip) -> Self {
    Self(vec![ip])
  }
}

impl TryFrom<Vec<Ip>> for Addresses {
  type Error = ResolveError;

  #[inline]
  fn try_from(addrs: Vec<Ip>) -> Result<Self, Self::Error> {
    Self::new(addrs)
  }
}

impl IntoIterator for Addresses {
  type Item = Ip;
  type IntoIter = std::vec::IntoIter<Ip>;

  #[inline]
  fn into_iter(self) -> Self::IntoIter {
    self.0.into_iter()
  }
}

impl<'a> IntoIterator for &'a Addresses {
  type Item = &'a Ip;
  type IntoIter = core::slice::Iter<'a, Ip>;

  #[inline]
  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Addresses {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    let addrs = Vec::<Ip>::deserialize(deserializer)?;
    Self::new(addrs).map_err(|_| serde::de::Error::invalid_length(0, &"at least one address"))
  }
}

/// Resolves a hostname to a list of IP addresses.
///
/// A resolver is a capability record: one required callback-style lookup, and
/// optionally a native async lookup. Which capabilities exist is fixed when the
/// resolver is constructed. When no native async lookup was supplied,
/// [`NameResolver::lookup_async`] bridges the callback into a single-result
/// future.
///
/// ```
/// use name_resolver::{Ip, NameResolver};
///
/// let resolver = NameResolver::localhost();
/// resolver.lookup("anything", |res| {
///   assert_eq!(res.unwrap().as_slice(), &[Ip::V4_LOOPBACK]);
/// });
/// ```
#[derive(Clone)]
pub struct NameResolver {
  lookup: Arc<LookupFn>,
  async_lookup: Option<Arc<AsyncLookupFn>>,
}

impl fmt::Debug for NameResolver {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NameResolver")
      .field("native_async", &self.async_lookup.is_some())
      .finish()
  }
}

impl CheapClone for NameResolver {
  #[inline]
  fn cheap_clone(&self) -> Self {
    Self {
      lookup: self.lookup.clone(),
      async_lookup: self.async_lookup.clone(),
    }
  }
}

impl NameResolver {
  /// Creates a resolver from a callback-style lookup.
  pub fn new<L>(lookup: L) -> Self
  where
    L: Fn(&str, Callback) + Send + Sync + 'static,
  {
    Self {
      lookup: Arc::new(lookup),
      async_lookup: None,
    }
  }

  /// Creates a resolver from a callback-style lookup and a native async lookup.
  pub fn with_async<L, A, F>(lookup: L, async_lookup: A) -> Self
  where
    L: Fn(&str, Callback) + Send + Sync + 'static,
    A: Fn(&str) -> F + Send + Sync + 'static,
    F: Future<Output = LookupResult> + Send + 'static,
  {
    Self {
      lookup: Arc::new(lookup),
      async_lookup: Some(Arc::new(move |host: &str| -> BoxFuture<'static, LookupResult> {
        Box::pin(async_lookup(host))
      })),
    }
  }

  /// Returns `true` if the resolver was built with a native async lookup.
  #[inline]
  pub fn has_native_async(&self) -> bool {
    self.async_lookup.is_some()
  }

  /// Resolves `host`, invoking `callback` exactly once with the outcome.
  ///
  /// The callback may run on a backend owned thread, before or after this
  /// method returns.
  #[inline]
  pub fn lookup<F>(&self, host: &str, callback: F)
  where
    F: FnOnce(LookupResult) + Send + 'static,
  {
    (self.lookup)(host, Box::new(callback))
  }

  /// Resolves `host`, returning a future of the outcome.
  ///
  /// Uses the native async lookup when there is one, otherwise the callback
  /// lookup is started immediately and its single result is forwarded to the
  /// returned future. Errors come through unchanged, so a
  /// [`ResolveError::NameNotFound`] stays a `NameNotFound`.
  pub fn lookup_async(&self, host: &str) -> Lookup {
    match &self.async_lookup {
      Some(async_lookup) => Lookup::native(async_lookup(host)),
      None => {
        let (tx, lookup) = Lookup::bridged();
        (self.lookup)(
          host,
          Box::new(move |res| {
            if tx.send(res).is_err() {
              #[cfg(feature = "tracing")]
              tracing::trace!(
                target: "name_resolver",
                "lookup completed after the future was dropped"
              );
            }
          }),
        );
        lookup
      }
    }
  }

  /// Resolves `host`, giving up with [`ResolveError::Timeout`] once `sleep` completes.
  ///
  /// The lookup itself is not torn down on timeout. A bridged lookup keeps
  /// running in the background until the backend delivers its outcome and
  /// releases its resources; the outcome is then discarded.
  pub async fn lookup_timeout<S>(&self, host: &str, sleep: S) -> LookupResult
  where
    S: Future,
  {
    let lookup = self.lookup_async(host);
    futures::pin_mut!(sleep);
    match futures::future::select(lookup, sleep).await {
      futures::future::Either::Left((res, _)) => res,
      futures::future::Either::Right(_) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "name_resolver", host, "lookup timed out");
        Err(ResolveError::Timeout)
      }
    }
  }
}
