use core::time::Duration;
use std::sync::Arc;

use smol_str_0_3::SmolStr;

use super::{Aggregator, Families, ReplySink, ServiceHandle};
use crate::resolver::{Callback, NameResolver, ResolveError};

/// The options used to construct a [`DiscoveryResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DiscoveryOptions {
  families: Families,
  interface_index: u32,
  #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
  timeout: Option<Duration>,
  return_intermediates: bool,
}

impl Default for DiscoveryOptions {
  fn default() -> Self {
    Self::new()
  }
}

impl DiscoveryOptions {
  /// Create a new [`DiscoveryOptions`], asking for both families on every interface.
  pub const fn new() -> Self {
    Self {
      families: Families::ALL,
      interface_index: 0,
      timeout: None,
      return_intermediates: true,
    }
  }

  /// Set the families to query in builder pattern
  pub const fn with_families(mut self, val: Families) -> Self {
    self.families = val;
    self
  }

  /// Set the families to query
  pub fn set_families(&mut self, val: Families) {
    self.families = val;
  }

  /// Returns the families to query
  pub const fn families(&self) -> Families {
    self.families
  }

  /// Set the interface index in builder pattern, `0` means any interface
  pub const fn with_interface_index(mut self, val: u32) -> Self {
    self.interface_index = val;
    self
  }

  /// Set the interface index, `0` means any interface
  pub fn set_interface_index(&mut self, val: u32) {
    self.interface_index = val;
  }

  /// Returns the interface index
  pub const fn interface_index(&self) -> u32 {
    self.interface_index
  }

  /// Set the service side timeout in builder pattern
  ///
  /// The service gives up after this long and reports the families it did
  /// not hear about as missing. `None` leaves it to the service.
  pub const fn with_timeout(mut self, val: Option<Duration>) -> Self {
    self.timeout = val;
    self
  }

  /// Set the service side timeout
  pub fn set_timeout(&mut self, val: Option<Duration>) {
    self.timeout = val;
  }

  /// Returns the service side timeout
  pub const fn timeout(&self) -> Option<Duration> {
    self.timeout
  }

  /// Set whether the service should report intermediate results, in builder pattern
  pub const fn with_return_intermediates(mut self, val: bool) -> Self {
    self.return_intermediates = val;
    self
  }

  /// Set whether the service should report intermediate results
  pub fn set_return_intermediates(&mut self, val: bool) {
    self.return_intermediates = val;
  }

  /// Returns whether the service should report intermediate results
  pub const fn return_intermediates(&self) -> bool {
    self.return_intermediates
  }
}

/// One address request handed to a [`DiscoveryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryQuery {
  host: SmolStr,
  options: DiscoveryOptions,
}

impl DiscoveryQuery {
  /// Creates a query for `host`.
  pub fn new(host: impl Into<SmolStr>, options: DiscoveryOptions) -> Self {
    Self {
      host: host.into(),
      options,
    }
  }

  /// Returns the host to resolve.
  #[inline]
  pub fn host(&self) -> &str {
    &self.host
  }

  /// Returns the families to register interest in.
  #[inline]
  pub const fn families(&self) -> Families {
    self.options.families
  }

  /// Returns the request options.
  #[inline]
  pub const fn options(&self) -> &DiscoveryOptions {
    &self.options
  }
}

/// A service delivering address records for a host as a stream of notifications.
///
/// `start` registers interest in the query's families and arranges for every
/// notification of the request to be delivered to `sink`, from whatever
/// context the service dispatches on. The service never decides when the
/// request ends; the sink releases the returned handle once the outcome is
/// known. A notification may reach the sink before `start` returns; an
/// outcome decided that early is delivered once the handle is attached.
/// Dropping every clone of the sink before the outcome is known abandons the
/// request.
pub trait DiscoveryService: Send + Sync + 'static {
  /// The native handle of one request.
  type Handle: ServiceHandle;

  /// Starts a request.
  ///
  /// On error, no handle exists and no notification must reach `sink`.
  fn start(
    &self,
    query: &DiscoveryQuery,
    sink: ReplySink<Self::Handle>,
  ) -> Result<Self::Handle, ResolveError>;
}

/// A resolver backed by a [`DiscoveryService`], e.g. multicast DNS.
///
/// Every lookup gets its own [`Aggregator`], so concurrent lookups share no
/// state besides the service.
pub struct DiscoveryResolver<S> {
  service: Arc<S>,
  options: DiscoveryOptions,
}

impl<S> Clone for DiscoveryResolver<S> {
  fn clone(&self) -> Self {
    Self {
      service: self.service.clone(),
      options: self.options.clone(),
    }
  }
}

impl<S: DiscoveryService> DiscoveryResolver<S> {
  /// Create a new [`DiscoveryResolver`] with the default options.
  #[inline]
  pub fn new(service: S) -> Self {
    Self::with_options(service, DiscoveryOptions::new())
  }

  /// Create a new [`DiscoveryResolver`] with the given options.
  #[inline]
  pub fn with_options(service: S, options: DiscoveryOptions) -> Self {
    Self {
      service: Arc::new(service),
      options,
    }
  }

  /// Returns the options.
  #[inline]
  pub const fn options(&self) -> &DiscoveryOptions {
    &self.options
  }

  /// Resolves `host`, invoking `callback` once the aggregated outcome is known.
  pub fn lookup(&self, host: &str, callback: Callback) {
    let query = DiscoveryQuery::new(host, self.options.clone());
    let sink = ReplySink::new(Aggregator::new(query.families(), callback));

    match self.service.start(&query, sink.clone()) {
      Ok(handle) => sink.attach(handle),
      Err(e) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(
          target: "name_resolver.discovery",
          host,
          err = %e,
          "failed to start discovery request"
        );
        sink.abort(e);
      }
    }
  }

  /// Turns the backend into a [`NameResolver`].
  pub fn into_resolver(self) -> NameResolver {
    NameResolver::new(move |host, cb| self.lookup(host, cb))
  }
}

impl<S: DiscoveryService> From<DiscoveryResolver<S>> for NameResolver {
  #[inline]
  fn from(value: DiscoveryResolver<S>) -> Self {
    value.into_resolver()
  }
}
