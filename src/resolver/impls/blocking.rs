use core::future::Future;
use std::{io, net::ToSocketAddrs};

use agnostic::Runtime;
use smol_str_0_3::SmolStr;

use crate::{
  Ip,
  resolver::{Addresses, Callback, LookupResult, NameResolver, ResolveError},
};

/// Resolves `host` with the system resolver, blocking the current thread.
///
/// Never call this from an async task, use [`BlockingResolver`] which moves
/// the call onto the runtime's blocking pool.
///
/// Any resolution failure becomes [`ResolveError::NameNotFound`], a host the
/// system resolver refuses to look up (e.g. one containing a NUL byte) becomes
/// [`ResolveError::Unsupported`].
pub fn resolve_blocking(host: &str) -> LookupResult {
  let addrs = ToSocketAddrs::to_socket_addrs(&(host, 0))
    .map_err(classify)?
    .map(Ip::from)
    .collect::<Vec<_>>();
  Addresses::new(addrs)
}

fn classify(err: io::Error) -> ResolveError {
  match err.kind() {
    io::ErrorKind::InvalidInput => ResolveError::Unsupported,
    _ => ResolveError::NameNotFound,
  }
}

/// A resolver backed by the system's blocking resolver (`getaddrinfo`).
///
/// Each lookup runs on the blocking pool of the runtime `R`, both the callback
/// and the native async capability are provided.
pub struct BlockingResolver<R: Runtime> {
  _marker: core::marker::PhantomData<fn() -> R>,
}

impl<R: Runtime> Default for BlockingResolver<R> {
  fn default() -> Self {
    Self::new()
  }
}

impl<R: Runtime> Clone for BlockingResolver<R> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<R: Runtime> Copy for BlockingResolver<R> {}

impl<R: Runtime> BlockingResolver<R> {
  /// Create a new [`BlockingResolver`].
  #[inline]
  pub const fn new() -> Self {
    Self {
      _marker: core::marker::PhantomData,
    }
  }

  /// Resolves `host` on the blocking pool and invokes `callback` from there.
  pub fn lookup(&self, host: &str, callback: Callback) {
    let host = SmolStr::new(host);
    R::spawn_blocking_detach(move || {
      let res = resolve_blocking(&host);
      #[cfg(feature = "tracing")]
      trace_outcome(&host, &res);
      callback(res)
    });
  }

  /// Resolves `host` on the blocking pool.
  pub fn lookup_async(&self, host: &str) -> impl Future<Output = LookupResult> + Send + use<R> {
    let (tx, rx) = futures::channel::oneshot::channel();
    let host = SmolStr::new(host);

    R::spawn_blocking_detach(move || {
      let res = resolve_blocking(&host);
      #[cfg(feature = "tracing")]
      trace_outcome(&host, &res);
      if tx.send(res).is_err() {
        #[cfg(feature = "tracing")]
        tracing::warn!(
          target: "name_resolver.blocking",
          "failed to deliver the addresses of {}: receiver dropped",
          host,
        );
      }
    });

    async move {
      match rx.await {
        Ok(res) => res,
        Err(e) => Err(ResolveError::Transport(io::Error::new(
          io::ErrorKind::BrokenPipe,
          e,
        ))),
      }
    }
  }

  /// Turns the backend into a [`NameResolver`].
  pub fn into_resolver(self) -> NameResolver {
    NameResolver::with_async(
      move |host, cb| self.lookup(host, cb),
      move |host| self.lookup_async(host),
    )
  }
}

impl<R: Runtime> From<BlockingResolver<R>> for NameResolver {
  #[inline]
  fn from(value: BlockingResolver<R>) -> Self {
    value.into_resolver()
  }
}

#[cfg(feature = "tracing")]
fn trace_outcome(host: &str, res: &LookupResult) {
  match res {
    Ok(addrs) => tracing::debug!(
      target: "name_resolver.blocking",
      host,
      count = addrs.len(),
      "resolved"
    ),
    Err(e) => tracing::debug!(
      target: "name_resolver.blocking",
      host,
      error = %e,
      "resolution failed"
    ),
  }
}
