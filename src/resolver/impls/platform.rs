use core::fmt;
use std::{sync::Arc, thread};

use parking_lot::Mutex;
use smol_str_0_3::SmolStr;

use crate::{
  Ip,
  resolver::{Addresses, Callback, LookupResult, NameResolver, ResolveError},
};

/// The error domain a [`PlatformError`] code belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorDomain {
  /// `errno` values.
  Posix,
  /// `getaddrinfo`/`netdb.h` values.
  NetDb,
  /// A domain only the platform knows about, identified by its raw value.
  Native(i32),
}

impl fmt::Display for ErrorDomain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Posix => write!(f, "posix"),
      Self::NetDb => write!(f, "netdb"),
      Self::Native(raw) => write!(f, "native({raw})"),
    }
  }
}

/// A failure reported by a [`PlatformHost`], as a domain/code pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("platform resolution failed with code {code} in the {domain} domain")]
pub struct PlatformError {
  domain: ErrorDomain,
  code: i32,
}

impl PlatformError {
  /// The [`ErrorDomain::NetDb`] code for "no DNS record for this host".
  pub const NO_RECORD: i32 = 8;

  /// Creates a new [`PlatformError`].
  #[inline]
  pub const fn new(domain: ErrorDomain, code: i32) -> Self {
    Self { domain, code }
  }

  /// Returns the error domain.
  #[inline]
  pub const fn domain(&self) -> ErrorDomain {
    self.domain
  }

  /// Returns the raw error code.
  #[inline]
  pub const fn code(&self) -> i32 {
    self.code
  }

  /// Returns `true` if the platform reported that the host has no DNS record.
  #[inline]
  pub const fn is_no_record(&self) -> bool {
    matches!(self.domain, ErrorDomain::NetDb) && self.code == Self::NO_RECORD
  }
}

/// A platform name service driven synchronously from a dedicated worker.
///
/// `resolve` may block, typically by spinning the platform's run loop until
/// the request completes. It is always called from a worker thread owned by
/// exactly one request.
pub trait PlatformHost: Send + Sync + 'static {
  /// Resolves `host`.
  fn resolve(&self, host: &str) -> Result<Vec<Ip>, PlatformError>;
}

impl<F> PlatformHost for F
where
  F: Fn(&str) -> Result<Vec<Ip>, PlatformError> + Send + Sync + 'static,
{
  #[inline]
  fn resolve(&self, host: &str) -> Result<Vec<Ip>, PlatformError> {
    self(host)
  }
}

fn translate(res: Result<Vec<Ip>, PlatformError>) -> LookupResult {
  match res {
    Ok(addrs) => Addresses::new(addrs),
    Err(e) if e.is_no_record() => Err(ResolveError::NameNotFound),
    Err(e) => Err(ResolveError::other(e)),
  }
}

/// A resolver which spawns one short lived worker thread per lookup.
///
/// The worker drives the [`PlatformHost`] until it answers, invokes the
/// callback and exits.
pub struct PlatformResolver<P> {
  host: Arc<P>,
}

impl<P> Clone for PlatformResolver<P> {
  fn clone(&self) -> Self {
    Self {
      host: self.host.clone(),
    }
  }
}

impl<P: PlatformHost> PlatformResolver<P> {
  /// Creates a new [`PlatformResolver`].
  #[inline]
  pub fn new(host: P) -> Self {
    Self {
      host: Arc::new(host),
    }
  }

  /// Resolves `name` on a fresh worker thread and invokes `callback` from it.
  ///
  /// If the worker cannot be spawned, `callback` is invoked on the calling
  /// thread with [`ResolveError::Transport`].
  pub fn lookup(&self, name: &str, callback: Callback) {
    let slot = Arc::new(Mutex::new(Some(callback)));
    let worker_slot = slot.clone();
    let host = self.host.clone();
    let name = SmolStr::new(name);

    let spawned = thread::Builder::new()
      .name("name-resolver-platform".into())
      .spawn(move || {
        let res = translate(host.resolve(&name));
        #[cfg(feature = "tracing")]
        tracing::debug!(
          target: "name_resolver.platform",
          host = %name,
          ok = res.is_ok(),
          "platform lookup finished"
        );
        let cb = worker_slot.lock().take();
        if let Some(cb) = cb {
          cb(res);
        }
      });

    if let Err(e) = spawned {
      #[cfg(feature = "tracing")]
      tracing::warn!(
        target: "name_resolver.platform",
        err = %e,
        "failed to spawn platform resolver worker"
      );
      let cb = slot.lock().take();
      if let Some(cb) = cb {
        cb(Err(ResolveError::Transport(e)));
      }
    }
  }

  /// Turns the backend into a [`NameResolver`].
  pub fn into_resolver(self) -> NameResolver {
    NameResolver::new(move |host, cb| self.lookup(host, cb))
  }
}

impl<P: PlatformHost> From<PlatformResolver<P>> for NameResolver {
  #[inline]
  fn from(value: PlatformResolver<P>) -> Self {
    value.into_resolver()
  }
}
