use crate::{Ip, resolver::{Addresses, NameResolver, ResolveError}};

/// The error returned by [`NameResolver::fail`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("AlwaysFail[test implementation]")]
pub struct AlwaysFail;

impl NameResolver {
  /// A resolver which answers `[127.0.0.1]` for every hostname.
  #[inline]
  pub fn localhost() -> Self {
    Self::fixed(Addresses::from(Ip::V4_LOOPBACK))
  }

  /// A resolver which answers `addrs` for every hostname.
  pub fn fixed(addrs: Addresses) -> Self {
    Self::new(move |_, cb| cb(Ok(addrs.clone())))
  }

  /// A resolver which fails with [`AlwaysFail`] for every hostname.
  #[inline]
  pub fn fail() -> Self {
    Self::fail_with(|| ResolveError::other(AlwaysFail))
  }

  /// A resolver which fails with the error built by `f` for every hostname.
  pub fn fail_with<F>(f: F) -> Self
  where
    F: Fn() -> ResolveError + Send + Sync + 'static,
  {
    Self::new(move |_, cb| cb(Err(f())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use futures::channel::oneshot;

  const HOSTS: &[&str] = &["localhost", "something that would never resolve 🤢", ""];

  #[tokio::test]
  async fn test_localhost() {
    let resolver = NameResolver::localhost();
    for host in HOSTS {
      let (tx, rx) = oneshot::channel();
      resolver.lookup(host, move |res| {
        let _ = tx.send(res);
      });
      assert_eq!(rx.await.unwrap().unwrap().as_slice(), &[Ip::V4_LOOPBACK]);

      let addrs = resolver.lookup_async(host).await.unwrap();
      assert_eq!(addrs.as_slice(), &[Ip::V4_LOOPBACK]);
    }
  }

  #[tokio::test]
  async fn test_always_fail() {
    let resolver = NameResolver::fail();
    for host in HOSTS {
      let (tx, rx) = oneshot::channel();
      resolver.lookup(host, move |res| {
        let _ = tx.send(res);
      });
      let err = rx.await.unwrap().unwrap_err();
      assert_eq!(err.downcast_ref::<AlwaysFail>(), Some(&AlwaysFail));

      let err = resolver.lookup_async(host).await.unwrap_err();
      assert_eq!(err.downcast_ref::<AlwaysFail>(), Some(&AlwaysFail));
      assert_eq!(err.to_string(), "AlwaysFail[test implementation]");
    }
  }

  #[tokio::test]
  async fn test_fail_with() {
    let resolver = NameResolver::fail_with(|| ResolveError::NameNotFound);
    assert!(resolver.lookup_async("x").await.unwrap_err().is_name_not_found());
  }
}
