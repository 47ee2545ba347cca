use core::{
  future::Future,
  pin::Pin,
  task::{Context, Poll},
};
use std::io;

use futures::{
  channel::oneshot::{self, Receiver, Sender},
  future::BoxFuture,
};

use super::{LookupResult, ResolveError};

enum Inner {
  Native(BoxFuture<'static, LookupResult>),
  Bridged(Receiver<LookupResult>),
}

/// The future returned by [`NameResolver::lookup_async`](super::NameResolver::lookup_async).
///
/// Dropping it never cancels a lookup which was started through the callback
/// capability, the backend still runs to completion.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Lookup {
  inner: Inner,
}

impl Lookup {
  #[inline]
  pub(super) fn native(fut: BoxFuture<'static, LookupResult>) -> Self {
    Self {
      inner: Inner::Native(fut),
    }
  }

  #[inline]
  pub(super) fn bridged() -> (Sender<LookupResult>, Self) {
    let (tx, rx) = oneshot::channel();
    (
      tx,
      Self {
        inner: Inner::Bridged(rx),
      },
    )
  }
}

impl core::fmt::Debug for Lookup {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    let kind = match self.inner {
      Inner::Native(_) => "native",
      Inner::Bridged(_) => "bridged",
    };
    f.debug_struct("Lookup").field("kind", &kind).finish()
  }
}

impl Future for Lookup {
  type Output = LookupResult;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match &mut self.get_mut().inner {
      Inner::Native(fut) => fut.as_mut().poll(cx),
      Inner::Bridged(rx) => Pin::new(rx).poll(cx).map(|res| match res {
        Ok(res) => res,
        // the backend dropped the callback without invoking it
        Err(e) => Err(ResolveError::Transport(io::Error::new(
          io::ErrorKind::BrokenPipe,
          e,
        ))),
      }),
    }
  }
}
