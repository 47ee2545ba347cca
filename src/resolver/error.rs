use std::io;

/// Errors that can be returned when resolving a hostname.
///
/// Every backend normalizes its "no such host" condition to
/// [`ResolveError::NameNotFound`], so callers can branch on it regardless of
/// which backend produced the error.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
  /// The host has no resolvable address of any requested family.
  #[error("name not found")]
  NameNotFound,
  /// The query was malformed or is not supported by the backend.
  #[error("unsupported query")]
  Unsupported,
  /// An opaque failure of the underlying transport, passed through untouched.
  #[error("transport error: {0}")]
  Transport(#[from] io::Error),
  /// The caller-side deadline expired before the lookup completed.
  #[error("lookup timed out")]
  Timeout,
  /// A backend specific error.
  #[error(transparent)]
  Other(Box<dyn core::error::Error + Send + Sync + 'static>),
}

impl ResolveError {
  /// Wraps a backend specific error.
  #[inline]
  pub fn other<E>(err: E) -> Self
  where
    E: Into<Box<dyn core::error::Error + Send + Sync + 'static>>,
  {
    Self::Other(err.into())
  }

  /// Returns `true` if the error is [`ResolveError::NameNotFound`].
  #[inline]
  pub const fn is_name_not_found(&self) -> bool {
    matches!(self, Self::NameNotFound)
  }

  /// Returns the backend specific error if it is of type `E`.
  pub fn downcast_ref<E: core::error::Error + 'static>(&self) -> Option<&E> {
    match self {
      Self::Other(e) => e.downcast_ref::<E>(),
      _ => None,
    }
  }
}
