/// Blocking system resolver backend
#[cfg(feature = "agnostic")]
#[cfg_attr(docsrs, doc(cfg(feature = "agnostic")))]
pub mod blocking;

/// Platform resolver backend running one worker thread per request
pub mod platform;

/// Deterministic resolvers for tests
pub mod fixed;
