#![doc = include_str!("../README.md")]
#![deny(missing_docs, warnings)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

mod ip;
mod utils;

pub use ip::*;

/// Hostname resolution through interchangeable backends.
pub mod resolver;

pub mod discovery;

pub use resolver::{Addresses, Callback, Lookup, LookupResult, NameResolver, ResolveError};

pub use cheap_clone::CheapClone;
pub use futures;
