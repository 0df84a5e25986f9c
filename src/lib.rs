#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod rate_limiter;
pub use rate_limiter::*;

mod store;
pub use store::{AdmissionScriptArgs, WindowBatch, WindowStore};

pub mod memory;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub mod redis;

mod error;
pub use error::*;

mod common;
pub use common::{Admission, Capacity, WindowDurationMs, WindowEntry, WindowKey};

mod clock;
pub use clock::{Clock, SystemClock};

mod token;
pub use token::{OsRngTokenSource, TokenSource, format_token};

mod window_parser;
pub use window_parser::parse_range_with_scores;

#[cfg(test)]
mod tests;
