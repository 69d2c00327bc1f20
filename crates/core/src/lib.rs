//! Core errors, result combinators and tracing bootstrap for keel.

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::Error;
pub use result::{Result, ResultExt, WriteResultExt};
