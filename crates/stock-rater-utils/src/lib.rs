//! Shared utilities for stock-rater
//!
//! Tracing subscriber setup used by the `stock-rater` binary and examples.

pub mod logging;

pub use logging::{LogFormat, init_tracing};
