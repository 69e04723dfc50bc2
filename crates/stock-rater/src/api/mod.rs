//! Metric source clients

pub mod yahoo;

pub use yahoo::{YahooMetricSource, parse_quote_summary};
