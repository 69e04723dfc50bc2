//! Sector-relative stock value rating
//!
//! This crate rates a listed company on a 1-10 scale from ten valuation,
//! profitability and balance-sheet KPIs. It includes:
//!
//! - A validated KPI catalog with weights, directions and thresholds
//! - Absolute scoring against fixed best/worst thresholds
//! - Relative scoring against sector peer medians (log-ratio sigmoid)
//! - A TTL cache of sector statistics that shares in-flight refreshes
//! - A Yahoo Finance quoteSummary client
//!
//! # Example
//!
//! ```rust,ignore
//! use stock_rater::{AnalysisPipeline, RaterConfig, StaticUniverse, YahooMetricSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RaterConfig::default().with_env_overrides()?;
//!     let source = Arc::new(YahooMetricSource::new(&config)?);
//!     let universe = Arc::new(StaticUniverse::from_json_file("universe.json")?);
//!
//!     let pipeline = AnalysisPipeline::from_config(source, universe, &config);
//!     let analysis = pipeline.analyze("AAPL").await?;
//!     println!("{}", analysis.summary());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod kpi;
pub mod scoring;
pub mod source;

// Re-export main types for convenience
pub use api::YahooMetricSource;
pub use cache::{CacheSettings, SectorStats, SectorStatsCache};
pub use config::RaterConfig;
pub use engine::{AnalysisPipeline, AnalysisStage, KpiComparison, StockAnalysis};
pub use error::{ErrorKind, ErrorReport, RaterError, Result};
pub use kpi::{Direction, Kpi, KpiCatalog, KpiDefinition, KpiValues, ValueFormat};
pub use scoring::{Blend, KpiScore, RatingResult, ScoringEngine};
pub use source::{CompanySnapshot, MetricSource, PeerUniverse, StaticUniverse};
