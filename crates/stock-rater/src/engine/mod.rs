//! Analysis pipeline
//!
//! Turns a ticker into a rated, sector-compared [`StockAnalysis`]

pub mod pipeline;
pub mod result;

pub use pipeline::{AnalysisPipeline, AnalysisStage, normalize_ticker};
pub use result::{KpiComparison, StockAnalysis};
