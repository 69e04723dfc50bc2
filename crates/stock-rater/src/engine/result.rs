//! Analysis result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::format::{format_difference, format_score, format_value, format_weight};
use crate::kpi::{Kpi, KpiDefinition};
use crate::scoring::{KpiScore, RatingResult};

/// One row of the company-vs-sector comparison table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiComparison {
    pub kpi: Kpi,
    pub display_name: String,
    pub weight: String,
    pub stock_value: String,
    pub sector_median: String,
    pub difference: String,
    pub stock_raw: Option<f64>,
    pub sector_raw: Option<f64>,
    pub diff_raw: Option<f64>,
    pub lower_is_better: bool,
    pub absolute: Option<f64>,
    pub relative: Option<f64>,
    pub combined: Option<f64>,
}

impl KpiComparison {
    pub fn new(def: &KpiDefinition, line: &KpiScore) -> Self {
        let diff_raw = line.value.zip(line.sector_median).map(|(v, m)| v - m);

        Self {
            kpi: def.kpi,
            display_name: def.display_name.clone(),
            weight: format_weight(def.weight),
            stock_value: format_value(def, line.value),
            sector_median: format_value(def, line.sector_median),
            difference: format_difference(def, diff_raw),
            stock_raw: line.value,
            sector_raw: line.sector_median,
            diff_raw,
            lower_is_better: def.lower_is_better(),
            absolute: line.absolute,
            relative: line.relative,
            combined: line.combined,
        }
    }
}

/// Full outcome of analysing one ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAnalysis {
    pub request_id: Uuid,
    pub ticker: String,
    pub company_name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    /// Every catalog KPI, `null` where the company does not report it
    pub kpis: BTreeMap<Kpi, Option<f64>>,
    pub sector_medians: BTreeMap<Kpi, f64>,
    pub sector_peer_count: usize,
    pub rating: RatingResult,
    pub comparison: Vec<KpiComparison>,
    /// No sector classification; the rating is absolute-only
    pub sector_unclassified: bool,
    pub analyzed_at: DateTime<Utc>,
}

impl StockAnalysis {
    pub fn summary(&self) -> String {
        let sector = self.sector.as_deref().unwrap_or("unclassified");
        format!(
            "{} ({}) - {} - rated {}/10 (absolute {}, relative {}) on {}",
            self.ticker,
            self.company_name,
            sector,
            format_score(Some(self.rating.overall)),
            format_score(self.rating.absolute),
            format_score(self.rating.relative),
            self.analyzed_at.format("%Y-%m-%d %H:%M UTC")
        )
    }

    /// True when the rating used sector medians at all
    pub fn has_sector_comparison(&self) -> bool {
        self.rating.relative.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::KpiCatalog;

    #[test]
    fn test_comparison_row() {
        let catalog = KpiCatalog::standard();
        let def = catalog.get(Kpi::ReturnOnEquity).unwrap();
        let line = KpiScore {
            kpi: Kpi::ReturnOnEquity,
            value: Some(0.25),
            sector_median: Some(0.20),
            absolute: Some(7.3),
            relative: Some(6.3),
            combined: Some(6.7),
            weight: def.weight,
        };

        let row = KpiComparison::new(def, &line);
        assert_eq!(row.weight, "12%");
        assert_eq!(row.stock_value, "25.00%");
        assert_eq!(row.sector_median, "20.00%");
        assert_eq!(row.difference, "+5.00%");
        assert!(!row.lower_is_better);
    }

    #[test]
    fn test_comparison_row_without_median() {
        let catalog = KpiCatalog::standard();
        let def = catalog.get(Kpi::TrailingPe).unwrap();
        let line = KpiScore {
            kpi: Kpi::TrailingPe,
            value: Some(18.0),
            sector_median: None,
            absolute: Some(8.5),
            relative: None,
            combined: Some(8.5),
            weight: def.weight,
        };

        let row = KpiComparison::new(def, &line);
        assert_eq!(row.sector_median, "N/A");
        assert_eq!(row.difference, "N/A");
        assert_eq!(row.diff_raw, None);
        assert!(row.lower_is_better);
    }
}
