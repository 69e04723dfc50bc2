//! KPI definitions and the rating catalog
//!
//! A [`KpiCatalog`] is the process-wide scoring configuration: which ratios
//! are rated, how heavily each counts, which way is "better", and the fixed
//! thresholds used for absolute scoring. It is validated once on
//! construction and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashSet;

use crate::error::{RaterError, Result};

/// Tolerance used when checking that catalog weights sum to one
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// The financial ratios the rater understands.
///
/// Serialized as the field names used by Yahoo Finance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kpi {
    #[serde(rename = "trailingPE")]
    TrailingPe,
    #[serde(rename = "forwardPE")]
    ForwardPe,
    #[serde(rename = "priceToBook")]
    PriceToBook,
    #[serde(rename = "enterpriseToEbitda")]
    EnterpriseToEbitda,
    #[serde(rename = "debtToEquity")]
    DebtToEquity,
    #[serde(rename = "returnOnEquity")]
    ReturnOnEquity,
    #[serde(rename = "profitMargins")]
    ProfitMargins,
    #[serde(rename = "revenueGrowth")]
    RevenueGrowth,
    #[serde(rename = "currentRatio")]
    CurrentRatio,
    #[serde(rename = "dividendYield")]
    DividendYield,
}

impl Kpi {
    /// Wire key for this KPI
    pub fn key(&self) -> &'static str {
        match self {
            Kpi::TrailingPe => "trailingPE",
            Kpi::ForwardPe => "forwardPE",
            Kpi::PriceToBook => "priceToBook",
            Kpi::EnterpriseToEbitda => "enterpriseToEbitda",
            Kpi::DebtToEquity => "debtToEquity",
            Kpi::ReturnOnEquity => "returnOnEquity",
            Kpi::ProfitMargins => "profitMargins",
            Kpi::RevenueGrowth => "revenueGrowth",
            Kpi::CurrentRatio => "currentRatio",
            Kpi::DividendYield => "dividendYield",
        }
    }

    /// Get all KPIs
    pub fn all() -> [Kpi; 10] {
        [
            Kpi::TrailingPe,
            Kpi::ForwardPe,
            Kpi::PriceToBook,
            Kpi::EnterpriseToEbitda,
            Kpi::DebtToEquity,
            Kpi::ReturnOnEquity,
            Kpi::ProfitMargins,
            Kpi::RevenueGrowth,
            Kpi::CurrentRatio,
            Kpi::DividendYield,
        ]
    }

    /// Parse a KPI from its wire key (case-insensitive)
    pub fn from_key(key: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|kpi| kpi.key().eq_ignore_ascii_case(key.trim()))
    }
}

impl std::fmt::Display for Kpi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Which way a KPI improves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

/// How a KPI value is rendered for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    #[default]
    Decimal,
    Percent,
}

fn default_decimals() -> u8 {
    2
}

/// Scoring configuration for a single KPI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDefinition {
    pub kpi: Kpi,
    pub display_name: String,
    /// Share of the composite, in (0, 1]
    pub weight: f64,
    pub direction: Direction,
    /// Value that earns an absolute score of 10
    pub best: f64,
    /// Value that earns an absolute score of 1
    pub worst: f64,
    #[serde(default)]
    pub format: ValueFormat,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

impl KpiDefinition {
    pub fn new(
        kpi: Kpi,
        display_name: impl Into<String>,
        weight: f64,
        direction: Direction,
        best: f64,
        worst: f64,
    ) -> Self {
        Self {
            kpi,
            display_name: display_name.into(),
            weight,
            direction,
            best,
            worst,
            format: ValueFormat::Decimal,
            decimals: default_decimals(),
        }
    }

    /// Render as a percentage
    pub fn percent(mut self) -> Self {
        self.format = ValueFormat::Percent;
        self
    }

    pub fn lower_is_better(&self) -> bool {
        self.direction == Direction::LowerIsBetter
    }

    fn validate(&self) -> Result<()> {
        if !(self.weight > 0.0 && self.weight <= 1.0) {
            return Err(RaterError::Config(format!(
                "weight for {} must be in (0, 1], got {}",
                self.kpi, self.weight
            )));
        }
        if !self.best.is_finite() || !self.worst.is_finite() {
            return Err(RaterError::Config(format!(
                "thresholds for {} must be finite",
                self.kpi
            )));
        }
        let ordered = match self.direction {
            Direction::LowerIsBetter => self.best < self.worst,
            Direction::HigherIsBetter => self.best > self.worst,
        };
        if !ordered {
            return Err(RaterError::Config(format!(
                "thresholds for {} (best {}, worst {}) do not match direction {:?}",
                self.kpi, self.best, self.worst, self.direction
            )));
        }
        Ok(())
    }
}

/// Validated, immutable set of KPI definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<KpiDefinition>", into = "Vec<KpiDefinition>")]
pub struct KpiCatalog {
    definitions: Vec<KpiDefinition>,
}

impl KpiCatalog {
    /// Build a catalog, rejecting anything that breaks the weight or
    /// threshold invariants
    pub fn new(definitions: Vec<KpiDefinition>) -> Result<Self> {
        let catalog = Self { definitions };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The ten-ratio catalog used by default
    pub fn standard() -> Self {
        let lower = |kpi, name: &str, weight, best, worst| {
            KpiDefinition::new(kpi, name, weight, Direction::LowerIsBetter, best, worst)
        };
        let higher = |kpi, name: &str, weight, best, worst| {
            KpiDefinition::new(kpi, name, weight, Direction::HigherIsBetter, best, worst)
        };

        Self {
            definitions: vec![
                lower(Kpi::TrailingPe, "P/E Ratio (TTM)", 0.15, 5.0, 60.0),
                lower(Kpi::ForwardPe, "Forward P/E", 0.12, 5.0, 50.0),
                lower(Kpi::PriceToBook, "P/B Ratio", 0.10, 0.5, 20.0),
                lower(Kpi::EnterpriseToEbitda, "EV/EBITDA", 0.12, 3.0, 40.0),
                lower(Kpi::DebtToEquity, "Debt/Equity", 0.10, 0.0, 300.0),
                higher(Kpi::ReturnOnEquity, "ROE", 0.12, 0.40, -0.10).percent(),
                higher(Kpi::ProfitMargins, "Profit Margin", 0.10, 0.40, -0.10).percent(),
                higher(Kpi::RevenueGrowth, "Revenue Growth", 0.09, 0.50, -0.20).percent(),
                higher(Kpi::CurrentRatio, "Current Ratio", 0.05, 3.0, 0.3),
                higher(Kpi::DividendYield, "Dividend Yield", 0.05, 0.06, 0.0).percent(),
            ],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.definitions.is_empty() {
            return Err(RaterError::Config("KPI catalog is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for def in &self.definitions {
            if !seen.insert(def.kpi) {
                return Err(RaterError::Config(format!(
                    "KPI {} is defined more than once",
                    def.kpi
                )));
            }
            def.validate()?;
        }

        let total = self.total_weight();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(RaterError::Config(format!(
                "KPI weights must sum to 1, got {total}"
            )));
        }

        Ok(())
    }

    pub fn get(&self, kpi: Kpi) -> Option<&KpiDefinition> {
        self.definitions.iter().find(|def| def.kpi == kpi)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KpiDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.definitions.iter().map(|def| def.weight).sum()
    }
}

impl Default for KpiCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<Vec<KpiDefinition>> for KpiCatalog {
    type Error = RaterError;

    fn try_from(definitions: Vec<KpiDefinition>) -> Result<Self> {
        Self::new(definitions)
    }
}

impl From<KpiCatalog> for Vec<KpiDefinition> {
    fn from(catalog: KpiCatalog) -> Self {
        catalog.definitions
    }
}

/// One company's KPI readings. A KPI the company does not report is
/// simply absent; non-finite readings are never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KpiValues(BTreeMap<Kpi, f64>);

impl KpiValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading; returns false (and stores nothing) for NaN/inf
    pub fn insert(&mut self, kpi: Kpi, value: f64) -> bool {
        if value.is_finite() {
            self.0.insert(kpi, value);
            true
        } else {
            false
        }
    }

    /// Builder-style insert
    pub fn with(mut self, kpi: Kpi, value: f64) -> Self {
        self.insert(kpi, value);
        self
    }

    pub fn get(&self, kpi: Kpi) -> Option<f64> {
        self.0.get(&kpi).copied()
    }

    pub fn remove(&mut self, kpi: Kpi) -> Option<f64> {
        self.0.remove(&kpi)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Kpi, f64)> + '_ {
        self.0.iter().map(|(kpi, value)| (*kpi, *value))
    }
}

impl FromIterator<(Kpi, f64)> for KpiValues {
    fn from_iter<I: IntoIterator<Item = (Kpi, f64)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (kpi, value) in iter {
            values.insert(kpi, value);
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_weights_sum_to_one() {
        let catalog = KpiCatalog::standard();
        assert_eq!(catalog.len(), 10);
        assert!((catalog.total_weight() - 1.0).abs() <= WEIGHT_TOLERANCE);
        assert!(catalog.validate().is_ok());
        assert!(catalog.iter().all(|def| def.weight > 0.0 && def.weight <= 1.0));
    }

    #[test]
    fn test_standard_catalog_covers_every_kpi() {
        let catalog = KpiCatalog::standard();
        for kpi in Kpi::all() {
            assert!(catalog.get(kpi).is_some(), "missing {kpi}");
        }
    }

    #[test]
    fn test_rejects_weights_not_summing_to_one() {
        let mut defs: Vec<KpiDefinition> = KpiCatalog::standard().into();
        defs[0].weight = 0.5;
        let err = KpiCatalog::new(defs).unwrap_err();
        assert!(err.to_string().contains("sum to 1"));
    }

    #[test]
    fn test_rejects_zero_weight() {
        let defs = vec![
            KpiDefinition::new(Kpi::TrailingPe, "P/E", 1.0, Direction::LowerIsBetter, 5.0, 60.0),
            KpiDefinition::new(Kpi::ForwardPe, "Fwd P/E", 0.0, Direction::LowerIsBetter, 5.0, 50.0),
        ];
        assert!(KpiCatalog::new(defs).is_err());
    }

    #[test]
    fn test_rejects_thresholds_against_direction() {
        let defs = vec![KpiDefinition::new(
            Kpi::ReturnOnEquity,
            "ROE",
            1.0,
            Direction::HigherIsBetter,
            -0.10,
            0.40,
        )];
        let err = KpiCatalog::new(defs).unwrap_err();
        assert!(err.to_string().contains("direction"));
    }

    #[test]
    fn test_rejects_duplicates() {
        let defs = vec![
            KpiDefinition::new(Kpi::TrailingPe, "P/E", 0.5, Direction::LowerIsBetter, 5.0, 60.0),
            KpiDefinition::new(Kpi::TrailingPe, "P/E", 0.5, Direction::LowerIsBetter, 5.0, 60.0),
        ];
        assert!(KpiCatalog::new(defs).is_err());
    }

    #[test]
    fn test_catalog_json_uses_wire_keys_and_validates() {
        let json = serde_json::to_value(KpiCatalog::standard()).unwrap();
        assert_eq!(json[0]["kpi"], "trailingPE");
        assert_eq!(json[0]["direction"], "lower-is-better");
        assert_eq!(json[5]["format"], "percent");

        let back: KpiCatalog = serde_json::from_value(json).unwrap();
        assert_eq!(back, KpiCatalog::standard());

        let bad = serde_json::json!([{
            "kpi": "trailingPE", "display_name": "P/E", "weight": 0.3,
            "direction": "lower-is-better", "best": 5.0, "worst": 60.0
        }]);
        assert!(serde_json::from_value::<KpiCatalog>(bad).is_err());
    }

    #[test]
    fn test_kpi_from_key() {
        assert_eq!(Kpi::from_key("trailingPE"), Some(Kpi::TrailingPe));
        assert_eq!(Kpi::from_key(" DIVIDENDYIELD "), Some(Kpi::DividendYield));
        assert_eq!(Kpi::from_key("beta"), None);
    }

    #[test]
    fn test_kpi_values_drop_non_finite() {
        let mut values = KpiValues::new();
        assert!(values.insert(Kpi::TrailingPe, 12.0));
        assert!(!values.insert(Kpi::ForwardPe, f64::NAN));
        assert!(!values.insert(Kpi::PriceToBook, f64::INFINITY));
        assert_eq!(values.len(), 1);
        assert_eq!(values.get(Kpi::TrailingPe), Some(12.0));
        assert_eq!(values.get(Kpi::ForwardPe), None);
    }
}
