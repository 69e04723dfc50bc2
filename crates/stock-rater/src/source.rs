//! Collaborator contracts: where KPI readings and sector peers come from

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::{RaterError, Result};
use crate::kpi::KpiValues;

/// Everything a data source knows about one company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySnapshot {
    pub ticker: String,
    pub company_name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub kpis: KpiValues,
}

impl CompanySnapshot {
    pub fn new(ticker: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            company_name: company_name.into(),
            sector: None,
            industry: None,
            kpis: KpiValues::new(),
        }
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_kpis(mut self, kpis: KpiValues) -> Self {
        self.kpis = kpis;
        self
    }

    /// Sector label, if the source classified the company at all
    pub fn classified_sector(&self) -> Option<&str> {
        self.sector
            .as_deref()
            .map(str::trim)
            .filter(|sector| !sector.is_empty())
    }
}

/// Source of per-company KPI readings.
///
/// Implementations report an unknown ticker as
/// [`RaterError::TickerNotFound`] and transport trouble as
/// [`RaterError::UpstreamUnavailable`]. Retries, if any, happen in here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch(&self, ticker: &str) -> Result<CompanySnapshot>;
}

/// The set of tickers considered peers for a sector
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerUniverse: Send + Sync {
    /// Tickers classified under `sector`. Unknown sectors yield an empty list.
    async fn peers_of(&self, sector: &str) -> Result<Vec<String>>;
}

/// Normalized form of a sector label used for lookups
pub(crate) fn sector_key(sector: &str) -> String {
    sector.trim().to_lowercase()
}

/// Fixed sector → tickers table, typically loaded from a JSON file shaped
/// like `{"Technology": ["AAPL", "MSFT"], ...}`
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    sectors: HashMap<String, BTreeSet<String>>,
}

impl StaticUniverse {
    pub fn new<S, I, T>(entries: impl IntoIterator<Item = (S, I)>) -> Self
    where
        S: AsRef<str>,
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut sectors: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (sector, tickers) in entries {
            let set = sectors.entry(sector_key(sector.as_ref())).or_default();
            set.extend(
                tickers
                    .into_iter()
                    .map(|t| t.as_ref().trim().to_uppercase())
                    .filter(|t| !t.is_empty()),
            );
        }
        Self { sectors }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
        Ok(Self::new(raw))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RaterError::Config(format!("cannot read universe {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Number of distinct sectors
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Total tickers across all sectors
    pub fn ticker_count(&self) -> usize {
        self.sectors.values().map(BTreeSet::len).sum()
    }
}

#[async_trait]
impl PeerUniverse for StaticUniverse {
    async fn peers_of(&self, sector: &str) -> Result<Vec<String>> {
        Ok(self
            .sectors
            .get(&sector_key(sector))
            .map(|tickers| tickers.iter().cloned().collect())
            .unwrap_or_default())
    }
}
