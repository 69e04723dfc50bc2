//! End-to-end analysis of a single ticker

use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::cache::{CacheSettings, SectorStats, SectorStatsCache};
use crate::config::RaterConfig;
use crate::error::{RaterError, Result};
use crate::scoring::ScoringEngine;
use crate::source::{CompanySnapshot, MetricSource, PeerUniverse};

use super::result::{KpiComparison, StockAnalysis};

const MAX_TICKER_LEN: usize = 16;

/// Steps of a single analysis request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    ResolveTicker,
    FetchCompanyKpis,
    ResolveSector,
    ObtainSectorStats,
    Score,
    Done,
    Failed,
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisStage::ResolveTicker => "resolve-ticker",
            AnalysisStage::FetchCompanyKpis => "fetch-company-kpis",
            AnalysisStage::ResolveSector => "resolve-sector",
            AnalysisStage::ObtainSectorStats => "obtain-sector-stats",
            AnalysisStage::Score => "score",
            AnalysisStage::Done => "done",
            AnalysisStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Trim, upper-case and sanity-check a ticker symbol.
///
/// Accepts the shapes Yahoo uses: `AAPL`, `BRK-B`, `BRK.B`, `^GSPC`,
/// `EURUSD=X`.
pub fn normalize_ticker(raw: &str) -> Result<String> {
    let ticker = raw.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(RaterError::InvalidTicker("ticker is empty".to_string()));
    }
    if ticker.chars().count() > MAX_TICKER_LEN {
        return Err(RaterError::InvalidTicker(format!(
            "'{ticker}' is longer than {MAX_TICKER_LEN} characters"
        )));
    }

    let mut chars = ticker.chars();
    let leading_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '^');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if !(leading_ok && rest_ok) {
        return Err(RaterError::InvalidTicker(format!(
            "'{ticker}' contains characters not allowed in a ticker"
        )));
    }

    Ok(ticker)
}

/// Orchestrates ticker → company KPIs → sector statistics → rating
pub struct AnalysisPipeline {
    source: Arc<dyn MetricSource>,
    cache: Arc<SectorStatsCache>,
    engine: ScoringEngine,
}

impl AnalysisPipeline {
    pub fn new(
        source: Arc<dyn MetricSource>,
        cache: Arc<SectorStatsCache>,
        engine: ScoringEngine,
    ) -> Self {
        Self {
            source,
            cache,
            engine,
        }
    }

    /// Wire a pipeline and its sector cache from configuration
    pub fn from_config(
        source: Arc<dyn MetricSource>,
        universe: Arc<dyn PeerUniverse>,
        config: &RaterConfig,
    ) -> Self {
        let engine = ScoringEngine::from_config(config);
        let cache = Arc::new(SectorStatsCache::new(
            Arc::clone(&source),
            universe,
            Arc::clone(engine.catalog()),
            CacheSettings::from_config(config),
        ));

        Self::new(source, cache, engine)
    }

    pub fn cache(&self) -> &Arc<SectorStatsCache> {
        &self.cache
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    /// Invalidate every cached sector
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Analyse one ticker.
    ///
    /// Dropping the returned future abandons the request; a sector refresh
    /// it started keeps running only while other requests wait on it.
    pub async fn analyze(&self, ticker: &str) -> Result<StockAnalysis> {
        let request_id = Uuid::new_v4();
        let span = info_span!("analysis", %request_id, ticker = ticker.trim());

        async {
            let mut stage = AnalysisStage::ResolveTicker;
            let outcome = self.run(ticker, request_id, &mut stage).await;
            match &outcome {
                Ok(analysis) => info!(
                    overall = analysis.rating.overall,
                    peers = analysis.sector_peer_count,
                    "Analysis complete"
                ),
                Err(e) => {
                    warn!(failed_at = %stage, kind = ?e.kind(), error = %e, "Analysis failed");
                    enter(&mut stage, AnalysisStage::Failed);
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        raw: &str,
        request_id: Uuid,
        stage: &mut AnalysisStage,
    ) -> Result<StockAnalysis> {
        let ticker = normalize_ticker(raw)?;

        enter(stage, AnalysisStage::FetchCompanyKpis);
        let snapshot = self.source.fetch(&ticker).await.map_err(upstream_error)?;

        enter(stage, AnalysisStage::ResolveSector);
        let sector = snapshot.classified_sector().map(str::to_string);

        enter(stage, AnalysisStage::ObtainSectorStats);
        let stats = match &sector {
            Some(sector) => {
                let stats = self.cache.get(sector).await?;
                Some(stats.excluding(&ticker, self.engine.catalog()))
            }
            None => {
                info!("No sector classification, rating on absolute thresholds only");
                None
            }
        };

        enter(stage, AnalysisStage::Score);
        let analysis = self.score(ticker, request_id, snapshot, sector, stats.as_ref())?;

        enter(stage, AnalysisStage::Done);
        Ok(analysis)
    }

    fn score(
        &self,
        ticker: String,
        request_id: Uuid,
        snapshot: CompanySnapshot,
        sector: Option<String>,
        stats: Option<&SectorStats>,
    ) -> Result<StockAnalysis> {
        let medians = stats.map(|s| s.medians.clone()).unwrap_or_default();
        let rating = self
            .engine
            .rate(&snapshot.kpis, &medians)
            .map_err(|e| match e {
                RaterError::InsufficientData(_) => RaterError::InsufficientData(ticker.clone()),
                other => other,
            })?;

        let catalog = self.engine.catalog();
        let comparison = catalog
            .iter()
            .zip(&rating.breakdown)
            .map(|(def, line)| KpiComparison::new(def, line))
            .collect();
        let kpis: BTreeMap<_, _> = catalog
            .iter()
            .map(|def| (def.kpi, snapshot.kpis.get(def.kpi)))
            .collect();

        Ok(StockAnalysis {
            request_id,
            ticker,
            company_name: snapshot.company_name,
            sector_unclassified: sector.is_none(),
            sector,
            industry: snapshot.industry.filter(|i| !i.trim().is_empty()),
            kpis,
            sector_medians: medians,
            sector_peer_count: stats.map_or(0, |s| s.peer_count),
            rating,
            comparison,
            analyzed_at: Utc::now(),
        })
    }
}

fn enter(stage: &mut AnalysisStage, next: AnalysisStage) {
    debug!(from = %stage, to = %next, "Analysis stage");
    *stage = next;
}

/// Anything the source reports other than "not found" is an upstream outage
fn upstream_error(err: RaterError) -> RaterError {
    match err {
        RaterError::TickerNotFound(_) | RaterError::UpstreamUnavailable(_) => err,
        other => RaterError::UpstreamUnavailable(other.to_string()),
    }
}
