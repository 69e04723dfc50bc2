//! Sector peer statistics with time-bounded caching
//!
//! Computing a sector's medians means fetching every peer in the sector,
//! which can take minutes, so results are kept for a TTL. Each sector has
//! its own slot and lock; refreshes for different sectors never wait on
//! each other.
//!
//! Concurrent callers for a sector that is being refreshed join the
//! in-flight refresh and wait for its fresh result. Expired entries are
//! never served. The refresh runs as its own task and keeps going for as
//! long as at least one caller is still waiting on it; once every waiter
//! has gone it stops issuing peer fetches and stores nothing.

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RaterConfig;
use crate::error::{RaterError, Result};
use crate::kpi::{Kpi, KpiCatalog, KpiValues};
use crate::source::{MetricSource, PeerUniverse, sector_key};

/// Standard median; sorts `values` in place. `None` for an empty slice.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Aggregate KPI statistics over a sector's peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorStats {
    pub sector: String,
    /// Peer median per KPI; KPIs no peer reported are absent
    pub medians: BTreeMap<Kpi, f64>,
    /// Peers whose data was fetched successfully
    pub peer_count: usize,
    pub peers_requested: usize,
    pub peers_failed: usize,
    pub computed_at: DateTime<Utc>,
    /// Readings of every peer that answered, keyed by ticker
    pub peers: BTreeMap<String, KpiValues>,
}

fn peer_medians<'a>(
    peers: impl Iterator<Item = &'a KpiValues> + Clone,
    catalog: &KpiCatalog,
) -> BTreeMap<Kpi, f64> {
    catalog
        .iter()
        .filter_map(|def| {
            let mut readings: Vec<f64> = peers.clone().filter_map(|p| p.get(def.kpi)).collect();
            median(&mut readings).map(|m| (def.kpi, m))
        })
        .collect()
}

impl SectorStats {
    /// Statistics over the given `(ticker, readings)` pairs
    pub fn from_peers<S, I>(sector: impl Into<String>, peers: I, catalog: &KpiCatalog) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, KpiValues)>,
    {
        let peers: BTreeMap<String, KpiValues> = peers
            .into_iter()
            .map(|(ticker, kpis)| (ticker.into(), kpis))
            .collect();

        Self {
            sector: sector.into(),
            medians: peer_medians(peers.values(), catalog),
            peer_count: peers.len(),
            peers_requested: peers.len(),
            peers_failed: 0,
            computed_at: Utc::now(),
            peers,
        }
    }

    /// A sector with nothing to compare against
    pub fn empty(sector: impl Into<String>) -> Self {
        Self {
            sector: sector.into(),
            medians: BTreeMap::new(),
            peer_count: 0,
            peers_requested: 0,
            peers_failed: 0,
            computed_at: Utc::now(),
            peers: BTreeMap::new(),
        }
    }

    /// The same statistics with `ticker` taken out of the peer set, so a
    /// company is never compared against itself
    pub fn excluding(&self, ticker: &str, catalog: &KpiCatalog) -> Self {
        if !self.peers.contains_key(ticker) {
            return self.clone();
        }

        let mut peers = self.peers.clone();
        peers.remove(ticker);
        Self {
            sector: self.sector.clone(),
            medians: peer_medians(peers.values(), catalog),
            peer_count: peers.len(),
            peers_requested: self.peers_requested,
            peers_failed: self.peers_failed,
            computed_at: self.computed_at,
            peers,
        }
    }

    pub fn median(&self, kpi: Kpi) -> Option<f64> {
        self.medians.get(&kpi).copied()
    }

    pub fn has_relative_data(&self) -> bool {
        !self.medians.is_empty()
    }
}

/// Cache tuning knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub peer_fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
}

impl CacheSettings {
    pub fn from_config(config: &RaterConfig) -> Self {
        Self {
            ttl: config.cache_ttl,
            peer_fetch_timeout: config.peer_fetch_timeout,
            max_concurrent_fetches: config.max_concurrent_fetches,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from_config(&RaterConfig::default())
    }
}

#[derive(Debug, Clone)]
enum RefreshError {
    Universe(String),
    Abandoned,
    Aborted(String),
}

impl From<RefreshError> for RaterError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Universe(reason) => {
                RaterError::UpstreamUnavailable(format!("peer universe: {reason}"))
            }
            RefreshError::Abandoned => {
                RaterError::Other("sector refresh abandoned by all callers".to_string())
            }
            RefreshError::Aborted(reason) => {
                RaterError::Other(format!("sector refresh aborted: {reason}"))
            }
        }
    }
}

type RefreshOutcome = std::result::Result<Arc<SectorStats>, RefreshError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Fetches a sector's peers and reduces them to medians
struct PeerScanner {
    source: Arc<dyn MetricSource>,
    universe: Arc<dyn PeerUniverse>,
    catalog: Arc<KpiCatalog>,
    settings: CacheSettings,
}

impl PeerScanner {
    async fn scan(
        &self,
        sector: &str,
        interest: &Weak<()>,
    ) -> std::result::Result<SectorStats, RefreshError> {
        let peers = self
            .universe
            .peers_of(sector)
            .await
            .map_err(|e| RefreshError::Universe(e.to_string()))?;
        let requested = peers.len();
        info!(sector, peers = requested, "Refreshing sector statistics");

        let outcomes: Vec<Option<(String, KpiValues)>> = stream::iter(peers)
            .take_while(|_| future::ready(interest.strong_count() > 0))
            .map(|ticker| self.fetch_peer(ticker))
            .buffer_unordered(self.settings.max_concurrent_fetches.max(1))
            .collect()
            .await;

        if outcomes.len() < requested {
            info!(sector, issued = outcomes.len(), "Sector refresh abandoned");
            return Err(RefreshError::Abandoned);
        }

        let fetched: Vec<(String, KpiValues)> = outcomes.into_iter().flatten().collect();
        let answered = fetched.len();
        let mut stats = SectorStats::from_peers(sector, fetched, &self.catalog);
        stats.peers_requested = requested;
        stats.peers_failed = requested - answered;

        info!(
            sector,
            peers = stats.peer_count,
            failed = stats.peers_failed,
            kpis = stats.medians.len(),
            "Sector statistics computed"
        );
        Ok(stats)
    }

    async fn fetch_peer(&self, ticker: String) -> Option<(String, KpiValues)> {
        let timeout = self.settings.peer_fetch_timeout;
        match tokio::time::timeout(timeout, self.source.fetch(&ticker)).await {
            Ok(Ok(snapshot)) => Some((ticker, snapshot.kpis)),
            Ok(Err(e)) => {
                warn!(ticker, error = %e, "Skipping peer");
                None
            }
            Err(_) => {
                warn!(ticker, ?timeout, "Peer fetch timed out");
                None
            }
        }
    }
}

struct CachedEntry {
    stats: Arc<SectorStats>,
    stored_at: Instant,
}

struct InFlight {
    id: u64,
    /// Alive while any caller is still waiting
    interest: Weak<()>,
    outcome: SharedRefresh,
}

#[derive(Default)]
struct SlotState {
    entry: Option<CachedEntry>,
    refresh: Option<InFlight>,
}

#[derive(Default)]
struct SectorSlot {
    state: Mutex<SlotState>,
}

/// Owned, injectable cache of [`SectorStats`] keyed by sector
pub struct SectorStatsCache {
    scanner: Arc<PeerScanner>,
    slots: Mutex<HashMap<String, Arc<SectorSlot>>>,
    next_refresh: AtomicU64,
}

impl SectorStatsCache {
    pub fn new(
        source: Arc<dyn MetricSource>,
        universe: Arc<dyn PeerUniverse>,
        catalog: Arc<KpiCatalog>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            scanner: Arc::new(PeerScanner {
                source,
                universe,
                catalog,
                settings,
            }),
            slots: Mutex::new(HashMap::new()),
            next_refresh: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.scanner.settings
    }

    fn is_fresh(&self, entry: &CachedEntry) -> bool {
        entry.stored_at.elapsed() < self.scanner.settings.ttl
    }

    async fn slot(&self, key: &str) -> Arc<SectorSlot> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    /// Statistics for `sector`, computing them if nothing fresh is cached
    pub async fn get(&self, sector: &str) -> Result<Arc<SectorStats>> {
        let key = sector_key(sector);
        let slot = self.slot(&key).await;

        let (interest, outcome) = {
            let mut state = slot.state.lock().await;

            let cached = state
                .entry
                .as_ref()
                .filter(|entry| self.is_fresh(entry))
                .map(|entry| Arc::clone(&entry.stats));
            if let Some(stats) = cached {
                debug!(sector = %key, "Sector cache hit");
                return Ok(stats);
            }
            if state.entry.take().is_some() {
                debug!(sector = %key, "Sector cache entry expired");
            }

            let joined = state.refresh.as_ref().and_then(|inflight| {
                inflight
                    .interest
                    .upgrade()
                    .map(|interest| (interest, inflight.outcome.clone()))
            });

            match joined {
                Some(joined) => {
                    debug!(sector = %key, "Joining in-flight sector refresh");
                    joined
                }
                None => self.start_refresh(sector, &slot, &mut state),
            }
        };

        let result = outcome.await;
        drop(interest);
        result.map_err(RaterError::from)
    }

    fn start_refresh(
        &self,
        sector: &str,
        slot: &Arc<SectorSlot>,
        state: &mut SlotState,
    ) -> (Arc<()>, SharedRefresh) {
        let id = self.next_refresh.fetch_add(1, Ordering::Relaxed);
        let interest = Arc::new(());
        let watcher = Arc::downgrade(&interest);

        let scanner = Arc::clone(&self.scanner);
        let task_slot = Arc::clone(slot);
        let task_watcher = watcher.clone();
        let label = sector.trim().to_string();

        let handle = tokio::spawn(async move {
            let outcome = scanner.scan(&label, &task_watcher).await.map(Arc::new);

            let mut state = task_slot.state.lock().await;
            if state.refresh.as_ref().is_some_and(|r| r.id == id) {
                state.refresh = None;
                if let Ok(stats) = &outcome {
                    state.entry = Some(CachedEntry {
                        stats: Arc::clone(stats),
                        stored_at: Instant::now(),
                    });
                }
            }
            outcome
        });

        let outcome = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(RefreshError::Aborted(e.to_string())),
            }
        }
        .boxed()
        .shared();

        state.refresh = Some(InFlight {
            id,
            interest: watcher,
            outcome: outcome.clone(),
        });

        (interest, outcome)
    }

    /// Fresh cached statistics for `sector`, without triggering a refresh
    pub async fn peek(&self, sector: &str) -> Option<Arc<SectorStats>> {
        let slot = self.slots.lock().await.get(&sector_key(sector)).cloned()?;
        let state = slot.state.lock().await;
        state
            .entry
            .as_ref()
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| Arc::clone(&entry.stats))
    }

    /// Drop every entry older than the TTL; returns how many were dropped.
    ///
    /// Slots stay in the map: a concurrent `get` may already hold one and is
    /// about to start that sector's only refresh in it.
    pub async fn evict_expired(&self) -> usize {
        let slots = self.slots.lock().await;
        let mut evicted = 0;

        for slot in slots.values() {
            let mut state = slot.state.lock().await;
            if state.entry.as_ref().is_some_and(|entry| !self.is_fresh(entry)) {
                state.entry = None;
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!(evicted, "Evicted expired sector statistics");
        }
        evicted
    }

    /// Remove all cached entries. In-flight refreshes still answer their
    /// current waiters but their results are not kept.
    pub async fn clear(&self) {
        let mut slots = self.slots.lock().await;
        let cleared = slots.len();
        slots.clear();
        info!(sectors = cleared, "Sector cache cleared");
    }

    /// Number of sectors with fresh statistics
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        let mut fresh = 0;
        for slot in slots.values() {
            let state = slot.state.lock().await;
            if state.entry.as_ref().is_some_and(|entry| self.is_fresh(entry)) {
                fresh += 1;
            }
        }
        fresh
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
