//! Configuration for rating operations

use crate::error::{RaterError, Result};
use crate::kpi::KpiCatalog;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the rating pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaterConfig {
    /// Maximum age of cached sector statistics
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,

    /// Per-peer fetch timeout during a sector refresh
    #[serde(with = "duration_secs")]
    pub peer_fetch_timeout: Duration,

    /// Maximum peer fetches in flight during one sector refresh
    pub max_concurrent_fetches: usize,

    /// Steepness `k` of the logistic used for relative scoring
    pub sigmoid_steepness: f64,

    /// Share of the absolute sub-score in the overall rating
    pub absolute_weight: f64,

    /// Share of the relative sub-score in the overall rating
    pub relative_weight: f64,

    /// HTTP request timeout for the market data client
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Rate limit for the market data client
    pub requests_per_minute: u32,

    /// Scoring catalog
    pub kpis: KpiCatalog,
}

impl Default for RaterConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),          // 1 hour
            peer_fetch_timeout: Duration::from_secs(15),
            max_concurrent_fetches: 8,
            sigmoid_steepness: 4.0,
            absolute_weight: 0.4,
            relative_weight: 0.6,
            request_timeout: Duration::from_secs(30),
            requests_per_minute: 120,
            kpis: KpiCatalog::standard(),
        }
    }
}

impl RaterConfig {
    /// Create a new configuration builder
    pub fn builder() -> RaterConfigBuilder {
        RaterConfigBuilder::default()
    }

    /// Load a configuration file; omitted fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            RaterError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STOCK_RATER_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(secs) = env_parse::<u64>("STOCK_RATER_CACHE_TTL_SECS")? {
            self.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("STOCK_RATER_PEER_TIMEOUT_SECS")? {
            self.peer_fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = env_parse::<usize>("STOCK_RATER_MAX_CONCURRENT_FETCHES")? {
            self.max_concurrent_fetches = limit;
        }
        if let Some(k) = env_parse::<f64>("STOCK_RATER_SIGMOID_STEEPNESS")? {
            self.sigmoid_steepness = k;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl.is_zero() {
            return Err(RaterError::Config(
                "cache_ttl must be greater than 0".to_string(),
            ));
        }

        if self.peer_fetch_timeout.is_zero() {
            return Err(RaterError::Config(
                "peer_fetch_timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_fetches == 0 {
            return Err(RaterError::Config(
                "max_concurrent_fetches must be greater than 0".to_string(),
            ));
        }

        if !(self.sigmoid_steepness.is_finite() && self.sigmoid_steepness > 0.0) {
            return Err(RaterError::Config(
                "sigmoid_steepness must be a positive number".to_string(),
            ));
        }

        let blend = self.absolute_weight + self.relative_weight;
        if self.absolute_weight < 0.0 || self.relative_weight < 0.0 || (blend - 1.0).abs() > 1e-9 {
            return Err(RaterError::Config(format!(
                "absolute_weight and relative_weight must be non-negative and sum to 1, got {blend}"
            )));
        }

        if self.requests_per_minute == 0 {
            return Err(RaterError::Config(
                "requests_per_minute must be greater than 0".to_string(),
            ));
        }

        self.kpis.validate()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RaterError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}

/// Durations are written as whole seconds in configuration files
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Builder for RaterConfig
#[derive(Debug, Default)]
pub struct RaterConfigBuilder {
    cache_ttl: Option<Duration>,
    peer_fetch_timeout: Option<Duration>,
    max_concurrent_fetches: Option<usize>,
    sigmoid_steepness: Option<f64>,
    blend: Option<(f64, f64)>,
    request_timeout: Option<Duration>,
    requests_per_minute: Option<u32>,
    kpis: Option<KpiCatalog>,
}

impl RaterConfigBuilder {
    /// Set the sector statistics TTL
    pub fn cache_ttl(mut self, duration: Duration) -> Self {
        self.cache_ttl = Some(duration);
        self
    }

    /// Set the per-peer fetch timeout
    pub fn peer_fetch_timeout(mut self, duration: Duration) -> Self {
        self.peer_fetch_timeout = Some(duration);
        self
    }

    /// Set the peer fetch fan-out limit
    pub fn max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = Some(limit);
        self
    }

    /// Set the relative-score sigmoid steepness
    pub fn sigmoid_steepness(mut self, k: f64) -> Self {
        self.sigmoid_steepness = Some(k);
        self
    }

    /// Set the absolute/relative blend of the overall rating
    pub fn blend(mut self, absolute: f64, relative: f64) -> Self {
        self.blend = Some((absolute, relative));
        self
    }

    /// Set the HTTP request timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Set the market data rate limit
    pub fn requests_per_minute(mut self, limit: u32) -> Self {
        self.requests_per_minute = Some(limit);
        self
    }

    /// Replace the KPI catalog
    pub fn kpis(mut self, catalog: KpiCatalog) -> Self {
        self.kpis = Some(catalog);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<RaterConfig> {
        let defaults = RaterConfig::default();
        let (absolute_weight, relative_weight) = self
            .blend
            .unwrap_or((defaults.absolute_weight, defaults.relative_weight));

        let config = RaterConfig {
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            peer_fetch_timeout: self.peer_fetch_timeout.unwrap_or(defaults.peer_fetch_timeout),
            max_concurrent_fetches: self
                .max_concurrent_fetches
                .unwrap_or(defaults.max_concurrent_fetches),
            sigmoid_steepness: self.sigmoid_steepness.unwrap_or(defaults.sigmoid_steepness),
            absolute_weight,
            relative_weight,
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            requests_per_minute: self.requests_per_minute.unwrap_or(defaults.requests_per_minute),
            kpis: self.kpis.unwrap_or(defaults.kpis),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RaterConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert!((config.sigmoid_steepness - 4.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RaterConfig::builder()
            .cache_ttl(Duration::from_secs(60))
            .max_concurrent_fetches(2)
            .blend(0.5, 0.5)
            .build()
            .unwrap();

        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_fetches, 2);
        assert!((config.absolute_weight - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_rejects_bad_blend() {
        let result = RaterConfig::builder().blend(0.5, 0.6).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_zero_fan_out() {
        let config = RaterConfig {
            max_concurrent_fetches: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_uses_seconds() {
        let json = serde_json::to_value(RaterConfig::default()).unwrap();
        assert_eq!(json["cache_ttl"], 3600);
        assert_eq!(json["peer_fetch_timeout"], 15);

        let partial: RaterConfig =
            serde_json::from_str(r#"{"cache_ttl": 120, "sigmoid_steepness": 2.5}"#).unwrap();
        assert_eq!(partial.cache_ttl, Duration::from_secs(120));
        assert!((partial.sigmoid_steepness - 2.5).abs() < f64::EPSILON);
        assert_eq!(partial.kpis, KpiCatalog::standard());
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("rater-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"max_concurrent_fetches": 3}"#).unwrap();

        let config = RaterConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_concurrent_fetches, 3);

        std::fs::write(&path, r#"{"max_concurrent_fetches": 0}"#).unwrap();
        assert!(RaterConfig::from_json_file(&path).is_err());

        let _ = std::fs::remove_file(&path);
    }
}
