//! Value scoring
//!
//! Turns one company's KPI readings plus its sector's peer medians into a
//! 1-10 rating. Everything here is pure and deterministic.
//!
//! Two sub-scores are computed per KPI:
//!
//! - **absolute**: linear interpolation between the KPI's `worst` (1) and
//!   `best` (10) thresholds, clamped.
//! - **relative**: the log of the company/median ratio, oriented so that
//!   "better than the median" is positive, passed through a logistic with
//!   steepness `k` and scaled onto 1-10. A reading equal to the median
//!   scores exactly 5.5.
//!
//! KPIs without a usable reading (or median) drop out of the matching
//! aggregate and the remaining weights are renormalized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::RaterConfig;
use crate::error::{RaterError, Result};
use crate::kpi::{Direction, Kpi, KpiCatalog, KpiDefinition, KpiValues};

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;
/// Score of a KPI sitting exactly on its sector median
pub const MIDPOINT_SCORE: f64 = 5.5;
pub const DEFAULT_STEEPNESS: f64 = 4.0;

fn clamp_score(score: f64) -> f64 {
    score.clamp(MIN_SCORE, MAX_SCORE)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Absolute score of `value` against the KPI's fixed thresholds.
///
/// `best` and `worst` are ordered by the KPI's direction, so a single
/// interpolation handles both lower- and higher-is-better KPIs.
pub fn absolute_score(def: &KpiDefinition, value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let span = def.best - def.worst;
    if span == 0.0 {
        return None;
    }
    let position = ((value - def.worst) / span).clamp(0.0, 1.0);
    Some(clamp_score(MIN_SCORE + (MAX_SCORE - MIN_SCORE) * position))
}

/// Natural log of the company/median ratio.
///
/// Uses the signed deviation `(value - median) / |median|` so a negative
/// median still orders correctly; for positive medians this is exactly
/// `ln(value / median)`. A value on the far side of zero yields -inf.
fn log_ratio(value: f64, median: f64) -> Option<f64> {
    if !value.is_finite() || !median.is_finite() || median == 0.0 {
        return None;
    }
    let growth = 1.0 + (value - median) / median.abs();
    if growth > 0.0 {
        Some(growth.ln())
    } else {
        Some(f64::NEG_INFINITY)
    }
}

/// Relative score of `value` against the sector median.
///
/// Returns `None` when the median is zero or either input is non-finite.
pub fn relative_score(
    def: &KpiDefinition,
    value: f64,
    sector_median: f64,
    steepness: f64,
) -> Option<f64> {
    let ratio = log_ratio(value, sector_median)?;
    let directional = match def.direction {
        Direction::LowerIsBetter => -ratio,
        Direction::HigherIsBetter => ratio,
    };
    let scaled = sigmoid(steepness * directional);
    Some(clamp_score(MIN_SCORE + (MAX_SCORE - MIN_SCORE) * scaled))
}

/// Weighted mean over `(weight, score)` pairs, renormalizing the weights
/// of whatever is present. `None` when nothing contributed.
pub fn aggregate<I>(scores: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (weighted, total_weight) = scores
        .into_iter()
        .filter(|(weight, score)| *weight > 0.0 && score.is_finite())
        .fold((0.0, 0.0), |(sum, total), (weight, score)| {
            (sum + weight * score, total + weight)
        });

    (total_weight > 0.0).then(|| clamp_score(weighted / total_weight))
}

/// Share of each sub-score in the overall rating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Blend {
    pub absolute: f64,
    pub relative: f64,
}

impl Default for Blend {
    fn default() -> Self {
        Self {
            absolute: 0.4,
            relative: 0.6,
        }
    }
}

/// Blend the two sub-scores, falling back to whichever one exists
pub fn overall(absolute: Option<f64>, relative: Option<f64>, blend: Blend) -> Option<f64> {
    match (absolute, relative) {
        (Some(abs), Some(rel)) => Some(clamp_score(blend.absolute * abs + blend.relative * rel)),
        (Some(abs), None) => Some(clamp_score(abs)),
        (None, Some(rel)) => Some(clamp_score(rel)),
        (None, None) => None,
    }
}

/// Per-KPI line of a rating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiScore {
    pub kpi: Kpi,
    pub value: Option<f64>,
    pub sector_median: Option<f64>,
    pub absolute: Option<f64>,
    pub relative: Option<f64>,
    /// This KPI's own absolute/relative blend
    pub combined: Option<f64>,
    pub weight: f64,
}

/// Outcome of rating one company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingResult {
    pub overall: f64,
    /// `None` when no KPI produced an absolute score
    pub absolute: Option<f64>,
    /// `None` when no KPI could be compared with a sector median
    pub relative: Option<f64>,
    pub breakdown: Vec<KpiScore>,
}

impl RatingResult {
    pub fn kpi(&self, kpi: Kpi) -> Option<&KpiScore> {
        self.breakdown.iter().find(|line| line.kpi == kpi)
    }

    /// KPIs that contributed to at least one sub-score
    pub fn scored_kpis(&self) -> usize {
        self.breakdown
            .iter()
            .filter(|line| line.absolute.is_some() || line.relative.is_some())
            .count()
    }
}

/// Applies a [`KpiCatalog`] to company readings
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    catalog: Arc<KpiCatalog>,
    steepness: f64,
    blend: Blend,
}

impl ScoringEngine {
    pub fn new(catalog: Arc<KpiCatalog>) -> Self {
        Self {
            catalog,
            steepness: DEFAULT_STEEPNESS,
            blend: Blend::default(),
        }
    }

    pub fn from_config(config: &RaterConfig) -> Self {
        Self {
            catalog: Arc::new(config.kpis.clone()),
            steepness: config.sigmoid_steepness,
            blend: Blend {
                absolute: config.absolute_weight,
                relative: config.relative_weight,
            },
        }
    }

    pub fn with_steepness(mut self, steepness: f64) -> Self {
        self.steepness = steepness;
        self
    }

    pub fn with_blend(mut self, blend: Blend) -> Self {
        self.blend = blend;
        self
    }

    pub fn catalog(&self) -> &Arc<KpiCatalog> {
        &self.catalog
    }

    /// Rate a company. An empty `medians` map means no sector comparison
    /// is possible and the rating is absolute-only.
    pub fn rate(&self, values: &KpiValues, medians: &BTreeMap<Kpi, f64>) -> Result<RatingResult> {
        let breakdown: Vec<KpiScore> = self
            .catalog
            .iter()
            .map(|def| {
                let value = values.get(def.kpi);
                let sector_median = medians.get(&def.kpi).copied();
                let absolute = value.and_then(|v| absolute_score(def, v));
                let relative = value
                    .zip(sector_median)
                    .and_then(|(v, m)| relative_score(def, v, m, self.steepness));

                KpiScore {
                    kpi: def.kpi,
                    value,
                    sector_median,
                    absolute,
                    relative,
                    combined: overall(absolute, relative, self.blend),
                    weight: def.weight,
                }
            })
            .collect();

        let absolute = aggregate(
            breakdown
                .iter()
                .filter_map(|line| line.absolute.map(|s| (line.weight, s))),
        );
        let relative = aggregate(
            breakdown
                .iter()
                .filter_map(|line| line.relative.map(|s| (line.weight, s))),
        );

        let overall = overall(absolute, relative, self.blend).ok_or_else(|| {
            RaterError::InsufficientData("no KPI produced a usable score".to_string())
        })?;

        Ok(RatingResult {
            overall,
            absolute,
            relative,
            breakdown,
        })
    }
}
