use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::EngineError;

/// Lower edge of the coherence corridor (golden ratio inverse).
pub const COHERENCE_LOWER_BOUND: f64 = 0.618;
/// Upper edge of the coherence corridor (two thirds).
pub const COHERENCE_UPPER_BOUND: f64 = 0.6667;

pub const DEFAULT_WINDOW_MINUTES: f64 = 30.0;
pub const DEFAULT_INTERRUPT_SATURATION_SECONDS: f64 = 300.0;
pub const DEFAULT_VOLATILITY_SCALE: f64 = 2.0;
pub const DEFAULT_DRIFT_SCALE: f64 = 2.0;
pub const DEFAULT_CONTRADICTION_AMPLIFICATION: f64 = 3.0;
pub const MEDIUM_CONFIDENCE_MIN_EVENTS: usize = 5;
pub const HIGH_CONFIDENCE_MIN_EVENTS: usize = 20;

pub const MIN_GOAL_SIMILARITY: f64 = 0.7;
pub const MIN_CONTINUITY_SCORE: f64 = 0.6;
pub const CONSTRAINT_MATCH_SIMILARITY: f64 = 0.5;

/// Tuning constants of the coherence calculator. The defaults were tuned
/// empirically; nothing downstream depends on them beyond the corridor bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CoherenceConfig {
    pub window_minutes: f64,
    /// Mean interrupt duration at which interrupt cost saturates at 1.0
    pub interrupt_saturation_seconds: f64,
    /// Divisor applied to the coefficient of variation of inter-event gaps
    pub volatility_scale: f64,
    pub drift_scale: f64,
    pub contradiction_amplification: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub medium_confidence_min_events: usize,
    pub high_confidence_min_events: usize,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            window_minutes: DEFAULT_WINDOW_MINUTES,
            interrupt_saturation_seconds: DEFAULT_INTERRUPT_SATURATION_SECONDS,
            volatility_scale: DEFAULT_VOLATILITY_SCALE,
            drift_scale: DEFAULT_DRIFT_SCALE,
            contradiction_amplification: DEFAULT_CONTRADICTION_AMPLIFICATION,
            lower_bound: COHERENCE_LOWER_BOUND,
            upper_bound: COHERENCE_UPPER_BOUND,
            medium_confidence_min_events: MEDIUM_CONFIDENCE_MIN_EVENTS,
            high_confidence_min_events: HIGH_CONFIDENCE_MIN_EVENTS,
        }
    }
}

/// Gates of the return-mapping validator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidatorThresholds {
    pub min_goal_similarity: f64,
    pub min_continuity_score: f64,
    /// A reconstructed constraint matches an original one strictly above this
    pub constraint_match_similarity: f64,
}

impl Default for ValidatorThresholds {
    fn default() -> Self {
        Self {
            min_goal_similarity: MIN_GOAL_SIMILARITY,
            min_continuity_score: MIN_CONTINUITY_SCORE,
            constraint_match_similarity: CONSTRAINT_MATCH_SIMILARITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct EngineConfig {
    pub coherence: CoherenceConfig,
    pub validator: ValidatorThresholds,
}

pub const ENV_WINDOW_MINUTES: &str = "RESONA_WINDOW_MINUTES";
pub const ENV_INTERRUPT_SATURATION_SECONDS: &str = "RESONA_INTERRUPT_SATURATION_SECONDS";
pub const ENV_VOLATILITY_SCALE: &str = "RESONA_VOLATILITY_SCALE";
pub const ENV_DRIFT_SCALE: &str = "RESONA_DRIFT_SCALE";
pub const ENV_CONTRADICTION_AMPLIFICATION: &str = "RESONA_CONTRADICTION_AMPLIFICATION";
pub const ENV_MIN_GOAL_SIMILARITY: &str = "RESONA_MIN_GOAL_SIMILARITY";
pub const ENV_MIN_CONTINUITY_SCORE: &str = "RESONA_MIN_CONTINUITY_SCORE";
pub const ENV_CONSTRAINT_MATCH_SIMILARITY: &str = "RESONA_CONSTRAINT_MATCH_SIMILARITY";

impl EngineConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an environment-style lookup. Unset keys keep their
    /// defaults; set keys must parse and pass range checks.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let coherence = &mut config.coherence;
        let validator = &mut config.validator;

        if let Some(value) = read_positive(&lookup, ENV_WINDOW_MINUTES)? {
            coherence.window_minutes = value;
        }
        if let Some(value) = read_positive(&lookup, ENV_INTERRUPT_SATURATION_SECONDS)? {
            coherence.interrupt_saturation_seconds = value;
        }
        if let Some(value) = read_positive(&lookup, ENV_VOLATILITY_SCALE)? {
            coherence.volatility_scale = value;
        }
        if let Some(value) = read_positive(&lookup, ENV_DRIFT_SCALE)? {
            coherence.drift_scale = value;
        }
        if let Some(value) = read_positive(&lookup, ENV_CONTRADICTION_AMPLIFICATION)? {
            coherence.contradiction_amplification = value;
        }
        if let Some(value) = read_unit_interval(&lookup, ENV_MIN_GOAL_SIMILARITY)? {
            validator.min_goal_similarity = value;
        }
        if let Some(value) = read_unit_interval(&lookup, ENV_MIN_CONTINUITY_SCORE)? {
            validator.min_continuity_score = value;
        }
        if let Some(value) = read_unit_interval(&lookup, ENV_CONSTRAINT_MATCH_SIMILARITY)? {
            validator.constraint_match_similarity = value;
        }

        Ok(config)
    }
}

fn read_number<F>(lookup: &F, key: &str) -> Result<Option<f64>, EngineError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(EngineError::InvalidConfig {
            key: key.to_string(),
            value: raw,
            reason: "expected a finite number".to_string(),
        }),
    }
}

fn read_positive<F>(lookup: &F, key: &str) -> Result<Option<f64>, EngineError>
where
    F: Fn(&str) -> Option<String>,
{
    match read_number(lookup, key)? {
        Some(value) if value <= 0.0 => Err(EngineError::InvalidConfig {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        other => Ok(other),
    }
}

fn read_unit_interval<F>(lookup: &F, key: &str) -> Result<Option<f64>, EngineError>
where
    F: Fn(&str) -> Option<String>,
{
    match read_number(lookup, key)? {
        Some(value) if !(0.0..=1.0).contains(&value) => Err(EngineError::InvalidConfig {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must lie in [0, 1]".to_string(),
        }),
        other => Ok(other),
    }
}
