//! Coherence score C(S) over a trailing window of session events.
//!
//! ```text
//! C(S) = orientation × (1 − interrupt_cost) × (1 − volatility) − drift − contradiction_rate
//! ```
//!
//! Each component is an independent signal in [0, 1]. The good factors are
//! multiplied and the bad ones subtracted, so a perfectly oriented session is
//! still penalized for instability. The composite is clamped to [0, 1] and
//! classified against the corridor [0.618, 0.6667]: below it the session is
//! fragmented, above it rigid.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::CoherenceConfig;
use crate::events::{Event, types};

/// Neutral orientation used when no current goal is known.
const NEUTRAL_ORIENTATION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceConfidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceState {
    /// Under-coupled: score below the corridor
    Fragmented,
    Coherent,
    /// Over-coupled: score above the corridor
    Rigid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CoherenceComponents {
    /// Goal alignment of windowed events
    pub orientation: f64,
    /// Normalized mean interrupt duration
    pub interrupt_cost: f64,
    /// Normalized coefficient of variation of inter-event gaps
    pub volatility: f64,
    /// Goal switching relative to window size
    pub drift: f64,
    /// Amplified tool-call retry rate
    pub contradiction_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CoherenceMetrics {
    pub score: f64,
    pub confidence: CoherenceConfidence,
    pub state: CoherenceState,
    pub components: CoherenceComponents,
    pub in_corridor: bool,
}

/// Score and confidence only, as stored on a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CoherenceEstimate {
    pub score: f64,
    pub confidence: CoherenceConfidence,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CoherenceInput {
    pub events: Vec<Event>,
    /// Goal the session is supposed to be working on
    #[serde(default)]
    pub current_goal: Option<String>,
    /// Trailing window length; the configured default applies when absent
    #[serde(default)]
    pub time_window_minutes: Option<f64>,
}

impl CoherenceInput {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            current_goal: None,
            time_window_minutes: None,
        }
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.current_goal = Some(goal.into());
        self
    }

    pub fn with_window_minutes(mut self, minutes: f64) -> Self {
        self.time_window_minutes = Some(minutes);
        self
    }
}

/// Calculate C(S) for a window ending now, with default tuning.
pub fn calculate_coherence(input: &CoherenceInput) -> CoherenceMetrics {
    calculate_coherence_at(input, Utc::now())
}

/// Calculate C(S) for a window ending at `now`.
pub fn calculate_coherence_at(input: &CoherenceInput, now: DateTime<Utc>) -> CoherenceMetrics {
    calculate_coherence_with(input, &CoherenceConfig::default(), now)
}

pub fn calculate_coherence_with(
    input: &CoherenceInput,
    config: &CoherenceConfig,
    now: DateTime<Utc>,
) -> CoherenceMetrics {
    let window_minutes = input
        .time_window_minutes
        .unwrap_or(config.window_minutes);
    let window = events_in_window(&input.events, window_minutes, now);

    if window.is_empty() {
        return neutral_metrics(config);
    }

    let components = CoherenceComponents {
        orientation: orientation(&window, input.current_goal.as_deref()),
        interrupt_cost: interrupt_cost(&window, config.interrupt_saturation_seconds),
        volatility: volatility(&window, config.volatility_scale),
        drift: drift(&window, config.drift_scale),
        contradiction_rate: contradiction_rate(&window, config.contradiction_amplification),
    };

    let score = (components.orientation
        * (1.0 - components.interrupt_cost)
        * (1.0 - components.volatility)
        - components.drift
        - components.contradiction_rate)
        .clamp(0.0, 1.0);

    let metrics = CoherenceMetrics {
        score,
        confidence: confidence_for(window.len(), config),
        state: classify_with(score, config),
        components,
        in_corridor: in_corridor_with(score, config),
    };

    tracing::debug!(
        window_events = window.len(),
        score = metrics.score,
        state = ?metrics.state,
        confidence = ?metrics.confidence,
        "coherence computed"
    );

    metrics
}

/// Lighter estimate taken when a checkpoint is created: no current goal,
/// only the window itself.
pub fn estimate_checkpoint_coherence(recent_events: &[Event]) -> CoherenceEstimate {
    estimate_checkpoint_coherence_at(recent_events, Utc::now())
}

pub fn estimate_checkpoint_coherence_at(
    recent_events: &[Event],
    now: DateTime<Utc>,
) -> CoherenceEstimate {
    estimate_checkpoint_coherence_with(recent_events, &CoherenceConfig::default(), now)
}

pub fn estimate_checkpoint_coherence_with(
    recent_events: &[Event],
    config: &CoherenceConfig,
    now: DateTime<Utc>,
) -> CoherenceEstimate {
    let input = CoherenceInput::new(recent_events.to_vec());
    let metrics = calculate_coherence_with(&input, config, now);
    CoherenceEstimate {
        score: metrics.score,
        confidence: metrics.confidence,
    }
}

/// Corridor classification with the default bounds.
pub fn classify(score: f64) -> CoherenceState {
    classify_with(score, &CoherenceConfig::default())
}

pub fn classify_with(score: f64, config: &CoherenceConfig) -> CoherenceState {
    if score < config.lower_bound {
        CoherenceState::Fragmented
    } else if score > config.upper_bound {
        CoherenceState::Rigid
    } else {
        CoherenceState::Coherent
    }
}

fn in_corridor_with(score: f64, config: &CoherenceConfig) -> bool {
    score >= config.lower_bound && score <= config.upper_bound
}

/// Confidence reflects sample size only, never the score.
pub fn confidence_for(sample_size: usize, config: &CoherenceConfig) -> CoherenceConfidence {
    if sample_size < config.medium_confidence_min_events {
        CoherenceConfidence::Low
    } else if sample_size < config.high_confidence_min_events {
        CoherenceConfidence::Medium
    } else {
        CoherenceConfidence::High
    }
}

/// Idle or brand-new sessions must not read as failing.
fn neutral_metrics(config: &CoherenceConfig) -> CoherenceMetrics {
    CoherenceMetrics {
        score: config.lower_bound,
        confidence: CoherenceConfidence::Low,
        state: CoherenceState::Coherent,
        components: CoherenceComponents {
            orientation: NEUTRAL_ORIENTATION,
            interrupt_cost: 1.0,
            volatility: 0.0,
            drift: 0.0,
            contradiction_rate: 0.0,
        },
        in_corridor: true,
    }
}

/// Events strictly younger than the window. Events stamped after `now` are kept.
fn events_in_window(events: &[Event], window_minutes: f64, now: DateTime<Utc>) -> Vec<&Event> {
    let window_ms = window_minutes * 60.0 * 1000.0;
    events
        .iter()
        .filter(|event| ((now - event.timestamp).num_milliseconds() as f64) < window_ms)
        .collect()
}

fn orientation(window: &[&Event], current_goal: Option<&str>) -> f64 {
    let Some(goal) = current_goal.filter(|goal| !goal.is_empty()) else {
        return NEUTRAL_ORIENTATION;
    };
    let aligned = window
        .iter()
        .filter(|event| event.goal_id.as_deref() == Some(goal))
        .count();
    aligned as f64 / window.len() as f64
}

fn interrupt_cost(window: &[&Event], saturation_seconds: f64) -> f64 {
    let durations: Vec<f64> = window
        .iter()
        .filter(|event| event.is_type(types::INTERRUPT))
        .map(|event| event.interrupt_duration_seconds())
        .collect();
    if durations.is_empty() {
        return 0.0;
    }
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;
    (mean / saturation_seconds).clamp(0.0, 1.0)
}

fn volatility(window: &[&Event], scale: f64) -> f64 {
    if window.len() < 3 {
        return 0.0;
    }

    let mut sorted = window.to_vec();
    sorted.sort_by_key(|event| event.timestamp);

    let gaps: Vec<f64> = sorted
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1000.0)
        .collect();

    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = gaps.iter().map(|gap| (gap - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    let coefficient_of_variation = variance.sqrt() / mean;

    (coefficient_of_variation / scale).clamp(0.0, 1.0)
}

fn drift(window: &[&Event], scale: f64) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let distinct_goals: HashSet<&str> = window
        .iter()
        .filter_map(|event| event.goal_id.as_deref())
        .collect();
    let ratio = distinct_goals.len().saturating_sub(1) as f64 / window.len() as f64;
    (ratio * scale).clamp(0.0, 1.0)
}

/// Retry loops: consecutive tool calls to the same tool with attempt > 1.
fn contradiction_rate(window: &[&Event], amplification: f64) -> f64 {
    let tool_calls: Vec<&Event> = window
        .iter()
        .copied()
        .filter(|event| event.is_type(types::TOOL_CALL))
        .collect();
    if tool_calls.len() < 2 {
        return 0.0;
    }
    let retries = tool_calls
        .windows(2)
        .filter(|pair| pair[0].tool_name() == pair[1].tool_name() && pair[1].tool_attempt() > 1.0)
        .count();
    let retry_rate = retries as f64 / tool_calls.len() as f64;
    (retry_rate * amplification).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::config::{COHERENCE_LOWER_BOUND, COHERENCE_UPPER_BOUND};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    /// An event `seconds_ago` before `now()`.
    fn event(seconds_ago: i64, event_type: &str, payload: serde_json::Value) -> Event {
        Event::new(
            Uuid::nil(),
            now() - Duration::seconds(seconds_ago),
            "agent",
            event_type,
            payload,
        )
    }

    fn activity(seconds_ago: i64) -> Event {
        event(seconds_ago, "edit", json!({}))
    }

    fn interrupt(seconds_ago: i64, duration_seconds: f64) -> Event {
        event(
            seconds_ago,
            types::INTERRUPT,
            json!({
                "type": "interrupt",
                "source": "meeting",
                "duration_seconds": duration_seconds,
                "recovered": true
            }),
        )
    }

    fn tool_call(seconds_ago: i64, tool: &str, attempt: u32) -> Event {
        event(
            seconds_ago,
            types::TOOL_CALL,
            json!({ "type": "tool_call", "tool": tool, "attempt": attempt }),
        )
    }

    /// Four evenly spaced on-goal events, one of them an interrupt of the given
    /// length. Orientation 1, volatility 0, drift 0: score = 1 − d/300.
    fn engineered_window(interrupt_seconds: f64) -> CoherenceInput {
        let events = vec![
            activity(240).with_goal("g"),
            activity(180).with_goal("g"),
            interrupt(120, interrupt_seconds).with_goal("g"),
            activity(60).with_goal("g"),
        ];
        CoherenceInput::new(events).with_goal("g")
    }

    fn evenly_spaced(count: usize) -> Vec<Event> {
        (0..count)
            .map(|i| activity(30 * (count - i) as i64).with_goal("g"))
            .collect()
    }

    fn assert_in_unit_interval(metrics: &CoherenceMetrics) {
        let c = metrics.components;
        for value in [
            metrics.score,
            c.orientation,
            c.interrupt_cost,
            c.volatility,
            c.drift,
            c.contradiction_rate,
        ] {
            assert!((0.0..=1.0).contains(&value), "{value} outside [0, 1]");
        }
    }

    #[test]
    fn empty_window_returns_neutral_default() {
        let input = CoherenceInput::new(Vec::new()).with_goal("g");
        let metrics = calculate_coherence_at(&input, now());

        assert_eq!(metrics.score, 0.618);
        assert_eq!(metrics.confidence, CoherenceConfidence::Low);
        assert_eq!(metrics.state, CoherenceState::Coherent);
        assert!(metrics.in_corridor);
        assert_eq!(metrics.components.orientation, 0.5);
        assert_eq!(metrics.components.interrupt_cost, 1.0);
        assert_eq!(metrics.components.volatility, 0.0);
        assert_eq!(metrics.components.drift, 0.0);
        assert_eq!(metrics.components.contradiction_rate, 0.0);
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let input = CoherenceInput::new(vec![activity(31 * 60), activity(45 * 60)]);
        let metrics = calculate_coherence_at(&input, now());
        assert_eq!(metrics.score, COHERENCE_LOWER_BOUND);
        assert_eq!(metrics.confidence, CoherenceConfidence::Low);
    }

    #[test]
    fn window_length_is_configurable_per_call() {
        let input = CoherenceInput::new(vec![activity(10 * 60).with_goal("g")])
            .with_goal("g")
            .with_window_minutes(5.0);
        let metrics = calculate_coherence_at(&input, now());
        // Outside a 5 minute window, so the neutral default applies.
        assert_eq!(metrics.components.interrupt_cost, 1.0);

        let wide = CoherenceInput {
            time_window_minutes: Some(15.0),
            ..input
        };
        let metrics = calculate_coherence_at(&wide, now());
        assert_eq!(metrics.components.orientation, 1.0);
        assert_eq!(metrics.components.interrupt_cost, 0.0);
    }

    #[test]
    fn corridor_lower_bound_is_coherent() {
        let metrics = calculate_coherence_at(&engineered_window(114.6), now());
        assert_eq!(metrics.score, 0.618);
        assert_eq!(metrics.state, CoherenceState::Coherent);
        assert!(metrics.in_corridor);
    }

    #[test]
    fn score_below_corridor_is_fragmented() {
        let metrics = calculate_coherence_at(&engineered_window(120.0), now());
        assert!((metrics.score - 0.6).abs() < 1e-12);
        assert_eq!(metrics.state, CoherenceState::Fragmented);
        assert!(!metrics.in_corridor);
    }

    #[test]
    fn score_above_corridor_is_rigid() {
        let metrics = calculate_coherence_at(&engineered_window(90.0), now());
        assert!((metrics.score - 0.70).abs() < 1e-12);
        assert_eq!(metrics.state, CoherenceState::Rigid);
        assert!(!metrics.in_corridor);
    }

    #[test]
    fn classify_respects_inclusive_bounds() {
        assert_eq!(classify(COHERENCE_LOWER_BOUND), CoherenceState::Coherent);
        assert_eq!(classify(COHERENCE_UPPER_BOUND), CoherenceState::Coherent);
        assert_eq!(classify(0.6), CoherenceState::Fragmented);
        assert_eq!(classify(0.7), CoherenceState::Rigid);
    }

    #[test]
    fn confidence_follows_window_size() {
        let expected = [
            (4, CoherenceConfidence::Low),
            (5, CoherenceConfidence::Medium),
            (19, CoherenceConfidence::Medium),
            (20, CoherenceConfidence::High),
            (25, CoherenceConfidence::High),
        ];
        for (count, confidence) in expected {
            let input = CoherenceInput::new(evenly_spaced(count)).with_goal("g");
            let metrics = calculate_coherence_at(&input, now());
            assert_eq!(metrics.confidence, confidence, "window of {count} events");
        }
    }

    #[test]
    fn orientation_is_neutral_without_current_goal() {
        let input = CoherenceInput::new(vec![activity(10).with_goal("g"), activity(5)]);
        let metrics = calculate_coherence_at(&input, now());
        assert_eq!(metrics.components.orientation, 0.5);
    }

    #[test]
    fn orientation_is_fraction_of_on_goal_events() {
        let input = CoherenceInput::new(vec![
            activity(40).with_goal("g"),
            activity(30).with_goal("g"),
            activity(20).with_goal("g"),
            activity(10),
        ])
        .with_goal("g");
        let metrics = calculate_coherence_at(&input, now());
        assert_eq!(metrics.components.orientation, 0.75);
    }

    #[test]
    fn interrupt_cost_saturates_at_five_minutes() {
        let input = CoherenceInput::new(vec![interrupt(60, 600.0), interrupt(30, 400.0)]);
        let metrics = calculate_coherence_at(&input, now());
        assert_eq!(metrics.components.interrupt_cost, 1.0);
    }

    #[test]
    fn interrupt_without_duration_counts_as_zero() {
        let input = CoherenceInput::new(vec![
            interrupt(60, 150.0),
            event(30, types::INTERRUPT, json!({ "source": "slack" })),
        ]);
        let metrics = calculate_coherence_at(&input, now());
        assert_eq!(metrics.components.interrupt_cost, 0.25);
    }

    #[test]
    fn volatility_is_zero_below_three_events() {
        let input = CoherenceInput::new(vec![activity(1700), activity(1)]);
        let metrics = calculate_coherence_at(&input, now());
        assert_eq!(metrics.components.volatility, 0.0);
    }

    #[test]
    fn volatility_reads_events_in_time_order() {
        // Gaps of 10s and 100s regardless of input order.
        let ordered = vec![activity(110), activity(100), activity(0)];
        let shuffled = vec![activity(0), activity(110), activity(100)];

        let a = calculate_coherence_at(&CoherenceInput::new(ordered), now());
        let b = calculate_coherence_at(&CoherenceInput::new(shuffled), now());

        // mean 55, stddev 45, cv 0.818.., scaled by 1/2
        assert!((a.components.volatility - (45.0 / 55.0) / 2.0).abs() < 1e-12);
        assert_eq!(a.components.volatility, b.components.volatility);
    }

    #[test]
    fn volatility_is_zero_for_simultaneous_events() {
        let input = CoherenceInput::new(vec![activity(10), activity(10), activity(10)]);
        let metrics = calculate_coherence_at(&input, now());
        assert_eq!(metrics.components.volatility, 0.0);
    }

    #[test]
    fn drift_scales_distinct_goals_by_window_size() {
        let input = CoherenceInput::new(vec![
            activity(40).with_goal("a"),
            activity(30).with_goal("b"),
            activity(20).with_goal("a"),
            activity(10),
        ]);
        let metrics = calculate_coherence_at(&input, now());
        // (2 - 1) / 4 * 2
        assert_eq!(metrics.components.drift, 0.5);
    }

    #[test]
    fn drift_is_zero_when_no_goal_is_recorded() {
        let input = CoherenceInput::new(vec![activity(20), activity(10)]);
        let metrics = calculate_coherence_at(&input, now());
        assert_eq!(metrics.components.drift, 0.0);
    }

    #[test]
    fn retry_loop_raises_contradiction_rate() {
        let input = CoherenceInput::new(vec![
            tool_call(50, "search", 1),
            tool_call(40, "search", 2),
            tool_call(30, "search", 3),
            tool_call(20, "read_file", 1),
            tool_call(10, "read_file", 2),
            tool_call(5, "search", 2),
        ]);
        let metrics = calculate_coherence_at(&input, now());
        // 3 retries out of 6 calls, amplified ×3
        assert_eq!(metrics.components.contradiction_rate, 1.0);

        let input = CoherenceInput::new(vec![
            tool_call(50, "search", 1),
            tool_call(40, "search", 2),
            tool_call(30, "read_file", 1),
            tool_call(20, "write_file", 1),
            tool_call(10, "search", 1),
            tool_call(5, "search", 1),
        ]);
        let metrics = calculate_coherence_at(&input, now());
        assert!((metrics.components.contradiction_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_tool_call_has_no_contradiction() {
        let input = CoherenceInput::new(vec![tool_call(10, "search", 4), activity(5)]);
        let metrics = calculate_coherence_at(&input, now());
        assert_eq!(metrics.components.contradiction_rate, 0.0);
    }

    #[test]
    fn penalties_clamp_score_at_zero() {
        let input = CoherenceInput::new(vec![
            tool_call(40, "search", 2).with_goal("a"),
            tool_call(30, "search", 2).with_goal("b"),
            tool_call(20, "search", 2).with_goal("c"),
        ])
        .with_goal("z");
        let metrics = calculate_coherence_at(&input, now());
        assert_eq!(metrics.score, 0.0);
        assert_eq!(metrics.state, CoherenceState::Fragmented);
        assert_in_unit_interval(&metrics);
    }

    #[test]
    fn components_stay_in_unit_interval() {
        let windows = vec![
            vec![activity(1)],
            vec![interrupt(1000, 9000.0), interrupt(10, 0.0), activity(5)],
            vec![
                activity(1500).with_goal("a"),
                activity(1499).with_goal("b"),
                activity(3).with_goal("c"),
                tool_call(2, "x", 7),
                tool_call(1, "x", 8),
            ],
            evenly_spaced(30),
        ];
        for events in windows {
            let input = CoherenceInput::new(events).with_goal("a");
            let metrics = calculate_coherence_at(&input, now());
            assert_in_unit_interval(&metrics);
        }
    }

    #[test]
    fn identical_inputs_give_identical_metrics() {
        let input = CoherenceInput::new(vec![
            activity(300).with_goal("g"),
            interrupt(200, 45.0).with_goal("g"),
            tool_call(100, "search", 1).with_goal("h"),
            tool_call(50, "search", 2).with_goal("g"),
        ])
        .with_goal("g");
        assert_eq!(
            calculate_coherence_at(&input, now()),
            calculate_coherence_at(&input, now())
        );
    }

    #[test]
    fn checkpoint_estimate_ignores_goal_alignment() {
        let events = engineered_window(0.0).events;
        let estimate = estimate_checkpoint_coherence_at(&events, now());
        // Orientation falls back to neutral, so the estimate is 0.5.
        assert_eq!(estimate.score, 0.5);
        assert_eq!(estimate.confidence, CoherenceConfidence::Low);
    }

    #[test]
    fn custom_config_changes_normalization() {
        let config = CoherenceConfig {
            interrupt_saturation_seconds: 600.0,
            ..CoherenceConfig::default()
        };
        let metrics = calculate_coherence_with(&engineered_window(120.0), &config, now());
        assert!((metrics.components.interrupt_cost - 0.2).abs() < 1e-12);
    }

    #[test]
    fn metrics_serialize_with_snake_case_fields() {
        let metrics = calculate_coherence_at(&CoherenceInput::default(), now());
        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json["state"], "coherent");
        assert_eq!(json["confidence"], "low");
        assert_eq!(json["in_corridor"], true);
        assert_eq!(json["components"]["interrupt_cost"], 1.0);
    }
}
