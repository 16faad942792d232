//! Research export: reproducible, optionally anonymized datasets assembled
//! from records the host has already loaded. Fetching them is the host's job.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::checkpoints::Checkpoint;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::Event;
use crate::incidents::Incident;
use crate::return_mapping::ReturnMapping;
use crate::sessions::Session;

pub const EXPORT_DATA_VERSION: &str = "1.0.0";
const EVENT_ACTOR_BUCKETS: u32 = 10_000;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
});
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("valid phone regex"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b").expect("valid name regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExportOptions {
    pub anonymize: bool,
    /// Keep (sanitized) payloads on anonymized events instead of blanking them
    pub include_payloads: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            anonymize: true,
            include_payloads: false,
        }
    }
}

/// Raw records to export, as loaded by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ExportBundle {
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub return_mappings: Vec<ReturnMapping>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CoherenceParameters {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub corridor_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetricDefinitions {
    pub coherence: String,
    pub orientation: String,
    pub interrupt_cost: String,
    pub volatility: String,
    pub drift: String,
    pub contradiction_rate: String,
}

impl Default for MetricDefinitions {
    fn default() -> Self {
        Self {
            coherence: "C(S) = orientation × (1 − interrupt_cost) × (1 − volatility) − drift − contradiction_rate, clamped to [0,1]".to_string(),
            orientation: "Share of windowed events under the current goal [0,1]".to_string(),
            interrupt_cost: "Mean interrupt duration normalized by the saturation time [0,1]".to_string(),
            volatility: "Coefficient of variation of inter-event gaps, scaled [0,1]".to_string(),
            drift: "Distinct goals beyond the first, relative to window size [0,1]".to_string(),
            contradiction_rate: "Amplified rate of consecutive same-tool retries [0,1]".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidationThresholdsSummary {
    pub min_goal_similarity: f64,
    pub min_continuity_score: f64,
}

/// Everything a researcher needs to reproduce the numbers in an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExportMetadata {
    pub export_id: Uuid,
    pub export_timestamp: DateTime<Utc>,
    pub system_version: String,
    pub data_version: String,
    pub anonymization_applied: bool,
    pub session_count: usize,
    pub event_count: usize,
    pub time_range: TimeRange,
    pub coherence_parameters: CoherenceParameters,
    pub metric_definitions: MetricDefinitions,
    pub validation_thresholds: ValidationThresholdsSummary,
}

impl ExportMetadata {
    pub fn build(
        sessions: &[Session],
        events: &[Event],
        anonymization_applied: bool,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let timestamps = sessions
            .iter()
            .map(|s| s.started_at)
            .chain(events.iter().map(|e| e.timestamp));
        let (start, end) = timestamps.fold((None, None), |(lo, hi), ts| {
            (
                Some(lo.map_or(ts, |lo: DateTime<Utc>| lo.min(ts))),
                Some(hi.map_or(ts, |hi: DateTime<Utc>| hi.max(ts))),
            )
        });

        Self {
            export_id: Uuid::now_v7(),
            export_timestamp: now,
            system_version: env!("CARGO_PKG_VERSION").to_string(),
            data_version: EXPORT_DATA_VERSION.to_string(),
            anonymization_applied,
            session_count: sessions.len(),
            event_count: events.len(),
            time_range: TimeRange {
                start: start.unwrap_or(now),
                end: end.unwrap_or(now),
            },
            coherence_parameters: CoherenceParameters {
                lower_bound: config.coherence.lower_bound,
                upper_bound: config.coherence.upper_bound,
                corridor_type: "golden-ratio inverse to two-thirds".to_string(),
            },
            metric_definitions: MetricDefinitions::default(),
            validation_thresholds: ValidationThresholdsSummary {
                min_goal_similarity: config.validator.min_goal_similarity,
                min_continuity_score: config.validator.min_continuity_score,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResearchExport {
    pub metadata: ExportMetadata,
    pub sessions: Vec<Session>,
    pub events: Vec<Event>,
    pub checkpoints: Vec<Checkpoint>,
    pub return_mappings: Vec<ReturnMapping>,
    pub incidents: Vec<Incident>,
}

impl ResearchExport {
    pub fn assemble(
        bundle: ExportBundle,
        options: ExportOptions,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let ExportBundle {
            mut sessions,
            mut events,
            mut checkpoints,
            mut return_mappings,
            mut incidents,
        } = bundle;

        if options.anonymize {
            anonymize_sessions(&mut sessions);
            anonymize_events(&mut events, options.include_payloads);
            checkpoints.iter_mut().for_each(anonymize_checkpoint);
            return_mappings.iter_mut().for_each(anonymize_return_mapping);
            for incident in &mut incidents {
                incident.details = sanitize_payload(&incident.details);
            }
        }

        let metadata = ExportMetadata::build(&sessions, &events, options.anonymize, config, now);

        tracing::info!(
            export_id = %metadata.export_id,
            sessions = metadata.session_count,
            events = metadata.event_count,
            anonymized = options.anonymize,
            "research export assembled"
        );

        Self {
            metadata,
            sessions,
            events,
            checkpoints,
            return_mappings,
            incidents,
        }
    }
}

/// Strip emails, phone numbers, URLs and "First Last" names from free text.
pub fn sanitize_text(text: &str) -> String {
    let text = EMAIL_RE.replace_all(text, "[EMAIL]");
    let text = PHONE_RE.replace_all(&text, "[PHONE]");
    let text = URL_RE.replace_all(&text, "[URL]");
    NAME_RE.replace_all(&text, "[NAME]").into_owned()
}

/// Sanitize every string inside a JSON value, recursively.
pub fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_text(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_payload).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| (key.clone(), sanitize_payload(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Stable pseudonym for an event actor: `actor_N` with N a hash bucket.
pub fn anonymize_actor_name(actor: &str) -> String {
    let digest = Sha256::digest(actor.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let bucket = prefix % EVENT_ACTOR_BUCKETS;
    format!("actor_{bucket}")
}

/// Replace session actor ids with `actor_1`, `actor_2`, ... in first-seen order.
fn anonymize_sessions(sessions: &mut [Session]) {
    let mut aliases: HashMap<String, String> = HashMap::new();
    for session in sessions {
        let next = aliases.len() + 1;
        let alias = aliases
            .entry(session.actor_id.clone())
            .or_insert_with(|| format!("actor_{next}"));
        session.actor_id = alias.clone();
    }
}

fn anonymize_events(events: &mut [Event], include_payloads: bool) {
    for event in events {
        event.actor = anonymize_actor_name(&event.actor);
        event.payload = if include_payloads {
            sanitize_payload(&event.payload)
        } else {
            Value::Object(Map::new())
        };
    }
}

fn anonymize_checkpoint(checkpoint: &mut Checkpoint) {
    checkpoint.goal_statement = sanitize_text(&checkpoint.goal_statement);
    checkpoint.constraints = checkpoint.constraints.iter().map(|c| sanitize_text(c)).collect();
    checkpoint.plan_step = checkpoint.plan_step.as_deref().map(sanitize_text);
    checkpoint.summary = checkpoint.summary.as_deref().map(sanitize_text);
    checkpoint.restore_instructions =
        checkpoint.restore_instructions.as_deref().map(sanitize_text);
}

fn anonymize_return_mapping(mapping: &mut ReturnMapping) {
    let r = &mut mapping.reconstruction;
    r.goal_reconstruction = sanitize_text(&r.goal_reconstruction);
    r.constraints_reconstruction = r
        .constraints_reconstruction
        .iter()
        .map(|c| sanitize_text(c))
        .collect();
    r.state_delta = sanitize_text(&r.state_delta);
    r.why_next_action_follows = sanitize_text(&r.why_next_action_follows);
    r.stop_condition = sanitize_text(&r.stop_condition);
}

/// One JSON document per line.
pub fn to_jsonl<T: Serialize>(items: &[T]) -> Result<String, EngineError> {
    let lines = items
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EngineError::encode("jsonl record", e))?;
    Ok(lines.join("\n"))
}
