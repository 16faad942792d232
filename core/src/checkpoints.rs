use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::coherence::{CoherenceConfidence, estimate_checkpoint_coherence_with};
use crate::config::CoherenceConfig;
use crate::error::EngineError;
use crate::events::Event;

/// Snapshot of intended state at a point in time. Return mappings are
/// reconstructed against a checkpoint. Never edited: a new checkpoint is
/// created instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Checkpoint {
    /// Unique checkpoint ID (UUIDv7)
    pub id: Uuid,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// What the session is trying to achieve, in plain words
    pub goal_statement: String,
    /// Ordered constraints the work must respect
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub plan_step: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// C(S) estimate over the events preceding the checkpoint, in [0, 1]
    #[serde(default)]
    pub coherence_estimate: Option<f64>,
    #[serde(default)]
    pub coherence_confidence: Option<CoherenceConfidence>,
    /// How to get back to this state after an interruption
    #[serde(default)]
    pub restore_instructions: Option<String>,
}

/// Request to create a checkpoint
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckpointDraft {
    pub session_id: Uuid,
    pub goal_statement: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub plan_step: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub restore_instructions: Option<String>,
}

impl Checkpoint {
    /// Create a checkpoint, estimating coherence over `recent_events`.
    pub fn create(
        draft: CheckpointDraft,
        recent_events: &[Event],
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        Self::create_with(draft, recent_events, &CoherenceConfig::default(), now)
    }

    pub fn create_with(
        draft: CheckpointDraft,
        recent_events: &[Event],
        config: &CoherenceConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let goal_statement = draft.goal_statement.trim();
        if goal_statement.is_empty() {
            return Err(EngineError::validation(
                "goal_statement",
                "goal_statement is required and must not be blank",
            ));
        }

        let session_events: Vec<Event> = recent_events
            .iter()
            .filter(|event| event.session_id == draft.session_id)
            .cloned()
            .collect();
        let estimate = estimate_checkpoint_coherence_with(&session_events, config, now);

        let checkpoint = Self {
            id: Uuid::now_v7(),
            session_id: draft.session_id,
            timestamp: now,
            goal_statement: goal_statement.to_string(),
            constraints: normalize_constraints(draft.constraints),
            plan_step: non_blank(draft.plan_step),
            summary: non_blank(draft.summary),
            coherence_estimate: Some(estimate.score),
            coherence_confidence: Some(estimate.confidence),
            restore_instructions: non_blank(draft.restore_instructions),
        };

        tracing::info!(
            checkpoint_id = %checkpoint.id,
            session_id = %checkpoint.session_id,
            coherence_estimate = estimate.score,
            "checkpoint created"
        );

        Ok(checkpoint)
    }
}

fn normalize_constraints(constraints: Vec<String>) -> Vec<String> {
    constraints
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
