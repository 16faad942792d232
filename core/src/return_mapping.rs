//! Return-mapping validation.
//!
//! An agent resuming after an interruption reconstructs its goal, constraints,
//! state delta, reasoning for the next action and stop condition. The
//! reconstruction runs through five gates in order and the first failing gate
//! decides the verdict:
//!
//! | # | Gate | On failure |
//! |---|------|------------|
//! | 1 | goal similarity ≥ 0.7 | `failed` |
//! | 2 | constraints reconstructed (only when originals exist) | `weak` |
//! | 3 | state delta explainable | `weak` |
//! | 4 | logical continuity ≥ 0.6 | `failed` |
//! | 5 | stop condition clear | `weak` |
//!
//! `failed` is a structural break from the task and warrants an incident;
//! `weak` is an incomplete report that should be reviewed. All checks are
//! plain lexical heuristics and stay that way.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::checkpoints::Checkpoint;
use crate::config::ValidatorThresholds;
use crate::incidents::Incident;

const CAUSAL_CONNECTIVES: [&str; 6] = ["because", "therefore", "since", "need to", "must", "require"];
const STOP_CONDITION_MARKERS: [&str; 4] = ["when", "until", "complete", "done"];
const VAGUE_DELTA_MARKERS: [&str; 2] = ["unknown", "unclear"];

const CONTINUITY_BASE: f64 = 0.5;
const CONTINUITY_CAUSAL_BONUS: f64 = 0.2;
const CONTINUITY_DELTA_BONUS: f64 = 0.2;
const CONTINUITY_CONTRADICTION_PENALTY: f64 = 0.5;
const CONTINUITY_TRIVIAL_REASONING: f64 = 0.3;
const MIN_REASONING_CHARS: usize = 20;
const MIN_STATE_DELTA_CHARS: usize = 10;
const MIN_STOP_CONDITION_CHARS: usize = 5;

/// The agent's self-report when resuming work.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct ReturnMappingInput {
    pub goal_reconstruction: String,
    #[serde(default)]
    pub constraints_reconstruction: Vec<String>,
    /// What changed since the checkpoint
    pub state_delta: String,
    pub why_next_action_follows: String,
    pub stop_condition: String,
}

impl ReturnMappingInput {
    /// Pre-filled report for an agent to complete: goal and constraints are
    /// copied from the checkpoint, everything else is left empty.
    pub fn template(goal: impl Into<String>, constraints: Vec<String>) -> Self {
        Self {
            goal_reconstruction: goal.into(),
            constraints_reconstruction: constraints,
            ..Self::default()
        }
    }
}

/// Reference a reconstruction is validated against.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct ValidationContext {
    pub original_goal: String,
    #[serde(default)]
    pub original_constraints: Vec<String>,
    /// Recent tool results, used only for contradiction detection
    #[serde(default)]
    pub recent_tool_results: Vec<Value>,
}

impl ValidationContext {
    pub fn from_checkpoint(checkpoint: &Checkpoint, recent_tool_results: Vec<Value>) -> Self {
        Self {
            original_goal: checkpoint.goal_statement.clone(),
            original_constraints: checkpoint.constraints.clone(),
            recent_tool_results,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMappingStatus {
    Valid,
    Weak,
    Failed,
}

/// Per-gate results. Gates after the deciding one keep their zero values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct ValidationScores {
    pub goal_similarity: f64,
    pub constraints_present: bool,
    pub state_delta_explainable: bool,
    pub logical_continuity: f64,
    pub stop_condition_clear: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnMappingValidation {
    pub status: ReturnMappingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub scores: ValidationScores,
}

impl ReturnMappingValidation {
    fn verdict(status: ReturnMappingStatus, reason: String, scores: ValidationScores) -> Self {
        Self {
            status,
            failure_reason: Some(reason),
            scores,
        }
    }

    /// A failed mapping must be logged as a high-severity incident by the host.
    pub fn requires_incident(&self) -> bool {
        self.status == ReturnMappingStatus::Failed
    }
}

pub fn validate_return_mapping(
    input: &ReturnMappingInput,
    context: &ValidationContext,
) -> ReturnMappingValidation {
    validate_return_mapping_with(input, context, &ValidatorThresholds::default())
}

pub fn validate_return_mapping_with(
    input: &ReturnMappingInput,
    context: &ValidationContext,
    thresholds: &ValidatorThresholds,
) -> ReturnMappingValidation {
    let mut scores = ValidationScores::default();

    // 1. Goal identity is not negotiable.
    scores.goal_similarity = token_similarity(&input.goal_reconstruction, &context.original_goal);
    if scores.goal_similarity < thresholds.min_goal_similarity {
        return ReturnMappingValidation::verdict(
            ReturnMappingStatus::Failed,
            format!(
                "Goal reconstruction too divergent ({}% similarity, need >{}%)",
                percent(scores.goal_similarity),
                percent(thresholds.min_goal_similarity)
            ),
            scores,
        );
    }

    // 2. Constraints are advisory.
    scores.constraints_present = !input.constraints_reconstruction.is_empty()
        && !context.original_constraints.is_empty()
        && has_constraint_overlap(
            &input.constraints_reconstruction,
            &context.original_constraints,
            thresholds.constraint_match_similarity,
        );
    if !scores.constraints_present && !context.original_constraints.is_empty() {
        return ReturnMappingValidation::verdict(
            ReturnMappingStatus::Weak,
            "Constraints not adequately reconstructed".to_string(),
            scores,
        );
    }

    // 3.
    scores.state_delta_explainable = is_state_delta_explainable(&input.state_delta);
    if !scores.state_delta_explainable {
        return ReturnMappingValidation::verdict(
            ReturnMappingStatus::Weak,
            "State delta not clearly explained".to_string(),
            scores,
        );
    }

    // 4.
    scores.logical_continuity = logical_continuity(
        &input.why_next_action_follows,
        &input.state_delta,
        &context.recent_tool_results,
    );
    if scores.logical_continuity < thresholds.min_continuity_score {
        return ReturnMappingValidation::verdict(
            ReturnMappingStatus::Failed,
            format!(
                "Logical continuity too low ({}%)",
                percent(scores.logical_continuity)
            ),
            scores,
        );
    }

    // 5.
    scores.stop_condition_clear = is_stop_condition_clear(&input.stop_condition);
    if !scores.stop_condition_clear {
        return ReturnMappingValidation::verdict(
            ReturnMappingStatus::Weak,
            "Stop condition not clearly defined".to_string(),
            scores,
        );
    }

    ReturnMappingValidation {
        status: ReturnMappingStatus::Valid,
        failure_reason: None,
        scores,
    }
}

/// Whole percent, halves rounded up (12.5 prints as 13).
fn percent(value: f64) -> String {
    format!("{}", (value * 100.0).round())
}

/// Lowercase, replace everything but ASCII letters, digits and whitespace
/// with spaces, split on whitespace, drop tokens of two characters or fewer.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|token| token.len() > 2)
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the token sets.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let left: HashSet<String> = tokenize(a).into_iter().collect();
    let right: HashSet<String> = tokenize(b).into_iter().collect();
    let union = left.union(&right).count();
    // Two empty sets score 0, not NaN, so an empty goal never passes the
    // goal gate (a NaN similarity would compare false against the threshold).
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

fn has_constraint_overlap(reconstructed: &[String], original: &[String], min_similarity: f64) -> bool {
    reconstructed.iter().any(|recon| {
        original
            .iter()
            .any(|orig| token_similarity(recon, orig) > min_similarity)
    })
}

fn is_state_delta_explainable(state_delta: &str) -> bool {
    let lower = state_delta.to_lowercase();
    state_delta.chars().count() > MIN_STATE_DELTA_CHARS
        && !VAGUE_DELTA_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn is_stop_condition_clear(stop_condition: &str) -> bool {
    let lower = stop_condition.to_lowercase();
    stop_condition.chars().count() > MIN_STOP_CONDITION_CHARS
        && STOP_CONDITION_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Continuity of the stated reasoning, in [0, 1].
pub fn logical_continuity(reasoning: &str, state_delta: &str, tool_results: &[Value]) -> f64 {
    if reasoning.chars().count() < MIN_REASONING_CHARS {
        return CONTINUITY_TRIVIAL_REASONING;
    }

    let lower = reasoning.to_lowercase();
    let mut score = CONTINUITY_BASE;

    if CAUSAL_CONNECTIVES.iter().any(|word| lower.contains(word)) {
        score += CONTINUITY_CAUSAL_BONUS;
    }

    let reasoning_tokens = tokenize(reasoning);
    let references_delta = tokenize(state_delta)
        .iter()
        .any(|token| reasoning_tokens.contains(token));
    if references_delta {
        score += CONTINUITY_DELTA_BONUS;
    }

    if detect_contradiction(reasoning, tool_results) {
        score -= CONTINUITY_CONTRADICTION_PENALTY;
    }

    score.clamp(0.0, 1.0)
}

/// Narrow string check between the reasoning and compact-JSON tool results:
/// claiming "failed" against a successful result, or "found" against an
/// empty or null one.
pub fn detect_contradiction(reasoning: &str, tool_results: &[Value]) -> bool {
    let lower = reasoning.to_lowercase();
    let claims_failure = lower.contains("failed");
    let claims_found = lower.contains("found");
    if !claims_failure && !claims_found {
        return false;
    }

    tool_results.iter().any(|result| {
        let rendered = result.to_string().to_lowercase();
        let reports_success = rendered.contains("success") || rendered.contains("\"status\":\"ok\"");
        let reports_nothing = rendered.contains("[]") || rendered.contains("null");
        (claims_failure && reports_success) || (claims_found && reports_nothing)
    })
}

/// Validated return mapping as stored by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnMapping {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Checkpoint the reconstruction was validated against
    #[serde(default)]
    pub checkpoint_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub status: ReturnMappingStatus,
    pub reconstruction: ReturnMappingInput,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub scores: ValidationScores,
}

/// Everything the host has to persist after a resumption.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ReturnMappingOutcome {
    pub return_mapping: ReturnMapping,
    pub validation: ReturnMappingValidation,
    /// Present only when the mapping failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident: Option<Incident>,
}

impl ReturnMapping {
    /// Validate `input` against a checkpoint and build the records to persist.
    pub fn resolve(
        checkpoint: &Checkpoint,
        input: ReturnMappingInput,
        recent_tool_results: Vec<Value>,
        thresholds: &ValidatorThresholds,
        now: DateTime<Utc>,
    ) -> ReturnMappingOutcome {
        let context = ValidationContext::from_checkpoint(checkpoint, recent_tool_results);
        Self::resolve_against(
            checkpoint.session_id,
            Some(checkpoint.id),
            input,
            &context,
            thresholds,
            now,
        )
    }

    pub fn resolve_against(
        session_id: Uuid,
        checkpoint_id: Option<Uuid>,
        input: ReturnMappingInput,
        context: &ValidationContext,
        thresholds: &ValidatorThresholds,
        now: DateTime<Utc>,
    ) -> ReturnMappingOutcome {
        let validation = validate_return_mapping_with(&input, context, thresholds);

        let return_mapping = ReturnMapping {
            id: Uuid::now_v7(),
            session_id,
            checkpoint_id,
            timestamp: now,
            status: validation.status,
            reconstruction: input,
            failure_reason: validation.failure_reason.clone(),
            scores: validation.scores,
        };

        let incident = if validation.requires_incident() {
            tracing::warn!(
                session_id = %session_id,
                return_mapping_id = %return_mapping.id,
                reason = validation.failure_reason.as_deref().unwrap_or_default(),
                "return mapping failed"
            );
            Some(Incident::return_mapping_failure(session_id, &validation, now))
        } else {
            tracing::info!(
                session_id = %session_id,
                return_mapping_id = %return_mapping.id,
                status = ?validation.status,
                "return mapping validated"
            );
            None
        };

        ReturnMappingOutcome {
            return_mapping,
            validation,
            incident,
        }
    }
}
