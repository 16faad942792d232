use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Well-known event types. `event_type` itself stays a free-form string:
/// instrumentation may emit types the engine has never seen, and those are
/// simply counted as ordinary activity.
pub mod types {
    pub const CHECKPOINT: &str = "checkpoint";
    pub const INTERRUPT: &str = "interrupt";
    pub const TOOL_CALL: &str = "tool_call";
    pub const ROLLBACK: &str = "rollback";
    pub const ALERT: &str = "alert";
}

/// A single fact about what happened during a session. Once appended to the
/// log an event is never changed or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    /// Unique event ID (UUIDv7, time-sortable)
    pub id: Uuid,
    /// Session this event belongs to. Never changes.
    pub session_id: Uuid,
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// Who or what produced the event (e.g. "human", "ci-runner")
    pub actor: String,
    /// Free-form event type (see [`types`] for the ones the engine reads)
    pub event_type: String,
    /// Goal the event was performed under, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_hash_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_hash_after: Option<String>,
    /// Shape depends on event_type. Read leniently: a missing
    /// field is treated as absent, never as an error.
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(
        session_id: Uuid,
        timestamp: DateTime<Utc>,
        actor: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            timestamp,
            actor: actor.into(),
            event_type: event_type.into(),
            goal_id: None,
            state_hash_before: None,
            state_hash_after: None,
            payload,
        }
    }

    pub fn with_goal(mut self, goal_id: impl Into<String>) -> Self {
        self.goal_id = Some(goal_id.into());
        self
    }

    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    /// Interrupt duration in seconds; 0 when absent or not a number.
    pub fn interrupt_duration_seconds(&self) -> f64 {
        self.payload
            .get("duration_seconds")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// Tool name of a tool_call payload.
    pub fn tool_name(&self) -> Option<&str> {
        self.payload.get("tool").and_then(Value::as_str)
    }

    /// Attempt counter of a tool_call payload; 0 when absent.
    pub fn tool_attempt(&self) -> f64 {
        self.payload
            .get("attempt")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// Strict decode of the payload into one of the known shapes.
    /// Returns `None` for unknown types or malformed payloads.
    pub fn typed_payload(&self) -> Option<EventPayload> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Known payload shapes, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Interrupt(InterruptPayload),
    ToolCall(ToolCallPayload),
    Checkpoint(CheckpointPayload),
    Rollback(RollbackPayload),
    Alert(AlertPayload),
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Interrupt(_) => types::INTERRUPT,
            Self::ToolCall(_) => types::TOOL_CALL,
            Self::Checkpoint(_) => types::CHECKPOINT,
            Self::Rollback(_) => types::ROLLBACK,
            Self::Alert(_) => types::ALERT,
        }
    }

    /// Serialize into the JSON stored on [`Event::payload`], including the tag.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InterruptPayload {
    /// What interrupted the session ("slack", "meeting", "rate_limit", ...)
    pub source: String,
    pub duration_seconds: f64,
    pub recovered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ToolCallPayload {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// 1-based attempt counter; values above 1 mark a retry
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckpointPayload {
    pub checkpoint_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RollbackPayload {
    pub from_checkpoint_id: Uuid,
    pub to_checkpoint_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Fragmentation,
    Rigidity,
    ReturnFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AlertPayload {
    pub alert_type: AlertType,
    pub message: String,
}
