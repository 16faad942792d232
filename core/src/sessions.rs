use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Human,
    Agent,
}

/// A work session. Events, checkpoints and return mappings are scoped to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub id: Uuid,
    pub actor_type: ActorType,
    /// Stable identifier of the human or agent running the session
    pub actor_id: String,
    pub started_at: DateTime<Utc>,
    /// None while the session is still open
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}
