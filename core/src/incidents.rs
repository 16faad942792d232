use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::return_mapping::ReturnMappingValidation;

pub const RETURN_MAPPING_FAILURE: &str = "return_mapping_failure";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Something crossed a safety or quality threshold. The engine decides that an
/// incident is warranted; persisting it belongs to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Incident {
    pub id: Uuid,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Free-form type (e.g. "return_mapping_failure")
    pub incident_type: String,
    pub severity: IncidentSeverity,
    pub details: serde_json::Value,
}

impl Incident {
    /// High-severity incident for a return mapping that resolved to `failed`.
    /// Carries the full validation so reviewers see which gate tripped.
    pub fn return_mapping_failure(
        session_id: Uuid,
        validation: &ReturnMappingValidation,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            timestamp: now,
            incident_type: RETURN_MAPPING_FAILURE.to_string(),
            severity: IncidentSeverity::High,
            details: json!({ "validation": validation }),
        }
    }
}
