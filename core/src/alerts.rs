use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::coherence::{CoherenceMetrics, CoherenceState};
use crate::config::{COHERENCE_LOWER_BOUND, COHERENCE_UPPER_BOUND};
use crate::events::{AlertPayload, AlertType, Event, EventPayload};
use crate::return_mapping::{ReturnMappingStatus, ReturnMappingValidation};

/// Alert for a session that has left the corridor. Coherent sessions raise none.
pub fn corridor_alert(metrics: &CoherenceMetrics) -> Option<AlertPayload> {
    match metrics.state {
        CoherenceState::Coherent => None,
        CoherenceState::Fragmented => Some(AlertPayload {
            alert_type: AlertType::Fragmentation,
            message: format!(
                "Coherence {:.3} below corridor [{COHERENCE_LOWER_BOUND}, {COHERENCE_UPPER_BOUND}]",
                metrics.score
            ),
        }),
        CoherenceState::Rigid => Some(AlertPayload {
            alert_type: AlertType::Rigidity,
            message: format!(
                "Coherence {:.3} above corridor [{COHERENCE_LOWER_BOUND}, {COHERENCE_UPPER_BOUND}]",
                metrics.score
            ),
        }),
    }
}

pub fn return_failure_alert(validation: &ReturnMappingValidation) -> Option<AlertPayload> {
    if validation.status != ReturnMappingStatus::Failed {
        return None;
    }
    let reason = validation
        .failure_reason
        .as_deref()
        .unwrap_or("return mapping failed");
    Some(AlertPayload {
        alert_type: AlertType::ReturnFailure,
        message: reason.to_string(),
    })
}

/// Wrap an alert as an `alert` event for the host to append to the log.
pub fn alert_event(
    session_id: Uuid,
    actor: &str,
    alert: AlertPayload,
    now: DateTime<Utc>,
) -> Event {
    let payload = EventPayload::Alert(alert);
    Event::new(session_id, now, actor, payload.event_type(), payload.to_value())
}
