use clap::Args;
use resona_core::alerts::return_failure_alert;
use resona_core::checkpoints::Checkpoint;
use resona_core::config::EngineConfig;
use resona_core::error::ErrorReport;
use resona_core::events::AlertPayload;
use resona_core::return_mapping::{ReturnMapping, ReturnMappingInput, ReturnMappingOutcome};
use serde::Serialize;
use serde_json::Value;

use crate::util::{print_error, print_json, read_json, resolve_now};

#[derive(Args)]
pub struct ValidateArgs {
    /// JSON file with the return mapping reconstruction (use '-' for stdin)
    #[arg(long)]
    pub input: String,
    /// JSON file with the checkpoint being returned to
    #[arg(long)]
    pub checkpoint: String,
    /// JSON file with an array of recent tool results
    #[arg(long)]
    pub tool_results: Option<String>,
    /// Validation timestamp (RFC3339). Defaults to now.
    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Serialize)]
struct ValidateReport {
    #[serde(flatten)]
    outcome: ReturnMappingOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<AlertPayload>,
}

pub fn run(args: ValidateArgs, config: &EngineConfig) -> i32 {
    match validate(args, config) {
        Ok(report) => print_json(&report),
        Err(e) => print_error(&e),
    }
}

fn validate(args: ValidateArgs, config: &EngineConfig) -> Result<ValidateReport, ErrorReport> {
    let now = resolve_now(args.as_of.as_deref())?;
    let input: ReturnMappingInput = read_json(&args.input)?;
    let checkpoint: Checkpoint = read_json(&args.checkpoint)?;
    let tool_results: Vec<Value> = match args.tool_results.as_deref() {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let outcome = ReturnMapping::resolve(&checkpoint, input, tool_results, &config.validator, now);
    let alert = return_failure_alert(&outcome.validation);
    Ok(ValidateReport { outcome, alert })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use resona_core::checkpoints::CheckpointDraft;
    use resona_core::return_mapping::ReturnMappingStatus;
    use serde_json::json;
    use uuid::Uuid;

    fn write(name: &str, value: &impl Serialize) -> String {
        let path = std::env::temp_dir().join(format!("resona-{name}-{}.json", Uuid::now_v7()));
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn checkpoint() -> Checkpoint {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let draft = CheckpointDraft {
            session_id: Uuid::now_v7(),
            goal_statement: "migrate billing service to rust".to_string(),
            constraints: vec!["keep public api stable".to_string()],
            plan_step: None,
            summary: None,
            restore_instructions: None,
        };
        Checkpoint::create(draft, &[], now).unwrap()
    }

    #[test]
    fn off_goal_reconstruction_fails_with_incident_and_alert() {
        let checkpoint_path = write("checkpoint", &checkpoint());
        let input_path = write(
            "input",
            &json!({
                "goal_reconstruction": "write marketing copy",
                "constraints_reconstruction": ["keep public api stable"],
                "state_delta": "nothing changed",
                "why_next_action_follows": "because it is next",
                "stop_condition": "when the copy is approved by marketing"
            }),
        );

        let report = validate(
            ValidateArgs {
                input: input_path.clone(),
                checkpoint: checkpoint_path.clone(),
                tool_results: None,
                as_of: Some("2026-03-01T12:30:00Z".to_string()),
            },
            &EngineConfig::default(),
        )
        .unwrap();
        std::fs::remove_file(&input_path).unwrap();
        std::fs::remove_file(&checkpoint_path).unwrap();

        assert_eq!(report.outcome.validation.status, ReturnMappingStatus::Failed);
        assert!(report.outcome.incident.is_some());
        assert!(report.alert.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["validation"]["status"], "failed");
        assert!(json["return_mapping"]["id"].is_string());
    }

    #[test]
    fn missing_tool_results_file_is_reported() {
        let checkpoint_path = write("checkpoint", &checkpoint());
        let input_path = write("input", &ReturnMappingInput::default());

        let err = validate(
            ValidateArgs {
                input: input_path.clone(),
                checkpoint: checkpoint_path.clone(),
                tool_results: Some("/nonexistent/resona/tools.json".to_string()),
                as_of: None,
            },
            &EngineConfig::default(),
        )
        .err()
        .unwrap();
        std::fs::remove_file(&input_path).unwrap();
        std::fs::remove_file(&checkpoint_path).unwrap();

        assert_eq!(err.error, resona_core::error::codes::IO_FAILED);
    }
}
