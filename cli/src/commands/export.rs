use chrono::Utc;
use clap::Args;
use resona_core::config::EngineConfig;
use resona_core::error::ErrorReport;
use resona_core::export::{ExportBundle, ExportOptions, ResearchExport, to_jsonl};

use crate::util::{print_error, print_json, read_json};

#[derive(Args)]
pub struct ExportArgs {
    /// JSON file with sessions, events, checkpoints, return_mappings and incidents
    #[arg(long)]
    pub bundle: String,
    /// Keep actor identities and free text as-is (no anonymization)
    #[arg(long)]
    pub keep_identities: bool,
    /// Keep sanitized event payloads instead of blanking them
    #[arg(long)]
    pub include_payloads: bool,
    /// Print the exported events as JSON Lines instead of the full export
    #[arg(long)]
    pub jsonl: bool,
}

pub fn run(args: ExportArgs, config: &EngineConfig) -> i32 {
    let jsonl = args.jsonl;
    let export = match assemble(args, config) {
        Ok(export) => export,
        Err(e) => return print_error(&e),
    };

    if !jsonl {
        return print_json(&export);
    }
    match to_jsonl(&export.events) {
        Ok(lines) => {
            if !lines.is_empty() {
                println!("{lines}");
            }
            0
        }
        Err(e) => print_error(&ErrorReport::from(&e)),
    }
}

fn assemble(args: ExportArgs, config: &EngineConfig) -> Result<ResearchExport, ErrorReport> {
    let bundle: ExportBundle = read_json(&args.bundle)?;
    let options = ExportOptions {
        anonymize: !args.keep_identities,
        include_payloads: args.include_payloads,
    };
    Ok(ResearchExport::assemble(bundle, options, config, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn anonymizes_by_default() {
        let path = std::env::temp_dir().join(format!("resona-bundle-{}.json", Uuid::now_v7()));
        let bundle = json!({
            "sessions": [{
                "id": Uuid::now_v7(),
                "actor_type": "human",
                "actor_id": "alice@example.com",
                "started_at": "2026-03-01T11:00:00Z",
                "ended_at": null
            }]
        });
        std::fs::write(&path, bundle.to_string()).unwrap();

        let export = assemble(
            ExportArgs {
                bundle: path.to_str().unwrap().to_string(),
                keep_identities: false,
                include_payloads: false,
                jsonl: false,
            },
            &EngineConfig::default(),
        )
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(export.metadata.anonymization_applied);
        assert_eq!(export.metadata.session_count, 1);
        assert_eq!(export.sessions[0].actor_id, "actor_1");
    }
}
