use clap::Args;
use resona_core::checkpoints::{Checkpoint, CheckpointDraft};
use resona_core::config::EngineConfig;
use resona_core::error::ErrorReport;
use resona_core::events::Event;
use uuid::Uuid;

use crate::util::{print_error, print_json, read_json, resolve_now};

#[derive(Args)]
pub struct CheckpointArgs {
    /// Session the checkpoint belongs to
    #[arg(long)]
    pub session_id: Uuid,
    /// JSON file with recent events (use '-' for stdin). Events from other sessions are ignored.
    #[arg(long)]
    pub events: String,
    /// What the session is trying to achieve
    #[arg(long)]
    pub goal_statement: String,
    /// Constraint the work must respect (repeatable, order is kept)
    #[arg(long = "constraint")]
    pub constraints: Vec<String>,
    #[arg(long)]
    pub plan_step: Option<String>,
    #[arg(long)]
    pub summary: Option<String>,
    /// How to get back to this state after an interruption
    #[arg(long)]
    pub restore_instructions: Option<String>,
    /// Checkpoint timestamp (RFC3339). Defaults to now.
    #[arg(long)]
    pub as_of: Option<String>,
}

pub fn run(args: CheckpointArgs, config: &EngineConfig) -> i32 {
    match create(args, config) {
        Ok(checkpoint) => print_json(&checkpoint),
        Err(e) => print_error(&e),
    }
}

fn create(args: CheckpointArgs, config: &EngineConfig) -> Result<Checkpoint, ErrorReport> {
    let now = resolve_now(args.as_of.as_deref())?;
    let events: Vec<Event> = read_json(&args.events)?;

    let draft = CheckpointDraft {
        session_id: args.session_id,
        goal_statement: args.goal_statement,
        constraints: args.constraints,
        plan_step: args.plan_step,
        summary: args.summary,
        restore_instructions: args.restore_instructions,
    };

    Checkpoint::create_with(draft, &events, &config.coherence, now)
        .map_err(|e| ErrorReport::from(&e))
}
