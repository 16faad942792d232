use clap::Args;
use resona_core::alerts::corridor_alert;
use resona_core::coherence::{CoherenceInput, CoherenceMetrics, calculate_coherence_with};
use resona_core::config::EngineConfig;
use resona_core::error::{ErrorReport, codes};
use resona_core::events::{AlertPayload, Event};
use serde::Serialize;

use crate::util::{print_error, print_json, read_json, resolve_now};

#[derive(Args)]
pub struct CoherenceArgs {
    /// JSON file with an array of events (use '-' for stdin)
    #[arg(long)]
    pub events: String,
    /// Current goal id; omit for a neutral orientation
    #[arg(long)]
    pub goal: Option<String>,
    /// Window length in minutes (defaults to RESONA_WINDOW_MINUTES or 30)
    #[arg(long)]
    pub window_minutes: Option<f64>,
    /// Evaluate as of this instant (RFC3339). Defaults to now.
    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Serialize)]
struct CoherenceReport {
    metrics: CoherenceMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<AlertPayload>,
}

pub fn run(args: CoherenceArgs, config: &EngineConfig) -> i32 {
    match report(args, config) {
        Ok(report) => print_json(&report),
        Err(e) => print_error(&e),
    }
}

fn report(args: CoherenceArgs, config: &EngineConfig) -> Result<CoherenceReport, ErrorReport> {
    let now = resolve_now(args.as_of.as_deref())?;
    let events: Vec<Event> = read_json(&args.events)?;

    let mut input = CoherenceInput::new(events);
    if let Some(goal) = args.goal {
        input = input.with_goal(goal);
    }
    if let Some(minutes) = args.window_minutes {
        if !minutes.is_finite() || minutes <= 0.0 {
            return Err(ErrorReport::new(
                codes::VALIDATION_FAILED,
                format!("--window-minutes must be a positive number, got {minutes}"),
            ));
        }
        input = input.with_window_minutes(minutes);
    }

    let metrics = calculate_coherence_with(&input, &config.coherence, now);
    let alert = corridor_alert(&metrics);
    Ok(CoherenceReport { metrics, alert })
}
