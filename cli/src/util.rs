use std::io::Read;

use chrono::{DateTime, Utc};
use resona_core::error::{EngineError, ErrorReport, codes};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Print a structured error to stderr and exit with code 1.
pub fn exit_error(report: &ErrorReport) -> ! {
    std::process::exit(print_error(report));
}

/// Print a structured error to stderr. Returns the exit code to use.
pub fn print_error(report: &ErrorReport) -> i32 {
    match serde_json::to_string_pretty(report) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{}: {}", report.error, report.message),
    }
    1
}

/// Print a value as pretty JSON on stdout. Returns the exit code to use.
pub fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => print_error(&ErrorReport::new(
            codes::ENCODE_FAILED,
            format!("Failed to encode output: {e}"),
        )),
    }
}

/// Read and decode JSON from a file path or stdin (when path is "-").
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, EngineError> {
    let raw = if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| EngineError::io("stdin", e))?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?
    };
    serde_json::from_str(&raw).map_err(|e| EngineError::decode(path, e))
}

/// Resolve an optional RFC3339 `--as-of` flag, defaulting to the wall clock.
pub fn resolve_now(as_of: Option<&str>) -> Result<DateTime<Utc>, ErrorReport> {
    match as_of {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                ErrorReport::new(codes::VALIDATION_FAILED, format!("Invalid --as-of '{raw}': {e}"))
                    .with_docs_hint("Use RFC3339, e.g. 2026-03-01T12:00:00Z")
            }),
    }
}
