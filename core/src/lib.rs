//! Coherence corridor engine: scores recent session activity, checkpoints
//! sessions, validates return mappings after an interruption, and assembles
//! research exports. Persistence and transport belong to the host.

pub mod alerts;
pub mod checkpoints;
pub mod coherence;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod history;
pub mod incidents;
pub mod return_mapping;
pub mod sessions;

pub use coherence::{
    CoherenceInput, CoherenceMetrics, CoherenceState, calculate_coherence,
    calculate_coherence_at, estimate_checkpoint_coherence,
};
pub use config::{COHERENCE_LOWER_BOUND, COHERENCE_UPPER_BOUND, EngineConfig};
pub use error::{EngineError, ErrorReport};
pub use return_mapping::{
    ReturnMappingInput, ReturnMappingStatus, ReturnMappingValidation, ValidationContext,
    validate_return_mapping,
};
