pub mod checkpoint;
pub mod coherence;
pub mod export;
pub mod validate;
