//! Simulation error types

use thiserror::Error;

use crate::generation::GenerationError;
use crate::model::RunId;

/// Errors surfaced by the simulation core
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Submission rejected before a run was created
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown run id
    #[error("Simulation '{0}' was not found")]
    NotFound(RunId),

    /// The text-generation capability failed or returned unusable output
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Run state would have been corrupted
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Event channel error
    #[error("Channel error: {0}")]
    Channel(#[from] crate::channel::ChannelError),
}
