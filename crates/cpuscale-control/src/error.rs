//! Control loop error types.

use thiserror::Error;

pub type ControlResult<T> = Result<T, ControlError>;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control loop already registered: {0}")]
    DuplicateLoop(String),

    #[error("control loop not found: {0}")]
    UnknownLoop(String),

    #[error("control loop {name} failed: {source}")]
    LoopFailed {
        name: String,
        source: anyhow::Error,
    },

    #[error("control loop {name} panicked: {message}")]
    LoopPanicked { name: String, message: String },
}
