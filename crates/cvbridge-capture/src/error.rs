//! Error types for the capture module.

use thiserror::Error;

/// Failure reported by a media device, named the way browsers name them
/// (`NotAllowedError`, `NotFoundError`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name} {message}")]
pub struct MediaError {
    pub name: String,
    pub message: String,
}

impl MediaError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Camera access refused.
    pub fn not_allowed() -> Self {
        Self::new("NotAllowedError", "Permission denied")
    }

    /// No device satisfies the constraints.
    pub fn overconstrained(constraint: &str) -> Self {
        Self::new(
            "OverconstrainedError",
            format!("Constraint not satisfied: {constraint}"),
        )
    }
}

/// Errors that can occur during capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Media access was denied or failed.
    #[error("Media access failed: {0}")]
    Media(#[from] MediaError),

    /// Operation needs an active session.
    #[error("Capture not started")]
    NotStarted,

    /// Frame data does not match its declared size.
    #[error("Frame conversion error: {0}")]
    FrameConversion(String),

    /// Frame producer thread could not be spawned.
    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}
