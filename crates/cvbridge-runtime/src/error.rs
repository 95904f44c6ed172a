//! Error types for the engine runtime.

use thiserror::Error;

/// A fault raised by the engine itself.
///
/// Engines report faults either as an opaque numeric handle into their own
/// exception table, or as text that may start with such a handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineFault {
    /// Numeric exception handle.
    #[error("engine exception {0}")]
    Code(u64),

    /// Textual fault.
    #[error("{0}")]
    Message(String),
}

/// Errors that can occur while bootstrapping an engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The bootstrap script is not something this runtime can execute.
    #[error("Invalid bootstrap script: {0}")]
    InvalidScript(String),

    /// The script targets a different runtime.
    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    /// The binary payload could not be fetched.
    #[error("Failed to fetch binary payload {url}: {reason}")]
    BinaryUnavailable { url: String, reason: String },

    /// Compilation thread could not be started.
    #[error("Failed to spawn runtime initialization: {0}")]
    Spawn(#[from] std::io::Error),
}
