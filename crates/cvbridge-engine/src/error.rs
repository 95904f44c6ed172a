//! Error types for the engine module.

use cvbridge_capture::CaptureError;
use cvbridge_transport::TransportError;
use thiserror::Error;

/// Why an engine load did not reach `ready`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The bootstrap script could not be fetched.
    #[error("Failed to fetch engine script {url}: {reason}")]
    ScriptFetch { url: String, reason: String },

    /// The runtime refused to execute the script.
    #[error("Failed to execute engine script: {0}")]
    ScriptExecute(String),

    /// The loader worker could not be started.
    #[error("Failed to start engine loader: {0}")]
    Spawn(String),

    /// Waiting for readiness gave up.
    #[error("Timed out waiting for the engine")]
    TimedOut,
}

/// A host-readable engine fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

/// Errors from moving resources between host and engine.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Image data in a layout the host cannot display.
    #[error("Unsupported matrix layout: {0}")]
    UnsupportedLayout(String),

    /// The worker finished without reporting.
    #[error("Request abandoned")]
    Abandoned,

    /// Worker thread could not be spawned.
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors surfaced by the client for a single request.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request needs the engine and it is not ready.
    #[error("Engine not ready")]
    EngineNotReady,

    /// No frame to process.
    #[error("No frame available")]
    NoFrame,

    /// Canvas id with nothing drawn on it.
    #[error("Canvas not found: {0}")]
    CanvasNotFound(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}
