//! Engine lifecycle and bridging layer.
//!
//! This crate loads the vision engine and publishes its readiness, moves
//! host resources (fetched files, images, camera frames) into the engine,
//! runs the reference contour pipeline and turns engine faults into
//! readable errors. [`Client`] ties these together behind a command loop.

mod bridge;
mod client;
mod diagnostics;
mod error;
mod loader;
mod pipeline;

pub use bridge::{BridgeResult, CanvasTarget, Completion, FileInputBinding, ResourceBridge};
pub use client::{Client, ClientServices};
pub use diagnostics::Diagnostics;
pub use error::{BridgeError, ClientError, EngineError, LoadError};
pub use loader::{EngineLoader, ReadinessStream};
pub use pipeline::{
    ContourPipeline, ContourSummary, PipelineContext, BACKGROUND, CONTOUR_COLOR, THRESHOLD,
    THRESHOLD_MAX_VALUE,
};

use crossbeam_channel::{Receiver, Sender};
use cvbridge_ipc::{ClientCommand, ClientEvent};

/// Create a client instance with command and event channels.
pub fn create_client(
    command_rx: Receiver<ClientCommand>,
    event_tx: Sender<ClientEvent>,
    services: ClientServices,
) -> Client {
    Client::new(command_rx, event_tx, services)
}
