//! Typed host<->client messages for the vision bridge.
//!
//! This crate defines the readiness record, the engine configuration and
//! every request/response message exchanged between a host UI layer and
//! the client event loop.

mod commands;
mod events;
mod state;
mod types;

pub use commands::ClientCommand;
pub use events::ClientEvent;
pub use state::{EngineReadiness, LoadPhase, ReadinessUpdate};
pub use types::{
    EngineConfig, FrameSource, ResolutionPreset, DEFAULT_SCRIPT_URL, DEFAULT_WASM_BINARY_FILE,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (host → client).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (client → host).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded command channel.
pub fn command_channel() -> (Sender<ClientCommand>, Receiver<ClientCommand>) {
    crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<ClientEvent>, Receiver<ClientEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
