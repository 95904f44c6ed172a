//! Requests sent from the host to the client.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{EngineConfig, FrameSource, ResolutionPreset};

/// Requests the host can send to the client.
///
/// Every request that can fail carries a `request_id` echoed back in the
/// matching [`ClientEvent`](crate::ClientEvent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientCommand {
    /// (Re)load the engine with the given configuration.
    LoadEngine { config: EngineConfig },

    /// Decode a local image file onto a canvas.
    LoadImageFromFile {
        request_id: u64,
        path: PathBuf,
        canvas_id: String,
    },

    /// Fetch and decode a remote image onto a canvas.
    LoadImageFromUrl {
        request_id: u64,
        url: String,
        canvas_id: String,
    },

    /// Write a remote resource into the engine's virtual filesystem.
    FetchResource {
        request_id: u64,
        path: String,
        url: String,
    },

    /// Start the camera and bind it to a sink element.
    StartCamera {
        request_id: u64,
        preset: ResolutionPreset,
        sink_id: String,
    },

    /// Stop the camera, if any.
    StopCamera,

    /// Run the contour pipeline and draw the result on a canvas.
    ProcessFrame {
        request_id: u64,
        source: FrameSource,
        output_canvas_id: String,
    },

    /// Request the current readiness.
    GetReadiness,

    /// Shutdown the client completely.
    Shutdown,
}
