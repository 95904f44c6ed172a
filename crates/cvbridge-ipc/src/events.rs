//! Events sent from the client to the host.

use serde::{Deserialize, Serialize};

use crate::state::ReadinessUpdate;

/// Events that the client can send to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Engine readiness changed.
    ReadinessChanged(ReadinessUpdate),

    /// The engine bootstrap failed.
    LoadFailed {
        /// Load attempt that failed.
        generation: u64,

        /// Error message.
        message: String,
    },

    /// A request finished successfully.
    Completed { request_id: u64 },

    /// A request failed.
    Failed {
        request_id: u64,

        /// Error message.
        message: String,
    },

    /// The camera sink became playable.
    CameraStarted {
        request_id: u64,
        width: u32,
        height: u32,
    },

    /// The contour pipeline produced an output frame.
    FrameProcessed {
        request_id: u64,

        /// Number of contours detected.
        contours: usize,

        /// Number of top-level (external) contours.
        external: usize,
    },

    /// Client is ready to accept commands.
    Started,

    /// Client has shut down.
    Shutdown,
}
