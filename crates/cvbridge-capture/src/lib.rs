//! Camera capture and host drawing surfaces.
//!
//! This crate owns the host side of pixel acquisition: media devices and
//! their video tracks, the sinks that play them, the canvases images are
//! drawn onto, and the session manager that ties a camera stream to a
//! sink.

mod canvas;
mod elements;
mod error;
mod frame;
mod media;
mod session;
mod sink;
mod synthetic;

pub use canvas::{Canvas, ImageData};
pub use elements::{ElementRegistry, FileInput, FileSelection, SelectedFile};
pub use error::{CaptureError, MediaError};
pub use frame::{CaptureTimestamp, VideoFrame};
pub use media::{MediaConstraints, MediaDevices, MediaStream, VideoConstraint, VideoTrack};
pub use session::{CaptureSessionManager, StartedCallback};
pub use sink::{CanPlayFn, VideoSink};
pub use synthetic::{SyntheticCamera, SyntheticTrack};

use std::sync::atomic::{AtomicU64, Ordering};

/// Channel capacity for captured frames.
pub const FRAME_CHANNEL_CAPACITY: usize = 3;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Identifies one registered event listener, so it can be removed exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
