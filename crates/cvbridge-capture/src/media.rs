//! Media device access.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use cvbridge_ipc::ResolutionPreset;

use crate::error::MediaError;
use crate::frame::VideoFrame;

/// Video size requirement of a media request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoConstraint {
    /// The device must deliver exactly this size.
    Exact { width: u32, height: u32 },

    /// Any size the device prefers.
    Any,
}

impl From<ResolutionPreset> for VideoConstraint {
    fn from(preset: ResolutionPreset) -> Self {
        match preset.dimensions() {
            Some((width, height)) => Self::Exact { width, height },
            None => Self::Any,
        }
    }
}

/// What a media request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: VideoConstraint,
    pub audio: bool,
}

impl MediaConstraints {
    /// Camera only, no audio.
    pub fn camera(preset: ResolutionPreset) -> Self {
        Self {
            video: preset.into(),
            audio: false,
        }
    }
}

/// A live video track backed by hardware (or a stand-in for it).
pub trait VideoTrack: Send + Sync {
    fn id(&self) -> &str;

    /// Delivered frame size.
    fn dimensions(&self) -> (u32, u32);

    /// Whether the track still produces frames.
    fn is_live(&self) -> bool;

    /// Stop the track and release the device. Idempotent.
    fn stop(&self);

    /// Frames produced by the track.
    fn frames(&self) -> Receiver<VideoFrame>;
}

/// A stream returned by a media request.
#[derive(Clone)]
pub struct MediaStream {
    id: String,
    video: Arc<dyn VideoTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, video: Arc<dyn VideoTrack>) -> Self {
        Self {
            id: id.into(),
            video,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn video_track(&self) -> &Arc<dyn VideoTrack> {
        &self.video
    }

    /// Stop every track of the stream.
    pub fn stop(&self) {
        self.video.stop();
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("track", &self.video.id())
            .field("live", &self.video.is_live())
            .finish()
    }
}

/// Source of camera streams.
pub trait MediaDevices: Send + Sync {
    /// Ask for a stream satisfying `constraints`.
    fn get_user_media(&self, constraints: &MediaConstraints) -> Result<MediaStream, MediaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraints_from_preset() {
        assert_eq!(
            MediaConstraints::camera(ResolutionPreset::Qvga).video,
            VideoConstraint::Exact {
                width: 320,
                height: 240
            }
        );
        assert_eq!(
            MediaConstraints::camera(ResolutionPreset::Vga).video,
            VideoConstraint::Exact {
                width: 640,
                height: 480
            }
        );
        let any = MediaConstraints::camera(ResolutionPreset::from_name("4k"));
        assert_eq!(any.video, VideoConstraint::Any);
        assert!(!any.audio);
    }
}
