//! Camera session management.

use std::sync::Arc;

use cvbridge_ipc::ResolutionPreset;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::elements::ElementRegistry;
use crate::frame::VideoFrame;
use crate::media::{MediaConstraints, MediaDevices, MediaStream};
use crate::sink::{CanPlayFn, VideoSink};
use crate::{CaptureResult, ListenerId};

/// Invoked with the stream and its sink once the sink can play.
pub type StartedCallback = CanPlayFn;

struct CaptureSession {
    stream: MediaStream,
    sink: Arc<VideoSink>,
    listener: ListenerId,
    active: bool,
}

impl CaptureSession {
    fn teardown(&mut self) {
        if !self.active {
            return;
        }
        self.sink.pause();
        self.sink.set_src_object(None);
        self.sink.remove_can_play_listener(self.listener);
        self.stream.stop();
        self.active = false;
    }
}

/// Owns at most one camera session bound to a video sink.
///
/// A stopped session is kept as the last session record until the next
/// start replaces it. A start that fails leaves no record.
pub struct CaptureSessionManager {
    devices: Arc<dyn MediaDevices>,
    elements: Arc<ElementRegistry>,
    session: Mutex<Option<CaptureSession>>,
}

impl CaptureSessionManager {
    pub fn new(devices: Arc<dyn MediaDevices>, elements: Arc<ElementRegistry>) -> Self {
        Self {
            devices,
            elements,
            session: Mutex::new(None),
        }
    }

    /// Open the camera and play it on the sink named `sink_id`.
    ///
    /// Any running session is stopped first. An unknown sink id gets a
    /// fresh sink that is not registered with the element registry.
    #[instrument(name = "camera_start", skip(self, on_started), fields(preset = %preset))]
    pub fn start(
        &self,
        preset: ResolutionPreset,
        on_started: StartedCallback,
        sink_id: &str,
    ) -> CaptureResult<()> {
        let mut slot = self.session.lock();
        if let Some(previous) = slot.as_mut() {
            debug!(stream = previous.stream.id(), "Stopping previous session");
            previous.teardown();
        }

        let constraints = MediaConstraints::camera(preset);
        let stream = match self.devices.get_user_media(&constraints) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Camera request failed");
                *slot = None;
                return Err(e.into());
            }
        };

        let sink = self.elements.find_sink(sink_id).unwrap_or_else(|| {
            debug!(sink_id, "Sink not found, using a detached one");
            Arc::new(VideoSink::new(sink_id))
        });

        sink.set_src_object(Some(stream.clone()));
        let listener = sink.add_can_play_listener(on_started);
        let (width, height) = stream.video_track().dimensions();

        *slot = Some(CaptureSession {
            stream,
            sink: Arc::clone(&sink),
            listener,
            active: true,
        });
        drop(slot);

        // Playback fires the started callback, which may call back in.
        sink.play();
        info!(width, height, sink = sink.id(), "Camera started");
        Ok(())
    }

    /// Stop playback and release the camera. No-op without a session.
    #[instrument(name = "camera_stop", skip(self))]
    pub fn stop(&self) {
        if let Some(session) = self.session.lock().as_mut() {
            if session.active {
                session.teardown();
                info!("Camera stopped");
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.lock().as_ref().is_some_and(|s| s.active)
    }

    /// Stream of the last session, running or not.
    pub fn stream(&self) -> Option<MediaStream> {
        self.session.lock().as_ref().map(|s| s.stream.clone())
    }

    /// Sink of the last session, running or not.
    pub fn sink(&self) -> Option<Arc<VideoSink>> {
        self.session.lock().as_ref().map(|s| Arc::clone(&s.sink))
    }

    /// Latest frame of the running session.
    pub fn current_frame(&self) -> Option<VideoFrame> {
        let sink = {
            let session = self.session.lock();
            let session = session.as_ref().filter(|s| s.active)?;
            Arc::clone(&session.sink)
        };
        sink.current_frame()
    }
}

impl Drop for CaptureSessionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
