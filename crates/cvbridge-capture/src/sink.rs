//! Video playback sinks.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::frame::VideoFrame;
use crate::media::MediaStream;
use crate::ListenerId;

/// Handler fired when a sink becomes playable.
pub type CanPlayFn = Arc<dyn Fn(&MediaStream, &VideoSink) + Send + Sync>;

#[derive(Default)]
struct SinkState {
    src_object: Option<MediaStream>,
    playing: bool,
    last_frame: Option<VideoFrame>,
}

/// Element that plays a media stream.
///
/// `can play` listeners fire once each time playback starts on a sink that
/// has a source attached.
pub struct VideoSink {
    id: String,
    state: Mutex<SinkState>,
    can_play: Mutex<Vec<(ListenerId, CanPlayFn)>>,
}

impl VideoSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(SinkState::default()),
            can_play: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn src_object(&self) -> Option<MediaStream> {
        self.state.lock().src_object.clone()
    }

    /// Attach or detach the played stream. Detaching also pauses.
    pub fn set_src_object(&self, stream: Option<MediaStream>) {
        let mut state = self.state.lock();
        if stream.is_none() {
            state.playing = false;
        }
        state.src_object = stream;
        state.last_frame = None;
    }

    /// Start playback, firing `can play` listeners on the transition.
    pub fn play(&self) {
        let stream = {
            let mut state = self.state.lock();
            if state.playing {
                return;
            }
            let Some(stream) = state.src_object.clone() else {
                return;
            };
            state.playing = true;
            stream
        };

        // Listeners may call back into the sink.
        let listeners: Vec<CanPlayFn> = self
            .can_play
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        debug!(sink = %self.id, listeners = listeners.len(), "Sink can play");
        for listener in listeners {
            listener(&stream, self);
        }
    }

    pub fn pause(&self) {
        self.state.lock().playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn add_can_play_listener(&self, listener: CanPlayFn) -> ListenerId {
        let id = ListenerId::next();
        self.can_play.lock().push((id, listener));
        trace!(sink = %self.id, ?id, "Can-play listener added");
        id
    }

    /// Remove exactly the listener registered under `id`.
    pub fn remove_can_play_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.can_play.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.can_play.lock().len()
    }

    /// Latest frame of the playing stream.
    ///
    /// Drains queued frames and keeps the newest, so a slow reader always
    /// sees the most recent picture.
    pub fn current_frame(&self) -> Option<VideoFrame> {
        let mut state = self.state.lock();
        if !state.playing {
            return state.last_frame.clone();
        }
        if let Some(stream) = &state.src_object {
            let frames = stream.video_track().frames();
            if let Some(frame) = frames.try_iter().last() {
                state.last_frame = Some(frame);
            }
        }
        state.last_frame.clone()
    }
}

impl fmt::Debug for VideoSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VideoSink")
            .field("id", &self.id)
            .field("src_object", &state.src_object)
            .field("playing", &state.playing)
            .field("listeners", &self.can_play.lock().len())
            .finish()
    }
}
