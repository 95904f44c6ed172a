//! Synthetic camera producing a moving test pattern.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::error::MediaError;
use crate::frame::{CaptureTimestamp, VideoFrame};
use crate::media::{MediaConstraints, MediaDevices, MediaStream, VideoConstraint, VideoTrack};
use crate::FRAME_CHANNEL_CAPACITY;

const DEFAULT_SIZE: (u32, u32) = (640, 480);
const DEFAULT_FPS: u32 = 30;
const BACKGROUND: u8 = 200;
const FOREGROUND: u8 = 40;

struct Pattern {
    width: u32,
    height: u32,
    live: AtomicBool,
    sequence: AtomicU64,
    started: Instant,
    sender: Sender<VideoFrame>,
}

impl Pattern {
    /// Light background with a dark block sliding left to right.
    fn render(&self, sequence: u64) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = vec![BACKGROUND; w * h * 4];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }

        let (bw, bh) = ((w / 4).max(1), (h / 4).max(1));
        let travel = w.saturating_sub(bw).max(1);
        let x0 = (sequence as usize * 4) % travel;
        let y0 = h / 3;
        for y in y0..(y0 + bh).min(h) {
            for x in x0..(x0 + bw).min(w) {
                let i = (y * w + x) * 4;
                data[i..i + 3].fill(FOREGROUND);
            }
        }
        data
    }

    fn emit(&self) -> bool {
        if !self.live.load(Ordering::SeqCst) {
            return false;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let frame = VideoFrame::new(
            Bytes::from(self.render(sequence)),
            self.width,
            self.height,
            CaptureTimestamp::now(self.started),
            sequence,
        );
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!(sequence, "Frame dropped, reader behind");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Video track rendering a test pattern.
pub struct SyntheticTrack {
    id: String,
    pattern: Arc<Pattern>,
    receiver: Receiver<VideoFrame>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyntheticTrack {
    /// Track that only produces frames when [`SyntheticTrack::emit_frame`]
    /// is called.
    pub fn idle(id: impl Into<String>, width: u32, height: u32) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(FRAME_CHANNEL_CAPACITY);
        Self {
            id: id.into(),
            pattern: Arc::new(Pattern {
                width,
                height,
                live: AtomicBool::new(true),
                sequence: AtomicU64::new(0),
                started: Instant::now(),
                sender,
            }),
            receiver,
            worker: Mutex::new(None),
        }
    }

    /// Track with a producer thread emitting `fps` frames per second.
    pub fn spawn(
        id: impl Into<String>,
        width: u32,
        height: u32,
        fps: u32,
    ) -> std::io::Result<Self> {
        let track = Self::idle(id, width, height);
        let pattern = Arc::clone(&track.pattern);
        let interval = Duration::from_secs(1) / fps.max(1);

        let handle = thread::Builder::new()
            .name(format!("synthetic-{}", track.id))
            .spawn(move || {
                while pattern.emit() {
                    thread::sleep(interval);
                }
            })?;
        *track.worker.lock() = Some(handle);
        Ok(track)
    }

    /// Produce one frame now. Returns false once stopped.
    pub fn emit_frame(&self) -> bool {
        self.pattern.emit()
    }
}

impl VideoTrack for SyntheticTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.pattern.width, self.pattern.height)
    }

    fn is_live(&self) -> bool {
        self.pattern.live.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if !self.pattern.live.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!(track = %self.id, "Track stopped");
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    fn frames(&self) -> Receiver<VideoFrame> {
        self.receiver.clone()
    }
}

impl Drop for SyntheticTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Media devices exposing a single synthetic camera.
pub struct SyntheticCamera {
    fps: u32,
    allow: AtomicBool,
    next_stream: AtomicU64,
    tracks: Mutex<Vec<Weak<SyntheticTrack>>>,
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            allow: AtomicBool::new(true),
            next_stream: AtomicU64::new(0),
            tracks: Mutex::new(Vec::new()),
        }
    }
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fps(fps: u32) -> Self {
        Self {
            fps,
            ..Self::default()
        }
    }

    /// Grant or revoke camera permission for later requests.
    pub fn set_permission(&self, allow: bool) {
        self.allow.store(allow, Ordering::SeqCst);
    }

    /// Number of tracks still producing frames.
    pub fn live_tracks(&self) -> usize {
        let mut tracks = self.tracks.lock();
        tracks.retain(|t| t.strong_count() > 0);
        tracks
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|t| t.is_live())
            .count()
    }
}

impl MediaDevices for SyntheticCamera {
    fn get_user_media(&self, constraints: &MediaConstraints) -> Result<MediaStream, MediaError> {
        if !self.allow.load(Ordering::SeqCst) {
            return Err(MediaError::not_allowed());
        }
        if constraints.audio {
            return Err(MediaError::new("NotFoundError", "Requested device not found"));
        }

        let (width, height) = match constraints.video {
            VideoConstraint::Exact { width, height } => (width, height),
            VideoConstraint::Any => DEFAULT_SIZE,
        };
        if width == 0 || height == 0 {
            return Err(MediaError::overconstrained("width/height"));
        }

        let n = self.next_stream.fetch_add(1, Ordering::SeqCst) + 1;
        let track = SyntheticTrack::spawn(format!("camera-{n}"), width, height, self.fps)
            .map_err(|e| MediaError::new("AbortError", e.to_string()))?;
        let track = Arc::new(track);
        self.tracks.lock().push(Arc::downgrade(&track));

        info!(width, height, fps = self.fps, "Synthetic camera opened");
        Ok(MediaStream::new(format!("stream-{n}"), track))
    }
}
