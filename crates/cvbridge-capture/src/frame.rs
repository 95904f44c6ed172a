//! Captured frame types.

use bytes::Bytes;
use std::time::Instant;

/// Timestamp for a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was captured.
    pub capture_time: Instant,

    /// Milliseconds since the track started.
    pub pts_ms: u64,
}

impl CaptureTimestamp {
    pub fn now(start_time: Instant) -> Self {
        let capture_time = Instant::now();
        let pts_ms = capture_time.duration_since(start_time).as_millis() as u64;
        Self {
            capture_time,
            pts_ms,
        }
    }
}

/// A video frame as played by a sink.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Tightly packed RGBA pixel data.
    pub data: Bytes,

    pub width: u32,
    pub height: u32,
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number within a track.
    pub sequence: u64,
}

impl VideoFrame {
    pub fn new(
        data: Bytes,
        width: u32,
        height: u32,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            timestamp,
            sequence,
        }
    }

    /// Expected RGBA buffer size for given dimensions.
    pub fn rgba_buffer_size(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    /// Whether the data matches the declared dimensions.
    pub fn is_valid(&self) -> bool {
        self.data.len() == Self::rgba_buffer_size(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_validity() {
        let ts = CaptureTimestamp::now(Instant::now());
        let frame = VideoFrame::new(Bytes::from(vec![0u8; 2 * 3 * 4]), 2, 3, ts, 0);
        assert!(frame.is_valid());

        let short = VideoFrame::new(Bytes::from(vec![0u8; 5]), 2, 3, ts, 1);
        assert!(!short.is_valid());
    }
}
