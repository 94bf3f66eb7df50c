//! Inbound stream statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Counters over every frame received
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStats {
    pub total_frames: u64,
    /// Rate over the last completed measurement window
    pub frames_per_second: u32,
    pub last_frame_len: usize,
    pub last_frame_at: Option<DateTime<Utc>>,
}

impl StreamStats {
    pub fn record(&mut self, frame_len: usize, at: DateTime<Utc>) {
        self.total_frames = self.total_frames.saturating_add(1);
        self.last_frame_len = frame_len;
        self.last_frame_at = Some(at);
    }
}

/// Measurement window for the frame rate
#[derive(Debug)]
pub(crate) struct RateWindow {
    started: Instant,
    frames_at_start: u64,
}

impl RateWindow {
    pub fn new(now: Instant, total_frames: u64) -> Self {
        Self {
            started: now,
            frames_at_start: total_frames,
        }
    }

    /// Close the window at `now` and start the next one; `None` if no time passed
    pub fn roll(&mut self, total_frames: u64, now: Instant) -> Option<u32> {
        let elapsed_ms = now.saturating_duration_since(self.started).as_millis();
        if elapsed_ms == 0 {
            return None;
        }
        let frames = u128::from(total_frames.saturating_sub(self.frames_at_start));
        let rate = u32::try_from(frames * 1000 / elapsed_ms).unwrap_or(u32::MAX);

        self.started = now;
        self.frames_at_start = total_frames;
        Some(rate)
    }
}
