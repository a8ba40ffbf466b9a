//! Frame-rate tracking fed from render callbacks

use std::collections::VecDeque;

use crate::engine::FrameInfo;

const DEFAULT_WINDOW_MS: f64 = 1000.0;

/// Rolling frame statistics over a time window
#[derive(Debug, Clone)]
pub struct FrameStats {
    window_ms: f64,
    timestamps: VecDeque<f64>,
    last_delta_ms: f64,
    frames: u64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

impl FrameStats {
    pub fn new(window_ms: f64) -> Self {
        Self {
            window_ms,
            timestamps: VecDeque::new(),
            last_delta_ms: 0.0,
            frames: 0,
        }
    }

    pub fn record(&mut self, info: &FrameInfo) {
        self.frames += 1;
        self.last_delta_ms = info.delta_ms;
        self.timestamps.push_back(info.time_ms);
        while let Some(&oldest) = self.timestamps.front() {
            if info.time_ms - oldest <= self.window_ms {
                break;
            }
            self.timestamps.pop_front();
        }
    }

    /// Frames per second over the window, 0 until two frames are seen
    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.timestamps.front(), self.timestamps.back()) else {
            return 0.0;
        };
        let span = last - first;
        if self.timestamps.len() < 2 || span <= 0.0 {
            return 0.0;
        }
        (self.timestamps.len() - 1) as f64 * 1000.0 / span
    }

    pub fn last_frame_ms(&self) -> f64 {
        self.last_delta_ms
    }

    pub fn total_frames(&self) -> u64 {
        self.frames
    }
}
