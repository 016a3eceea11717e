use serde::{Deserialize, Serialize};

use crate::audio::CaptureConfig;

/// Configuration for a live voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sample rate frames are captured and transmitted at (the voice
    /// service expects 16kHz)
    pub sample_rate: u32,

    /// Samples per frame (4096 is ~256ms at 16kHz)
    pub frame_samples: usize,

    /// Outbound queue capacity, in frames
    /// Default: 8 (~2 seconds of audio)
    pub outbound_queue_frames: usize,

    /// Playback delivery buffer, in synthesized chunks
    pub playback_buffer_chunks: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz
            frame_samples: 4096,
            outbound_queue_frames: 8,
            playback_buffer_chunks: 32,
        }
    }
}

impl SessionConfig {
    /// Capture source settings matching this session
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            frame_samples: self.frame_samples,
            ..CaptureConfig::default()
        }
    }
}
