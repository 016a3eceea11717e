use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// One block of captured audio (f32 PCM, mono)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (f32 PCM in [-1.0, 1.0], mono)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for capture sources
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (capture converts if the device differs)
    pub sample_rate: u32,
    /// Samples per emitted frame
    pub frame_samples: usize,
    /// Capacity of the frame delivery channel
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz, what the voice service expects
            frame_samples: 4096,
            channel_capacity: 16,
        }
    }
}

impl CaptureConfig {
    /// Wall-clock duration of one frame at the configured rate
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_samples as u64 * 1000 / u64::from(self.sample_rate))
    }
}

/// Why the microphone could not be acquired
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The platform refused microphone access
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),
    /// No usable input device, or the device rejected the stream
    #[error("input device unavailable: {0}")]
    Unavailable(String),
}

/// Microphone capability provider
///
/// Implementations:
/// - `MicCapture`: default input device via cpal
/// - `ToneCapture`: synthetic sine source (tests and `--tone` runs)
#[async_trait::async_trait]
pub trait AudioCaptureSource: Send + Sync {
    /// Acquire the device and start producing frames
    ///
    /// Suspends until the source is live or has failed. A handle is only
    /// returned once frames are actually flowing, so closing it is always
    /// enough to release the device.
    async fn open(&self) -> Result<CaptureHandle, DeviceError>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Signal/ack pair tying a running pipeline to the handle that owns it.
/// Used by both capture and transport teardown.
///
/// Dropping the link without calling [`ShutdownLink::shutdown`] still wakes
/// the pipeline side (the signal receiver resolves with an error), so a
/// leaked handle cannot leak the device behind it.
#[derive(Debug)]
pub struct ShutdownLink {
    signal: oneshot::Sender<()>,
    done: oneshot::Receiver<()>,
}

/// Pipeline-side endpoints of a [`ShutdownLink`]
///
/// The pipeline waits on `signal` (completion or error both mean "stop"),
/// releases its resources, then acks on `done`.
#[derive(Debug)]
pub struct ShutdownListener {
    pub signal: oneshot::Receiver<()>,
    pub done: oneshot::Sender<()>,
}

impl ShutdownLink {
    pub fn new() -> (Self, ShutdownListener) {
        let (signal_tx, signal_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        (
            Self {
                signal: signal_tx,
                done: done_rx,
            },
            ShutdownListener {
                signal: signal_rx,
                done: done_tx,
            },
        )
    }

    /// Signal shutdown and wait for the pipeline to confirm release
    pub async fn shutdown(self) {
        let _ = self.signal.send(());
        let _ = self.done.await;
    }
}

/// Handle to an open capture pipeline
///
/// Receives frames in capture order. Closing (or dropping) the handle stops
/// the pipeline and releases the device.
pub struct CaptureHandle {
    frames: mpsc::Receiver<AudioFrame>,
    shutdown: Option<ShutdownLink>,
}

impl CaptureHandle {
    pub fn new(frames: mpsc::Receiver<AudioFrame>, shutdown: ShutdownLink) -> Self {
        Self {
            frames,
            shutdown: Some(shutdown),
        }
    }

    /// Receive the next frame. `None` once the pipeline has ended.
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        self.frames.recv().await
    }

    /// Stop capture and release the device
    ///
    /// Idempotent. Suspends until the pipeline has confirmed release; no
    /// frames are delivered after this returns.
    pub async fn close(&mut self) {
        self.frames.close();
        if let Some(link) = self.shutdown.take() {
            link.shutdown().await;
        }
        while self.frames.try_recv().is_ok() {}
    }
}

/// Capture source selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureSourceKind {
    /// Default input device
    Microphone,
    /// Synthetic sine tone (no hardware required)
    Tone { hz: f32 },
}

/// Capture source factory
pub struct CaptureSourceFactory;

impl CaptureSourceFactory {
    /// Create a capture source for the requested kind
    pub fn create(kind: CaptureSourceKind, config: CaptureConfig) -> Arc<dyn AudioCaptureSource> {
        match kind {
            CaptureSourceKind::Microphone => Arc::new(super::mic::MicCapture::new(config)),
            CaptureSourceKind::Tone { hz } => Arc::new(super::tone::ToneCapture::new(config, hz)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_a_quarter_second_frame() {
        let config = CaptureConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.frame_samples, 4096);
        assert_eq!(config.frame_duration(), Duration::from_millis(256));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_drains_buffered_frames() {
        let (tx, rx) = mpsc::channel(4);
        let (link, listener) = ShutdownLink::new();
        let mut handle = CaptureHandle::new(rx, link);

        tx.send(AudioFrame {
            samples: vec![0.0; 8],
            sample_rate: 16000,
            timestamp_ms: 0,
        })
        .await
        .unwrap();

        tokio::spawn(async move {
            let _ = listener.signal.await;
            let _ = listener.done.send(());
        });

        handle.close().await;
        handle.close().await;
        assert!(handle.recv().await.is_none());
        assert!(tx
            .send(AudioFrame {
                samples: vec![0.0; 8],
                sample_rate: 16000,
                timestamp_ms: 256,
            })
            .await
            .is_err());
    }
}
