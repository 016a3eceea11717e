use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

use super::capture::{
    AudioCaptureSource, AudioFrame, CaptureConfig, CaptureHandle, DeviceError, ShutdownLink,
    ShutdownListener,
};

const TONE_AMPLITUDE: f32 = 0.5;

/// Synthetic capture source: a steady sine tone at the real frame cadence
///
/// Stands in for the microphone in tests and `--tone` runs. No hardware,
/// same contract.
pub struct ToneCapture {
    config: CaptureConfig,
    tone_hz: f32,
}

impl ToneCapture {
    pub fn new(config: CaptureConfig, tone_hz: f32) -> Self {
        Self { config, tone_hz }
    }
}

#[async_trait::async_trait]
impl AudioCaptureSource for ToneCapture {
    async fn open(&self) -> Result<CaptureHandle, DeviceError> {
        let config = self.config.clone();
        let tone_hz = self.tone_hz;
        let (frame_tx, frame_rx) = mpsc::channel(config.channel_capacity);
        let (link, listener) = ShutdownLink::new();

        tokio::spawn(async move {
            let ShutdownListener { mut signal, done } = listener;
            let mut ticker = interval(config.frame_duration());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let step = std::f32::consts::TAU * tone_hz / config.sample_rate as f32;
            let mut phase = 0.0f32;
            let mut emitted: u64 = 0;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut signal => break,
                    _ = ticker.tick() => {
                        let samples: Vec<f32> = (0..config.frame_samples)
                            .map(|_| {
                                let sample = phase.sin() * TONE_AMPLITUDE;
                                phase += step;
                                if phase > std::f32::consts::TAU {
                                    phase -= std::f32::consts::TAU;
                                }
                                sample
                            })
                            .collect();
                        let frame = AudioFrame {
                            samples,
                            sample_rate: config.sample_rate,
                            timestamp_ms: emitted * 1000 / u64::from(config.sample_rate),
                        };
                        emitted += config.frame_samples as u64;
                        if let Err(e) = frame_tx.try_send(frame) {
                            warn!("dropping tone frame: {}", e);
                        }
                    }
                }
            }
            let _ = done.send(());
        });

        Ok(CaptureHandle::new(frame_rx, link))
    }

    fn name(&self) -> &str {
        "tone"
    }
}
