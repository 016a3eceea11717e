// cpal-backed microphone capture
//
// The cpal input stream is not Send, so it lives on a dedicated thread for
// the lifetime of the capture session. The async side talks to that thread
// through the frame channel and the shutdown link.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SupportedStreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::capture::{
    AudioCaptureSource, AudioFrame, CaptureConfig, CaptureHandle, DeviceError, ShutdownLink,
    ShutdownListener,
};

/// Default input device capture source
pub struct MicCapture {
    config: CaptureConfig,
}

impl MicCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl AudioCaptureSource for MicCapture {
    async fn open(&self) -> Result<CaptureHandle, DeviceError> {
        let config = self.config.clone();
        let (frame_tx, frame_rx) = mpsc::channel(config.channel_capacity);
        let (link, listener) = ShutdownLink::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || capture_thread(config, frame_tx, listener, ready_tx))
            .map_err(|e| DeviceError::Unavailable(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(CaptureHandle::new(frame_rx, link)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(DeviceError::Unavailable(
                "capture thread exited before the stream came up".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

/// Owns the cpal stream from open to release
fn capture_thread(
    config: CaptureConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    listener: ShutdownListener,
    ready_tx: oneshot::Sender<Result<(), DeviceError>>,
) {
    let ShutdownListener { signal, done } = listener;

    let stream = match build_stream(&config, frame_tx) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            let _ = done.send(());
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(DeviceError::Unavailable(format!(
            "failed to start input stream: {e}"
        ))));
        let _ = done.send(());
        return;
    }

    if ready_tx.send(Ok(())).is_err() {
        // open() was cancelled while the stream came up; release right away
        drop(stream);
        let _ = done.send(());
        return;
    }

    // Hold the stream until the handle closes or is dropped
    let _ = signal.blocking_recv();
    drop(stream);
    let _ = done.send(());
    info!("microphone released");
}

fn build_stream(
    config: &CaptureConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| DeviceError::Unavailable("no default input device".to_string()))?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = pick_input_config(&device, config.sample_rate)?;
    let device_rate = supported.sample_rate().0;
    let device_channels = supported.channels();

    info!(
        "opening input device {} ({} Hz, {} channels, {:?})",
        device_name,
        device_rate,
        device_channels,
        supported.sample_format()
    );

    let assembler = FrameAssembler::new(config, device_rate, device_channels);
    let stream_config: cpal::StreamConfig = supported.config();

    match supported.sample_format() {
        SampleFormat::F32 => typed_stream::<f32>(&device, &stream_config, assembler, frame_tx),
        SampleFormat::I16 => typed_stream::<i16>(&device, &stream_config, assembler, frame_tx),
        SampleFormat::U16 => typed_stream::<u16>(&device, &stream_config, assembler, frame_tx),
        other => Err(DeviceError::Unavailable(format!(
            "unsupported input sample format {other:?}"
        ))),
    }
}

fn typed_stream<T>(
    device: &Device,
    config: &cpal::StreamConfig,
    mut assembler: FrameAssembler,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                assembler.push(data, &frame_tx);
            },
            |err| error!("input stream error: {}", err),
            None,
        )
        .map_err(|e| classify(e.to_string()))
}

/// Pick the input config: the target rate natively if the device offers it
/// (fewest channels first), otherwise the device default with software
/// conversion downstream.
fn pick_input_config(
    device: &Device,
    target_rate: u32,
) -> Result<SupportedStreamConfig, DeviceError> {
    let target = cpal::SampleRate(target_rate);
    let ranges: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| classify(e.to_string()))?
        .collect();

    let mut candidates: Vec<_> = ranges
        .into_iter()
        .filter(|r| r.min_sample_rate() <= target && target <= r.max_sample_rate())
        .collect();
    candidates.sort_by_key(|r| r.channels());
    if let Some(range) = candidates.into_iter().next() {
        return Ok(range.with_sample_rate(target));
    }

    device
        .default_input_config()
        .map_err(|e| classify(e.to_string()))
}

/// Map backend error text onto the device error taxonomy
///
/// cpal has no dedicated permission error, so this is a best-effort match
/// on the platform message.
fn classify(message: String) -> DeviceError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not permitted") {
        DeviceError::PermissionDenied(message)
    } else {
        DeviceError::Unavailable(message)
    }
}

/// Accumulates device-format callback buffers into fixed-size mono frames
/// at the target rate
struct FrameAssembler {
    target_rate: u32,
    frame_samples: usize,
    device_rate: u32,
    device_channels: u16,
    pending: Vec<f32>,
    emitted_samples: u64,
    decim_acc: u64,
}

impl FrameAssembler {
    fn new(config: &CaptureConfig, device_rate: u32, device_channels: u16) -> Self {
        Self {
            target_rate: config.sample_rate,
            frame_samples: config.frame_samples,
            device_rate,
            device_channels: device_channels.max(1),
            pending: Vec::with_capacity(config.frame_samples),
            emitted_samples: 0,
            decim_acc: 0,
        }
    }

    fn push<T>(&mut self, interleaved: &[T], frame_tx: &mpsc::Sender<AudioFrame>)
    where
        T: cpal::SizedSample,
        f32: cpal::FromSample<T>,
    {
        for chunk in interleaved.chunks(self.device_channels as usize) {
            let mut mixed = 0.0f32;
            for &raw in chunk {
                let sample: f32 = cpal::Sample::from_sample(raw);
                mixed += sample;
            }
            // Sum the channels and clip rather than average, so quiet
            // single-channel content keeps its level
            let mono = mixed.clamp(-1.0, 1.0);

            // Nearest-sample decimation; adequate for speech-band capture
            self.decim_acc += u64::from(self.target_rate);
            if self.decim_acc >= u64::from(self.device_rate) {
                self.decim_acc -= u64::from(self.device_rate);
                self.pending.push(mono);
                if self.pending.len() == self.frame_samples {
                    self.emit(frame_tx);
                }
            }
        }
    }

    fn emit(&mut self, frame_tx: &mpsc::Sender<AudioFrame>) {
        let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_samples));
        let timestamp_ms = self.emitted_samples * 1000 / u64::from(self.target_rate);
        self.emitted_samples += samples.len() as u64;

        let frame = AudioFrame {
            samples,
            sample_rate: self.target_rate,
            timestamp_ms,
        };

        // The device callback must never block; a full channel costs frames
        if let Err(e) = frame_tx.try_send(frame) {
            warn!("dropping capture frame: {}", e);
        }
    }
}
