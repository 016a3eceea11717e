pub mod capture;
pub mod meter;
pub mod mic;
pub mod tone;

pub use capture::{
    AudioCaptureSource, AudioFrame, CaptureConfig, CaptureHandle, CaptureSourceFactory,
    CaptureSourceKind, DeviceError, ShutdownLink, ShutdownListener,
};
pub use meter::{measure, rms, VolumeSample};
pub use mic::MicCapture;
pub use tone::ToneCapture;
