pub mod audio;
pub mod config;
pub mod session;
pub mod transport;

pub use audio::{
    AudioCaptureSource, AudioFrame, CaptureConfig, CaptureHandle, CaptureSourceFactory,
    CaptureSourceKind, DeviceError, MicCapture, ShutdownLink, ShutdownListener, ToneCapture,
    VolumeSample,
};
pub use config::Config;
pub use session::{
    ErrorReason, SessionConfig, SessionController, SessionError, SessionHandle, SessionState,
    SessionStats,
};
pub use transport::{
    AudioChunk, LiveSessionTransport, NatsTransport, NatsTransportConfig, OutboundQueue,
    TransportError, TransportEvent, TransportHandle,
};
