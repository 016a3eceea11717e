//! Bidirectional live voice channel
//!
//! Captured frames go out through a bounded lossy queue; synthesized audio
//! and control signals come back as ordered events. The NATS implementation
//! carries JSON messages with base64 PCM payloads.

pub mod messages;
pub mod nats;
pub mod outbound;

pub use nats::{NatsTransport, NatsTransportConfig};
pub use outbound::OutboundQueue;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::{AudioFrame, ShutdownLink};

/// Synthesized audio received from the remote service
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Events delivered by an open transport, in arrival order
#[derive(Debug)]
pub enum TransportEvent {
    /// Synthesized audio for playback
    AudioOut(AudioChunk),
    /// The remote service ended the session
    RemoteClose,
}

/// Why the voice channel could not be established or keep going
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to voice service: {0}")]
    ConnectFailed(String),
    #[error("voice channel dropped: {0}")]
    Dropped(String),
}

/// Live voice channel provider
#[async_trait::async_trait]
pub trait LiveSessionTransport: Send + Sync {
    /// Establish the channel
    ///
    /// Suspends until the channel is usable or has failed; a returned
    /// handle always owns a live channel that `close` will release.
    async fn connect(&self) -> Result<TransportHandle, TransportError>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// Handle to an established voice channel
///
/// Sending never blocks: frames go through the bounded [`OutboundQueue`]
/// and the oldest is dropped on overflow. Events arrive in order on the
/// event channel; `None` from [`TransportHandle::next_event`] means the
/// channel is gone (expected after close, a fault otherwise).
pub struct TransportHandle {
    outbound: OutboundQueue,
    events: mpsc::Receiver<TransportEvent>,
    shutdown: Option<ShutdownLink>,
}

impl TransportHandle {
    /// Assemble a handle for a transport implementation: the outbound
    /// queue its io task drains, the event channel it feeds, and the
    /// shutdown link it listens on
    pub fn new(
        outbound: OutboundQueue,
        events: mpsc::Receiver<TransportEvent>,
        shutdown: ShutdownLink,
    ) -> Self {
        Self {
            outbound,
            events,
            shutdown: Some(shutdown),
        }
    }

    /// Queue one frame for transmission without blocking
    pub fn send_audio(&self, frame: AudioFrame) {
        self.outbound.push(frame);
    }

    /// Next event from the remote side
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Frames discarded by the outbound capacity bound so far
    pub fn dropped_frames(&self) -> u64 {
        self.outbound.dropped()
    }

    /// Terminate the channel
    ///
    /// Idempotent. Queued outbound frames are discarded, not flushed.
    /// Suspends until the io task confirms release; no events are
    /// delivered after this returns.
    pub async fn close(&mut self) {
        if let Some(link) = self.shutdown.take() {
            // Unblock the io task before waiting on it: pending event
            // deliveries fail fast and the queue stops yielding frames
            self.events.close();
            self.outbound.close();
            link.shutdown().await;
        }
        while self.events.try_recv().is_ok() {}
    }
}
