use async_nats::Client;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audio::{ShutdownLink, ShutdownListener};

use super::messages::{
    decode_pcm, encode_pcm, AudioFrameMessage, ControlKind, ControlMessage, SynthAudioMessage,
};
use super::outbound::OutboundQueue;
use super::{AudioChunk, LiveSessionTransport, TransportError, TransportEvent, TransportHandle};

/// Configuration for the NATS voice channel
#[derive(Debug, Clone)]
pub struct NatsTransportConfig {
    /// NATS server URL (credentials go in the URL)
    pub url: String,
    /// Subject prefix shared with the voice service
    pub subject_prefix: String,
    /// Outbound queue capacity, in frames
    pub outbound_capacity: usize,
    /// Inbound event channel capacity
    pub event_capacity: usize,
}

impl Default for NatsTransportConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            subject_prefix: "voice".to_string(),
            outbound_capacity: 8, // ~2s of audio at 256ms frames
            event_capacity: 64,
        }
    }
}

/// Live voice channel over NATS pub/sub
///
/// Each session gets a fresh stream id. Captured frames are published as
/// JSON on `{prefix}.audio.{stream}`; the service answers with synthesized
/// audio on `{prefix}.synth.{stream}` and control signals on
/// `{prefix}.control.{stream}`.
pub struct NatsTransport {
    config: NatsTransportConfig,
}

impl NatsTransport {
    pub fn new(config: NatsTransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl LiveSessionTransport for NatsTransport {
    async fn connect(&self) -> Result<TransportHandle, TransportError> {
        let client = async_nats::connect(&self.config.url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let stream_id = format!("stream-{}", Uuid::new_v4());
        let subjects = StreamSubjects::new(&self.config.subject_prefix, &stream_id);

        let synth_sub = client
            .subscribe(subjects.synth.clone())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let control_sub = client
            .subscribe(subjects.control.clone())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        info!(
            "connected to voice service at {} (stream {})",
            self.config.url, stream_id
        );

        let outbound = OutboundQueue::new(self.config.outbound_capacity);
        let (event_tx, event_rx) = mpsc::channel(self.config.event_capacity.max(1));
        let (link, listener) = ShutdownLink::new();

        let io = IoTask {
            client,
            stream_id,
            subjects,
            outbound: outbound.clone(),
            event_tx,
        };
        tokio::spawn(io.run(synth_sub, control_sub, listener));

        Ok(TransportHandle::new(outbound, event_rx, link))
    }

    fn name(&self) -> &str {
        "nats"
    }
}

struct StreamSubjects {
    audio: String,
    synth: String,
    control: String,
}

impl StreamSubjects {
    fn new(prefix: &str, stream_id: &str) -> Self {
        Self {
            audio: format!("{prefix}.audio.{stream_id}"),
            synth: format!("{prefix}.synth.{stream_id}"),
            control: format!("{prefix}.control.{stream_id}"),
        }
    }
}

struct IoTask {
    client: Client,
    stream_id: String,
    subjects: StreamSubjects,
    outbound: OutboundQueue,
    event_tx: mpsc::Sender<TransportEvent>,
}

impl IoTask {
    async fn run(
        self,
        mut synth_sub: async_nats::Subscriber,
        mut control_sub: async_nats::Subscriber,
        listener: ShutdownListener,
    ) {
        let ShutdownListener { mut signal, done } = listener;
        let mut sequence: u64 = 0;
        let mut sample_rate: u32 = 16000;

        loop {
            tokio::select! {
                biased;
                _ = &mut signal => break,
                maybe_frame = self.outbound.pop() => match maybe_frame {
                    Some(frame) => {
                        sample_rate = frame.sample_rate;
                        self.publish_frame(&frame.samples, sample_rate, sequence, false).await;
                        sequence += 1;
                    }
                    None => break,
                },
                maybe_msg = synth_sub.next() => match maybe_msg {
                    Some(msg) => {
                        if !self.handle_synth(&msg.payload).await {
                            break;
                        }
                    }
                    None => break, // subscription gone; the session sees the drop
                },
                maybe_msg = control_sub.next() => match maybe_msg {
                    Some(msg) => {
                        if !self.handle_control(&msg.payload).await {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        // End-of-stream marker so the service can finalize its side
        self.publish_frame(&[], sample_rate, sequence, true).await;
        let _ = self.client.flush().await;
        let _ = done.send(());
        info!("voice channel closed (stream {})", self.stream_id);
    }

    async fn publish_frame(
        &self,
        samples: &[f32],
        sample_rate: u32,
        sequence: u64,
        final_frame: bool,
    ) {
        let message = AudioFrameMessage {
            stream_id: self.stream_id.clone(),
            sequence,
            pcm: encode_pcm(samples),
            sample_rate,
            channels: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame,
        };

        match serde_json::to_vec(&message) {
            Ok(payload) => {
                // Keep the session going even if one publish fails
                let subject = self.subjects.audio.clone();
                if let Err(e) = self.client.publish(subject, payload.into()).await {
                    error!("failed to publish audio frame: {}", e);
                }
            }
            Err(e) => error!("failed to serialize audio frame: {}", e),
        }
    }

    /// Returns false once the event side is gone and the task should stop
    async fn handle_synth(&self, payload: &[u8]) -> bool {
        let message: SynthAudioMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("failed to parse synth message: {}", e);
                return true;
            }
        };
        let samples = match decode_pcm(&message.pcm) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("undecodable synth payload (seq={}): {}", message.sequence, e);
                return true;
            }
        };
        let chunk = AudioChunk {
            samples,
            sample_rate: message.sample_rate,
        };
        self.event_tx.send(TransportEvent::AudioOut(chunk)).await.is_ok()
    }

    async fn handle_control(&self, payload: &[u8]) -> bool {
        match serde_json::from_slice::<ControlMessage>(payload) {
            Ok(message) => match message.kind {
                ControlKind::SessionEnd => {
                    info!(
                        "remote ended stream {} ({})",
                        self.stream_id,
                        message.reason.as_deref().unwrap_or("no reason given")
                    );
                    let _ = self.event_tx.send(TransportEvent::RemoteClose).await;
                    false
                }
            },
            Err(e) => {
                warn!("failed to parse control message: {}", e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_follow_the_prefix_scheme() {
        let subjects = StreamSubjects::new("voice", "stream-1");
        assert_eq!(subjects.audio, "voice.audio.stream-1");
        assert_eq!(subjects.synth, "voice.synth.stream-1");
        assert_eq!(subjects.control, "voice.control.stream-1");
    }

    #[test]
    fn test_default_config_points_at_local_nats() {
        let config = NatsTransportConfig::default();
        assert_eq!(config.url, "nats://localhost:4222");
        assert_eq!(config.outbound_capacity, 8);
    }
}
