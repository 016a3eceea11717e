use base64::Engine;
use serde::{Deserialize, Serialize};

/// Captured audio frame published to the voice service
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub stream_id: String,
    pub sequence: u64,
    pub pcm: String,  // Base64-encoded 16-bit LE PCM
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String,  // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Synthesized audio received from the voice service
#[derive(Debug, Serialize, Deserialize)]
pub struct SynthAudioMessage {
    pub stream_id: String,
    pub sequence: u64,
    pub pcm: String,
    pub sample_rate: u32,
    pub timestamp: String,
}

/// Control signal received from the voice service
#[derive(Debug, Serialize, Deserialize)]
pub struct ControlMessage {
    pub stream_id: String,
    #[serde(rename = "type")]
    pub kind: ControlKind,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// The service has ended the session from its side
    SessionEnd,
}

/// Encode mono f32 samples as base64 16-bit little-endian PCM
pub fn encode_pcm(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(&bytes)
}

/// Decode base64 16-bit little-endian PCM into f32 samples
pub fn decode_pcm(pcm: &str) -> Result<Vec<f32>, base64::DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(pcm)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect())
}
