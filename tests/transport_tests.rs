use base64::Engine;
use buildify_voice::transport::messages::{
    decode_pcm, encode_pcm, AudioFrameMessage, ControlKind, ControlMessage, SynthAudioMessage,
};
use buildify_voice::{AudioFrame, OutboundQueue, ShutdownLink, TransportHandle};
use tokio::sync::mpsc;

#[test]
fn test_audio_frame_serialization() {
    let msg = AudioFrameMessage {
        stream_id: "stream-test".to_string(),
        sequence: 0,
        pcm: base64::engine::general_purpose::STANDARD.encode([0u8; 100]),
        sample_rate: 16000,
        channels: 1,
        timestamp: "2026-08-26T14:30:00Z".to_string(),
        final_frame: false,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("stream-test"));
    assert!(json.contains("16000"));
    assert!(json.contains("\"final\":false"));
    assert!(json.contains("\"sequence\":0"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.stream_id, "stream-test");
    assert_eq!(deserialized.sample_rate, 16000);
    assert_eq!(deserialized.channels, 1);
    assert_eq!(deserialized.sequence, 0);
    assert!(!deserialized.final_frame);
}

#[test]
fn test_audio_frame_final_marker() {
    let msg = AudioFrameMessage {
        stream_id: "stream-test".to_string(),
        sequence: 10,
        pcm: String::new(), // Empty for final marker
        sample_rate: 16000,
        channels: 1,
        timestamp: "2026-08-26T14:30:00Z".to_string(),
        final_frame: true,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"final\":true"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert!(deserialized.final_frame);
    assert!(deserialized.pcm.is_empty());
    assert_eq!(deserialized.sequence, 10);
}

#[test]
fn test_synth_audio_deserialization() {
    let json = r#"{
        "stream_id": "stream-test",
        "sequence": 3,
        "pcm": "AAAAAA==",
        "sample_rate": 24000,
        "timestamp": "2026-08-26T14:30:05Z"
    }"#;

    let msg: SynthAudioMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.stream_id, "stream-test");
    assert_eq!(msg.sequence, 3);
    assert_eq!(msg.sample_rate, 24000);

    let samples = decode_pcm(&msg.pcm).unwrap();
    assert_eq!(samples, vec![0.0, 0.0]);
}

#[test]
fn test_control_session_end_deserialization() {
    let json = r#"{
        "stream_id": "stream-test",
        "type": "session_end",
        "reason": "conversation complete"
    }"#;

    let msg: ControlMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.stream_id, "stream-test");
    assert_eq!(msg.kind, ControlKind::SessionEnd);
    assert_eq!(msg.reason, Some("conversation complete".to_string()));
}

#[test]
fn test_control_without_reason() {
    let json = r#"{
        "stream_id": "stream-test",
        "type": "session_end"
    }"#;

    let msg: ControlMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.kind, ControlKind::SessionEnd);
    assert_eq!(msg.reason, None);
}

#[test]
fn test_pcm_survives_the_message_envelope() {
    let original = vec![0.25f32, -0.25, 0.75, -0.75];

    let msg = AudioFrameMessage {
        stream_id: "stream-test".to_string(),
        sequence: 0,
        pcm: encode_pcm(&original),
        sample_rate: 16000,
        channels: 1,
        timestamp: "2026-08-26T14:30:00Z".to_string(),
        final_frame: false,
    };

    let json = serde_json::to_string(&msg).unwrap();
    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    let decoded = decode_pcm(&deserialized.pcm).unwrap();

    assert_eq!(decoded.len(), original.len());
    for (a, b) in original.iter().zip(&decoded) {
        assert!((a - b).abs() < 1e-4);
    }
}

#[tokio::test]
async fn test_send_audio_is_lossy_instead_of_blocking() {
    let outbound = OutboundQueue::new(8);
    let (_event_tx, event_rx) = mpsc::channel(4);
    let (link, listener) = ShutdownLink::new();
    let mut handle = TransportHandle::new(outbound.clone(), event_rx, link);
    tokio::spawn(async move {
        let _ = listener.signal.await;
        let _ = listener.done.send(());
    });

    // Nothing drains the queue, so pushes past capacity discard the oldest
    for i in 0..12u64 {
        handle.send_audio(AudioFrame {
            samples: vec![0.0; 16],
            sample_rate: 16000,
            timestamp_ms: i * 256,
        });
    }
    assert_eq!(handle.dropped_frames(), 4);
    assert_eq!(outbound.len(), 8);
    let oldest_survivor = outbound.try_pop().unwrap();
    assert_eq!(oldest_survivor.timestamp_ms, 4 * 256);

    // Close discards what is still queued and is safe to repeat
    handle.close().await;
    handle.close().await;
    assert!(outbound.try_pop().is_none());
    assert!(handle.next_event().await.is_none());
}
