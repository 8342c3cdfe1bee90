// Integration tests for the websocket transport
//
// A local tokio-tungstenite server plays the assistant.

mod common;

use anyhow::Result;
use base64::Engine;
use common::MockAssistant;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use voice_duplex::audio::AudioFrame;
use voice_duplex::transport::{InboundEvent, OutboundMessage, TransportEvent, TransportSession};

async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Result<TransportEvent> {
    let event = tokio::time::timeout(common::WAIT, rx.recv()).await?;
    Ok(event.expect("transport event stream ended"))
}

#[tokio::test]
async fn test_open_sends_start() -> Result<()> {
    let mut assistant = MockAssistant::spawn().await?;
    let (transport, _events) = TransportSession::open(&assistant.url, 8).await?;

    assert!(transport.is_open());
    assert_eq!(assistant.next_message().await?, json!({"event": "start"}));
    Ok(())
}

#[tokio::test]
async fn test_open_fails_without_server() -> Result<()> {
    let url = common::dead_url().await?;
    assert!(TransportSession::open(&url, 8).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_frames_and_control_messages_in_order() -> Result<()> {
    let mut assistant = MockAssistant::spawn().await?;
    let (transport, _events) = TransportSession::open(&assistant.url, 8).await?;
    assistant.expect_event("start").await?;

    let frame = AudioFrame {
        samples: vec![100; 768],
        sample_rate: 16000,
        sequence: 0,
    };
    assert!(transport.send(&frame));
    assert!(transport.send_control(OutboundMessage::TtsStart));

    let chunk = assistant.next_message().await?;
    assert_eq!(chunk["event"], "audio_chunk");
    let bytes = base64::engine::general_purpose::STANDARD.decode(chunk["data"].as_str().unwrap())?;
    assert_eq!(bytes.len(), 768 * 2);
    assert_eq!(&bytes[..2], &100i16.to_le_bytes());

    assert_eq!(assistant.next_message().await?["event"], "tts_start");
    Ok(())
}

#[tokio::test]
async fn test_inbound_events_are_dispatched_in_order() -> Result<()> {
    let assistant = MockAssistant::spawn().await?;
    let (_transport, mut events) = TransportSession::open(&assistant.url, 8).await?;

    assistant.send(json!({"event": "transcript", "data": "hi"}));
    assistant.send_raw("garbage");
    assistant.send(json!({"event": "unknown_thing"}));
    assistant.send(json!({"event": "response_start"}));

    assert_eq!(
        next_event(&mut events).await?,
        TransportEvent::Message(InboundEvent::Transcript("hi".into()))
    );
    assert_eq!(
        next_event(&mut events).await?,
        TransportEvent::Message(InboundEvent::ResponseStart)
    );
    Ok(())
}

#[tokio::test]
async fn test_peer_close_is_reported() -> Result<()> {
    let assistant = MockAssistant::spawn().await?;
    let (transport, mut events) = TransportSession::open(&assistant.url, 8).await?;

    assistant.close();

    assert!(matches!(next_event(&mut events).await?, TransportEvent::Closed { .. }));
    assert!(!transport.is_open());

    let frame = AudioFrame {
        samples: vec![0; 768],
        sample_rate: 16000,
        sequence: 0,
    };
    assert!(!transport.send(&frame), "frames after close are dropped");
    Ok(())
}

#[tokio::test]
async fn test_full_frame_budget_drops_frames_but_keeps_control() -> Result<()> {
    let mut assistant = MockAssistant::spawn().await?;
    let (transport, _events) = TransportSession::open(&assistant.url, 2).await?;
    assistant.expect_event("start").await?;

    let frame = AudioFrame {
        samples: vec![5; 768],
        sample_rate: 16000,
        sequence: 0,
    };

    // No await in between: the writer cannot drain, so the budget fills
    assert!(transport.send(&frame));
    assert!(transport.send(&frame));
    assert!(!transport.send(&frame), "third frame is over budget");
    assert!(transport.send_control(OutboundMessage::TtsEnd));

    assert_eq!(assistant.next_message().await?["event"], "audio_chunk");
    assert_eq!(assistant.next_message().await?["event"], "audio_chunk");
    assert_eq!(assistant.next_message().await?["event"], "tts_end");

    // Budget frees up once the writer has flushed
    assert!(transport.send(&frame));
    assert_eq!(assistant.next_message().await?["event"], "audio_chunk");
    Ok(())
}

#[tokio::test]
async fn test_close_is_idempotent() -> Result<()> {
    let mut assistant = MockAssistant::spawn().await?;
    let (mut transport, _events) = TransportSession::open(&assistant.url, 8).await?;
    assistant.expect_event("start").await?;

    transport.close().await;
    transport.close().await;

    assert!(!transport.is_open());
    assert!(!transport.send_control(OutboundMessage::TtsEnd));
    assistant.assert_no_event("tts_end", Duration::from_millis(100)).await?;
    Ok(())
}
