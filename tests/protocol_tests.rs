// Tests for the assistant wire protocol
//
// Outbound messages must serialize with an `event` discriminator; inbound
// parsing must be closed: anything unknown or malformed is dropped.

use base64::Engine;
use voice_duplex::audio::AudioFrame;
use voice_duplex::transport::{InboundEvent, OutboundMessage};

#[test]
fn test_control_messages_serialization() {
    assert_eq!(OutboundMessage::Start.to_json().unwrap(), r#"{"event":"start"}"#);
    assert_eq!(OutboundMessage::TtsStart.to_json().unwrap(), r#"{"event":"tts_start"}"#);
    assert_eq!(OutboundMessage::TtsEnd.to_json().unwrap(), r#"{"event":"tts_end"}"#);
}

#[test]
fn test_audio_chunk_carries_pcm16_le() {
    let frame = AudioFrame {
        samples: vec![1, -2, 32767],
        sample_rate: 16000,
        sequence: 7,
    };

    let msg = OutboundMessage::audio_chunk(&frame.to_pcm_bytes());
    let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

    assert_eq!(json["event"], "audio_chunk");
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(json["data"].as_str().unwrap())
        .unwrap();
    assert_eq!(bytes, vec![0x01, 0x00, 0xFE, 0xFF, 0xFF, 0x7F]);
}

#[test]
fn test_outbound_deserialization() {
    let msg: OutboundMessage =
        serde_json::from_str(r#"{"event":"audio_chunk","data":"AAA="}"#).unwrap();
    assert_eq!(
        msg,
        OutboundMessage::AudioChunk {
            data: "AAA=".to_string()
        }
    );
}

#[test]
fn test_inbound_events_parse() {
    let cases = [
        (r#"{"event":"transcript","data":"hello"}"#, InboundEvent::Transcript("hello".into())),
        (r#"{"event":"response_start"}"#, InboundEvent::ResponseStart),
        (r#"{"event":"response_text","data":"Hi"}"#, InboundEvent::ResponseText("Hi".into())),
        (r#"{"event":"response_done"}"#, InboundEvent::ResponseDone),
        (r#"{"event":"tts_audio","data":"UklGRg=="}"#, InboundEvent::TtsAudio("UklGRg==".into())),
        (r#"{"event":"tts_start"}"#, InboundEvent::TtsStart),
        (r#"{"event":"tts_end"}"#, InboundEvent::TtsEnd),
    ];

    for (raw, expected) in cases {
        assert_eq!(InboundEvent::parse(raw), Some(expected), "parsing {}", raw);
    }
}

#[test]
fn test_error_uses_data_or_message() {
    assert_eq!(
        InboundEvent::parse(r#"{"event":"error","data":"quota exceeded"}"#),
        Some(InboundEvent::Error("quota exceeded".into()))
    );
    assert_eq!(
        InboundEvent::parse(r#"{"event":"error","message":"bad request"}"#),
        Some(InboundEvent::Error("bad request".into()))
    );
    assert_eq!(
        InboundEvent::parse(r#"{"event":"error"}"#),
        Some(InboundEvent::Error("unknown error".into()))
    );
}

#[test]
fn test_extra_fields_are_ignored() {
    assert_eq!(
        InboundEvent::parse(r#"{"event":"response_start","id":42,"meta":{"x":1}}"#),
        Some(InboundEvent::ResponseStart)
    );
}

#[test]
fn test_malformed_messages_are_dropped() {
    for raw in [
        "",
        "not json",
        "[]",
        r#"{"data":"no event"}"#,
        r#"{"event":"something_new","data":"x"}"#,
        r#"{"event":"tts_audio"}"#,
        r#"{"event":"transcript","data":null}"#,
        r#"{"event":42}"#,
    ] {
        assert_eq!(InboundEvent::parse(raw), None, "parsing {:?}", raw);
    }
}
