use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message sent to the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Session opened, audio follows
    Start,
    /// One captured frame
    AudioChunk {
        /// Base64-encoded PCM16 little-endian mono at 16kHz
        data: String,
    },
    /// A spoken reply became audible
    TtsStart,
    /// A spoken reply finished playing (or was cut off)
    TtsEnd,
}

impl OutboundMessage {
    pub fn audio_chunk(pcm_bytes: &[u8]) -> Self {
        use base64::Engine;
        Self::AudioChunk {
            data: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Message received from the assistant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Recognised user speech
    Transcript(String),
    /// The assistant began a new reply
    ResponseStart,
    /// Incremental reply text
    ResponseText(String),
    ResponseDone,
    /// Encoded reply audio (base64)
    TtsAudio(String),
    TtsStart,
    TtsEnd,
    Error(String),
}

#[derive(Debug, Deserialize)]
struct RawInbound {
    event: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

impl InboundEvent {
    /// Parse a text frame. Anything malformed or unknown yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let msg: RawInbound = serde_json::from_str(raw).ok()?;
        let data = text_of(msg.data.as_ref());

        let event = match msg.event.as_str() {
            "transcript" => Self::Transcript(data?),
            "response_start" => Self::ResponseStart,
            "response_text" => Self::ResponseText(data?),
            "response_done" => Self::ResponseDone,
            "tts_audio" => Self::TtsAudio(data?),
            "tts_start" => Self::TtsStart,
            "tts_end" => Self::TtsEnd,
            "error" => Self::Error(
                data.or_else(|| text_of(msg.message.as_ref()))
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            _ => return None,
        };

        Some(event)
    }

    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transcript(_) => "transcript",
            Self::ResponseStart => "response_start",
            Self::ResponseText(_) => "response_text",
            Self::ResponseDone => "response_done",
            Self::TtsAudio(_) => "tts_audio",
            Self::TtsStart => "tts_start",
            Self::TtsEnd => "tts_end",
            Self::Error(_) => "error",
        }
    }
}
