use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::decode::ReplyFormat;
use crate::audio::encoder::DEFAULT_FRAME_MS;
use crate::audio::gain::{GainConfig, DEFAULT_DUCK_LEVEL};
use crate::audio::playback::DEFAULT_MAX_SCHEDULED;
use crate::audio::timeline::FLUSH_FADE;
use crate::transport::DEFAULT_OUTBOUND_BUFFER;

/// Configuration for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "voice-3f2a...")
    pub session_id: String,

    /// Assistant websocket URL
    pub assistant_url: String,

    /// Outbound messages buffered before frames are dropped
    pub outbound_buffer: usize,

    /// Audio per outbound frame
    pub frame_ms: u32,

    /// How `tts_audio` payloads are encoded
    pub reply_format: ReplyFormat,

    /// Sample rate of raw `pcm16` replies
    pub reply_sample_rate: u32,

    /// Microphone gain while the assistant speaks (0.0 to 1.0)
    pub duck_level: f32,

    pub duck_time_constant_ms: u64,
    pub fade_time_constant_ms: u64,

    /// Fade applied to the playing buffer on barge-in
    pub flush_fade_ms: u64,

    /// Reply buffers handed to the output ahead of the play position
    pub max_scheduled: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let gain = GainConfig::default();
        Self {
            session_id: format!("voice-{}", uuid::Uuid::new_v4()),
            assistant_url: "ws://localhost:8765".to_string(),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            frame_ms: DEFAULT_FRAME_MS,
            reply_format: ReplyFormat::default(),
            reply_sample_rate: 24_000,
            duck_level: DEFAULT_DUCK_LEVEL,
            duck_time_constant_ms: gain.duck_time_constant.as_millis() as u64,
            fade_time_constant_ms: gain.fade_time_constant.as_millis() as u64,
            flush_fade_ms: FLUSH_FADE.as_millis() as u64,
            max_scheduled: DEFAULT_MAX_SCHEDULED,
        }
    }
}

impl SessionConfig {
    pub fn gain_config(&self) -> GainConfig {
        GainConfig {
            duck_level: self.duck_level,
            duck_time_constant: Duration::from_millis(self.duck_time_constant_ms),
            fade_time_constant: Duration::from_millis(self.fade_time_constant_ms),
        }
    }

    pub fn flush_fade(&self) -> Duration {
        Duration::from_millis(self.flush_fade_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_audio_constants() {
        let config = SessionConfig::default();
        assert!(config.session_id.starts_with("voice-"));
        assert_eq!(config.frame_ms, 48);
        assert_eq!(config.duck_time_constant_ms, 50);
        assert_eq!(config.fade_time_constant_ms, 20);
        assert_eq!(config.flush_fade(), Duration::from_millis(15));
        assert_eq!(config.gain_config().duck_level, 0.2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"assistant_url": "ws://example:9000", "duck_level": 0.5}"#)
                .unwrap();
        assert_eq!(config.assistant_url, "ws://example:9000");
        assert_eq!(config.duck_level, 0.5);
        assert_eq!(config.max_scheduled, DEFAULT_MAX_SCHEDULED);
    }
}
