use anyhow::Result;
use serde::Deserialize;

use crate::audio::decode::ReplyFormat;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AssistantConfig {
    /// Websocket URL of the assistant
    pub url: String,
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_outbound_buffer() -> usize {
    crate::transport::DEFAULT_OUTBOUND_BUFFER
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub frame_ms: u32,
    /// Render rate when no sound card is used
    pub output_sample_rate: u32,
    pub reply_format: ReplyFormat,
    pub reply_sample_rate: u32,
    pub duck_level: f32,
    pub duck_time_constant_ms: u64,
    pub fade_time_constant_ms: u64,
    pub flush_fade_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            frame_ms: session.frame_ms,
            output_sample_rate: 48_000,
            reply_format: session.reply_format,
            reply_sample_rate: session.reply_sample_rate,
            duck_level: session.duck_level,
            duck_time_constant_ms: session.duck_time_constant_ms,
            fade_time_constant_ms: session.fade_time_constant_ms,
            flush_fade_ms: session.flush_fade_ms,
        }
    }
}

impl Config {
    /// Load from a config file, then apply `VOICE_DUPLEX__SECTION__KEY`
    /// environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("VOICE_DUPLEX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Session settings derived from this config
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            assistant_url: self.assistant.url.clone(),
            outbound_buffer: self.assistant.outbound_buffer,
            frame_ms: self.audio.frame_ms,
            reply_format: self.audio.reply_format,
            reply_sample_rate: self.audio.reply_sample_rate,
            duck_level: self.audio.duck_level,
            duck_time_constant_ms: self.audio.duck_time_constant_ms,
            fade_time_constant_ms: self.audio.fade_time_constant_ms,
            flush_fade_ms: self.audio.flush_fade_ms,
            ..SessionConfig::default()
        }
    }
}
