use crate::audio::{AudioBackendConfig, AudioSink, AudioSource};
use crate::session::{SessionConfig, VoiceSession};
use std::sync::Arc;
use tokio::sync::RwLock;

/// What a `POST /voice/start` launches
#[derive(Debug, Clone)]
pub struct SessionTemplate {
    /// Base session settings; the id is regenerated for every start
    pub config: SessionConfig,

    /// Where captured audio comes from
    pub source: AudioSource,

    /// Where reply audio goes
    pub sink: AudioSink,

    pub backend: AudioBackendConfig,
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The current (or most recent) voice session
    pub session: Arc<RwLock<Option<Arc<VoiceSession>>>>,

    pub template: Arc<SessionTemplate>,
}

impl AppState {
    pub fn new(template: SessionTemplate) -> Self {
        Self {
            session: Arc::new(RwLock::new(None)),
            template: Arc::new(template),
        }
    }
}
