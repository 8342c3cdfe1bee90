pub mod audio;
pub mod config;
pub mod http;
pub mod session;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioOutput,
    AudioSink, AudioSource, CancellationToken, FrameEncoder, GainController, PlaybackEngine,
};
pub use config::Config;
pub use http::{create_router, AppState, SessionTemplate};
pub use session::{
    ConversationStateMachine, SessionConfig, SessionNotice, SessionState, SessionStats,
    TranscriptSegment, VoiceSession,
};
pub use transport::{InboundEvent, OutboundMessage, TransportSession};
