//! Voice session management
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Audio capture, framing and streaming to the assistant
//! - Reply playback with barge-in
//! - Microphone ducking and output fades
//! - The idle/listening/speaking state machine
//! - Transcript collection and session statistics

mod config;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use session::{SessionNotice, VoiceSession};
pub use state::{Action, ConversationStateMachine, SessionState};
pub use stats::{Role, SessionStats, TranscriptSegment};
