use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Current conversation state
    pub state: SessionState,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Seconds since start (frozen once the session ends)
    pub duration_secs: f64,

    /// Frames handed to the transport
    pub frames_sent: u64,

    /// Frames dropped because the transport was not ready
    pub frames_dropped: u64,

    /// Reply chunks played to the end
    pub chunks_played: u64,

    /// Reply chunks dropped by barge-in, teardown or a stale token
    pub chunks_discarded: u64,

    /// Reply chunks waiting to be decoded
    pub queued_chunks: u64,

    /// Completed assistant turns (Speaking → Listening)
    pub turns_completed: u64,

    /// Number of transcript segments received
    pub transcript_segments_count: usize,
}

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One line of the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub role: Role,

    pub text: String,

    /// When this segment was committed
    pub timestamp: DateTime<Utc>,
}

impl TranscriptSegment {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
