use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::transport::InboundEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
    Speaking,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
        };
        f.write_str(s)
    }
}

/// Side effects the control loop must carry out, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Record a user transcript segment
    Transcript(String),
    /// Append to the in-progress assistant reply
    ResponseText(String),
    /// Commit the assistant reply text
    ResponseDone,
    /// Invalidate queued and playing audio, drop the partial reply
    BargeIn,
    /// Queue reply audio for playback
    Enqueue(String),
    /// Duck the microphone and fade the output in
    EnterSpeaking,
    /// Undo the duck and fade the output out
    LeaveSpeaking,
    /// Surface an assistant error
    Error(String),
}

/// Turn-taking state.
///
/// Pure: it only decides transitions and reports the actions that go with
/// them. It never fails; anything that does not apply to the current state
/// is ignored.
#[derive(Debug, Default)]
pub struct ConversationStateMachine {
    state: SessionState,
    turns_completed: u64,
}

impl ConversationStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Speaking → Listening transitions so far
    pub fn turns_completed(&self) -> u64 {
        self.turns_completed
    }

    /// Transport opened. Returns false unless the machine was idle.
    pub fn open(&mut self) -> bool {
        if self.state != SessionState::Idle {
            return false;
        }
        self.state = SessionState::Listening;
        true
    }

    /// Transport closed or session stopped. Returns true if the state changed.
    pub fn reset(&mut self) -> bool {
        let changed = self.state != SessionState::Idle;
        self.state = SessionState::Idle;
        changed
    }

    /// Handle an inbound event. `playback_active` tells whether reply audio
    /// is still queued or playing.
    pub fn on_event(&mut self, event: &InboundEvent, playback_active: bool) -> Vec<Action> {
        if self.state == SessionState::Idle {
            debug!("Ignoring {} while idle", event.name());
            return Vec::new();
        }

        match event {
            InboundEvent::Transcript(text) => vec![Action::Transcript(text.clone())],
            InboundEvent::ResponseText(text) => vec![Action::ResponseText(text.clone())],
            InboundEvent::ResponseDone => vec![Action::ResponseDone],
            InboundEvent::Error(message) => vec![Action::Error(message.clone())],
            InboundEvent::ResponseStart => {
                let mut actions = vec![Action::BargeIn];
                if self.state == SessionState::Speaking {
                    actions.extend(self.leave_speaking());
                }
                actions
            }
            InboundEvent::TtsAudio(payload) => {
                let mut actions = Vec::with_capacity(2);
                if self.state == SessionState::Listening {
                    self.state = SessionState::Speaking;
                    actions.push(Action::EnterSpeaking);
                }
                actions.push(Action::Enqueue(payload.clone()));
                actions
            }
            InboundEvent::TtsEnd => {
                if self.state == SessionState::Speaking && !playback_active {
                    self.leave_speaking()
                } else {
                    // Queue exhaustion finishes the turn
                    Vec::new()
                }
            }
            InboundEvent::TtsStart => Vec::new(),
        }
    }

    /// Playback queue drained with nothing left on the timeline
    pub fn on_playback_exhausted(&mut self) -> Vec<Action> {
        if self.state == SessionState::Speaking {
            self.leave_speaking()
        } else {
            Vec::new()
        }
    }

    fn leave_speaking(&mut self) -> Vec<Action> {
        self.state = SessionState::Listening;
        self.turns_completed += 1;
        vec![Action::LeaveSpeaking]
    }
}
