use super::config::SessionConfig;
use super::state::{Action, ConversationStateMachine, SessionState};
use super::stats::{Role, SessionStats, TranscriptSegment};
use crate::audio::{
    AudioBackend, AudioCaptureEngine, AudioFrame, AudioOutput, CancellationToken, GainController,
    PlaybackEngine, PlaybackSignal, PlaybackTimeline, RenderEvent, ReplyDecoder,
};
use crate::transport::{InboundEvent, OutboundMessage, TransportEvent, TransportSession};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Frames buffered between the capture task and the control loop
const FRAME_CHANNEL_CAPACITY: usize = 32;

const NOTICE_CAPACITY: usize = 256;

/// What a running session reports to its owner
#[derive(Debug, Clone)]
pub enum SessionNotice {
    StateChanged(SessionState),
    /// A committed transcript segment (user speech or a finished reply)
    Transcript(TranscriptSegment),
    /// Incremental reply text
    ResponseText(String),
    /// Error reported by the assistant
    Error(String),
    /// The session ended and everything was torn down
    Closed { reason: Option<String> },
}

enum Command {
    Stop,
}

/// Counters and transcript written by the control loop, read by the handle
#[derive(Default)]
struct SessionShared {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    chunks_played: AtomicU64,
    chunks_discarded: AtomicU64,
    queued_chunks: AtomicU64,
    turns_completed: AtomicU64,
    transcript: Mutex<Vec<TranscriptSegment>>,
    ended_at: Mutex<Option<DateTime<Utc>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running duplex voice session.
///
/// The engines themselves live in a [`SessionContext`] owned by the control
/// loop task; this handle only talks to it through a command channel and
/// reads what it publishes.
pub struct VoiceSession {
    config: SessionConfig,

    /// When the session started
    started_at: DateTime<Utc>,

    shared: Arc<SessionShared>,

    state_rx: watch::Receiver<SessionState>,

    notices: broadcast::Sender<SessionNotice>,

    /// Playback cancellation token shared with the render side
    token: CancellationToken,

    commands: mpsc::Sender<Command>,

    /// Handle for the control loop
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl VoiceSession {
    /// Toggle the session on.
    ///
    /// Capture starts first; if it fails nothing else is attempted. Then the
    /// transport opens and sends `start`, the output device starts pulling
    /// from the playback timeline, and the session enters Listening. Any
    /// failure tears down what was already started and returns the error.
    pub async fn start(
        config: SessionConfig,
        backend: Box<dyn AudioBackend>,
        mut output: Box<dyn AudioOutput>,
    ) -> Result<Self> {
        info!("Starting voice session: {}", config.session_id);

        let gains = GainController::new(&config.gain_config());

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let mut capture = AudioCaptureEngine::new(config.frame_ms, gains.input_param());
        capture
            .start(backend, frame_tx)
            .await
            .context("Audio capture failed to start")?;

        let (mut transport, inbound_rx) =
            match TransportSession::open(&config.assistant_url, config.outbound_buffer).await {
                Ok(opened) => opened,
                Err(e) => {
                    capture.stop().await;
                    return Err(e.context("Failed to open assistant connection"));
                }
            };

        let token = CancellationToken::new();
        let (timeline, render_rx) = PlaybackTimeline::new(
            output.sample_rate(),
            token.clone(),
            gains.output_param(),
            config.flush_fade(),
        );

        if let Err(e) = output.start(Arc::clone(&timeline)) {
            capture.stop().await;
            transport.close().await;
            return Err(e.context(format!("Failed to start audio output ({})", output.name())));
        }

        let decoder = Box::new(ReplyDecoder::new(config.reply_format, config.reply_sample_rate));
        let playback = PlaybackEngine::new(decoder, timeline, token.clone())
            .with_max_scheduled(config.max_scheduled);

        let mut machine = ConversationStateMachine::new();
        machine.open();

        let shared = Arc::new(SessionShared::default());
        let (state_tx, state_rx) = watch::channel(machine.state());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(4);

        let context = SessionContext {
            session_id: config.session_id.clone(),
            capture,
            transport,
            playback,
            gains,
            machine,
            output,
            shared: Arc::clone(&shared),
            state_tx,
            notices: notices.clone(),
            response_text: String::new(),
            tts_announced: false,
        };

        let task = tokio::spawn(context.run(frame_rx, inbound_rx, render_rx, command_rx));

        info!("Voice session {} listening", config.session_id);

        Ok(Self {
            config,
            started_at: Utc::now(),
            shared,
            state_rx,
            notices,
            token,
            commands: command_tx,
            task: tokio::sync::Mutex::new(Some(task)),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// False once the session has been torn down
    pub fn is_active(&self) -> bool {
        self.state() != SessionState::Idle
    }

    /// Watch state changes
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Current playback cancellation token value
    pub fn playback_token(&self) -> u64 {
        self.token.current()
    }

    /// Wait until the session has been torn down (stopped or connection lost)
    pub async fn closed(&self) {
        let mut rx = self.state_rx.clone();
        let _ = rx.wait_for(|state| *state == SessionState::Idle).await;
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        let shared = &self.shared;
        let ended_at = *lock(&shared.ended_at);
        let duration = ended_at.unwrap_or_else(Utc::now) - self.started_at;

        SessionStats {
            session_id: self.config.session_id.clone(),
            state: self.state(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: shared.frames_sent.load(Ordering::SeqCst),
            frames_dropped: shared.frames_dropped.load(Ordering::SeqCst),
            chunks_played: shared.chunks_played.load(Ordering::SeqCst),
            chunks_discarded: shared.chunks_discarded.load(Ordering::SeqCst),
            queued_chunks: shared.queued_chunks.load(Ordering::SeqCst),
            turns_completed: shared.turns_completed.load(Ordering::SeqCst),
            transcript_segments_count: lock(&shared.transcript).len(),
        }
    }

    /// Get all transcript segments committed so far
    pub fn transcript(&self) -> Vec<TranscriptSegment> {
        lock(&self.shared.transcript).clone()
    }

    /// Toggle the session off and wait for teardown. Safe to call twice or
    /// after the connection was lost.
    pub async fn stop(&self) -> Result<SessionStats> {
        info!("Stopping voice session: {}", self.config.session_id);

        // The loop may already have exited on its own
        let _ = self.commands.send(Command::Stop).await;

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            handle.await.context("Session control loop failed")?;
        }

        let stats = self.stats();
        info!(
            "Voice session {} stopped ({} frames sent, {} turns)",
            self.config.session_id, stats.frames_sent, stats.turns_completed
        );
        Ok(stats)
    }
}

/// Everything a live session owns, driven by a single control loop
struct SessionContext {
    session_id: String,
    capture: AudioCaptureEngine,
    transport: TransportSession,
    playback: PlaybackEngine,
    gains: GainController,
    machine: ConversationStateMachine,
    output: Box<dyn AudioOutput>,
    shared: Arc<SessionShared>,
    state_tx: watch::Sender<SessionState>,
    notices: broadcast::Sender<SessionNotice>,
    /// Reply text since the last `response_start`
    response_text: String,
    /// `tts_start` was sent for the current playback cycle
    tts_announced: bool,
}

impl SessionContext {
    async fn run(
        mut self,
        mut frames: mpsc::Receiver<AudioFrame>,
        mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
        mut render: mpsc::UnboundedReceiver<RenderEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        debug!("Control loop started for {}", self.session_id);

        let reason = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Stop) => break Some("stopped".to_string()),
                    None => break Some("session handle dropped".to_string()),
                },
                event = inbound.recv() => match event {
                    Some(TransportEvent::Message(event)) => self.handle_inbound(event),
                    Some(TransportEvent::Closed { reason }) => {
                        break reason.or_else(|| Some("connection closed".to_string()))
                    }
                    None => break Some("connection closed".to_string()),
                },
                Some(event) = render.recv() => {
                    if let Some(signal) = self.playback.on_render_event(event) {
                        self.handle_signal(signal);
                    }
                    self.sync_playback_stats();
                }
                Some(frame) = frames.recv() => self.forward_frame(&frame),
            }
        };

        self.teardown(reason).await;
    }

    fn forward_frame(&self, frame: &AudioFrame) {
        if self.transport.send(frame) {
            self.shared.frames_sent.fetch_add(1, Ordering::SeqCst);
        } else {
            let dropped = self.shared.frames_dropped.fetch_add(1, Ordering::SeqCst);
            if dropped == 0 {
                warn!("Transport not ready, dropping audio frames");
            }
        }
    }

    fn handle_inbound(&mut self, event: InboundEvent) {
        debug!("Inbound {} in {}", event.name(), self.machine.state());

        let actions = self.machine.on_event(&event, self.playback.is_playing());
        for action in actions {
            self.apply(action);
        }
        self.sync_playback_stats();
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Transcript(text) => self.commit_segment(Role::User, text),
            Action::ResponseText(text) => {
                self.response_text.push_str(&text);
                let _ = self.notices.send(SessionNotice::ResponseText(text));
            }
            Action::ResponseDone => {
                let text = std::mem::take(&mut self.response_text);
                if !text.trim().is_empty() {
                    self.commit_segment(Role::Assistant, text);
                }
            }
            Action::BargeIn => {
                self.response_text.clear();
                self.playback.cancel_and_flush();
                self.finish_tts();
            }
            Action::Enqueue(payload) => {
                if let Some(signal) = self.playback.enqueue(payload) {
                    self.handle_signal(signal);
                }
            }
            Action::EnterSpeaking => {
                self.gains.duck_input();
                self.gains.fade_in_output();
                self.publish_state();
            }
            Action::LeaveSpeaking => {
                self.gains.restore_input();
                self.gains.fade_out_output();
                self.shared
                    .turns_completed
                    .store(self.machine.turns_completed(), Ordering::SeqCst);
                self.publish_state();
            }
            Action::Error(message) => {
                warn!("Assistant reported an error: {}", message);
                let _ = self.notices.send(SessionNotice::Error(message));
            }
        }
    }

    fn handle_signal(&mut self, signal: PlaybackSignal) {
        match signal {
            PlaybackSignal::Started => {
                if !self.tts_announced {
                    self.tts_announced = true;
                    self.transport.send_control(OutboundMessage::TtsStart);
                }
            }
            PlaybackSignal::Exhausted => {
                self.finish_tts();
                for action in self.machine.on_playback_exhausted() {
                    self.apply(action);
                }
            }
        }
    }

    fn finish_tts(&mut self) {
        if self.tts_announced {
            self.tts_announced = false;
            self.transport.send_control(OutboundMessage::TtsEnd);
        }
    }

    fn commit_segment(&self, role: Role, text: String) {
        let segment = TranscriptSegment::new(role, text);
        info!("Transcript [{:?}]: {}", role, segment.text);
        lock(&self.shared.transcript).push(segment.clone());
        let _ = self.notices.send(SessionNotice::Transcript(segment));
    }

    fn publish_state(&self) {
        let state = self.machine.state();
        if self.state_tx.send_replace(state) != state {
            info!("Session {} -> {}", self.session_id, state);
            let _ = self.notices.send(SessionNotice::StateChanged(state));
        }
    }

    fn sync_playback_stats(&self) {
        let stats = self.playback.stats();
        self.shared.chunks_played.store(stats.chunks_played, Ordering::SeqCst);
        self.shared.chunks_discarded.store(stats.chunks_discarded, Ordering::SeqCst);
        self.shared
            .queued_chunks
            .store(self.playback.queue_len() as u64, Ordering::SeqCst);
    }

    async fn teardown(mut self, reason: Option<String>) {
        info!(
            "Tearing down voice session {} ({})",
            self.session_id,
            reason.as_deref().unwrap_or("unknown")
        );

        self.capture.stop().await;
        self.playback.cancel_and_flush();
        self.tts_announced = false;
        self.gains.release();
        self.transport.close().await;
        self.output.stop();
        self.response_text.clear();

        self.sync_playback_stats();
        self.machine.reset();
        *lock(&self.shared.ended_at) = Some(Utc::now());
        self.publish_state();

        let _ = self.notices.send(SessionNotice::Closed { reason });
    }
}
