use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::decode::PayloadDecoder;
use super::resample::resample;
use super::timeline::{CancellationToken, PlaybackTimeline, RenderEvent, ScheduledBuffer};

/// Buffers handed to the timeline ahead of the render position
pub const DEFAULT_MAX_SCHEDULED: usize = 2;

/// One received audio payload waiting to be decoded
#[derive(Debug, Clone)]
pub struct PlaybackQueueEntry {
    pub payload: String,
    /// Cancellation token value when the entry was queued
    pub token: u64,
}

/// Playback milestones reported to the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackSignal {
    /// The first buffer of a drain cycle became audible
    Started,
    /// Queue empty and nothing left on the timeline
    Exhausted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub chunks_played: u64,
    pub chunks_discarded: u64,
    pub decode_failures: u64,
}

/// Turns arriving reply payloads into gapless output.
///
/// Entries are decoded in order and handed to the [`PlaybackTimeline`] at
/// most `max_scheduled` at a time, so the next buffer is always queued
/// behind the one playing. Every entry carries the token it was queued
/// under and is dropped if the token moved on before it becomes audible.
pub struct PlaybackEngine {
    queue: VecDeque<PlaybackQueueEntry>,
    token: CancellationToken,
    decoder: Box<dyn PayloadDecoder>,
    timeline: Arc<PlaybackTimeline>,
    max_scheduled: usize,
    /// Buffer ids on the timeline that belong to the current drain cycle
    in_flight: HashSet<u64>,
    next_id: u64,
    /// A drain cycle is running (something queued since the last completion)
    active: bool,
    started_announced: bool,
    stats: PlaybackStats,
}

impl PlaybackEngine {
    pub fn new(
        decoder: Box<dyn PayloadDecoder>,
        timeline: Arc<PlaybackTimeline>,
        token: CancellationToken,
    ) -> Self {
        Self {
            queue: VecDeque::new(),
            token,
            decoder,
            timeline,
            max_scheduled: DEFAULT_MAX_SCHEDULED,
            in_flight: HashSet::new(),
            next_id: 0,
            active: false,
            started_announced: false,
            stats: PlaybackStats::default(),
        }
    }

    pub fn with_max_scheduled(mut self, max_scheduled: usize) -> Self {
        self.max_scheduled = max_scheduled.max(1);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn current_token(&self) -> u64 {
        self.token.current()
    }

    /// Entries not yet decoded
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Something is queued or still on the timeline
    pub fn is_playing(&self) -> bool {
        self.active
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    /// Queue a payload under the current token and start draining if idle
    pub fn enqueue(&mut self, payload: String) -> Option<PlaybackSignal> {
        self.queue.push_back(PlaybackQueueEntry {
            payload,
            token: self.token.current(),
        });

        if !self.active {
            debug!("Playback cycle started");
            self.active = true;
            self.started_announced = false;
        }

        self.drain_next();
        self.check_exhausted()
    }

    /// Decode queued entries until the timeline holds `max_scheduled` buffers
    pub fn drain_next(&mut self) {
        while self.in_flight.len() < self.max_scheduled {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };

            if !self.token.is_current(entry.token) {
                debug!("Dropping stale audio chunk (token {})", entry.token);
                self.stats.chunks_discarded += 1;
                continue;
            }

            let audio = match self.decoder.decode(&entry.payload) {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("Skipping undecodable audio chunk: {:#}", e);
                    self.stats.decode_failures += 1;
                    continue;
                }
            };

            // Decoding may have raced a barge-in
            if !self.token.is_current(entry.token) {
                self.stats.chunks_discarded += 1;
                continue;
            }

            let samples = resample(&audio.samples, audio.sample_rate, self.timeline.sample_rate());
            if samples.is_empty() {
                continue;
            }

            let id = self.next_id;
            self.next_id += 1;
            self.in_flight.insert(id);
            self.timeline.schedule(ScheduledBuffer {
                id,
                token: entry.token,
                samples,
            });
        }
    }

    /// React to a notification from the render side
    pub fn on_render_event(&mut self, event: RenderEvent) -> Option<PlaybackSignal> {
        match event {
            RenderEvent::Started { id } => {
                if self.in_flight.contains(&id) && !self.started_announced {
                    self.started_announced = true;
                    return Some(PlaybackSignal::Started);
                }
                None
            }
            RenderEvent::Finished { id } => {
                if !self.in_flight.remove(&id) {
                    return None;
                }
                self.stats.chunks_played += 1;
                self.drain_next();
                self.check_exhausted()
            }
            RenderEvent::Discarded { id } => {
                if !self.in_flight.remove(&id) {
                    return None;
                }
                self.stats.chunks_discarded += 1;
                self.drain_next();
                self.check_exhausted()
            }
        }
    }

    fn check_exhausted(&mut self) -> Option<PlaybackSignal> {
        if self.active && self.queue.is_empty() && self.in_flight.is_empty() {
            self.active = false;
            debug!("Playback queue exhausted");
            return Some(PlaybackSignal::Exhausted);
        }
        None
    }

    /// Invalidate everything queued or playing.
    ///
    /// Returns true if a drain cycle was interrupted. No completion signal is
    /// emitted for the interrupted cycle.
    pub fn cancel_and_flush(&mut self) -> bool {
        let token = self.token.cancel();
        let dropped = self.queue.len() + self.in_flight.len();

        self.stats.chunks_discarded += dropped as u64;
        self.queue.clear();
        self.in_flight.clear();
        self.timeline.flush();

        let was_active = self.active;
        self.active = false;
        self.started_announced = false;

        if was_active {
            info!("Playback cancelled (token {}, {} chunks dropped)", token, dropped);
        }
        was_active
    }
}
