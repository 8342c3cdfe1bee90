//! Render-side playback timeline.
//!
//! Decoded reply buffers are appended here by the control loop and pulled by
//! the output device's render callback. Consecutive buffers are played back
//! to back inside the same callback, so chaining is gapless without any
//! wall-clock scheduling. The callback only ever `try_lock`s the timeline and
//! renders silence if the control loop holds it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use super::gain::{GainFollower, GainParam};

/// Fade applied to an in-flight buffer when playback is flushed
pub const FLUSH_FADE: Duration = Duration::from_millis(15);

/// Monotonic counter that invalidates queued and in-flight playback.
///
/// Cloning shares the counter. Work tagged with an older value must be
/// discarded before it produces audible output.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicU64>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.current() == token
    }

    /// Invalidate everything tagged with the current value; returns the new value
    pub fn cancel(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// A decoded buffer at the output rate, tagged with the token it was queued under
#[derive(Debug, Clone)]
pub struct ScheduledBuffer {
    pub id: u64,
    pub token: u64,
    pub samples: Vec<f32>,
}

/// Notifications from the render side, delivered to the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent {
    /// First sample of the buffer was rendered
    Started { id: u64 },
    /// Last sample of the buffer was rendered
    Finished { id: u64 },
    /// Buffer was dropped without (fully) playing
    Discarded { id: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Fade {
    start: usize,
    len: usize,
}

struct TimelineState {
    queue: VecDeque<ScheduledBuffer>,
    /// Read position inside the front buffer
    cursor: usize,
    front_started: bool,
    /// Fade-out applied to the front buffer after a flush
    fade: Option<Fade>,
    output_gain: GainFollower,
    frames_rendered: u64,
}

pub struct PlaybackTimeline {
    state: Mutex<TimelineState>,
    token: CancellationToken,
    sample_rate: u32,
    flush_fade_len: usize,
    events: mpsc::UnboundedSender<RenderEvent>,
}

impl PlaybackTimeline {
    pub fn new(
        sample_rate: u32,
        token: CancellationToken,
        output_gain: GainParam,
        flush_fade: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RenderEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let flush_fade_len =
            ((sample_rate as f64 * flush_fade.as_secs_f64()).round() as usize).max(1);

        let timeline = Arc::new(Self {
            state: Mutex::new(TimelineState {
                queue: VecDeque::new(),
                cursor: 0,
                front_started: false,
                fade: None,
                output_gain: output_gain.follower(),
                frames_rendered: 0,
            }),
            token,
            sample_rate,
            flush_fade_len,
            events,
        });

        (timeline, rx)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn lock(&self) -> MutexGuard<'_, TimelineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a buffer; it starts as soon as everything before it has played
    pub fn schedule(&self, buffer: ScheduledBuffer) {
        self.lock().queue.push_back(buffer);
    }

    /// Buffers waiting or playing
    pub fn scheduled_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Samples rendered since creation
    pub fn frames_rendered(&self) -> u64 {
        self.lock().frames_rendered
    }

    /// Drop every buffer that has not started and fade out the one in flight
    pub fn flush(&self) {
        let mut st = self.lock();
        let keep_front = st.front_started;

        let dropped: Vec<u64> = st
            .queue
            .iter()
            .skip(usize::from(keep_front))
            .map(|b| b.id)
            .collect();
        st.queue.truncate(usize::from(keep_front));
        if !keep_front {
            st.cursor = 0;
            st.fade = None;
        }

        if keep_front {
            self.begin_fade(&mut st);
        }

        for id in dropped {
            let _ = self.events.send(RenderEvent::Discarded { id });
        }
    }

    fn begin_fade(&self, st: &mut TimelineState) {
        if st.fade.is_some() {
            return;
        }
        let cursor = st.cursor;
        if let Some(front) = st.queue.front_mut() {
            let end = (cursor + self.flush_fade_len).min(front.samples.len());
            front.samples.truncate(end);
            st.fade = Some(Fade {
                start: cursor,
                len: end - cursor,
            });
        }
    }

    /// Fill `out` with the next samples. Called from the real-time render callback.
    pub fn render(&self, out: &mut [f32]) {
        out.iter_mut().for_each(|s| *s = 0.0);

        let Ok(mut st) = self.state.try_lock() else {
            return;
        };

        let current = self.token.current();
        let mut written = 0;

        while written < out.len() {
            let Some(front) = st.queue.front() else {
                break;
            };
            let (id, token, len) = (front.id, front.token, front.samples.len());

            if !st.front_started {
                if token != current {
                    st.queue.pop_front();
                    st.cursor = 0;
                    let _ = self.events.send(RenderEvent::Discarded { id });
                    continue;
                }
                st.front_started = true;
                let _ = self.events.send(RenderEvent::Started { id });
            } else if token != current && st.fade.is_none() {
                // Cancelled mid-buffer before the control loop flushed
                self.begin_fade(&mut st);
                continue;
            }

            let cursor = st.cursor;
            let n = (len - cursor).min(out.len() - written);
            let fade = st.fade;
            if let Some(front) = st.queue.front() {
                for i in 0..n {
                    let pos = cursor + i;
                    let mut sample = front.samples[pos];
                    if let Some(fade) = fade {
                        let remaining = (fade.start + fade.len).saturating_sub(pos);
                        sample *= remaining as f32 / fade.len.max(1) as f32;
                    }
                    out[written + i] = sample;
                }
            }

            st.cursor += n;
            written += n;

            if st.cursor >= len {
                st.queue.pop_front();
                st.cursor = 0;
                st.front_started = false;
                let faded = st.fade.take().is_some();
                let event = if faded {
                    RenderEvent::Discarded { id }
                } else {
                    RenderEvent::Finished { id }
                };
                let _ = self.events.send(event);
            }
        }

        let sample_rate = self.sample_rate;
        st.output_gain.apply(out, sample_rate);
        st.frames_rendered += out.len() as u64;
    }
}
