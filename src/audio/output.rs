use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use super::timeline::PlaybackTimeline;

/// Output device that pulls rendered audio from a [`PlaybackTimeline`]
pub trait AudioOutput: Send {
    /// Rate the device renders at; the timeline is built for this rate
    fn sample_rate(&self) -> u32;

    /// Begin pulling from the timeline
    fn start(&mut self, timeline: Arc<PlaybackTimeline>) -> Result<()>;

    /// Stop pulling and release the device
    fn stop(&mut self);

    fn name(&self) -> &str;
}

/// Audio output sink type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSink {
    /// Default sound card (requires the `device` feature)
    Speaker,
    /// Render on a timer and discard (headless runs)
    Null { sample_rate: u32 },
}

pub fn create_output(sink: &AudioSink) -> Result<Box<dyn AudioOutput>> {
    match sink {
        AudioSink::Speaker => {
            #[cfg(feature = "device")]
            {
                Ok(Box::new(super::device::DeviceOutput::open_default()?))
            }

            #[cfg(not(feature = "device"))]
            {
                anyhow::bail!("Speaker output requires the `device` feature")
            }
        }
        AudioSink::Null { sample_rate } => Ok(Box::new(NullOutput::new(*sample_rate))),
    }
}

/// Consumes the timeline in real time without a sound card
pub struct NullOutput {
    sample_rate: u32,
    period: Duration,
    running: Arc<AtomicBool>,
    audible_samples: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl NullOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            period: Duration::from_millis(10),
            running: Arc::new(AtomicBool::new(false)),
            audible_samples: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Counter of non-silent samples rendered so far
    pub fn audible_samples(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.audible_samples)
    }
}

impl AudioOutput for NullOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, timeline: Arc<PlaybackTimeline>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let block_len =
            ((self.sample_rate as u128 * self.period.as_millis()) / 1000).max(1) as usize;
        let period = self.period;
        let running = Arc::clone(&self.running);
        let audible = Arc::clone(&self.audible_samples);

        info!("Null output started ({}Hz)", self.sample_rate);

        self.task = Some(tokio::spawn(async move {
            let mut block = vec![0.0f32; block_len];
            let mut ticker = tokio::time::interval(period);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                timeline.render(&mut block);
                let loud = block.iter().filter(|s| s.abs() > 1e-6).count();
                audible.fetch_add(loud as u64, Ordering::Relaxed);
            }
        }));

        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn name(&self) -> &str {
        "null"
    }
}

impl Drop for NullOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
