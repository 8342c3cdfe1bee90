use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, CaptureBlock};
use super::encoder::{AudioFrame, FrameEncoder};
use super::gain::{GainFollower, GainParam};
use super::resample::{downmix_to_mono, resample_to_target};

/// Microphone → frames.
///
/// The capture graph is `input backend → input gain → resampler → encoder`.
/// It has no handle on any output device, so captured audio can never be
/// routed to the speakers.
pub struct AudioCaptureEngine {
    frame_ms: u32,
    input_gain: GainParam,
    backend: Option<Box<dyn AudioBackend>>,
    task: Option<JoinHandle<()>>,
    frames_emitted: Arc<AtomicU64>,
}

impl AudioCaptureEngine {
    pub fn new(frame_ms: u32, input_gain: GainParam) -> Self {
        Self {
            frame_ms,
            input_gain,
            backend: None,
            task: None,
            frames_emitted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.backend.is_some()
    }

    /// Frames handed to the frame channel so far
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted.load(Ordering::SeqCst)
    }

    /// Start capturing from `backend`, delivering frames on `frame_tx`.
    ///
    /// Calling this while already running is a no-op. If the backend fails
    /// to start, nothing is spawned and no frame is ever emitted.
    pub async fn start(
        &mut self,
        mut backend: Box<dyn AudioBackend>,
        frame_tx: mpsc::Sender<AudioFrame>,
    ) -> Result<()> {
        if self.is_running() {
            debug!("Capture already running, ignoring start");
            return Ok(());
        }

        info!("Starting audio capture ({})", backend.name());

        let block_rx = backend
            .start()
            .await
            .with_context(|| format!("Failed to start audio capture ({})", backend.name()))?;

        let encoder = FrameEncoder::new(self.frame_ms);
        let gain = self.input_gain.follower();
        let frames_emitted = Arc::clone(&self.frames_emitted);

        self.task = Some(tokio::spawn(capture_loop(
            block_rx,
            encoder,
            gain,
            frame_tx,
            frames_emitted,
        )));
        self.backend = Some(backend);

        Ok(())
    }

    /// Tear down the capture graph. Safe to call when not running.
    pub async fn stop(&mut self) {
        let Some(mut backend) = self.backend.take() else {
            return;
        };

        info!("Stopping audio capture ({})", backend.name());

        if let Err(e) = backend.stop().await {
            warn!("Failed to stop audio backend: {:#}", e);
        }

        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

async fn capture_loop(
    mut block_rx: mpsc::Receiver<CaptureBlock>,
    mut encoder: FrameEncoder,
    mut gain: GainFollower,
    frame_tx: mpsc::Sender<AudioFrame>,
    frames_emitted: Arc<AtomicU64>,
) {
    debug!("Capture task started");

    while let Some(block) = block_rx.recv().await {
        let mut mono = downmix_to_mono(&block.samples, block.channels);
        gain.apply(&mut mono, block.sample_rate);
        let resampled = resample_to_target(&mono, block.sample_rate);

        for frame in encoder.push(&resampled) {
            if frame_tx.send(frame).await.is_err() {
                error!("Frame channel closed, stopping capture task");
                return;
            }
            frames_emitted.fetch_add(1, Ordering::SeqCst);
        }
    }

    encoder.discard_pending();
    debug!("Capture task finished (input ended)");
}
