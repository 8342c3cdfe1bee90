use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioBackendConfig, CaptureBlock};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples normalised to [-1, 1]
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        if spec.channels == 0 || spec.sample_rate == 0 {
            bail!("Invalid WAV header: {}Hz, {} channels", spec.sample_rate, spec.channels);
        }

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into device-sized blocks of `block_ms` milliseconds
    pub fn blocks(&self, block_ms: u64) -> Vec<CaptureBlock> {
        let frames_per_block = ((self.sample_rate as u64 * block_ms.max(1)) / 1000).max(1) as usize;
        let block_len = frames_per_block * self.channels as usize;

        self.samples
            .chunks(block_len)
            .map(|chunk| CaptureBlock {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
            })
            .collect()
    }
}

/// Replays a WAV file as if it were a live input device
pub struct FileBackend {
    file: Arc<AudioFile>,
    config: AudioBackendConfig,
    /// Deliver blocks at the file's real-time rate
    paced: bool,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self> {
        let file = AudioFile::open(path)?;
        Ok(Self::from_file(file, config))
    }

    pub fn from_file(file: AudioFile, config: AudioBackendConfig) -> Self {
        Self {
            file: Arc::new(file),
            config,
            paced: true,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Deliver all blocks as fast as the consumer accepts them
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureBlock>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let blocks = self.file.blocks(self.config.block_duration_ms);
        let block_interval = Duration::from_millis(self.config.block_duration_ms.max(1));
        let paced = self.paced;
        let capturing = Arc::clone(&self.capturing);

        capturing.store(true, Ordering::SeqCst);
        info!(
            "Replaying {} ({} blocks, paced={})",
            self.file.path,
            blocks.len(),
            paced
        );

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_interval);
            for block in blocks {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                if paced {
                    ticker.tick().await;
                }
                if tx.send(block).await.is_err() {
                    break;
                }
            }
            debug!("File replay finished");
            capturing.store(false, Ordering::SeqCst);
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
