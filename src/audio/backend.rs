use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Raw input samples as delivered by an input device (f32, interleaved)
#[derive(Debug, Clone)]
pub struct CaptureBlock {
    /// Samples in [-1, 1], interleaved when `channels > 1`
    pub samples: Vec<f32>,
    /// Native sample rate of the device in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

/// Configuration for audio input backends
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Block size requested from the device in milliseconds
    pub block_duration_ms: u64,
    /// Blocks buffered between the device callback and the capture task
    pub channel_capacity: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            block_duration_ms: 20, // Small device buffers keep latency low
            channel_capacity: 64,
        }
    }
}

/// Audio input backend trait
///
/// Implementations:
/// - Device: default sound-card input through cpal (`device` feature)
/// - File: WAV file replayed in real time (testing/batch processing)
/// - Channel: blocks pushed by the embedding application
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive raw input blocks.
    /// Device callbacks must only copy and push into this channel.
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureBlock>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone (requires the `device` feature)
    Microphone,
    /// WAV file input
    File(String),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create an input backend for the given source
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "device")]
                {
                    let backend = super::device::DeviceInputBackend::new(config);
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "device"))]
                {
                    let _ = config;
                    bail!("Microphone capture requires the `device` feature")
                }
            }

            AudioSource::File(path) => {
                let backend = super::file::FileBackend::open(&path, config)?;
                Ok(Box::new(backend))
            }
        }
    }
}

/// Backend fed by the embedding application through a sender
pub struct ChannelBackend {
    rx: Option<mpsc::Receiver<CaptureBlock>>,
    capturing: Arc<AtomicBool>,
}

impl ChannelBackend {
    /// Create a backend and the sender that feeds it
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<CaptureBlock>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                rx: Some(rx),
                capturing: Arc::new(AtomicBool::new(false)),
            },
            tx,
        )
    }
}

#[async_trait::async_trait]
impl AudioBackend for ChannelBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureBlock>> {
        let Some(rx) = self.rx.take() else {
            bail!("Channel backend can only be started once");
        };
        self.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "channel"
    }
}
