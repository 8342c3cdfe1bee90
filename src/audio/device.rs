// Sound-card input and output through cpal
//
// cpal streams are not Send, so each stream lives on its own thread which
// builds it, reports success or failure, then parks until told to stop.
// Callbacks only copy samples: input pushes blocks with try_send, output
// pulls from the playback timeline with try_lock.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, CaptureBlock};
use super::output::AudioOutput;
use super::timeline::PlaybackTimeline;

struct StreamThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl StreamThread {
    fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            error!("Audio stream thread panicked");
        }
    }
}

/// Default microphone
pub struct DeviceInputBackend {
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    thread: Option<StreamThread>,
}

impl DeviceInputBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

fn build_input_stream(
    tx: mpsc::Sender<CaptureBlock>,
    dropped: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;
    let supported = device
        .default_input_config()
        .context("Failed to query input config")?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    info!(
        "Input device: {} ({}Hz, {} channels, {:?})",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels,
        format
    );

    let err_fn = |e: cpal::StreamError| error!("Input stream error: {}", e);

    let push = move |samples: Vec<f32>| {
        let block = CaptureBlock {
            samples,
            sample_rate,
            channels,
        };
        if tx.try_send(block).is_err() && !dropped.swap(true, Ordering::Relaxed) {
            warn!("Capture channel full, dropping input blocks");
        }
    };

    let stream = match format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| push(data.to_vec()),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push(data.iter().map(|&s| s as f32 / 32768.0).collect())
            },
            err_fn,
            None,
        ),
        other => bail!("Unsupported input sample format: {:?}", other),
    }
    .context("Failed to build input stream")?;

    stream.play().context("Failed to start input stream")?;
    Ok(stream)
}

#[async_trait::async_trait]
impl AudioBackend for DeviceInputBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureBlock>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let dropped = Arc::new(AtomicBool::new(false));

        let handle = std::thread::Builder::new()
            .name("voice-capture".to_string())
            .spawn(move || match build_input_stream(tx, dropped) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .context("Failed to spawn capture thread")?;

        ready_rx
            .await
            .map_err(|_| anyhow!("Capture thread exited during setup"))??;

        self.thread = Some(StreamThread { stop_tx, handle });
        self.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.stop())
                .await
                .context("Capture thread join failed")?;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

/// Default speaker
pub struct DeviceOutput {
    sample_rate: u32,
    channels: u16,
    thread: Option<StreamThread>,
}

impl DeviceOutput {
    pub fn open_default() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?;
        let supported = device
            .default_output_config()
            .context("Failed to query output config")?;

        Ok(Self {
            sample_rate: supported.sample_rate().0,
            channels: supported.channels(),
            thread: None,
        })
    }
}

fn build_output_stream(timeline: Arc<PlaybackTimeline>, channels: u16) -> Result<cpal::Stream> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;
    let supported = device
        .default_output_config()
        .context("Failed to query output config")?;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let ch = channels.max(1) as usize;

    let err_fn = |e: cpal::StreamError| error!("Output stream error: {}", e);

    let stream = match format {
        cpal::SampleFormat::F32 => {
            let mut mono = Vec::new();
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mono.resize(data.len() / ch, 0.0);
                    timeline.render(&mut mono);
                    for (frame, &s) in data.chunks_mut(ch).zip(mono.iter()) {
                        frame.iter_mut().for_each(|out| *out = s);
                    }
                },
                err_fn,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let mut mono = Vec::new();
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    mono.resize(data.len() / ch, 0.0);
                    timeline.render(&mut mono);
                    for (frame, &s) in data.chunks_mut(ch).zip(mono.iter()) {
                        let v = crate::audio::encoder::quantize(s);
                        frame.iter_mut().for_each(|out| *out = v);
                    }
                },
                err_fn,
                None,
            )
        }
        other => bail!("Unsupported output sample format: {:?}", other),
    }
    .context("Failed to build output stream")?;

    stream.play().context("Failed to start output stream")?;
    Ok(stream)
}

impl AudioOutput for DeviceOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, timeline: Arc<PlaybackTimeline>) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        let channels = self.channels;
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name("voice-playback".to_string())
            .spawn(move || match build_output_stream(timeline, channels) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .context("Failed to spawn playback thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("Playback thread exited during setup"))??;

        info!("Speaker output started ({}Hz, {} channels)", self.sample_rate, channels);
        self.thread = Some(StreamThread { stop_tx, handle });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            thread.stop();
        }
    }

    fn name(&self) -> &str {
        "speaker"
    }
}
