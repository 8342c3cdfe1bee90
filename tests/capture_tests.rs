// Integration tests for the capture path
//
// These tests verify that raw input blocks come out as gap-free 48ms PCM16
// frames at 16kHz, and that capture fails closed.

use anyhow::{bail, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use voice_duplex::audio::gain::GainConfig;
use voice_duplex::audio::{
    AudioBackend, AudioCaptureEngine, AudioFrame, CaptureBlock, ChannelBackend, GainController,
};

fn stereo_block(frames: usize, value: f32) -> CaptureBlock {
    CaptureBlock {
        samples: vec![value; frames * 2],
        sample_rate: 48000,
        channels: 2,
    }
}

async fn collect(rx: &mut mpsc::Receiver<AudioFrame>, count: usize) -> Result<Vec<AudioFrame>> {
    let mut frames = Vec::new();
    while frames.len() < count {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await? {
            Some(frame) => frames.push(frame),
            None => break,
        }
    }
    Ok(frames)
}

#[tokio::test]
async fn test_continuous_capture_is_gap_free() -> Result<()> {
    let gains = GainController::new(&GainConfig::default());
    let mut engine = AudioCaptureEngine::new(48, gains.input_param());
    let (backend, block_tx) = ChannelBackend::new(16);
    let (frame_tx, mut frame_rx) = mpsc::channel(64);

    engine.start(Box::new(backend), frame_tx).await?;
    assert!(engine.is_running());

    // 20ms blocks at 48kHz stereo: 320 samples each once at 16kHz
    for _ in 0..24 {
        block_tx.send(stereo_block(960, 0.25)).await?;
    }

    // 24 * 320 = 7680 samples = 10 frames of 768
    let frames = collect(&mut frame_rx, 10).await?;
    assert_eq!(frames.len(), 10);

    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.sequence, i as u64);
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.samples.len(), 768);
        assert!(frame.samples.iter().all(|&s| s == 8191));
    }

    engine.stop().await;
    assert!(!engine.is_running());
    assert_eq!(engine.frames_emitted(), 10);

    Ok(())
}

#[tokio::test]
async fn test_ducked_input_is_attenuated() -> Result<()> {
    let mut gains = GainController::new(&GainConfig::default());
    assert!(gains.duck_input());

    let mut engine = AudioCaptureEngine::new(48, gains.input_param());
    let (backend, block_tx) = ChannelBackend::new(16);
    let (frame_tx, mut frame_rx) = mpsc::channel(64);
    engine.start(Box::new(backend), frame_tx).await?;

    block_tx.send(stereo_block(2400, 0.5)).await?;
    let frames = collect(&mut frame_rx, 1).await?;

    // 0.5 * 0.2 = 0.1
    let expected = (0.1f32 * 32767.0) as i16;
    assert!(frames[0].samples.iter().all(|&s| (s - expected).abs() <= 2));

    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_start_is_idempotent() -> Result<()> {
    let gains = GainController::new(&GainConfig::default());
    let mut engine = AudioCaptureEngine::new(48, gains.input_param());
    let (first, block_tx) = ChannelBackend::new(4);
    let (second, _unused) = ChannelBackend::new(4);
    let (frame_tx, mut frame_rx) = mpsc::channel(8);

    engine.start(Box::new(first), frame_tx.clone()).await?;
    engine.start(Box::new(second), frame_tx).await?;

    // Still wired to the first backend
    block_tx.send(stereo_block(2400, 0.1)).await?;
    assert_eq!(collect(&mut frame_rx, 1).await?.len(), 1);

    engine.stop().await;
    engine.stop().await;
    Ok(())
}

struct BrokenBackend;

#[async_trait::async_trait]
impl AudioBackend for BrokenBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureBlock>> {
        bail!("audio processor registration failed")
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "broken"
    }
}

#[tokio::test]
async fn test_capture_fails_closed() -> Result<()> {
    let gains = GainController::new(&GainConfig::default());
    let mut engine = AudioCaptureEngine::new(48, gains.input_param());
    let (frame_tx, mut frame_rx) = mpsc::channel(8);

    let result = engine.start(Box::new(BrokenBackend), frame_tx).await;
    assert!(result.is_err());
    assert!(!engine.is_running());

    // The only sender was dropped with the failed start
    assert!(frame_rx.recv().await.is_none());
    assert_eq!(engine.frames_emitted(), 0);
    Ok(())
}
