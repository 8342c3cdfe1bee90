// Shared helpers for integration tests: a scripted websocket assistant and
// small audio fixtures.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

/// Accepts one websocket client, records every JSON message it sends and
/// forwards whatever the test queues.
pub struct MockAssistant {
    pub url: String,
    received: mpsc::UnboundedReceiver<Value>,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl MockAssistant {
    pub async fn spawn() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            let (mut tx, mut rx) = ws.split();

            loop {
                tokio::select! {
                    msg = rx.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                let _ = in_tx.send(value);
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    out = out_rx.recv() => match out {
                        Some(msg) => {
                            let closing = matches!(msg, Message::Close(_));
                            if tx.send(msg).await.is_err() || closing {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(Self {
            url: format!("ws://{}", addr),
            received: in_rx,
            outgoing: out_tx,
        })
    }

    pub fn send(&self, event: Value) {
        let _ = self.outgoing.send(Message::Text(event.to_string()));
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.outgoing.send(Message::Text(text.to_string()));
    }

    /// Close the connection from the assistant side
    pub fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));
    }

    /// Next message from the client, whatever it is
    pub async fn next_message(&mut self) -> Result<Value> {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .map_err(|_| anyhow!("Timed out waiting for a client message"))?
            .ok_or_else(|| anyhow!("Client connection ended"))
    }

    /// Skip messages until one with the given `event` arrives
    pub async fn expect_event(&mut self, event: &str) -> Result<Value> {
        loop {
            let msg = self.next_message().await?;
            if msg["event"] == event {
                return Ok(msg);
            }
        }
    }

    /// Assert that no message with the given `event` arrives within `window`
    pub async fn assert_no_event(&mut self, event: &str, window: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.received.recv()).await {
                Err(_) | Ok(None) => return Ok(()),
                Ok(Some(msg)) if msg["event"] == event => {
                    bail!("Unexpected {} message: {}", event, msg)
                }
                Ok(Some(_)) => {}
            }
        }
    }
}

/// A url nothing listens on
pub async fn dead_url() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("ws://{}", addr))
}

/// Base64 raw PCM16 of `len` samples all equal to `value`
pub fn pcm16_payload(value: i16, len: usize) -> String {
    let bytes: Vec<u8> = std::iter::repeat(value)
        .take(len)
        .flat_map(|s| s.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Write a 16-bit WAV with a constant value on every channel
pub fn write_wav(
    path: &Path,
    sample_rate: u32,
    channels: u16,
    frames: usize,
    value: i16,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for _ in 0..frames * channels as usize {
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}
