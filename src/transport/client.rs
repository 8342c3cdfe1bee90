use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::messages::{InboundEvent, OutboundMessage};
use crate::audio::AudioFrame;

/// Audio frames buffered ahead of the socket before new frames are dropped
pub const DEFAULT_OUTBOUND_BUFFER: usize = 32;

/// How long `close` waits for queued messages to flush
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Delivered to the control loop by the reader task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(InboundEvent),
    /// Peer closed the connection or the socket failed. Always the last event.
    Closed { reason: Option<String> },
}

/// Queued for the writer task. `frame` marks entries held against the frame budget.
struct Outbound {
    msg: OutboundMessage,
    frame: bool,
}

/// Duplex websocket connection to the assistant
pub struct TransportSession {
    url: String,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    open: Arc<AtomicBool>,
    /// Frames queued but not yet written. Control messages are not counted.
    pending_frames: Arc<AtomicUsize>,
    frame_budget: usize,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl TransportSession {
    /// Connect, send `start`, and spawn the reader and writer tasks
    pub async fn open(
        url: &str,
        outbound_buffer: usize,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        info!("Connecting to assistant at {}", url);

        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let start = OutboundMessage::Start.to_json()?;
        ws_tx
            .send(Message::Text(start))
            .await
            .context("Failed to send start message")?;

        info!("Connected to assistant, session started");

        let open = Arc::new(AtomicBool::new(true));
        let pending_frames = Arc::new(AtomicUsize::new(0));
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let writer_open = Arc::clone(&open);
        let writer_pending = Arc::clone(&pending_frames);
        let writer = tokio::spawn(async move {
            while let Some(Outbound { msg, frame }) = out_rx.recv().await {
                if frame {
                    writer_pending.fetch_sub(1, Ordering::SeqCst);
                }
                let text = match msg.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(text)).await {
                    warn!("Websocket send failed: {}", e);
                    writer_open.store(false, Ordering::SeqCst);
                    return;
                }
            }

            // Sender dropped: local close
            let _ = ws_tx.send(Message::Close(None)).await;
            let _ = ws_tx.close().await;
            debug!("Websocket writer finished");
        });

        let reader_open = Arc::clone(&open);
        let reader = tokio::spawn(async move {
            let mut reason = None;

            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => match InboundEvent::parse(&text) {
                        Some(event) => {
                            if event_tx.send(TransportEvent::Message(event)).is_err() {
                                break;
                            }
                        }
                        None => debug!("Ignoring unrecognised message: {:.120}", text),
                    },
                    Ok(Message::Close(frame)) => {
                        reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                        break;
                    }
                    Ok(Message::Binary(data)) => {
                        debug!("Ignoring binary message ({} bytes)", data.len());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Websocket receive failed: {}", e);
                        reason = Some(e.to_string());
                        break;
                    }
                }
            }

            reader_open.store(false, Ordering::SeqCst);
            info!("Assistant connection closed");
            let _ = event_tx.send(TransportEvent::Closed { reason });
        });

        Ok((
            Self {
                url: url.to_string(),
                outbound: Some(out_tx),
                open,
                pending_frames,
                frame_budget: outbound_buffer.max(1),
                writer: Some(writer),
                reader: Some(reader),
            },
            event_rx,
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.outbound.is_some() && self.open.load(Ordering::SeqCst)
    }

    /// Queue a captured frame. Returns false if the frame was dropped
    /// because the connection is gone or the frame budget is used up.
    /// Never waits.
    pub fn send(&self, frame: &AudioFrame) -> bool {
        let reserved = self
            .pending_frames
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                (pending < self.frame_budget).then_some(pending + 1)
            })
            .is_ok();
        if !reserved {
            return false;
        }

        let queued = self.queue(Outbound {
            msg: OutboundMessage::audio_chunk(&frame.to_pcm_bytes()),
            frame: true,
        });
        if !queued {
            self.pending_frames.fetch_sub(1, Ordering::SeqCst);
        }
        queued
    }

    /// Queue a control message (`tts_start`, `tts_end`, ...). Control
    /// messages bypass the frame budget and keep their order relative to
    /// frames; they are only lost once the connection is gone.
    pub fn send_control(&self, msg: OutboundMessage) -> bool {
        let name = format!("{:?}", msg);
        let queued = self.queue(Outbound { msg, frame: false });
        if !queued {
            warn!("Dropped control message {}, connection closed", name);
        }
        queued
    }

    fn queue(&self, msg: Outbound) -> bool {
        if !self.open.load(Ordering::SeqCst) {
            return false;
        }
        match &self.outbound {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Stop sending, flush what is queued, and close the socket. Idempotent.
    pub async fn close(&mut self) {
        let Some(outbound) = self.outbound.take() else {
            return;
        };
        drop(outbound);

        info!("Closing assistant connection");

        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, writer).await.is_err() {
                warn!("Timed out flushing websocket writer");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.open.store(false, Ordering::SeqCst);
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
