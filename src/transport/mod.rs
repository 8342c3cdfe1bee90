//! Websocket connection to the remote assistant
//!
//! Outbound: `start`, `audio_chunk`, `tts_start`, `tts_end`.
//! Inbound: `transcript`, `response_start`, `response_text`, `response_done`,
//! `tts_audio`, `tts_start`, `tts_end`, `error`.

pub mod client;
pub mod messages;

pub use client::{TransportEvent, TransportSession, DEFAULT_OUTBOUND_BUFFER};
pub use messages::{InboundEvent, OutboundMessage};
