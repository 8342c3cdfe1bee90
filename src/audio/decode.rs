//! Reply audio decoding.
//!
//! `tts_audio` payloads are base64 strings. Depending on the assistant's
//! configured output format they carry either raw little-endian PCM16 or a
//! complete container (WAV, MP3, OGG...) which symphonia probes.

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::resample::downmix_to_mono;

/// Encoding of reply audio payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplyFormat {
    /// Probe the payload as a container/codec stream
    #[default]
    Auto,
    /// Headerless little-endian PCM16 mono at a known rate
    Pcm16,
}

/// Decoded mono audio at its native rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate.max(1) as f64
    }
}

/// Turns one encoded payload into samples
pub trait PayloadDecoder: Send {
    fn decode(&mut self, payload: &str) -> Result<DecodedAudio>;
}

/// Default decoder for `tts_audio` payloads
#[derive(Debug, Clone)]
pub struct ReplyDecoder {
    format: ReplyFormat,
    pcm_sample_rate: u32,
}

impl ReplyDecoder {
    pub fn new(format: ReplyFormat, pcm_sample_rate: u32) -> Self {
        Self {
            format,
            pcm_sample_rate,
        }
    }
}

impl PayloadDecoder for ReplyDecoder {
    fn decode(&mut self, payload: &str) -> Result<DecodedAudio> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .context("Invalid base64 audio payload")?;

        match self.format {
            ReplyFormat::Pcm16 => decode_pcm16(&bytes, self.pcm_sample_rate),
            ReplyFormat::Auto => decode_container(bytes),
        }
    }
}

/// Decode headerless PCM16 (little-endian, mono)
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32) -> Result<DecodedAudio> {
    if bytes.is_empty() {
        bail!("Empty PCM payload");
    }
    if bytes.len() % 2 != 0 {
        bail!("PCM payload has odd length ({} bytes)", bytes.len());
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect();

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Probe and decode a complete audio stream held in memory
pub fn decode_container(bytes: Vec<u8>) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unrecognized audio container")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No decodable audio track"))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported codec")?;

    let mut samples = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend(downmix_to_mono(buf.samples(), spec.channels.count() as u16));
            }
            // Corrupt packets are skipped, the rest of the stream is still usable
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e).context("Failed to decode audio packet"),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        bail!("Payload contained no audio");
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}
