use super::resample::TARGET_SAMPLE_RATE;

/// Default frame duration sent to the assistant.
pub const DEFAULT_FRAME_MS: u32 = 48;

/// One encoded capture frame (16-bit PCM, mono, 16 kHz)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Quantized samples
    pub samples: Vec<i16>,
    /// Sample rate in Hz (always the capture target)
    pub sample_rate: u32,
    /// Position of this frame in the capture stream, starting at 0
    pub sequence: u64,
}

impl AudioFrame {
    /// Little-endian PCM16 bytes, as sent on the wire
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// Convert a float sample to PCM16, clamping to [-1, 1].
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Batches 16 kHz float samples into fixed-size PCM16 frames.
///
/// Samples that do not fill a whole frame stay pending until the next push.
/// Sequence numbers increase by one per emitted frame and never repeat for
/// the lifetime of the encoder.
#[derive(Debug)]
pub struct FrameEncoder {
    samples_per_frame: usize,
    pending: Vec<f32>,
    next_sequence: u64,
}

impl FrameEncoder {
    pub fn new(frame_ms: u32) -> Self {
        let samples_per_frame =
            ((TARGET_SAMPLE_RATE as u64 * frame_ms.max(1) as u64) / 1000).max(1) as usize;

        Self {
            samples_per_frame,
            pending: Vec::with_capacity(samples_per_frame * 2),
            next_sequence: 0,
        }
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    /// Sequence number the next frame will carry
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Number of samples waiting for a full frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Append samples and return every frame that is now complete
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::with_capacity(self.pending.len() / self.samples_per_frame);
        let mut offset = 0;

        while self.pending.len() - offset >= self.samples_per_frame {
            let block = &self.pending[offset..offset + self.samples_per_frame];
            frames.push(AudioFrame {
                samples: block.iter().map(|&s| quantize(s)).collect(),
                sample_rate: TARGET_SAMPLE_RATE,
                sequence: self.next_sequence,
            });
            self.next_sequence += 1;
            offset += self.samples_per_frame;
        }

        self.pending.drain(..offset);
        frames
    }

    /// Drop any partial frame (used when capture stops)
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_48ms() {
        let encoder = FrameEncoder::new(48);
        assert_eq!(encoder.samples_per_frame(), 768);
    }

    #[test]
    fn test_quantize_bounds() {
        assert_eq!(quantize(1.0), i16::MAX);
        assert_eq!(quantize(-1.0), i16::MIN);
        assert_eq!(quantize(2.5), i16::MAX);
        assert_eq!(quantize(-3.0), i16::MIN);
        assert_eq!(quantize(0.0), 0);
    }

    #[test]
    fn test_push_holds_partial_frame() {
        let mut encoder = FrameEncoder::new(48);
        assert!(encoder.push(&[0.0; 500]).is_empty());
        assert_eq!(encoder.pending_len(), 500);

        let frames = encoder.push(&[0.0; 300]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples.len(), 768);
        assert_eq!(encoder.pending_len(), 32);
    }

    #[test]
    fn test_sequence_is_contiguous() {
        let mut encoder = FrameEncoder::new(48);
        let mut sequences = Vec::new();
        for _ in 0..10 {
            for frame in encoder.push(&[0.1; 1000]) {
                sequences.push(frame.sequence);
            }
        }
        let expected: Vec<u64> = (0..sequences.len() as u64).collect();
        assert_eq!(sequences, expected);
        assert_eq!(sequences.len(), 10_000 / 768);
    }

    #[test]
    fn test_pcm_bytes_little_endian() {
        let frame = AudioFrame {
            samples: vec![1, -2],
            sample_rate: 16_000,
            sequence: 0,
        };
        assert_eq!(frame.to_pcm_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);
        assert!((frame.duration_ms() - 0.125).abs() < 1e-9);
    }
}
