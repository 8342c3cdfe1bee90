//! Sample rate conversion using linear interpolation.
//!
//! Capture audio arrives at whatever rate the input device runs at (44.1 or
//! 48 kHz typically) and must reach the assistant at 16 kHz. Reply audio goes
//! the other way, from the TTS rate to the output device rate. Both use the
//! same stateless converter; callers feed contiguous blocks.

/// Sample rate the assistant expects for captured audio.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Number of output samples produced for `input_len` samples at `from_rate`.
///
/// The ratio is `to_rate / from_rate`, rounded up: `ceil(len * Rout / Rin)`.
/// 48 kHz to 16 kHz yields a third of the samples, never three times as many.
pub fn output_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == to_rate || from_rate == 0 {
        return input_len;
    }
    (input_len as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize
}

/// Resample a block of mono samples from `from_rate` to `to_rate`.
///
/// Output sample `i` sits at input position `i * from_rate / to_rate` and is
/// interpolated between the two neighbouring input samples. The upper
/// neighbour clamps to the last input sample. Equal rates return the input
/// unchanged.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }
    if input.is_empty() {
        return Vec::new();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let last = input.len() - 1;
    let len = output_len(input.len(), from_rate, to_rate);

    (0..len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            let a = input[idx];
            let b = input[next];
            a + (b - a) * frac
        })
        .collect()
}

/// Resample to the 16 kHz capture target.
pub fn resample_to_target(input: &[f32], from_rate: u32) -> Vec<f32> {
    resample(input, from_rate, TARGET_SAMPLE_RATE)
}

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}
