//! Smoothed gain ramps for input ducking and output fades.
//!
//! The control loop is the only writer of gain targets. Targets are stored in
//! atomics so the capture task and the render callback can pick them up
//! without locking; each consumer owns a [`GainFollower`] that advances its
//! own [`GainRamp`] sample by sample.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DUCK_TIME_CONSTANT: Duration = Duration::from_millis(50);
pub const FADE_TIME_CONSTANT: Duration = Duration::from_millis(20);
pub const DEFAULT_DUCK_LEVEL: f32 = 0.2;

/// Input gain when not ducked
pub const INPUT_REST_LEVEL: f32 = 1.0;
/// Output gain between spoken turns
pub const OUTPUT_REST_LEVEL: f32 = 0.0;

/// Distance below which a ramp snaps onto its target
const SETTLE_EPSILON: f32 = 1e-4;

/// Exponential approach of `current` towards `target`
#[derive(Debug, Clone, PartialEq)]
pub struct GainRamp {
    current: f32,
    target: f32,
    time_constant: f32,
}

impl GainRamp {
    pub fn new(initial: f32, time_constant: Duration) -> Self {
        let initial = initial.clamp(0.0, 1.0);
        Self {
            current: initial,
            target: initial,
            time_constant: time_constant.as_secs_f32().max(f32::EPSILON),
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn time_constant(&self) -> Duration {
        Duration::from_secs_f32(self.time_constant)
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    /// Point the ramp at a new target. Returns false when the target is unchanged.
    pub fn set_target(&mut self, target: f32) -> bool {
        let target = target.clamp(0.0, 1.0);
        if target == self.target {
            return false;
        }
        self.target = target;
        true
    }

    /// Jump straight to the target
    pub fn settle(&mut self) {
        self.current = self.target;
    }

    /// Advance the ramp by `dt` seconds and return the new gain
    pub fn advance(&mut self, dt: f32) -> f32 {
        if self.current != self.target {
            let coeff = 1.0 - (-dt / self.time_constant).exp();
            self.current += (self.target - self.current) * coeff.clamp(0.0, 1.0);
            if (self.target - self.current).abs() < SETTLE_EPSILON {
                self.current = self.target;
            }
        }
        self.current
    }

    /// Multiply `samples` by the ramp, advancing one sample period per sample
    pub fn apply(&mut self, samples: &mut [f32], sample_rate: u32) {
        if self.is_settled() {
            if self.current != 1.0 {
                let gain = self.current;
                samples.iter_mut().for_each(|s| *s *= gain);
            }
            return;
        }

        let dt = 1.0 / sample_rate.max(1) as f32;
        for sample in samples.iter_mut() {
            *sample *= self.advance(dt);
        }
    }
}

/// Shared gain target written by the control loop
#[derive(Debug, Clone)]
pub struct GainParam {
    target: Arc<AtomicU32>,
    time_constant: Duration,
}

impl GainParam {
    pub fn new(initial: f32, time_constant: Duration) -> Self {
        Self {
            target: Arc::new(AtomicU32::new(initial.clamp(0.0, 1.0).to_bits())),
            time_constant,
        }
    }

    pub fn target(&self) -> f32 {
        f32::from_bits(self.target.load(Ordering::Acquire))
    }

    fn store(&self, target: f32) {
        self.target.store(target.to_bits(), Ordering::Release);
    }

    /// Create a follower for a consuming stage, starting settled at the current target
    pub fn follower(&self) -> GainFollower {
        GainFollower {
            param: self.clone(),
            ramp: GainRamp::new(self.target(), self.time_constant),
        }
    }
}

/// Consumer-side view of a [`GainParam`]
#[derive(Debug, Clone)]
pub struct GainFollower {
    param: GainParam,
    ramp: GainRamp,
}

impl GainFollower {
    /// Pick up the latest target and apply the ramp to a block
    pub fn apply(&mut self, samples: &mut [f32], sample_rate: u32) {
        self.ramp.set_target(self.param.target());
        self.ramp.apply(samples, sample_rate);
    }

    pub fn ramp(&self) -> &GainRamp {
        &self.ramp
    }
}

/// Gain settings for a session
#[derive(Debug, Clone)]
pub struct GainConfig {
    pub duck_level: f32,
    pub duck_time_constant: Duration,
    pub fade_time_constant: Duration,
}

impl Default for GainConfig {
    fn default() -> Self {
        Self {
            duck_level: DEFAULT_DUCK_LEVEL,
            duck_time_constant: DUCK_TIME_CONSTANT,
            fade_time_constant: FADE_TIME_CONSTANT,
        }
    }
}

/// Owns the input-duck and output-fade targets
#[derive(Debug)]
pub struct GainController {
    input: GainParam,
    output: GainParam,
    duck_level: f32,
    transitions: u64,
}

impl GainController {
    pub fn new(config: &GainConfig) -> Self {
        Self {
            input: GainParam::new(INPUT_REST_LEVEL, config.duck_time_constant),
            output: GainParam::new(OUTPUT_REST_LEVEL, config.fade_time_constant),
            duck_level: config.duck_level.clamp(0.0, 1.0),
            transitions: 0,
        }
    }

    /// Handle for the capture path
    pub fn input_param(&self) -> GainParam {
        self.input.clone()
    }

    /// Handle for the playback path
    pub fn output_param(&self) -> GainParam {
        self.output.clone()
    }

    pub fn input_target(&self) -> f32 {
        self.input.target()
    }

    pub fn output_target(&self) -> f32 {
        self.output.target()
    }

    /// Number of target changes actually applied
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn duck_input(&mut self) -> bool {
        let level = self.duck_level;
        self.request(Which::Input, level)
    }

    pub fn restore_input(&mut self) -> bool {
        self.request(Which::Input, INPUT_REST_LEVEL)
    }

    pub fn fade_in_output(&mut self) -> bool {
        self.request(Which::Output, 1.0)
    }

    pub fn fade_out_output(&mut self) -> bool {
        self.request(Which::Output, OUTPUT_REST_LEVEL)
    }

    /// Return both ramps to their rest levels
    pub fn release(&mut self) {
        self.restore_input();
        self.fade_out_output();
    }

    fn request(&mut self, which: Which, target: f32) -> bool {
        let param = match which {
            Which::Input => &self.input,
            Which::Output => &self.output,
        };

        let target = target.clamp(0.0, 1.0);
        if param.target() == target {
            return false;
        }

        debug!("Gain {:?} -> {:.2}", which, target);
        param.store(target);
        self.transitions += 1;
        true
    }
}

#[derive(Debug, Clone, Copy)]
enum Which {
    Input,
    Output,
}
