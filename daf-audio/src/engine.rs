//! Audio engine: orchestrates gain, delay, pitch, fade and metering.
//!
//! The engine is owned by the audio thread. Control happens exclusively
//! through the [`EngineController`] handle: the control side writes atomic
//! parameter targets and the enable flag; the audio side reads them at
//! block boundaries, smooths them per sample, and publishes meter levels
//! back. `prepare` and `release` are the only entry points allowed to
//! allocate; `process` never allocates, locks, blocks or logs.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::config::EngineConfig;
use crate::delay::{DelayLine, OnePoleLowPass};
use crate::fade::FadeController;
use crate::meter::LevelMeter;
use crate::params::{
    EngineController, SharedState, DELAY_TIME_MS, DRY_WET_MIX, INPUT_GAIN_DB, PITCH_SEMITONES,
};
use crate::pitch::{PitchShifter, PitchUnit, TapeShifter};
use crate::smoother::LinearSmoother;
use crate::MAX_CHANNELS;

/// Errors from the non-real-time prepare boundary.
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),
    #[error("maximum block size must be non-zero")]
    InvalidBlockSize,
}

/// Real-time feedback-delay engine.
///
/// Per block the pipeline runs: fade-in (after re-enable) → input gain →
/// delay with dry/wet mix → pitch shift (unless bypassed) → metering, all
/// in place on the block. While disabled the engine outputs silence and
/// keeps its meters at zero; the disabled→enabled edge clears the delay and
/// pitch history and arms a fresh fade so stale samples never click through.
pub struct AudioEngine {
    shared: Arc<SharedState>,
    config: EngineConfig,

    sample_rate: f64,
    max_block: usize,
    prepared: bool,

    // Signal path, exclusively owned by the audio context
    delay: DelayLine,
    wet_filter: [OnePoleLowPass; MAX_CHANNELS],
    wet_filter_on: bool,
    fade: FadeController,
    fade_len: u32,
    meter: LevelMeter,
    pitch: PitchShifter,

    // Per-sample smoothed parameters (gain is linear, delay in samples)
    gain_smoother: LinearSmoother,
    delay_smoother: LinearSmoother,
    mix_smoother: LinearSmoother,

    /// Audio-side view of the enable flag, for edge detection
    was_enabled: bool,
    /// Last shift forwarded to the pitch units
    applied_semitones: f32,
}

impl AudioEngine {
    /// Engine with the built-in tape-style pitch shifter on every channel.
    pub fn new(config: EngineConfig) -> Self {
        let channels = config.channels.clamp(1, MAX_CHANNELS);
        let units: Vec<Box<dyn PitchUnit>> = (0..channels)
            .map(|_| Box::new(TapeShifter::new()) as Box<dyn PitchUnit>)
            .collect();
        Self::with_pitch_units(config, units)
    }

    /// Engine with caller-supplied pitch units, one per channel.
    pub fn with_pitch_units(mut config: EngineConfig, units: Vec<Box<dyn PitchUnit>>) -> Self {
        config.channels = config.channels.clamp(1, MAX_CHANNELS);
        debug_assert!(units.len() >= config.channels);
        debug!(channels = config.channels, "engine created");
        Self {
            shared: Arc::new(SharedState::new()),
            config,
            sample_rate: 0.0,
            max_block: 0,
            prepared: false,
            delay: DelayLine::new(),
            wet_filter: [OnePoleLowPass::new(), OnePoleLowPass::new()],
            wet_filter_on: false,
            fade: FadeController::new(),
            fade_len: 0,
            meter: LevelMeter::new(config.meter_smoothing),
            pitch: PitchShifter::new(units),
            gain_smoother: LinearSmoother::new(1.0),
            delay_smoother: LinearSmoother::new(0.0),
            mix_smoother: LinearSmoother::new(DRY_WET_MIX.default),
            was_enabled: false,
            applied_semitones: PITCH_SEMITONES.default,
        }
    }

    /// Cloneable control-side handle. Safe to hand to any thread.
    pub fn controller(&self) -> EngineController {
        EngineController {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of channels the engine processes.
    pub fn channels(&self) -> usize {
        self.config.channels
    }

    /// Size buffers for the given stream format. Non-real-time: allocates.
    ///
    /// Parameters persist across calls; level and fade state reset to
    /// neutral. Must run before the first `process` and again after any
    /// sample-rate or block-size change.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<(), PrepareError> {
        if !(sample_rate > 0.0) || !sample_rate.is_finite() {
            return Err(PrepareError::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 {
            return Err(PrepareError::InvalidBlockSize);
        }

        self.sample_rate = sample_rate;
        self.max_block = max_block_size;

        self.delay
            .resize(self.config.channels, self.config.max_delay_secs, sample_rate);

        self.wet_filter_on =
            self.config.wet_lowpass_hz.is_finite() && self.config.wet_lowpass_hz > 0.0;
        if self.wet_filter_on {
            for filter in &mut self.wet_filter {
                filter.set_cutoff(self.config.wet_lowpass_hz, sample_rate);
                filter.reset();
            }
        }

        self.fade_len = (self.config.fade_secs.max(0.0) as f64 * sample_rate) as u32;
        self.fade.reset();
        self.meter.reset();
        for level in &self.shared.levels {
            level.store(0.0);
        }

        // Smoothers restart from the current targets with no ramp
        let gain_db = INPUT_GAIN_DB.clamp(self.shared.input_gain_db.load());
        self.gain_smoother
            .reset(sample_rate, self.config.smoothing_secs);
        self.gain_smoother.snap_to(db_to_gain(gain_db));

        let delay_ms = DELAY_TIME_MS.clamp(self.shared.delay_time_ms.load());
        self.delay_smoother
            .reset(sample_rate, self.config.smoothing_secs);
        self.delay_smoother.snap_to(self.delay_target_samples(delay_ms));

        self.mix_smoother
            .reset(sample_rate, self.config.smoothing_secs);
        self.mix_smoother.snap_to(self.mix_target(delay_ms));

        let semitones = PITCH_SEMITONES.clamp(self.shared.pitch_semitones.load());
        self.pitch
            .configure(sample_rate, self.config.channels, max_block_size, semitones);
        self.applied_semitones = semitones;

        self.prepared = true;
        debug!(
            sample_rate,
            max_block_size,
            delay_buffer = self.delay.len(),
            "engine prepared"
        );
        Ok(())
    }

    /// Free block-sized scratch. The delay buffer stays allocated; `prepare`
    /// must run again before the next `process`.
    pub fn release(&mut self) {
        self.pitch.release();
        self.prepared = false;
        debug!("engine released");
    }

    /// Process one block in place. Real-time safe.
    ///
    /// `channels` holds one slice per channel, all the same length, at most
    /// the prepared maximum block size. Calling this before `prepare` is a
    /// programming error (checked only in debug builds).
    pub fn process(&mut self, channels: &mut [&mut [f32]]) {
        debug_assert!(self.prepared, "process called before prepare");
        let active = channels.len().min(self.config.channels);
        if active == 0 {
            return;
        }
        let num_samples = channels[0].len();
        debug_assert!(channels.iter().all(|ch| ch.len() == num_samples));
        debug_assert!(num_samples <= self.max_block, "block exceeds prepared maximum");

        if !self.shared.enabled.load(Ordering::Relaxed) {
            for ch in channels.iter_mut() {
                ch.fill(0.0);
            }
            self.meter.reset();
            for level in &self.shared.levels {
                level.store(0.0);
            }
            self.fade.reset();
            self.was_enabled = false;
            return;
        }

        if !self.was_enabled {
            // Stale delay history recorded before the mute would click
            // through; start from a clean slate and ramp in.
            self.delay.clear();
            self.pitch.clear();
            for filter in &mut self.wet_filter {
                filter.reset();
            }
            self.fade.start(self.fade_len);
            self.was_enabled = true;
        }

        // Pick up control-side targets once per block
        let delay_ms = DELAY_TIME_MS.clamp(self.shared.delay_time_ms.load());
        let gain_db = INPUT_GAIN_DB.clamp(self.shared.input_gain_db.load());
        self.gain_smoother.set_target(db_to_gain(gain_db));
        self.delay_smoother
            .set_target(self.delay_target_samples(delay_ms));
        self.mix_smoother.set_target(self.mix_target(delay_ms));

        let semitones = PITCH_SEMITONES.clamp(self.shared.pitch_semitones.load());
        if semitones != self.applied_semitones {
            self.pitch.set_semitones(semitones);
            self.applied_semitones = semitones;
        }

        // Fade the captured input when coming out of a mute; one gain step
        // per sample index, shared across channels.
        if self.fade.is_fading() {
            for i in 0..num_samples {
                let gain = self.fade.next_gain();
                for ch in channels.iter_mut().take(active) {
                    ch[i] *= gain;
                }
            }
        }

        // Gain, delay and mix, one sample at a time across channels
        for i in 0..num_samples {
            let gain = self.gain_smoother.next_value();
            let delay_samples = self.delay_smoother.next_value();
            let mix = self.mix_smoother.next_value();
            for (ch_index, ch) in channels.iter_mut().take(active).enumerate() {
                let dry = ch[i] * gain;
                let mut wet = self.delay.write_and_read(ch_index, dry, delay_samples);
                if self.wet_filter_on {
                    wet = self.wet_filter[ch_index].process(wet);
                }
                ch[i] = dry * (1.0 - mix) + wet * mix;
            }
        }

        // Pitch stage, skipped entirely for near-zero shifts
        if semitones.abs() >= self.config.pitch_bypass_semitones {
            for (ch_index, ch) in channels.iter_mut().take(active).enumerate() {
                self.pitch.process(ch_index, ch);
            }
        }

        // Meter the final output
        for (ch_index, ch) in channels.iter().take(active).enumerate() {
            let level = self.meter.update(ch_index, ch);
            self.shared.levels[ch_index].store(level);
        }
    }

    /// Delay target in samples, clamped below the buffer length.
    fn delay_target_samples(&self, delay_ms: f32) -> f32 {
        let samples = (delay_ms / 1000.0) * self.sample_rate as f32;
        let max = self.delay.len().saturating_sub(1) as f32;
        samples.min(max)
    }

    /// A 0 ms delay forces a pure-dry mix; the configured blend is
    /// overridden until the delay time comes back above zero.
    fn mix_target(&self, delay_ms: f32) -> f32 {
        if delay_ms > 0.0 {
            DRY_WET_MIX.clamp(self.shared.dry_wet_mix.load())
        } else {
            0.0
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        debug!("engine dropped");
    }
}

/// Decibels to linear gain.
#[inline]
fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db * 0.05)
}
