//! Cross-thread parameter state.
//!
//! The control thread writes parameter *targets*; the audio thread reads
//! them opportunistically at block boundaries and smooths them per sample.
//! Everything shared crosses as single-word atomics: no locks, and no
//! multi-field structures updated non-atomically. The audio thread writes
//! back only the displayed meter levels.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::meter::level_to_db;
use crate::MAX_CHANNELS;

/// f32 stored as atomic bits. Relaxed ordering throughout: each value is an
/// independent scalar with no cross-value ordering requirements.
pub(crate) struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub(crate) fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    #[inline]
    pub(crate) fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Inclusive parameter range with a default.
#[derive(Debug, Clone, Copy)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamRange {
    /// Clamp `value` into the range; non-finite input falls back to the
    /// default rather than poisoning the signal path.
    pub fn clamp(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }
}

/// Input gain in decibels
pub const INPUT_GAIN_DB: ParamRange = ParamRange {
    min: -24.0,
    max: 24.0,
    default: 0.0,
};

/// Delay time in milliseconds
pub const DELAY_TIME_MS: ParamRange = ParamRange {
    min: 0.0,
    max: 2000.0,
    default: 100.0,
};

/// Dry/wet blend, 0 = dry only
pub const DRY_WET_MIX: ParamRange = ParamRange {
    min: 0.0,
    max: 1.0,
    default: 0.5,
};

/// Pitch shift in semitones
pub const PITCH_SEMITONES: ParamRange = ParamRange {
    min: -12.0,
    max: 12.0,
    default: 0.0,
};

/// Atomic scalars shared between the controller and the audio engine.
pub(crate) struct SharedState {
    pub(crate) input_gain_db: AtomicF32,
    pub(crate) delay_time_ms: AtomicF32,
    pub(crate) dry_wet_mix: AtomicF32,
    pub(crate) pitch_semitones: AtomicF32,
    pub(crate) enabled: AtomicBool,
    /// Smoothed output levels published by the audio thread
    pub(crate) levels: [AtomicF32; MAX_CHANNELS],
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            input_gain_db: AtomicF32::new(INPUT_GAIN_DB.default),
            delay_time_ms: AtomicF32::new(DELAY_TIME_MS.default),
            dry_wet_mix: AtomicF32::new(DRY_WET_MIX.default),
            pitch_semitones: AtomicF32::new(PITCH_SEMITONES.default),
            enabled: AtomicBool::new(false),
            levels: [AtomicF32::new(0.0), AtomicF32::new(0.0)],
        }
    }
}

/// Control-side handle to a running engine.
///
/// Cloning is cheap (single `Arc` increment). Every method is lock-free and
/// safe from any thread; setters clamp out-of-range input silently and only
/// ever update the target; the audio thread ramps to it on its own clock.
#[derive(Clone)]
pub struct EngineController {
    pub(crate) shared: Arc<SharedState>,
}

impl EngineController {
    /// Set the input gain target in decibels (-24 to +24).
    pub fn set_input_gain_db(&self, db: f32) {
        self.shared.input_gain_db.store(INPUT_GAIN_DB.clamp(db));
    }

    /// Current input gain target in decibels.
    pub fn input_gain_db(&self) -> f32 {
        self.shared.input_gain_db.load()
    }

    /// Set the delay time target in milliseconds (0 to 2000).
    pub fn set_delay_time_ms(&self, ms: f32) {
        self.shared.delay_time_ms.store(DELAY_TIME_MS.clamp(ms));
    }

    /// Current delay time target in milliseconds.
    pub fn delay_time_ms(&self) -> f32 {
        self.shared.delay_time_ms.load()
    }

    /// Set the dry/wet mix target (0 = dry, 1 = wet).
    pub fn set_dry_wet_mix(&self, mix: f32) {
        self.shared.dry_wet_mix.store(DRY_WET_MIX.clamp(mix));
    }

    /// Current dry/wet mix target.
    pub fn dry_wet_mix(&self) -> f32 {
        self.shared.dry_wet_mix.load()
    }

    /// Set the pitch shift target in semitones (-12 to +12).
    pub fn set_pitch_semitones(&self, semitones: f32) {
        self.shared
            .pitch_semitones
            .store(PITCH_SEMITONES.clamp(semitones));
    }

    /// Current pitch shift target in semitones.
    pub fn pitch_semitones(&self) -> f32 {
        self.shared.pitch_semitones.load()
    }

    /// Enable or mute processing. Enabling arms a fade-in; while muted the
    /// engine outputs silence and holds its meters at zero.
    pub fn set_processing_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether processing is currently enabled.
    pub fn is_processing_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }

    /// Smoothed output level for `channel` (0 = left, 1 = right), linear
    /// 0..1. Out-of-range channels read as silence.
    pub fn level(&self, channel: usize) -> f32 {
        if channel < MAX_CHANNELS {
            self.shared.levels[channel].load()
        } else {
            0.0
        }
    }

    /// Smoothed output level in decibels, floored at -100 dB.
    pub fn level_db(&self, channel: usize) -> f32 {
        level_to_db(self.level(channel))
    }
}

impl fmt::Debug for EngineController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineController")
            .field("input_gain_db", &self.input_gain_db())
            .field("delay_time_ms", &self.delay_time_ms())
            .field("dry_wet_mix", &self.dry_wet_mix())
            .field("pitch_semitones", &self.pitch_semitones())
            .field("enabled", &self.is_processing_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> EngineController {
        EngineController {
            shared: Arc::new(SharedState::new()),
        }
    }

    #[test]
    fn test_defaults_match_ranges() {
        let c = controller();
        assert_eq!(c.input_gain_db(), 0.0);
        assert_eq!(c.delay_time_ms(), 100.0);
        assert_eq!(c.dry_wet_mix(), 0.5);
        assert_eq!(c.pitch_semitones(), 0.0);
        assert!(!c.is_processing_enabled());
    }

    #[test]
    fn test_setters_clamp() {
        let c = controller();
        c.set_input_gain_db(100.0);
        assert_eq!(c.input_gain_db(), 24.0);
        c.set_delay_time_ms(-5.0);
        assert_eq!(c.delay_time_ms(), 0.0);
        c.set_delay_time_ms(9999.0);
        assert_eq!(c.delay_time_ms(), 2000.0);
        c.set_dry_wet_mix(1.5);
        assert_eq!(c.dry_wet_mix(), 1.0);
        c.set_pitch_semitones(-40.0);
        assert_eq!(c.pitch_semitones(), -12.0);
    }

    #[test]
    fn test_non_finite_input_falls_back_to_default() {
        let c = controller();
        c.set_dry_wet_mix(f32::NAN);
        assert_eq!(c.dry_wet_mix(), 0.5);
        c.set_delay_time_ms(f32::INFINITY);
        assert_eq!(c.delay_time_ms(), 100.0);
    }

    #[test]
    fn test_levels_read_as_silence_out_of_range() {
        let c = controller();
        assert_eq!(c.level(5), 0.0);
        assert_eq!(c.level_db(0), -100.0);
    }

    #[test]
    fn test_clones_share_state() {
        let a = controller();
        let b = a.clone();
        a.set_delay_time_ms(250.0);
        assert_eq!(b.delay_time_ms(), 250.0);
    }
}
