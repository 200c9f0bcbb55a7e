//! Audio engine for DAF - delayed auditory feedback
//!
//! This crate provides the real-time signal path:
//! - Engine: block orchestration, prepare/process/release lifecycle
//! - Delay: circular delay line with wrap-around addressing
//! - Pitch: unit interface, tape-style shifter, block adapter
//! - Fade: click-free ramp after re-enabling processing
//! - Meter: per-block RMS with smoothed, lock-free readout
//!
//! Control and audio run on different threads; all shared state crosses as
//! single-word atomics through [`EngineController`]. The per-block path
//! never allocates, locks or blocks.

mod config;
mod delay;
mod engine;
mod fade;
mod meter;
mod params;
mod pitch;
mod smoother;

/// Most channels the engine will ever process (stereo).
pub const MAX_CHANNELS: usize = 2;

pub use config::EngineConfig;
pub use delay::{DelayLine, OnePoleLowPass};
pub use engine::{AudioEngine, PrepareError};
pub use fade::FadeController;
pub use meter::{level_color, level_to_db, rms, LevelMeter, MeterRepaintGate};
pub use params::{
    EngineController, ParamRange, DELAY_TIME_MS, DRY_WET_MIX, INPUT_GAIN_DB, PITCH_SEMITONES,
};
pub use pitch::{PitchShifter, PitchUnit, TapeShifter};
pub use smoother::LinearSmoother;
