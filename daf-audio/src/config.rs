//! Engine configuration.
//!
//! An explicit object handed to the engine at construction; nothing in the
//! signal path reads ambient global state. Hosts that persist settings do so
//! at their own boundary and feed the result in here.

/// Build-time knobs for the engine. All fields have workable defaults.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Channels to process: 1 (mono) or 2 (stereo)
    pub channels: usize,
    /// Delay-line capacity in seconds; delay-time requests clamp below this
    pub max_delay_secs: f32,
    /// Fade-in window after re-enable, in seconds
    pub fade_secs: f32,
    /// Parameter smoothing ramp, in seconds
    pub smoothing_secs: f32,
    /// Shifts smaller than this bypass the pitch stage entirely
    pub pitch_bypass_semitones: f32,
    /// Per-block EMA coefficient for the displayed level
    pub meter_smoothing: f32,
    /// Wet-path low-pass cutoff in Hz; 0 disables the filter
    pub wet_lowpass_hz: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            max_delay_secs: 2.0,
            fade_secs: 0.1,
            smoothing_secs: 0.1,
            pitch_bypass_semitones: 0.1,
            meter_smoothing: 0.2,
            wet_lowpass_hz: 5000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.channels, 2);
        assert_eq!(config.max_delay_secs, 2.0);
        assert!(config.fade_secs > 0.0);
        assert!(config.meter_smoothing > 0.0 && config.meter_smoothing <= 1.0);
    }
}
