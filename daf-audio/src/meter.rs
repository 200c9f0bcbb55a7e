//! Output level metering.
//!
//! Computes a per-block RMS magnitude per channel and smooths it with an
//! exponential moving average so the displayed value is perceptually steady
//! without lagging far behind the signal. Publication to other threads goes
//! through the atomic scalars in `params`; this module only does the math.
//!
//! Also provides the meter's presentation helpers: the green→yellow→red
//! color mapping and a repaint gate that suppresses redundant UI refreshes.

use crate::MAX_CHANNELS;

/// Per-channel block RMS with EMA smoothing.
pub struct LevelMeter {
    /// EMA coefficient applied once per block (1.0 = no smoothing)
    alpha: f32,
    smoothed: [f32; MAX_CHANNELS],
}

impl LevelMeter {
    /// Create a meter with the given per-block smoothing coefficient.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            smoothed: [0.0; MAX_CHANNELS],
        }
    }

    /// Fold one channel's block into the displayed value and return it.
    pub fn update(&mut self, channel: usize, block: &[f32]) -> f32 {
        let raw = rms(block);
        let smoothed = self.alpha * raw + (1.0 - self.alpha) * self.smoothed[channel];
        self.smoothed[channel] = smoothed;
        smoothed
    }

    /// Last displayed value for `channel`.
    pub fn level(&self, channel: usize) -> f32 {
        self.smoothed[channel]
    }

    /// Drop both channels back to silence.
    pub fn reset(&mut self) {
        self.smoothed = [0.0; MAX_CHANNELS];
    }
}

/// Block RMS: sqrt(mean(x²)). An empty block is silence.
pub fn rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f32 = block.iter().map(|s| s * s).sum();
    (sum / block.len() as f32).sqrt()
}

/// Convert a linear level to decibels, floored at -100 dB.
pub fn level_to_db(level: f32) -> f32 {
    if level > 1e-5 {
        20.0 * level.log10()
    } else {
        -100.0
    }
}

/// Map a level in [0, 1] to an RGB triple running green→yellow→red.
///
/// Below 0.6 the hue interpolates green to yellow; above, yellow to red.
/// Input outside [0, 1] is clamped, and the red/green components are clamped
/// after interpolation so the two segments join continuously.
pub fn level_color(level: f32) -> [f32; 3] {
    let level = level.clamp(0.0, 1.0);
    let r = (2.0 * level).min(1.0);
    let g = if level < 0.6 {
        1.0
    } else {
        (1.0 - (level - 0.6) * 2.5).clamp(0.0, 1.0)
    };
    [r, g, 0.0]
}

/// Suppresses meter repaints when the displayed value barely moved.
pub struct MeterRepaintGate {
    last_painted: f32,
    epsilon: f32,
}

impl MeterRepaintGate {
    pub fn new(epsilon: f32) -> Self {
        Self {
            last_painted: 0.0,
            epsilon,
        }
    }

    /// True when `level` differs from the last painted value by more than
    /// the configured epsilon; records `level` as painted in that case.
    pub fn should_repaint(&mut self, level: f32) -> bool {
        if (level - self.last_painted).abs() > self.epsilon {
            self.last_painted = level;
            true
        } else {
            false
        }
    }
}
