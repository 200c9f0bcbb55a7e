//! Circular delay line with wrap-around addressing.

/// Per-channel circular sample buffer, sized once at prepare time.
///
/// Each `write_and_read` call stores the incoming sample at the write
/// cursor, reads the sample `delay_samples` behind it, then advances the
/// cursor. Buffer length is a power of two so the wrap is a mask.
pub struct DelayLine {
    /// One buffer per channel
    buffers: Vec<Vec<f32>>,
    /// Next index to overwrite, per channel
    write_pos: Vec<usize>,
    mask: usize,
}

impl DelayLine {
    /// Create an empty delay line. `resize` must run before any audio.
    pub fn new() -> Self {
        Self {
            buffers: Vec::new(),
            write_pos: Vec::new(),
            mask: 0,
        }
    }

    /// Reallocate and clear storage. Never called from the audio callback.
    pub fn resize(&mut self, channels: usize, max_delay_secs: f32, sample_rate: f64) {
        let len = ((max_delay_secs as f64 * sample_rate).ceil() as usize)
            .max(1)
            .next_power_of_two();
        self.buffers = vec![vec![0.0; len]; channels];
        self.write_pos = vec![0; channels];
        self.mask = len - 1;
    }

    /// Buffer length in samples (0 before `resize`).
    pub fn len(&self) -> usize {
        self.buffers.first().map_or(0, |b| b.len())
    }

    /// Whether `resize` has run yet.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Zero all stored samples and rewind the cursors.
    pub fn clear(&mut self) {
        for buf in &mut self.buffers {
            buf.fill(0.0);
        }
        for pos in &mut self.write_pos {
            *pos = 0;
        }
    }

    /// Write `input` at the cursor, read `delay_samples` behind it, advance.
    ///
    /// The delay is rounded to the nearest whole sample. The caller clamps
    /// requested delay times before conversion, so `delay_samples` never
    /// reaches the buffer length.
    #[inline]
    pub fn write_and_read(&mut self, channel: usize, input: f32, delay_samples: f32) -> f32 {
        let buf = &mut self.buffers[channel];
        let pos = self.write_pos[channel];
        buf[pos] = input;

        let delay = delay_samples.round() as usize;
        debug_assert!(delay <= self.mask, "delay {} exceeds buffer", delay);
        let read_pos = pos.wrapping_sub(delay) & self.mask;
        let out = buf[read_pos];

        self.write_pos[channel] = (pos + 1) & self.mask;
        out
    }
}

impl Default for DelayLine {
    fn default() -> Self {
        Self::new()
    }
}

/// One-pole low-pass used to darken the wet path.
pub struct OnePoleLowPass {
    coeff: f32,
    state: f32,
}

impl OnePoleLowPass {
    /// Create a filter that passes everything until `set_cutoff` runs.
    pub fn new() -> Self {
        Self {
            coeff: 0.0,
            state: 0.0,
        }
    }

    /// Set the cutoff frequency for the given sample rate.
    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f64) {
        self.coeff = (-2.0 * std::f32::consts::PI * cutoff_hz / sample_rate as f32).exp();
    }

    /// Zero the filter memory.
    pub fn reset(&mut self) {
        self.state = 0.0;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.state = input * (1.0 - self.coeff) + self.state * self.coeff;
        self.state
    }
}

impl Default for OnePoleLowPass {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_is_power_of_two() {
        let mut dl = DelayLine::new();
        dl.resize(2, 2.0, 44100.0);
        // 2 * 44100 = 88200, next power of two is 131072
        assert_eq!(dl.len(), 131072);
        assert!(dl.len().is_power_of_two());
    }

    #[test]
    fn test_round_trip_recovers_written_sequence() {
        let mut dl = DelayLine::new();
        dl.resize(1, 0.01, 12800.0); // 128 samples
        let len = dl.len();
        assert_eq!(len, 128);

        for delay in [1usize, 7, 64, 127] {
            dl.clear();
            for i in 0..len {
                let input = i as f32 + 1.0;
                let out = dl.write_and_read(0, input, delay as f32);
                if i >= delay {
                    assert_eq!(out, (i - delay) as f32 + 1.0, "delay {} index {}", delay, i);
                } else {
                    assert_eq!(out, 0.0, "delay {} index {}", delay, i);
                }
            }
        }
    }

    #[test]
    fn test_zero_delay_returns_input() {
        let mut dl = DelayLine::new();
        dl.resize(1, 0.01, 12800.0);
        assert_eq!(dl.write_and_read(0, 0.5, 0.0), 0.5);
        assert_eq!(dl.write_and_read(0, -0.25, 0.0), -0.25);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut dl = DelayLine::new();
        dl.resize(2, 0.01, 12800.0);
        dl.write_and_read(0, 1.0, 0.0);
        dl.write_and_read(1, -1.0, 0.0);
        assert_eq!(dl.write_and_read(0, 0.0, 1.0), 1.0);
        assert_eq!(dl.write_and_read(1, 0.0, 1.0), -1.0);
    }

    #[test]
    fn test_fractional_delay_rounds_to_nearest() {
        let mut dl = DelayLine::new();
        dl.resize(1, 0.01, 12800.0);
        // Write an impulse, then silence; a 2.4-sample request reads 2 back
        dl.write_and_read(0, 1.0, 0.0);
        dl.write_and_read(0, 0.0, 0.0);
        assert_eq!(dl.write_and_read(0, 0.0, 2.4), 1.0);
    }

    #[test]
    fn test_clear_zeroes_history() {
        let mut dl = DelayLine::new();
        dl.resize(1, 0.01, 12800.0);
        for _ in 0..32 {
            dl.write_and_read(0, 1.0, 0.0);
        }
        dl.clear();
        assert_eq!(dl.write_and_read(0, 0.0, 16.0), 0.0);
    }

    #[test]
    fn test_one_pole_settles_on_dc() {
        let mut lp = OnePoleLowPass::new();
        lp.set_cutoff(1000.0, 48000.0);
        let mut out = 0.0;
        for _ in 0..48000 {
            out = lp.process(1.0);
        }
        assert!((out - 1.0).abs() < 1e-3, "settled at {}", out);
    }
}
