//! Fixed-size rolling sample buffer with running min / max / mean.
//!
//! Used to smooth noisy sensor readings (yaw rate) so that plausibility
//! checks compare against the envelope of recent measurements rather than
//! a single sample.

/// Number of samples retained.
pub const SAMPLE_BUFFER_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    values: [f64; SAMPLE_BUFFER_LEN],
    filled: usize,
    min: f64,
    max: f64,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            values: [0.0; SAMPLE_BUFFER_LEN],
            filled: 0,
            min: 0.0,
            max: 0.0,
        }
    }

    /// Push `sample`, evicting the oldest one once the buffer is full.
    pub fn push(&mut self, sample: f64) {
        self.values.copy_within(0..SAMPLE_BUFFER_LEN - 1, 1);
        self.values[0] = sample;
        self.filled = (self.filled + 1).min(SAMPLE_BUFFER_LEN);

        let live = &self.values[..self.filled];
        self.min = live.iter().copied().fold(f64::INFINITY, f64::min);
        self.max = live.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Smallest retained sample, `0.0` when empty.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest retained sample, `0.0` when empty.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Mean of the retained samples, `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.filled == 0 {
            return 0.0;
        }
        self.values[..self.filled].iter().sum::<f64>() / self.filled as f64
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_reports_zero() {
        let buf = SampleBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.min(), 0.0);
        assert_eq!(buf.max(), 0.0);
        assert_eq!(buf.mean(), 0.0);
    }

    #[test]
    fn partial_buffer_ignores_unfilled_slots() {
        let mut buf = SampleBuffer::new();
        buf.push(0.5);
        buf.push(0.7);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.min(), 0.5);
        assert_eq!(buf.max(), 0.7);
        assert!((buf.mean() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn oldest_sample_is_evicted() {
        let mut buf = SampleBuffer::new();
        buf.push(-10.0);
        for _ in 0..SAMPLE_BUFFER_LEN {
            buf.push(1.0);
        }
        assert_eq!(buf.len(), SAMPLE_BUFFER_LEN);
        assert_eq!(buf.min(), 1.0);
        assert_eq!(buf.max(), 1.0);
    }

    #[test]
    fn clear_resets_state() {
        let mut buf = SampleBuffer::new();
        buf.push(3.0);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.max(), 0.0);
    }
}
