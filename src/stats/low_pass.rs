//! Second order Butterworth low pass filter
//!
//! Cutoff at 0.0025 of the sample rate. Cell voltage frames arrive at roughly 1Hz, which
//! puts the filter period around 400 seconds.

const GAIN: f64 = 6.100_617_875_806_624e-5;
const A1: f64 = -0.978_030_508_491_796_3;
const A2: f64 = 1.977_786_483_776_764;

#[derive(Debug, Clone, Copy, Default)]
pub struct LowPassFilter {
    taps: [f64; 3],
    initialized: bool,
}

impl LowPassFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the filter has seen at least one sample.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Jump straight to `value` without a transient.
    pub fn reset_to(&mut self, value: f64) {
        self.initialized = true;
        self.taps = [value / 4.0; 3];
    }

    pub fn step(&mut self, x: f64) {
        if !self.initialized {
            self.reset_to(x);
            return;
        }
        self.taps[0] = self.taps[1];
        self.taps[1] = self.taps[2];
        self.taps[2] = GAIN * x + A1 * self.taps[0] + A2 * self.taps[1];
    }

    pub fn get(&self) -> f64 {
        self.taps[0] + self.taps[2] + 2.0 * self.taps[1]
    }
}
