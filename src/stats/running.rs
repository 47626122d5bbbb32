//! Welford's online mean/variance accumulator

/// Streaming mean and sample standard deviation without retained history.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    sum_sq: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.sum_sq += delta * delta2;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean, `0.0` before the first sample.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Unbiased sample variance; undefined below two samples.
    pub fn variance(&self) -> Option<f64> {
        (self.count >= 2).then(|| self.sum_sq / (self.count - 1) as f64)
    }

    /// Sample standard deviation; undefined below two samples.
    pub fn stddev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}
