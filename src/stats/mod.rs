//! Numeric building blocks: streaming statistics and signal smoothing.

mod low_pass;
mod running;

pub use low_pass::LowPassFilter;
pub use running::RunningStats;
