//! Frame scheduler implementations.

pub mod interval;
pub mod manual;

pub use interval::IntervalScheduler;
pub use manual::ManualScheduler;
