pub mod average;
pub mod kalman;
pub mod outlier;

pub use average::WeightedAverager;
pub use kalman::{AdaptiveKalmanFilter, MotionClass};
pub use outlier::{OutlierDetector, OutlierReason};
