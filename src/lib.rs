pub mod cache;
pub mod config;
pub mod error;
pub mod interpolate;
pub mod pipeline;
pub mod pose;
pub mod schedule;
#[cfg(any(test, feature = "synthetic"))]
pub mod synthetic;
pub mod tracker;
pub mod validation;

pub use config::Config;
pub use error::InputError;
pub use pipeline::{CacheStatus, CoordinateSpace, FrameInput, FrameOutput, LandmarkPipeline, QualityReport};
pub use pose::{Keypoint, KeypointIndex, KeypointSet};

/// `git describe` の結果
pub const VERSION: &str = env!("GIT_VERSION");
