pub mod keypoint;
pub mod skeleton;

pub use keypoint::{Keypoint, KeypointIndex, KeypointSet};
pub use skeleton::{chain_for, mirror_of, neighbors, AnatomicalChain, BodySegment};
