use thiserror::Error;

/// パイプライン入口で弾く不正入力
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("expected {expected} keypoints, got {got}")]
    PointCount { expected: usize, got: usize },

    #[error("keypoint {index} has a non-finite {field}")]
    NonFinite { index: usize, field: &'static str },

    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("non-finite frame timestamp")]
    InvalidTimestamp,
}
