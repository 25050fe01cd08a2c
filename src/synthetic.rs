//! 合成ポーズ（ベンチマーク・テスト用）
//!
//! 正面を向いて立つ人物をピクセル座標で表す。鼻から足首までの縦距離が
//! ちょうど 1000px になるように置いている。

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::pose::{Keypoint, KeypointIndex, KeypointSet};

/// (x, y) を KeypointIndex 順に並べた正面立位
const STANDING: [(f64, f64); KeypointIndex::COUNT] = [
    (500.0, 100.0),  // nose
    (510.0, 90.0),   // left_eye_inner
    (520.0, 88.0),   // left_eye
    (530.0, 90.0),   // left_eye_outer
    (490.0, 90.0),   // right_eye_inner
    (480.0, 88.0),   // right_eye
    (470.0, 90.0),   // right_eye_outer
    (545.0, 100.0),  // left_ear
    (455.0, 100.0),  // right_ear
    (515.0, 125.0),  // mouth_left
    (485.0, 125.0),  // mouth_right
    (600.0, 250.0),  // left_shoulder
    (400.0, 250.0),  // right_shoulder
    (620.0, 420.0),  // left_elbow
    (380.0, 420.0),  // right_elbow
    (630.0, 580.0),  // left_wrist
    (370.0, 580.0),  // right_wrist
    (640.0, 610.0),  // left_pinky
    (360.0, 610.0),  // right_pinky
    (632.0, 620.0),  // left_index
    (368.0, 620.0),  // right_index
    (622.0, 605.0),  // left_thumb
    (378.0, 605.0),  // right_thumb
    (560.0, 600.0),  // left_hip
    (440.0, 600.0),  // right_hip
    (565.0, 850.0),  // left_knee
    (435.0, 850.0),  // right_knee
    (570.0, 1100.0), // left_ankle
    (430.0, 1100.0), // right_ankle
    (565.0, 1115.0), // left_heel
    (435.0, 1115.0), // right_heel
    (590.0, 1125.0), // left_foot_index
    (410.0, 1125.0), // right_foot_index
];

/// 正面立位。全点の可視性は `visibility`
pub fn standing_pose(visibility: f64, timestamp: f64) -> KeypointSet {
    let mut set = KeypointSet::default();
    for (&id, &(x, y)) in KeypointIndex::ALL.iter().zip(STANDING.iter()) {
        set.set(id, Keypoint::new(x, y, 0.0, visibility, timestamp));
    }
    set
}

/// 全点の x, y に σ=`sigma` のガウスノイズを足したコピー。σ が不正なら元のまま
pub fn with_noise<R: Rng + ?Sized>(set: &KeypointSet, sigma: f64, rng: &mut R) -> KeypointSet {
    let mut out = set.clone();
    let Ok(normal) = Normal::new(0.0, sigma) else {
        return out;
    };
    for kp in out.keypoints.iter_mut() {
        kp.x += normal.sample(rng);
        kp.y += normal.sample(rng);
    }
    out
}

/// 全点を (dx, dy) だけ平行移動したコピー
pub fn translated(set: &KeypointSet, dx: f64, dy: f64) -> KeypointSet {
    let mut out = set.clone();
    for kp in out.keypoints.iter_mut() {
        kp.x += dx;
        kp.y += dy;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_standing_pose_height() {
        let pose = standing_pose(0.9, 0.0);
        let nose = pose.get(KeypointIndex::Nose);
        let ankle = pose.get(KeypointIndex::LeftAnkle);
        assert_eq!(ankle.y - nose.y, 1000.0);
        assert_eq!(pose.hip_center(0.5), Some((500.0, 600.0)));
    }

    #[test]
    fn test_noise_moments() {
        let mut rng = StdRng::seed_from_u64(7);
        let base = standing_pose(0.9, 0.0);
        let samples: Vec<f64> = (0..600)
            .map(|_| with_noise(&base, 2.0, &mut rng))
            .flat_map(|set| {
                KeypointIndex::ALL
                    .iter()
                    .map(|&id| set.get(id).x - base.get(id).x)
                    .collect::<Vec<_>>()
            })
            .collect();
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.1, "mean={}", mean);
        assert!((var - 4.0).abs() < 0.25, "var={}", var);
    }

    #[test]
    fn test_invalid_sigma_leaves_pose() {
        let mut rng = StdRng::seed_from_u64(1);
        let base = standing_pose(0.9, 0.0);
        assert_eq!(with_noise(&base, f64::NAN, &mut rng), base);
    }
}
