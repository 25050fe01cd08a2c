//! キーポイントセットの量子化ハッシュと類似度

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::pose::{KeypointIndex, KeypointSet};

pub type Fingerprint = u64;

/// 類似度バケットに使う代表点
pub const KEY_LANDMARKS: [KeypointIndex; 5] = [
    KeypointIndex::Nose,
    KeypointIndex::LeftShoulder,
    KeypointIndex::RightShoulder,
    KeypointIndex::LeftHip,
    KeypointIndex::RightHip,
];

/// 量子化と比較に使う可視性の下限
pub const FINGERPRINT_VISIBILITY: f64 = 0.5;

fn quantize(v: f64, grid: f64) -> i64 {
    (v / grid.max(1e-9)).round() as i64
}

fn hash_points<'a>(
    set: &KeypointSet,
    ids: impl Iterator<Item = &'a KeypointIndex>,
    grid: f64,
    hasher: &mut DefaultHasher,
) {
    for &id in ids {
        let kp = set.get(id);
        let visible = kp.is_valid(FINGERPRINT_VISIBILITY);
        visible.hash(hasher);
        if visible {
            quantize(kp.x, grid).hash(hasher);
            quantize(kp.y, grid).hash(hasher);
        }
    }
}

/// 全 33 点を `grid` ピクセル格子に丸めたハッシュ
pub fn fingerprint(set: &KeypointSet, grid: f64) -> Fingerprint {
    let mut hasher = DefaultHasher::new();
    hash_points(set, KeypointIndex::ALL.iter(), grid, &mut hasher);
    hasher.finish()
}

/// 領域メンバーだけのハッシュ。メンバー構成も含めるので領域間で衝突しない
pub fn region_fingerprint(set: &KeypointSet, members: &[KeypointIndex], grid: f64) -> Fingerprint {
    let mut hasher = DefaultHasher::new();
    for id in members {
        id.index().hash(&mut hasher);
    }
    hash_points(set, members.iter(), grid, &mut hasher);
    hasher.finish()
}

/// 代表点の重心が入る粗いセル
pub fn bucket_cell(set: &KeypointSet, grid: f64) -> Option<(i64, i64)> {
    let visible: Vec<_> = KEY_LANDMARKS
        .iter()
        .map(|&id| set.get(id))
        .filter(|k| k.is_valid(FINGERPRINT_VISIBILITY))
        .collect();
    if visible.is_empty() {
        return None;
    }
    let n = visible.len() as f64;
    let cx = visible.iter().map(|k| k.x).sum::<f64>() / n;
    let cy = visible.iter().map(|k| k.y).sum::<f64>() / n;
    Some(((cx / grid).floor() as i64, (cy / grid).floor() as i64))
}

/// 両方で見えている点のうち、距離が `tolerance` px 以内の割合。比較できなければ 0
///
/// 検出ノイズ程度のずれしかないフレームだけが 1 に近づく。
pub fn similarity(stored: &KeypointSet, query: &KeypointSet, tolerance: f64) -> f64 {
    let mut shared = 0usize;
    let mut close = 0usize;
    for (a, b) in stored.iter().zip(query.iter()) {
        if !a.is_valid(FINGERPRINT_VISIBILITY) || !b.is_valid(FINGERPRINT_VISIBILITY) {
            continue;
        }
        shared += 1;
        if a.distance_2d(b) <= tolerance {
            close += 1;
        }
    }
    if shared == 0 {
        return 0.0;
    }
    close as f64 / shared as f64
}
