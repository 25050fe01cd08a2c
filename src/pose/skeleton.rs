//! 33 点スケルトンの静的テーブル（隣接・左右対・解剖学的チェーン）

use super::keypoint::KeypointIndex;
use KeypointIndex::*;

/// 左右対称のランドマーク対 (left, right)
pub const MIRROR_PAIRS: [(KeypointIndex, KeypointIndex); 16] = [
    (LeftEyeInner, RightEyeInner),
    (LeftEye, RightEye),
    (LeftEyeOuter, RightEyeOuter),
    (LeftEar, RightEar),
    (MouthLeft, MouthRight),
    (LeftShoulder, RightShoulder),
    (LeftElbow, RightElbow),
    (LeftWrist, RightWrist),
    (LeftPinky, RightPinky),
    (LeftIndex, RightIndex),
    (LeftThumb, RightThumb),
    (LeftHip, RightHip),
    (LeftKnee, RightKnee),
    (LeftAnkle, RightAnkle),
    (LeftHeel, RightHeel),
    (LeftFootIndex, RightFootIndex),
];

/// 対称性チェックに使う 6 対
pub const SYMMETRY_PAIRS: [(KeypointIndex, KeypointIndex); 6] = [
    (LeftShoulder, RightShoulder),
    (LeftElbow, RightElbow),
    (LeftWrist, RightWrist),
    (LeftHip, RightHip),
    (LeftKnee, RightKnee),
    (LeftAnkle, RightAnkle),
];

/// 反対側の対応点
pub fn mirror_of(id: KeypointIndex) -> Option<KeypointIndex> {
    MIRROR_PAIRS.iter().find_map(|&(l, r)| {
        if l == id {
            Some(r)
        } else if r == id {
            Some(l)
        } else {
            None
        }
    })
}

/// 関節を両端点の内分点として近似するチェーン
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnatomicalChain {
    pub joint: KeypointIndex,
    pub start: KeypointIndex,
    pub end: KeypointIndex,
    /// start からの内分比
    pub ratio: f64,
}

pub const CHAINS: [AnatomicalChain; 4] = [
    AnatomicalChain { joint: LeftElbow, start: LeftShoulder, end: LeftWrist, ratio: 0.6 },
    AnatomicalChain { joint: RightElbow, start: RightShoulder, end: RightWrist, ratio: 0.6 },
    AnatomicalChain { joint: LeftKnee, start: LeftHip, end: LeftAnkle, ratio: 0.5 },
    AnatomicalChain { joint: RightKnee, start: RightHip, end: RightAnkle, ratio: 0.5 },
];

pub fn chain_for(id: KeypointIndex) -> Option<&'static AnatomicalChain> {
    CHAINS.iter().find(|c| c.joint == id)
}

/// 近い順に並べた解剖学的な隣接点
pub fn neighbors(id: KeypointIndex) -> &'static [KeypointIndex] {
    match id {
        Nose => &[LeftEye, RightEye, MouthLeft, MouthRight, LeftEyeInner, RightEyeInner],
        LeftEyeInner => &[LeftEye, Nose, RightEyeInner],
        LeftEye => &[LeftEyeInner, LeftEyeOuter, Nose],
        LeftEyeOuter => &[LeftEye, LeftEar, LeftEyeInner],
        RightEyeInner => &[RightEye, Nose, LeftEyeInner],
        RightEye => &[RightEyeInner, RightEyeOuter, Nose],
        RightEyeOuter => &[RightEye, RightEar, RightEyeInner],
        LeftEar => &[LeftEyeOuter, LeftEye, LeftShoulder],
        RightEar => &[RightEyeOuter, RightEye, RightShoulder],
        MouthLeft => &[MouthRight, Nose, LeftShoulder],
        MouthRight => &[MouthLeft, Nose, RightShoulder],
        LeftShoulder => &[RightShoulder, LeftElbow, LeftHip, LeftEar],
        RightShoulder => &[LeftShoulder, RightElbow, RightHip, RightEar],
        LeftElbow => &[LeftShoulder, LeftWrist],
        RightElbow => &[RightShoulder, RightWrist],
        LeftWrist => &[LeftElbow, LeftIndex, LeftPinky, LeftThumb],
        RightWrist => &[RightElbow, RightIndex, RightPinky, RightThumb],
        LeftPinky => &[LeftWrist, LeftIndex, LeftThumb],
        RightPinky => &[RightWrist, RightIndex, RightThumb],
        LeftIndex => &[LeftWrist, LeftPinky, LeftThumb],
        RightIndex => &[RightWrist, RightPinky, RightThumb],
        LeftThumb => &[LeftWrist, LeftIndex, LeftPinky],
        RightThumb => &[RightWrist, RightIndex, RightPinky],
        LeftHip => &[RightHip, LeftKnee, LeftShoulder],
        RightHip => &[LeftHip, RightKnee, RightShoulder],
        LeftKnee => &[LeftHip, LeftAnkle],
        RightKnee => &[RightHip, RightAnkle],
        LeftAnkle => &[LeftKnee, LeftHeel, LeftFootIndex],
        RightAnkle => &[RightKnee, RightHeel, RightFootIndex],
        LeftHeel => &[LeftAnkle, LeftFootIndex],
        RightHeel => &[RightAnkle, RightFootIndex],
        LeftFootIndex => &[LeftHeel, LeftAnkle],
        RightFootIndex => &[RightHeel, RightAnkle],
    }
}

/// プロポーション検査の対象となる体節
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodySegment {
    ShoulderWidth,
    HipWidth,
    UpperArm,
    Forearm,
    Thigh,
    Shin,
    Torso,
}

impl BodySegment {
    pub const ALL: [BodySegment; 7] = [
        BodySegment::ShoulderWidth,
        BodySegment::HipWidth,
        BodySegment::UpperArm,
        BodySegment::Forearm,
        BodySegment::Thigh,
        BodySegment::Shin,
        BodySegment::Torso,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BodySegment::ShoulderWidth => "shoulder_width",
            BodySegment::HipWidth => "hip_width",
            BodySegment::UpperArm => "upper_arm",
            BodySegment::Forearm => "forearm",
            BodySegment::Thigh => "thigh",
            BodySegment::Shin => "shin",
            BodySegment::Torso => "torso",
        }
    }

    /// 長さの計算に使う端点。左右がある体節は両側を返す
    pub fn endpoints(self) -> &'static [(KeypointIndex, KeypointIndex)] {
        match self {
            BodySegment::ShoulderWidth => &[(LeftShoulder, RightShoulder)],
            BodySegment::HipWidth => &[(LeftHip, RightHip)],
            BodySegment::UpperArm => &[(LeftShoulder, LeftElbow), (RightShoulder, RightElbow)],
            BodySegment::Forearm => &[(LeftElbow, LeftWrist), (RightElbow, RightWrist)],
            BodySegment::Thigh => &[(LeftHip, LeftKnee), (RightHip, RightKnee)],
            BodySegment::Shin => &[(LeftKnee, LeftAnkle), (RightKnee, RightAnkle)],
            // 肩中点〜腰中点は特別扱い
            BodySegment::Torso => &[(LeftShoulder, LeftHip), (RightShoulder, RightHip)],
        }
    }
}

impl std::fmt::Display for BodySegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
