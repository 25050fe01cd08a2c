/// MediaPipe Pose の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl KeypointIndex {
    pub const COUNT: usize = 33;

    pub const ALL: [KeypointIndex; Self::COUNT] = {
        use KeypointIndex::*;
        [
            Nose, LeftEyeInner, LeftEye, LeftEyeOuter, RightEyeInner, RightEye,
            RightEyeOuter, LeftEar, RightEar, MouthLeft, MouthRight,
            LeftShoulder, RightShoulder, LeftElbow, RightElbow, LeftWrist,
            RightWrist, LeftPinky, RightPinky, LeftIndex, RightIndex,
            LeftThumb, RightThumb, LeftHip, RightHip, LeftKnee, RightKnee,
            LeftAnkle, RightAnkle, LeftHeel, RightHeel, LeftFootIndex,
            RightFootIndex,
        ]
    };

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        use KeypointIndex::*;
        match self {
            Nose => "nose",
            LeftEyeInner => "left_eye_inner",
            LeftEye => "left_eye",
            LeftEyeOuter => "left_eye_outer",
            RightEyeInner => "right_eye_inner",
            RightEye => "right_eye",
            RightEyeOuter => "right_eye_outer",
            LeftEar => "left_ear",
            RightEar => "right_ear",
            MouthLeft => "mouth_left",
            MouthRight => "mouth_right",
            LeftShoulder => "left_shoulder",
            RightShoulder => "right_shoulder",
            LeftElbow => "left_elbow",
            RightElbow => "right_elbow",
            LeftWrist => "left_wrist",
            RightWrist => "right_wrist",
            LeftPinky => "left_pinky",
            RightPinky => "right_pinky",
            LeftIndex => "left_index",
            RightIndex => "right_index",
            LeftThumb => "left_thumb",
            RightThumb => "right_thumb",
            LeftHip => "left_hip",
            RightHip => "right_hip",
            LeftKnee => "left_knee",
            RightKnee => "right_knee",
            LeftAnkle => "left_ankle",
            RightAnkle => "right_ankle",
            LeftHeel => "left_heel",
            RightHeel => "right_heel",
            LeftFootIndex => "left_foot_index",
            RightFootIndex => "right_foot_index",
        }
    }
}

impl std::fmt::Display for KeypointIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// 可視性スコア (0.0〜1.0)
    pub visibility: f64,
    /// フレームのタイムスタンプ（秒）
    pub timestamp: f64,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, z: f64, visibility: f64, timestamp: f64) -> Self {
        Self {
            x,
            y,
            z,
            visibility: visibility.clamp(0.0, 1.0),
            timestamp,
        }
    }

    /// 可視性が閾値以上か
    pub fn is_valid(&self, threshold: f64) -> bool {
        self.visibility >= threshold
    }

    pub fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// 位置だけ差し替えた新しい値を返す
    pub fn with_position(&self, x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, ..*self }
    }

    pub fn with_visibility(&self, visibility: f64) -> Self {
        Self {
            visibility: visibility.clamp(0.0, 1.0),
            ..*self
        }
    }

    pub fn distance_2d(&self, other: &Keypoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            visibility: 0.0,
            timestamp: 0.0,
        }
    }
}

/// 1 フレーム分の 33 ランドマーク
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointSet {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl KeypointSet {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    /// インデックスでキーポイントを取得
    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    pub fn set(&mut self, index: KeypointIndex, keypoint: Keypoint) {
        self.keypoints[index as usize] = keypoint;
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keypoint> {
        self.keypoints.iter()
    }

    /// 全キーポイントの平均可視性
    pub fn average_visibility(&self) -> f64 {
        let sum: f64 = self.keypoints.iter().map(|k| k.visibility).sum();
        sum / KeypointIndex::COUNT as f64
    }

    /// フレームのタイムスタンプ（全点の最大値）
    pub fn timestamp(&self) -> f64 {
        self.keypoints
            .iter()
            .map(|k| k.timestamp)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// 左右ヒップの中点。どちらかが閾値未満なら None
    pub fn hip_center(&self, threshold: f64) -> Option<(f64, f64)> {
        let left = self.get(KeypointIndex::LeftHip);
        let right = self.get(KeypointIndex::RightHip);
        if !left.is_valid(threshold) || !right.is_valid(threshold) {
            return None;
        }
        Some(((left.x + right.x) / 2.0, (left.y + right.y) / 2.0))
    }

    /// 全点を書き換えたタイムスタンプのコピー
    pub fn restamped(&self, timestamp: f64) -> Self {
        let mut out = self.clone();
        for kp in out.keypoints.iter_mut() {
            kp.timestamp = timestamp;
        }
        out
    }
}

impl Default for KeypointSet {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); KeypointIndex::COUNT],
        }
    }
}
