//! 解剖学的妥当性チェック
//!
//! 各検査は失敗するたびにスコアへペナルティ係数を掛け、理由を issues に積む。
//! 欠損点や退化した幾何もエラーにはせず、issue と部分ペナルティに変換する。

use std::fmt;

use crate::config::{Bounds, ValidatorConfig};
use crate::pose::skeleton::SYMMETRY_PAIRS;
use crate::pose::{BodySegment, Keypoint, KeypointIndex, KeypointSet};

use KeypointIndex::*;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    MissingLandmark { check: Check, landmark: KeypointIndex },
    BodyTooSmall { height: f64, min: f64 },
    Proportion { segment: BodySegment, ratio: f64, bounds: Bounds },
    Asymmetry { left: KeypointIndex, right: KeypointIndex, asymmetry: f64 },
    JointAngle { joint: KeypointIndex, angle: f64, bounds: Bounds },
    WristCrossing { wrist: KeypointIndex },
    AnkleCrossing { ankle: KeypointIndex },
    DegenerateGeometry { check: Check },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingLandmark { check, landmark } => {
                write!(f, "{}: required landmark {} not visible", check, landmark)
            }
            ValidationIssue::BodyTooSmall { height, min } => write!(
                f,
                "proportions skipped: estimated body height {:.1} below minimum {:.1}",
                height, min
            ),
            ValidationIssue::Proportion { segment, ratio, bounds } => write!(
                f,
                "{} ratio {:.3} outside [{:.3}, {:.3}]",
                segment, ratio, bounds.min, bounds.max
            ),
            ValidationIssue::Asymmetry { left, right, asymmetry } => write!(
                f,
                "{}/{} asymmetry {:.0}%",
                left,
                right,
                asymmetry * 100.0
            ),
            ValidationIssue::JointAngle { joint, angle, bounds } => write!(
                f,
                "{} flexion {:.1}° outside [{:.0}°, {:.0}°]",
                joint, angle, bounds.min, bounds.max
            ),
            ValidationIssue::WristCrossing { wrist } => {
                write!(f, "{} crosses far past the opposite shoulder", wrist)
            }
            ValidationIssue::AnkleCrossing { ankle } => {
                write!(f, "{} crosses far past the hip centerline", ankle)
            }
            ValidationIssue::DegenerateGeometry { check } => {
                write!(f, "{}: degenerate geometry", check)
            }
        }
    }
}

/// 個別の検査
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Proportions,
    Symmetry,
    JointAngles,
    ImpossiblePose,
}

impl Check {
    pub const ALL: [Check; 4] = [
        Check::Proportions,
        Check::Symmetry,
        Check::JointAngles,
        Check::ImpossiblePose,
    ];

    /// 検査が参照するランドマーク
    pub fn landmarks(self) -> &'static [KeypointIndex] {
        match self {
            Check::Proportions => &[
                Nose, LeftShoulder, RightShoulder, LeftElbow, RightElbow, LeftWrist,
                RightWrist, LeftHip, RightHip, LeftKnee, RightKnee, LeftAnkle, RightAnkle,
            ],
            Check::Symmetry => &[
                LeftShoulder, RightShoulder, LeftElbow, RightElbow, LeftWrist, RightWrist,
                LeftHip, RightHip, LeftKnee, RightKnee, LeftAnkle, RightAnkle,
            ],
            Check::JointAngles => &[
                LeftShoulder, RightShoulder, LeftElbow, RightElbow, LeftWrist, RightWrist,
                LeftHip, RightHip, LeftKnee, RightKnee, LeftAnkle, RightAnkle,
            ],
            Check::ImpossiblePose => &[
                LeftShoulder, RightShoulder, LeftWrist, RightWrist, LeftHip, RightHip,
                LeftAnkle, RightAnkle,
            ],
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Check::Proportions => "proportions",
            Check::Symmetry => "symmetry",
            Check::JointAngles => "joint angles",
            Check::ImpossiblePose => "impossible pose",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub score: f64,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// 検査対象がないときの結果
    pub fn clean() -> Self {
        Self {
            valid: true,
            score: 1.0,
            issues: Vec::new(),
        }
    }

    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.to_string()).collect()
    }
}

/// 検査中の累積スコア
struct Tally {
    score: f64,
    issues: Vec<ValidationIssue>,
}

impl Tally {
    fn penalize(&mut self, issue: ValidationIssue, factor: f64) {
        self.score *= factor;
        self.issues.push(issue);
    }
}

pub struct AnatomicalValidator {
    config: ValidatorConfig,
}

impl AnatomicalValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self::new(config.clone())
    }

    /// 全検査を実行
    pub fn validate(&self, set: &KeypointSet) -> ValidationReport {
        self.run(set, &Check::ALL)
    }

    /// `members` に関係する検査だけを実行
    pub fn validate_members(&self, set: &KeypointSet, members: &[KeypointIndex]) -> ValidationReport {
        let checks: Vec<Check> = Check::ALL
            .iter()
            .copied()
            .filter(|c| c.landmarks().iter().any(|l| members.contains(l)))
            .collect();
        if checks.is_empty() {
            return ValidationReport::clean();
        }
        self.run(set, &checks)
    }

    fn run(&self, set: &KeypointSet, checks: &[Check]) -> ValidationReport {
        let mut tally = Tally {
            score: 1.0,
            issues: Vec::new(),
        };
        for &check in checks {
            let result = match check {
                Check::Proportions => self.check_proportions(set, &mut tally),
                Check::Symmetry => self.check_symmetry(set, &mut tally),
                Check::JointAngles => self.check_joint_angles(set, &mut tally),
                Check::ImpossiblePose => self.check_impossible_pose(set, &mut tally),
            };
            if let Err(issue) = result {
                tally.penalize(issue, self.config.degenerate_penalty);
            }
        }
        let score = tally.score.clamp(0.0, 1.0);
        ValidationReport {
            valid: score > self.config.valid_score,
            score,
            issues: tally.issues,
        }
    }

    fn visible<'a>(&self, set: &'a KeypointSet, id: KeypointIndex) -> Option<&'a Keypoint> {
        let kp = set.get(id);
        if kp.is_valid(self.config.visibility_threshold) && kp.x.is_finite() && kp.y.is_finite() {
            Some(kp)
        } else {
            None
        }
    }

    fn require<'a>(
        &self,
        set: &'a KeypointSet,
        id: KeypointIndex,
        check: Check,
    ) -> Result<&'a Keypoint, ValidationIssue> {
        self.visible(set, id)
            .ok_or(ValidationIssue::MissingLandmark { check, landmark: id })
    }

    /// 鼻から最も低い足首までの縦距離
    fn body_height(&self, set: &KeypointSet) -> Result<f64, ValidationIssue> {
        let nose = self.require(set, Nose, Check::Proportions)?;
        let lowest = [LeftAnkle, RightAnkle]
            .iter()
            .filter_map(|&id| self.visible(set, id))
            .map(|k| k.y)
            .fold(None, |acc: Option<f64>, y| Some(acc.map_or(y, |a| a.max(y))))
            .ok_or(ValidationIssue::MissingLandmark {
                check: Check::Proportions,
                landmark: LeftAnkle,
            })?;
        Ok((lowest - nose.y).abs())
    }

    fn segment_length(&self, set: &KeypointSet, segment: BodySegment) -> Option<f64> {
        if segment == BodySegment::Torso {
            let ls = self.visible(set, LeftShoulder)?;
            let rs = self.visible(set, RightShoulder)?;
            let lh = self.visible(set, LeftHip)?;
            let rh = self.visible(set, RightHip)?;
            let dx = (ls.x + rs.x) / 2.0 - (lh.x + rh.x) / 2.0;
            let dy = (ls.y + rs.y) / 2.0 - (lh.y + rh.y) / 2.0;
            return Some((dx * dx + dy * dy).sqrt());
        }
        let lengths: Vec<f64> = segment
            .endpoints()
            .iter()
            .filter_map(|&(a, b)| {
                let a = self.visible(set, a)?;
                let b = self.visible(set, b)?;
                Some(a.distance_2d(b))
            })
            .collect();
        if lengths.is_empty() {
            None
        } else {
            Some(lengths.iter().sum::<f64>() / lengths.len() as f64)
        }
    }

    fn check_proportions(&self, set: &KeypointSet, tally: &mut Tally) -> Result<(), ValidationIssue> {
        let height = self.body_height(set)?;
        if height < self.config.min_body_height {
            tally.penalize(
                ValidationIssue::BodyTooSmall {
                    height,
                    min: self.config.min_body_height,
                },
                self.config.degenerate_penalty,
            );
            return Ok(());
        }
        for segment in BodySegment::ALL {
            // 端点が見えていない体節は補間側で扱う
            let Some(length) = self.segment_length(set, segment) else {
                continue;
            };
            let ratio = length / height;
            let bounds = self.config.proportions.get(segment);
            if !bounds.contains(ratio) {
                tally.penalize(
                    ValidationIssue::Proportion { segment, ratio, bounds },
                    self.config.proportion_penalty,
                );
            }
        }
        Ok(())
    }

    fn check_symmetry(&self, set: &KeypointSet, tally: &mut Tally) -> Result<(), ValidationIssue> {
        self.require(set, LeftHip, Check::Symmetry)?;
        self.require(set, RightHip, Check::Symmetry)?;
        let (cx, _) = set
            .hip_center(self.config.visibility_threshold)
            .ok_or(ValidationIssue::DegenerateGeometry { check: Check::Symmetry })?;

        for &(left, right) in SYMMETRY_PAIRS.iter() {
            let (Some(l), Some(r)) = (self.visible(set, left), self.visible(set, right)) else {
                continue;
            };
            let dl = (l.x - cx).abs();
            let dr = (r.x - cx).abs();
            let larger = dl.max(dr);
            if larger < 1e-6 {
                continue;
            }
            let asymmetry = (dl - dr).abs() / larger;
            if asymmetry > self.config.symmetry_threshold {
                tally.penalize(
                    ValidationIssue::Asymmetry { left, right, asymmetry },
                    self.config.symmetry_penalty,
                );
            }
        }
        Ok(())
    }

    fn check_joint_angles(&self, set: &KeypointSet, tally: &mut Tally) -> Result<(), ValidationIssue> {
        let joints = [
            (LeftShoulder, LeftElbow, LeftWrist, self.config.elbow_range),
            (RightShoulder, RightElbow, RightWrist, self.config.elbow_range),
            (LeftHip, LeftKnee, LeftAnkle, self.config.knee_range),
            (RightHip, RightKnee, RightAnkle, self.config.knee_range),
        ];
        for (a, joint, c, bounds) in joints {
            let (Some(pa), Some(pj), Some(pc)) = (
                self.visible(set, a),
                self.visible(set, joint),
                self.visible(set, c),
            ) else {
                continue;
            };
            let Some(interior) = interior_angle(pa, pj, pc) else {
                tally.penalize(
                    ValidationIssue::DegenerateGeometry { check: Check::JointAngles },
                    self.config.degenerate_penalty,
                );
                continue;
            };
            let flexion = (180.0 - interior).max(0.0);
            if !bounds.contains(flexion) {
                tally.penalize(
                    ValidationIssue::JointAngle { joint, angle: flexion, bounds },
                    self.config.joint_angle_penalty,
                );
            }
        }
        Ok(())
    }

    fn check_impossible_pose(&self, set: &KeypointSet, tally: &mut Tally) -> Result<(), ValidationIssue> {
        let ls = self.require(set, LeftShoulder, Check::ImpossiblePose)?;
        let rs = self.require(set, RightShoulder, Check::ImpossiblePose)?;
        let shoulder_width = (ls.x - rs.x).abs();
        if shoulder_width < 1e-6 {
            return Err(ValidationIssue::DegenerateGeometry { check: Check::ImpossiblePose });
        }
        // 画像上で左側の点が +x にあるかどうか
        let side = (ls.x - rs.x).signum();
        let wrist_margin = self.config.wrist_cross_tolerance * shoulder_width;

        if let Some(lw) = self.visible(set, LeftWrist) {
            if (lw.x - rs.x) * side < -wrist_margin {
                tally.penalize(
                    ValidationIssue::WristCrossing { wrist: LeftWrist },
                    self.config.impossible_pose_penalty,
                );
            }
        }
        if let Some(rw) = self.visible(set, RightWrist) {
            if (rw.x - ls.x) * side > wrist_margin {
                tally.penalize(
                    ValidationIssue::WristCrossing { wrist: RightWrist },
                    self.config.impossible_pose_penalty,
                );
            }
        }

        let (Some(lh), Some(rh)) = (self.visible(set, LeftHip), self.visible(set, RightHip)) else {
            return Ok(());
        };
        // 腰が潰れていれば肩を基準にする
        let (cx, reference_width) = if (lh.x - rh.x).abs() < 1e-6 {
            tally.penalize(
                ValidationIssue::DegenerateGeometry { check: Check::ImpossiblePose },
                self.config.degenerate_penalty,
            );
            ((ls.x + rs.x) / 2.0, shoulder_width)
        } else {
            ((lh.x + rh.x) / 2.0, (lh.x - rh.x).abs())
        };
        let ankle_margin = self.config.ankle_cross_tolerance * reference_width;
        if let Some(la) = self.visible(set, LeftAnkle) {
            if (la.x - cx) * side < -ankle_margin {
                tally.penalize(
                    ValidationIssue::AnkleCrossing { ankle: LeftAnkle },
                    self.config.impossible_pose_penalty,
                );
            }
        }
        if let Some(ra) = self.visible(set, RightAnkle) {
            if (ra.x - cx) * side > ankle_margin {
                tally.penalize(
                    ValidationIssue::AnkleCrossing { ankle: RightAnkle },
                    self.config.impossible_pose_penalty,
                );
            }
        }
        Ok(())
    }
}

/// 頂点 `vertex` における角度（度）。辺の長さが 0 なら None
fn interior_angle(a: &Keypoint, vertex: &Keypoint, c: &Keypoint) -> Option<f64> {
    let (v1x, v1y) = (a.x - vertex.x, a.y - vertex.y);
    let (v2x, v2y) = (c.x - vertex.x, c.y - vertex.y);
    let n1 = (v1x * v1x + v1y * v1y).sqrt();
    let n2 = (v2x * v2x + v2y * v2y).sqrt();
    if n1 < 1e-9 || n2 < 1e-9 {
        return None;
    }
    let cos = ((v1x * v2x + v1y * v2y) / (n1 * n2)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::standing_pose;

    fn validator() -> AnatomicalValidator {
        AnatomicalValidator::from_config(&ValidatorConfig::default())
    }

    fn move_point(set: &mut KeypointSet, id: KeypointIndex, x: f64, y: f64) {
        let kp = *set.get(id);
        set.set(id, kp.with_position(x, y, kp.z));
    }

    #[test]
    fn test_standing_pose_is_clean() {
        let report = validator().validate(&standing_pose(0.9, 0.0));
        assert!(report.valid);
        assert_eq!(report.score, 1.0);
        assert!(report.issues.is_empty(), "{:?}", report.issue_messages());
    }

    #[test]
    fn test_shoulder_width_boundary() {
        let mut at_boundary = standing_pose(0.9, 0.0);
        // 肩幅 300 / 体高 1000 = 0.30（上限ちょうど）
        move_point(&mut at_boundary, LeftShoulder, 650.0, 250.0);
        move_point(&mut at_boundary, RightShoulder, 350.0, 250.0);
        let accepted = validator().validate(&at_boundary);
        assert!(accepted.issues.is_empty(), "{:?}", accepted.issue_messages());

        let mut past = at_boundary.clone();
        move_point(&mut past, LeftShoulder, 650.5, 250.0);
        move_point(&mut past, RightShoulder, 349.5, 250.0);
        let flagged = validator().validate(&past);
        assert_eq!(flagged.issues.len(), 1);
        assert!(matches!(
            flagged.issues[0],
            ValidationIssue::Proportion { segment: BodySegment::ShoulderWidth, .. }
        ));
        assert!(flagged.score < accepted.score);
    }

    #[test]
    fn test_small_body_skips_proportions() {
        let mut set = standing_pose(0.9, 0.0);
        move_point(&mut set, Nose, 500.0, 1080.0);
        let report = validator().validate_members(&set, &[Nose]);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ValidationIssue::BodyTooSmall { .. })));
        assert!(report
            .issues
            .iter()
            .all(|i| !matches!(i, ValidationIssue::Proportion { .. })));
    }

    #[test]
    fn test_asymmetry_flagged() {
        let mut set = standing_pose(0.9, 0.0);
        // 右肘だけ中心線に寄せる: 左 120, 右 20
        move_point(&mut set, RightElbow, 480.0, 420.0);
        let report = validator().validate(&set);
        assert!(report.issues.iter().any(|i| matches!(
            i,
            ValidationIssue::Asymmetry { left: LeftElbow, right: RightElbow, .. }
        )));
        assert!(report.score < 1.0);
    }

    #[test]
    fn test_elbow_over_flexed() {
        let mut set = standing_pose(0.9, 0.0);
        // 手首を肩のすぐ横に折りたたむ
        move_point(&mut set, LeftWrist, 610.0, 260.0);
        let report = validator().validate_members(&set, &[LeftElbow]);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ValidationIssue::JointAngle { joint: LeftElbow, .. })));
    }

    #[test]
    fn test_wrist_crossing() {
        let mut set = standing_pose(0.9, 0.0);
        // 左手首が右肩(x=400)より 0.3*200=60 以上右側へ
        move_point(&mut set, LeftWrist, 300.0, 400.0);
        let report = validator().validate(&set);
        assert!(report
            .issues
            .contains(&ValidationIssue::WristCrossing { wrist: LeftWrist }));
    }

    #[test]
    fn test_ankle_crossing() {
        let mut set = standing_pose(0.9, 0.0);
        move_point(&mut set, RightAnkle, 600.0, 1100.0);
        let report = validator().validate_members(&set, &[RightAnkle]);
        assert!(report
            .issues
            .contains(&ValidationIssue::AnkleCrossing { ankle: RightAnkle }));
    }

    #[test]
    fn test_missing_landmark_is_partial_penalty() {
        let mut set = standing_pose(0.9, 0.0);
        let hip = set.get(LeftHip).with_visibility(0.0);
        set.set(LeftHip, hip);
        let report = validator().validate(&set);
        assert!(report.issues.iter().any(|i| matches!(
            i,
            ValidationIssue::MissingLandmark { check: Check::Symmetry, landmark: LeftHip }
        )));
        assert!(report.score > 0.6);
        assert!(report.valid);
    }

    #[test]
    fn test_degenerate_joint_geometry() {
        let mut set = standing_pose(0.9, 0.0);
        move_point(&mut set, LeftElbow, 600.0, 250.0);
        let report = validator().validate_members(&set, &[LeftElbow]);
        assert!(report.issues.iter().any(|i| matches!(
            i,
            ValidationIssue::DegenerateGeometry { check: Check::JointAngles }
        )));
    }

    #[test]
    fn test_degenerate_joint_does_not_hide_other_joints() {
        let mut set = standing_pose(0.9, 0.0);
        move_point(&mut set, LeftElbow, 600.0, 250.0);
        // 右膝を深く曲げる
        move_point(&mut set, RightAnkle, 445.0, 640.0);
        let report = validator().validate_members(&set, &[LeftElbow, RightKnee]);
        assert!(report.issues.iter().any(|i| matches!(
            i,
            ValidationIssue::DegenerateGeometry { check: Check::JointAngles }
        )));
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ValidationIssue::JointAngle { joint: RightKnee, .. })));
    }

    #[test]
    fn test_collapsed_hips_still_check_ankles() {
        let mut set = standing_pose(0.9, 0.0);
        move_point(&mut set, LeftHip, 500.0, 600.0);
        move_point(&mut set, RightHip, 500.0, 600.0);
        // 肩中心 500・肩幅 200 の半分より内側へ交差
        move_point(&mut set, LeftAnkle, 380.0, 1100.0);
        let report = validator().validate(&set);
        assert!(report.issues.iter().any(|i| matches!(
            i,
            ValidationIssue::DegenerateGeometry { check: Check::ImpossiblePose }
        )));
        assert!(report
            .issues
            .contains(&ValidationIssue::AnkleCrossing { ankle: LeftAnkle }));
    }

    #[test]
    fn test_members_without_checks_are_clean() {
        let mut set = standing_pose(0.9, 0.0);
        move_point(&mut set, LeftWrist, 300.0, 400.0);
        let report = validator().validate_members(&set, &[LeftHeel, RightFootIndex]);
        assert_eq!(report, ValidationReport::clean());
    }

    #[test]
    fn test_many_failures_invalid() {
        let mut set = standing_pose(0.9, 0.0);
        move_point(&mut set, LeftWrist, 300.0, 400.0);
        move_point(&mut set, RightWrist, 700.0, 400.0);
        move_point(&mut set, LeftAnkle, 400.0, 1100.0);
        let report = validator().validate(&set);
        assert!(!report.valid);
        assert!(report.score <= 0.6);
    }

    #[test]
    fn test_interior_angle() {
        let a = Keypoint::new(0.0, 1.0, 0.0, 1.0, 0.0);
        let v = Keypoint::new(0.0, 0.0, 0.0, 1.0, 0.0);
        let c = Keypoint::new(1.0, 0.0, 0.0, 1.0, 0.0);
        assert!((interior_angle(&a, &v, &c).unwrap() - 90.0).abs() < 1e-9);
        assert!(interior_angle(&v, &v, &c).is_none());
    }
}
