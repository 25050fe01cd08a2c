//! 時間予算つきの階層処理
//!
//! 33 点を優先度の異なる 4 段に分け、上の段から順に処理する。
//! Critical 段は必ず処理し、時間が足りなければ残りの段の予算を縮める。

pub mod clock;
pub mod scheduler;

use std::fmt;

use crate::config::SchedulerConfig;
use crate::pose::KeypointIndex;
use KeypointIndex::*;

pub use clock::{FrameClock, MonotonicClock, SteppedClock};
pub use scheduler::{FrameSchedule, HierarchicalScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Critical,
    High,
    Medium,
    Low,
}

const CRITICAL_MEMBERS: [KeypointIndex; 11] = [
    Nose, LeftShoulder, RightShoulder, LeftElbow, RightElbow, LeftHip, RightHip, LeftKnee,
    RightKnee, LeftAnkle, RightAnkle,
];
const HIGH_MEMBERS: [KeypointIndex; 8] = [
    LeftWrist, RightWrist, LeftPinky, RightPinky, LeftIndex, RightIndex, LeftThumb, RightThumb,
];
const MEDIUM_MEMBERS: [KeypointIndex; 10] = [
    LeftEyeInner, LeftEye, LeftEyeOuter, RightEyeInner, RightEye, RightEyeOuter, LeftEar, RightEar,
    MouthLeft, MouthRight,
];
const LOW_MEMBERS: [KeypointIndex; 4] = [LeftHeel, RightHeel, LeftFootIndex, RightFootIndex];

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Critical, Tier::High, Tier::Medium, Tier::Low];

    pub fn name(self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
        }
    }

    /// 段に属する点。4 段で 33 点をちょうど 1 回ずつ覆う
    pub fn members(self) -> &'static [KeypointIndex] {
        match self {
            Tier::Critical => &CRITICAL_MEMBERS,
            Tier::High => &HIGH_MEMBERS,
            Tier::Medium => &MEDIUM_MEMBERS,
            Tier::Low => &LOW_MEMBERS,
        }
    }

    pub fn of(id: KeypointIndex) -> Tier {
        Tier::ALL
            .into_iter()
            .find(|t| t.members().contains(&id))
            .unwrap_or(Tier::Critical)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingLevel {
    pub tier: Tier,
    pub members: &'static [KeypointIndex],
    pub budget_ms: f64,
    pub min_quality: f64,
    pub skippable: bool,
}

impl ProcessingLevel {
    pub fn levels(config: &SchedulerConfig) -> [ProcessingLevel; 4] {
        Tier::ALL.map(|tier| {
            let (budget_ms, min_quality) = match tier {
                Tier::Critical => (config.critical_budget_ms, config.critical_min_quality),
                Tier::High => (config.high_budget_ms, config.high_min_quality),
                Tier::Medium => (config.medium_budget_ms, config.medium_min_quality),
                Tier::Low => (config.low_budget_ms, config.low_min_quality),
            };
            ProcessingLevel {
                tier,
                members: tier.members(),
                budget_ms,
                min_quality,
                skippable: tier != Tier::Critical,
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 残り時間が段の予算に満たない
    BudgetExhausted,
    /// 上の段の品質が十分で、残り時間が少ない
    EarlyExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierStatus {
    Completed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierOutcome {
    pub tier: Tier,
    pub status: TierStatus,
    pub quality: f64,
    /// 縮小後の実効予算
    pub budget_ms: f64,
    pub meets_min_quality: bool,
}

impl TierOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, TierStatus::Skipped(_))
    }
}

/// フレーム処理の進行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    NotStarted,
    Processing(Tier),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameMetrics {
    pub elapsed_ms: f64,
    pub budget_ms: f64,
    pub estimated_fps: f64,
    /// elapsed / budget
    pub time_utilization: f64,
    /// Critical 超過時に後段へ掛けた係数。超過なしなら 1.0
    pub budget_scale: f64,
}
