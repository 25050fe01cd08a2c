use tracing::{debug, trace};

use super::{
    FrameClock, FrameMetrics, FrameState, MonotonicClock, ProcessingLevel, SkipReason, Tier,
    TierOutcome, TierStatus,
};
use crate::config::{Config, FeatureConfig, SchedulerConfig};
use crate::interpolate::{Fill, SmartInterpolator};
use crate::pose::{Keypoint, KeypointIndex, KeypointSet};
use crate::tracker::{AdaptiveKalmanFilter, OutlierDetector, OutlierReason, WeightedAverager};
use crate::validation::{AnatomicalValidator, ValidationIssue, ValidationReport};

/// 1 フレーム分の処理結果
#[derive(Debug, Clone)]
pub struct FrameSchedule {
    pub keypoints: KeypointSet,
    pub tiers: Vec<TierOutcome>,
    pub overall_quality: f64,
    pub issues: Vec<ValidationIssue>,
    pub fills: Vec<Fill>,
    pub unfilled: Vec<KeypointIndex>,
    pub rejected: Vec<(KeypointIndex, OutlierReason)>,
    pub metrics: FrameMetrics,
}

impl FrameSchedule {
    pub fn completed(&self) -> impl Iterator<Item = Tier> + '_ {
        self.tiers
            .iter()
            .filter(|t| t.status == TierStatus::Completed)
            .map(|t| t.tier)
    }

    pub fn skipped(&self) -> impl Iterator<Item = (Tier, SkipReason)> + '_ {
        self.tiers.iter().filter_map(|t| match t.status {
            TierStatus::Skipped(reason) => Some((t.tier, reason)),
            TierStatus::Completed => None,
        })
    }

    pub fn outcome(&self, tier: Tier) -> Option<&TierOutcome> {
        self.tiers.iter().find(|t| t.tier == tier)
    }
}

/// 1 段分の処理結果
struct TierWork {
    quality: f64,
    issues: Vec<ValidationIssue>,
    fills: Vec<Fill>,
    unfilled: Vec<KeypointIndex>,
    rejected: Vec<(KeypointIndex, OutlierReason)>,
}

/// 段ごとに 検証 → 外れ値除去 → 補間 → フィルタ → 平均化 を回す
pub struct HierarchicalScheduler {
    features: FeatureConfig,
    scheduler: SchedulerConfig,
    levels: [ProcessingLevel; 4],
    visibility_threshold: f64,
    validator: AnatomicalValidator,
    interpolator: SmartInterpolator,
    outliers: [OutlierDetector; KeypointIndex::COUNT],
    filters: [AdaptiveKalmanFilter; KeypointIndex::COUNT],
    averagers: [WeightedAverager; KeypointIndex::COUNT],
    previous: Option<KeypointSet>,
    clock: Box<dyn FrameClock>,
    state: FrameState,
}

impl HierarchicalScheduler {
    pub fn from_config(config: &Config) -> Self {
        Self::with_clock(config, Box::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: &Config, clock: Box<dyn FrameClock>) -> Self {
        Self {
            features: config.features.clone(),
            scheduler: config.scheduler.clone(),
            levels: ProcessingLevel::levels(&config.scheduler),
            visibility_threshold: config.detection.visibility_threshold,
            validator: AnatomicalValidator::from_config(&config.validator),
            interpolator: SmartInterpolator::from_config(&config.interpolation),
            outliers: std::array::from_fn(|_| OutlierDetector::from_config(&config.outlier)),
            filters: std::array::from_fn(|_| AdaptiveKalmanFilter::from_config(&config.filter)),
            averagers: std::array::from_fn(|_| WeightedAverager::from_config(&config.averager)),
            previous: None,
            clock,
            state: FrameState::NotStarted,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn levels(&self) -> &[ProcessingLevel; 4] {
        &self.levels
    }

    pub fn filter(&self, id: KeypointIndex) -> &AdaptiveKalmanFilter {
        &self.filters[id as usize]
    }

    /// 直前フレームの出力
    pub fn previous(&self) -> Option<&KeypointSet> {
        self.previous.as_ref()
    }

    /// キャッシュから返したフレームを次フレームの引き継ぎ元として登録する
    pub fn adopt(&mut self, output: &KeypointSet) {
        self.previous = Some(output.clone());
    }

    /// ピクセル座標のフレームを処理する
    pub fn process(&mut self, input: &KeypointSet, timestamp: f64) -> FrameSchedule {
        let start = self.clock.now_ms();
        let frame_budget = self.scheduler.frame_budget_ms;
        let input = &input.restamped(timestamp);
        let mut work = input.clone();
        let mut tiers = Vec::with_capacity(self.levels.len());
        let mut issues = Vec::new();
        let mut fills = Vec::new();
        let mut unfilled = Vec::new();
        let mut rejected = Vec::new();
        let mut scale = 1.0;
        let mut exit_early = false;
        let mut last_quality: Option<(Tier, f64)> = None;

        for i in 0..self.levels.len() {
            let level = self.levels[i].clone();
            let remaining = frame_budget - (self.clock.now_ms() - start);

            if !exit_early {
                if let Some((tier, q)) = last_quality {
                    let critical_exit = tier == Tier::Critical
                        && q >= self.scheduler.early_exit_critical_quality
                        && remaining < self.scheduler.early_exit_critical_remaining_ms;
                    let any_exit = q >= self.scheduler.early_exit_quality
                        && remaining < self.scheduler.early_exit_remaining_ms;
                    if critical_exit || any_exit {
                        debug!(after = %tier, quality = q, remaining_ms = remaining, "early exit");
                        exit_early = true;
                    }
                }
            }

            let budget = if level.skippable {
                level.budget_ms * scale
            } else {
                level.budget_ms
            };

            let skip = if exit_early {
                Some(SkipReason::EarlyExit)
            } else if level.skippable && remaining < budget {
                debug!(tier = %level.tier, remaining_ms = remaining, budget_ms = budget, "tier skipped");
                Some(SkipReason::BudgetExhausted)
            } else {
                None
            };

            if let Some(reason) = skip {
                let quality = self.carry_over(&mut work, input, level.members);
                tiers.push(TierOutcome {
                    tier: level.tier,
                    status: TierStatus::Skipped(reason),
                    quality,
                    budget_ms: budget,
                    meets_min_quality: quality >= level.min_quality,
                });
                continue;
            }

            if !level.skippable && remaining < level.budget_ms {
                scale = if level.budget_ms > 0.0 {
                    (remaining / level.budget_ms).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                debug!(
                    tier = %level.tier,
                    remaining_ms = remaining,
                    scale,
                    "critical overrun, shrinking remaining budgets"
                );
            }

            self.state = FrameState::Processing(level.tier);
            trace!(tier = %level.tier, "processing tier");
            let result = self.process_tier(&level, input, &mut work, timestamp);
            if result.quality < level.min_quality {
                debug!(tier = %level.tier, quality = result.quality, min = level.min_quality, "tier below minimum quality");
            }
            tiers.push(TierOutcome {
                tier: level.tier,
                status: TierStatus::Completed,
                quality: result.quality,
                budget_ms: budget,
                meets_min_quality: result.quality >= level.min_quality,
            });
            last_quality = Some((level.tier, result.quality));
            issues.extend(result.issues);
            fills.extend(result.fills);
            unfilled.extend(result.unfilled);
            rejected.extend(result.rejected);
        }

        let elapsed = self.clock.now_ms() - start;
        self.state = FrameState::Done;

        let overall_quality = overall_quality(&tiers);
        self.previous = Some(work.clone());

        FrameSchedule {
            keypoints: work,
            tiers,
            overall_quality,
            issues,
            fills,
            unfilled,
            rejected,
            metrics: FrameMetrics {
                elapsed_ms: elapsed,
                budget_ms: frame_budget,
                estimated_fps: 1000.0 / elapsed.max(1e-3),
                time_utilization: if frame_budget > 0.0 { elapsed / frame_budget } else { 0.0 },
                budget_scale: scale,
            },
        }
    }

    /// 飛ばした段は直前フレームの出力（なければ生の値）を引き継ぐ。品質は平均可視性
    fn carry_over(&self, work: &mut KeypointSet, input: &KeypointSet, members: &[KeypointIndex]) -> f64 {
        let source = self.previous.as_ref().unwrap_or(input);
        let timestamp = work.get(KeypointIndex::Nose).timestamp;
        for &id in members {
            let kp = source.get(id);
            work.set(id, Keypoint { timestamp, ..*kp });
        }
        mean_visibility(work, members)
    }

    fn process_tier(
        &mut self,
        level: &ProcessingLevel,
        input: &KeypointSet,
        work: &mut KeypointSet,
        timestamp: f64,
    ) -> TierWork {
        let members = level.members;

        let report = if self.features.enable_validation {
            self.validator.validate_members(work, members)
        } else {
            ValidationReport::clean()
        };

        let mut gaps = Vec::new();
        let mut rejected = Vec::new();
        for &id in members {
            let raw = input.get(id);
            let low = !raw.is_valid(self.visibility_threshold);
            let reason = if self.features.enable_outlier_detection {
                self.outliers[id as usize].check(raw, None)
            } else {
                None
            };
            if let Some(r) = reason {
                if r != OutlierReason::LowVisibility {
                    rejected.push((id, r));
                }
            }
            if low || reason.is_some() {
                gaps.push(id);
            }
        }

        let mut fills = Vec::new();
        let mut unfilled = Vec::new();
        let mut fill_ratio = 1.0;
        if !gaps.is_empty() {
            if self.features.enable_interpolation {
                let result = self.interpolator.fill(work, &gaps, timestamp);
                for &id in &gaps {
                    work.set(id, *result.set.get(id));
                }
                fill_ratio = result.success_ratio();
                fills = result.filled;
                unfilled = result.unfilled;
            } else {
                fill_ratio = 0.0;
                unfilled = gaps.clone();
            }
        }
        for &id in members {
            if !gaps.contains(&id) {
                self.interpolator.record_point(id, input.get(id));
            }
        }

        let mut smoothed = 0usize;
        for &id in members {
            if unfilled.contains(&id) {
                continue;
            }
            let kp = *work.get(id);
            let mut pos = [kp.x, kp.y, kp.z];
            let mut touched = false;
            if self.features.enable_filter {
                let (fx, fy) = self.filters[id as usize].update((kp.x, kp.y), kp.visibility, timestamp);
                pos[0] = fx;
                pos[1] = fy;
                touched = true;
            }
            if self.features.enable_averaging {
                pos = self.averagers[id as usize].apply(pos);
                touched = true;
            }
            if touched {
                smoothed += 1;
            }
            work.set(id, kp.with_position(pos[0], pos[1], pos[2]));
        }

        let smoothing_ratio = smoothed as f64 / members.len().max(1) as f64;
        let quality = tier_quality(
            mean_visibility(work, members),
            report.score,
            fill_ratio,
            smoothing_ratio,
        );

        TierWork {
            quality,
            issues: report.issues,
            fills,
            unfilled,
            rejected,
        }
    }

    /// ストリーム再開時に全状態を捨てる
    pub fn reset(&mut self) {
        self.outliers.iter_mut().for_each(OutlierDetector::reset);
        self.filters.iter_mut().for_each(AdaptiveKalmanFilter::reset);
        self.averagers.iter_mut().for_each(WeightedAverager::reset);
        self.interpolator.reset();
        self.previous = None;
        self.state = FrameState::NotStarted;
    }
}

fn mean_visibility(set: &KeypointSet, members: &[KeypointIndex]) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    members.iter().map(|&id| set.get(id).visibility).sum::<f64>() / members.len() as f64
}

/// 0.4·可視性 + 0.3·検証スコア + 0.2·補間成功率 + 0.1·平滑化率
pub fn tier_quality(visibility: f64, validation: f64, fill_ratio: f64, smoothing_ratio: f64) -> f64 {
    (0.4 * visibility + 0.3 * validation + 0.2 * fill_ratio + 0.1 * smoothing_ratio).clamp(0.0, 1.0)
}

/// 段の点数で重み付けした平均
fn overall_quality(tiers: &[TierOutcome]) -> f64 {
    let (sum, n) = tiers.iter().fold((0.0, 0usize), |(s, n), t| {
        let m = t.tier.members().len();
        (s + t.quality * m as f64, n + m)
    });
    if n == 0 {
        0.0
    } else {
        (sum / n as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::SteppedClock;
    use crate::synthetic::{standing_pose, translated};

    fn config() -> Config {
        let mut c = Config::default();
        c.features.enable_caching = false;
        c
    }

    fn no_early_exit(mut c: Config) -> Config {
        c.scheduler.early_exit_critical_quality = 2.0;
        c.scheduler.early_exit_quality = 2.0;
        c
    }

    fn scheduler(config: &Config, step_ms: f64, budget_ms: f64) -> HierarchicalScheduler {
        let mut config = config.clone();
        config.scheduler.frame_budget_ms = budget_ms;
        HierarchicalScheduler::with_clock(&config, Box::new(SteppedClock::new(step_ms)))
    }

    fn skipped_count(s: &FrameSchedule) -> usize {
        s.skipped().count()
    }

    #[test]
    fn test_all_tiers_complete_with_ample_budget() {
        let mut s = scheduler(&config(), 1.0, 33.0);
        assert_eq!(s.state(), FrameState::NotStarted);
        let out = s.process(&standing_pose(0.9, 0.0), 0.0);
        assert_eq!(out.completed().count(), 4);
        assert_eq!(out.keypoints.len(), 33);
        assert_eq!(s.state(), FrameState::Done);
        // 初回フレームはフィルタも平均化も素通し
        assert_eq!(out.keypoints.get(KeypointIndex::Nose).xy(), (500.0, 100.0));
        // 0.4·0.9 + 0.3 + 0.2 + 0.1
        assert!((out.overall_quality - 0.96).abs() < 1e-9);
        assert_eq!(out.metrics.elapsed_ms, 5.0);
        assert!((out.metrics.estimated_fps - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_budget_skip_low_tier() {
        // 5ms/読み取り: Low の前で残り 22-20=2 < 3
        let mut s = scheduler(&no_early_exit(config()), 5.0, 22.0);
        let out = s.process(&standing_pose(0.9, 0.0), 0.0);
        let skipped: Vec<_> = out.skipped().collect();
        assert_eq!(skipped, vec![(Tier::Low, SkipReason::BudgetExhausted)]);
        assert_eq!(out.completed().count(), 3);
    }

    #[test]
    fn test_critical_overrun_shrinks_budgets() {
        let mut s = scheduler(&no_early_exit(config()), 5.0, 17.0);
        let out = s.process(&standing_pose(0.9, 0.0), 0.0);
        assert_eq!(out.outcome(Tier::Critical).unwrap().status, TierStatus::Completed);
        assert!((out.metrics.budget_scale - 12.0 / 15.0).abs() < 1e-12);
        assert!((out.outcome(Tier::High).unwrap().budget_ms - 6.4).abs() < 1e-12);
    }

    #[test]
    fn test_critical_never_skipped() {
        for budget in [0.0, 0.5, 1.0, 3.0, 10.0] {
            let mut s = scheduler(&config(), 1.0, budget);
            let out = s.process(&standing_pose(0.9, 0.0), 0.0);
            assert_eq!(out.outcome(Tier::Critical).unwrap().status, TierStatus::Completed);
            assert_eq!(out.keypoints.len(), 33);
        }
    }

    #[test]
    fn test_budget_monotonicity() {
        let frames: Vec<KeypointSet> = (0..5)
            .map(|i| translated(&standing_pose(0.9, 0.0), i as f64, 0.0))
            .collect();
        for step in [1.0, 3.0, 5.0] {
            let mut previous: Option<Vec<usize>> = None;
            for budget in (0..=40).rev() {
                let mut s = scheduler(&config(), step, budget as f64);
                let counts: Vec<usize> = frames
                    .iter()
                    .enumerate()
                    .map(|(i, f)| skipped_count(&s.process(f, i as f64 / 30.0)))
                    .collect();
                if let Some(prev) = &previous {
                    for (lower, higher) in counts.iter().zip(prev) {
                        assert!(lower >= higher, "step={} budget={}", step, budget);
                    }
                }
                previous = Some(counts);
            }
        }
    }

    #[test]
    fn test_early_exit_after_critical() {
        // 残り 11-2=9 < 10 かつ Critical 品質 0.96
        let mut s = scheduler(&config(), 1.0, 11.0);
        let out = s.process(&standing_pose(0.9, 0.0), 0.0);
        assert_eq!(out.completed().collect::<Vec<_>>(), vec![Tier::Critical]);
        assert!(out.skipped().all(|(_, r)| r == SkipReason::EarlyExit));
    }

    #[test]
    fn test_skipped_tier_keeps_previous_output() {
        let mut ample = config();
        ample.scheduler.frame_budget_ms = 1000.0;
        let mut s = HierarchicalScheduler::with_clock(&ample, Box::new(SteppedClock::new(1.0)));
        let first = s.process(&standing_pose(0.9, 0.0), 0.0);
        let heel = *first.keypoints.get(KeypointIndex::LeftHeel);

        // 以降は Critical 直後に打ち切られる設定へ
        s.scheduler.frame_budget_ms = 11.0;
        let moved = translated(&standing_pose(0.9, 0.0), 3.0, 0.0);
        let second = s.process(&moved, 1.0 / 30.0);
        assert!(second.outcome(Tier::Low).unwrap().is_skipped());
        let carried = second.keypoints.get(KeypointIndex::LeftHeel);
        assert_eq!(carried.xy(), heel.xy());
        assert_eq!(carried.timestamp, 1.0 / 30.0);
    }

    #[test]
    fn test_skipped_without_previous_uses_raw() {
        let mut s = scheduler(&config(), 1.0, 11.0);
        let input = standing_pose(0.9, 0.0);
        let out = s.process(&input, 0.0);
        assert_eq!(
            out.keypoints.get(KeypointIndex::RightFootIndex).xy(),
            input.get(KeypointIndex::RightFootIndex).xy()
        );
    }

    #[test]
    fn test_outlier_replaced_by_interpolation() {
        let mut s = scheduler(&config(), 0.0, 33.0);
        let base = standing_pose(0.9, 0.0);
        for i in 0..6 {
            s.process(&base, i as f64 / 30.0);
        }
        let mut jumped = base.clone();
        let wrist = base.get(KeypointIndex::LeftWrist);
        jumped.set(KeypointIndex::LeftWrist, wrist.with_position(wrist.x + 500.0, wrist.y, 0.0));
        let out = s.process(&jumped, 6.0 / 30.0);
        assert!(out
            .rejected
            .iter()
            .any(|(id, _)| *id == KeypointIndex::LeftWrist));
        let kp = out.keypoints.get(KeypointIndex::LeftWrist);
        assert!((kp.x - wrist.x).abs() < 5.0, "x={}", kp.x);
    }

    #[test]
    fn test_low_visibility_point_filled() {
        let mut s = scheduler(&config(), 0.0, 33.0);
        let mut input = standing_pose(0.9, 0.0);
        let hidden = input.get(KeypointIndex::RightWrist).with_visibility(0.1);
        input.set(KeypointIndex::RightWrist, hidden);
        let out = s.process(&input, 0.0);
        assert!(out
            .fills
            .iter()
            .any(|f| f.id == KeypointIndex::RightWrist));
        let kp = out.keypoints.get(KeypointIndex::RightWrist);
        assert!((kp.x - 370.0).abs() < 1e-9);
    }

    #[test]
    fn test_features_disabled_passthrough() {
        let mut c = config();
        c.features.enable_filter = false;
        c.features.enable_averaging = false;
        c.features.enable_outlier_detection = false;
        c.features.enable_validation = false;
        c.features.enable_interpolation = false;
        let mut s = HierarchicalScheduler::with_clock(&c, Box::new(SteppedClock::new(0.0)));
        let input = standing_pose(0.9, 0.0);
        s.process(&input, 0.0);
        let moved = translated(&input, 10.0, 0.0);
        let out = s.process(&moved, 1.0 / 30.0);
        for id in KeypointIndex::ALL {
            assert_eq!(out.keypoints.get(id).xy(), moved.get(id).xy());
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut s = scheduler(&config(), 0.0, 33.0);
        s.process(&standing_pose(0.9, 0.0), 0.0);
        assert!(s.filter(KeypointIndex::Nose).is_initialized());
        s.reset();
        assert!(!s.filter(KeypointIndex::Nose).is_initialized());
        assert!(s.previous().is_none());
        assert_eq!(s.state(), FrameState::NotStarted);
    }

    #[test]
    fn test_tier_quality_weights() {
        assert!((tier_quality(1.0, 1.0, 1.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((tier_quality(0.5, 0.0, 1.0, 0.0) - 0.4).abs() < 1e-12);
    }
}
