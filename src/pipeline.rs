//! 入口の検証・座標変換とキャッシュを含むフレーム単位の処理
//!
//! 上流の 33 点を受け取り、ピクセル座標に直してからキャッシュと階層スケジューラに渡す。
//! 出力は入力と同じ座標系で返す。

use tracing::debug;

use crate::cache::{FrameCache, MatchKind};
use crate::config::Config;
use crate::error::InputError;
use crate::interpolate::InterpolationMethod;
use crate::pose::{Keypoint, KeypointIndex, KeypointSet};
use crate::schedule::{FrameClock, FrameMetrics, HierarchicalScheduler, TierOutcome};
use crate::tracker::OutlierReason;
use crate::validation::ValidationIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// 画像サイズで割った 0〜1 の座標
    Normalized,
    Pixel,
}

/// 上流から受け取る 1 フレーム分の入力。各点は (x, y, z, visibility)
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInput {
    pub landmarks: Vec<[f64; 4]>,
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub space: CoordinateSpace,
}

impl FrameInput {
    pub fn new(landmarks: Vec<[f64; 4]>, timestamp: f64, width: u32, height: u32, space: CoordinateSpace) -> Self {
        Self {
            landmarks,
            timestamp,
            width,
            height,
            space,
        }
    }

    /// ピクセル座標の `KeypointSet` から作る
    pub fn from_pixels(set: &KeypointSet, timestamp: f64, width: u32, height: u32) -> Self {
        let landmarks = set.iter().map(|k| [k.x, k.y, k.z, k.visibility]).collect();
        Self::new(landmarks, timestamp, width, height, CoordinateSpace::Pixel)
    }

    /// 入口の検証。通ればピクセル座標の `KeypointSet` を返す
    pub fn to_keypoints(&self) -> Result<KeypointSet, InputError> {
        if self.landmarks.len() != KeypointIndex::COUNT {
            return Err(InputError::PointCount {
                expected: KeypointIndex::COUNT,
                got: self.landmarks.len(),
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(InputError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if !self.timestamp.is_finite() {
            return Err(InputError::InvalidTimestamp);
        }

        let (sx, sy) = self.scale();
        let mut set = KeypointSet::default();
        for (index, (&id, lm)) in KeypointIndex::ALL.iter().zip(&self.landmarks).enumerate() {
            for (value, field) in lm.iter().zip(["x", "y", "z", "visibility"]) {
                if !value.is_finite() {
                    return Err(InputError::NonFinite { index, field });
                }
            }
            set.set(
                id,
                Keypoint::new(lm[0] * sx, lm[1] * sy, lm[2] * sx, lm[3], self.timestamp),
            );
        }
        Ok(set)
    }

    /// 正規化座標 → ピクセルの倍率。z は x と同じ尺度
    fn scale(&self) -> (f64, f64) {
        match self.space {
            CoordinateSpace::Normalized => (self.width as f64, self.height as f64),
            CoordinateSpace::Pixel => (1.0, 1.0),
        }
    }

    fn to_output(&self, set: &KeypointSet) -> Vec<[f64; 4]> {
        let (sx, sy) = self.scale();
        set.iter()
            .map(|k| [k.x / sx, k.y / sy, k.z / sx, k.visibility])
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Disabled,
    Miss,
    Hit(MatchKind),
}

#[derive(Debug, Clone)]
pub struct QualityReport {
    pub overall_quality: f64,
    pub tiers: Vec<TierOutcome>,
    pub issues: Vec<ValidationIssue>,
    pub methods: Vec<(KeypointIndex, InterpolationMethod)>,
    pub unfilled: Vec<KeypointIndex>,
    pub rejected: Vec<(KeypointIndex, OutlierReason)>,
    pub cache: CacheStatus,
    /// 入力の平均可視性が検出閾値未満
    pub low_confidence: bool,
    pub metrics: FrameMetrics,
}

#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// 入力と同じ座標系の 33 点
    pub landmarks: Vec<[f64; 4]>,
    /// ピクセル座標の 33 点
    pub keypoints: KeypointSet,
    pub report: QualityReport,
}

/// キャッシュに載せる処理済みフレーム（ピクセル座標）
#[derive(Debug, Clone)]
struct CachedFrame {
    keypoints: KeypointSet,
    report: QualityReport,
}

pub struct LandmarkPipeline {
    config: Config,
    scheduler: HierarchicalScheduler,
    cache: FrameCache<CachedFrame>,
}

impl LandmarkPipeline {
    pub fn new(config: Config) -> Self {
        let scheduler = HierarchicalScheduler::from_config(&config);
        Self::from_parts(config, scheduler)
    }

    /// 計測用の時計を差し替える
    pub fn with_clock(config: Config, clock: Box<dyn FrameClock>) -> Self {
        let scheduler = HierarchicalScheduler::with_clock(&config, clock);
        Self::from_parts(config, scheduler)
    }

    fn from_parts(config: Config, scheduler: HierarchicalScheduler) -> Self {
        let cache = FrameCache::from_config(&config.cache);
        Self {
            config,
            scheduler,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &HierarchicalScheduler {
        &self.scheduler
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    pub fn process(&mut self, input: &FrameInput) -> Result<FrameOutput, InputError> {
        let set = input.to_keypoints()?;
        let timestamp = input.timestamp;
        let average_visibility = set.average_visibility();
        let low_confidence = average_visibility < self.config.detection.min_detection_confidence;
        if low_confidence {
            debug!(average_visibility, "frame below detection confidence");
        }

        let caching = self.config.features.enable_caching;
        let key = self.cache.fingerprint_of(&set);
        if caching {
            if let Some(hit) = self.cache.get(key, Some(&set), None) {
                let keypoints = hit.value.keypoints.restamped(timestamp);
                self.scheduler.adopt(&keypoints);
                let report = QualityReport {
                    cache: CacheStatus::Hit(hit.kind),
                    low_confidence,
                    metrics: FrameMetrics::default(),
                    ..hit.value.report
                };
                return Ok(FrameOutput {
                    landmarks: input.to_output(&keypoints),
                    keypoints,
                    report,
                });
            }
        }

        let schedule = self.scheduler.process(&set, timestamp);
        let report = QualityReport {
            overall_quality: schedule.overall_quality,
            tiers: schedule.tiers,
            issues: schedule.issues,
            methods: schedule.fills.iter().map(|f| (f.id, f.method)).collect(),
            unfilled: schedule.unfilled,
            rejected: schedule.rejected,
            cache: if caching { CacheStatus::Miss } else { CacheStatus::Disabled },
            low_confidence,
            metrics: schedule.metrics,
        };

        // 追跡が途切れかけたフレームは再利用しない
        if caching && average_visibility >= self.config.detection.min_tracking_confidence {
            self.cache.put(
                key,
                CachedFrame {
                    keypoints: schedule.keypoints.clone(),
                    report: report.clone(),
                },
                Some(&set),
                report.overall_quality,
                None,
            );
        }

        Ok(FrameOutput {
            landmarks: input.to_output(&schedule.keypoints),
            keypoints: schedule.keypoints,
            report,
        })
    }

    /// ストリームの切り替え時に呼ぶ
    pub fn reset(&mut self) {
        self.scheduler.reset();
        self.cache.clear();
    }
}
