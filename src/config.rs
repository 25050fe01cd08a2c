use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::pose::BodySegment;

/// パイプライン全体の設定。座標系の閾値はすべてピクセル単位
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub outlier: OutlierConfig,
    #[serde(default)]
    pub averager: AveragerConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub interpolation: InterpolationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト値
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(path = %path.as_ref().display(), error = %e, "using default config");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// 上流の検出信頼度閾値（フレーム全体の平均可視性がこれ未満なら低品質扱い）
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f64,
    /// トラッキング継続の閾値
    #[serde(default = "default_min_tracking_confidence")]
    pub min_tracking_confidence: f64,
    /// これ未満の可視性の点は欠損として補間対象
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,
}

fn default_min_detection_confidence() -> f64 { 0.5 }
fn default_min_tracking_confidence() -> f64 { 0.5 }
fn default_visibility_threshold() -> f64 { 0.5 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: default_min_detection_confidence(),
            min_tracking_confidence: default_min_tracking_confidence(),
            visibility_threshold: default_visibility_threshold(),
        }
    }
}

/// 各段の有効/無効
#[derive(Debug, Deserialize, Clone)]
pub struct FeatureConfig {
    #[serde(default = "default_true")]
    pub enable_filter: bool,
    #[serde(default = "default_true")]
    pub enable_outlier_detection: bool,
    #[serde(default = "default_true")]
    pub enable_averaging: bool,
    #[serde(default = "default_true")]
    pub enable_validation: bool,
    #[serde(default = "default_true")]
    pub enable_interpolation: bool,
    #[serde(default = "default_true")]
    pub enable_caching: bool,
}

fn default_true() -> bool { true }

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enable_filter: true,
            enable_outlier_detection: true,
            enable_averaging: true,
            enable_validation: true,
            enable_interpolation: true,
            enable_caching: true,
        }
    }
}

/// 適応カルマンフィルタ
#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// 基準プロセスノイズ
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    /// 基準観測ノイズ（px^2）
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,
    /// 初期共分散
    #[serde(default = "default_initial_covariance")]
    pub initial_covariance: f64,
    /// タイムスタンプが単調でないときの dt（秒）
    #[serde(default = "default_dt")]
    pub default_dt: f64,
    #[serde(default = "default_filter_history")]
    pub history_len: usize,
    /// 方向安定度を計算するサンプル数
    #[serde(default = "default_stability_window")]
    pub stability_window: usize,
    /// 動き分類の速度閾値（px/s）
    #[serde(default = "default_static_velocity")]
    pub static_velocity: f64,
    #[serde(default = "default_slow_velocity")]
    pub slow_velocity: f64,
    #[serde(default = "default_fast_velocity")]
    pub fast_velocity: f64,
    /// 急激な動きとみなす加速度（px/s^2）
    #[serde(default = "default_sudden_acceleration")]
    pub sudden_acceleration: f64,
    /// 方向安定度がこれ未満なら不規則な動き
    #[serde(default = "default_erratic_stability")]
    pub erratic_stability: f64,
    /// ノイズ行列を作り直す相対変化量
    #[serde(default = "default_noise_hysteresis")]
    pub noise_hysteresis: f64,
    #[serde(default = "default_min_gain_scale")]
    pub min_gain_scale: f64,
    #[serde(default = "default_max_gain_scale")]
    pub max_gain_scale: f64,
}

fn default_process_noise() -> f64 { 1.0 }
fn default_measurement_noise() -> f64 { 4.0 }
fn default_initial_covariance() -> f64 { 100.0 }
fn default_dt() -> f64 { 1.0 / 30.0 }
fn default_filter_history() -> usize { 20 }
fn default_stability_window() -> usize { 10 }
fn default_static_velocity() -> f64 { 5.0 }
fn default_slow_velocity() -> f64 { 40.0 }
fn default_fast_velocity() -> f64 { 250.0 }
fn default_sudden_acceleration() -> f64 { 10000.0 }
fn default_erratic_stability() -> f64 { 0.3 }
fn default_noise_hysteresis() -> f64 { 0.1 }
fn default_min_gain_scale() -> f64 { 0.2 }
fn default_max_gain_scale() -> f64 { 1.3 }

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
            initial_covariance: default_initial_covariance(),
            default_dt: default_dt(),
            history_len: default_filter_history(),
            stability_window: default_stability_window(),
            static_velocity: default_static_velocity(),
            slow_velocity: default_slow_velocity(),
            fast_velocity: default_fast_velocity(),
            sudden_acceleration: default_sudden_acceleration(),
            erratic_stability: default_erratic_stability(),
            noise_hysteresis: default_noise_hysteresis(),
            min_gain_scale: default_min_gain_scale(),
            max_gain_scale: default_max_gain_scale(),
        }
    }
}

/// 外れ値検出
#[derive(Debug, Deserialize, Clone)]
pub struct OutlierConfig {
    #[serde(default = "default_outlier_visibility")]
    pub visibility_threshold: f64,
    /// 1 フレームあたりの最大移動量（px）
    #[serde(default = "default_velocity_threshold")]
    pub velocity_threshold: f64,
    /// 連続する移動量の最大変化（px）
    #[serde(default = "default_acceleration_threshold")]
    pub acceleration_threshold: f64,
    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,
    /// z-score の分母の下限（px）。検出ノイズ程度の揺れは外れ値にしない
    #[serde(default = "default_min_std")]
    pub min_std: f64,
    #[serde(default = "default_outlier_history")]
    pub history_len: usize,
    /// 連続棄却がこの回数に達したら履歴をリセットして受理
    #[serde(default = "default_max_reject_streak")]
    pub max_reject_streak: u32,
}

fn default_outlier_visibility() -> f64 { 0.3 }
fn default_velocity_threshold() -> f64 { 100.0 }
fn default_acceleration_threshold() -> f64 { 80.0 }
fn default_z_score_threshold() -> f64 { 3.0 }
fn default_min_std() -> f64 { 5.0 }
fn default_outlier_history() -> usize { 10 }
fn default_max_reject_streak() -> u32 { 5 }

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_outlier_visibility(),
            velocity_threshold: default_velocity_threshold(),
            acceleration_threshold: default_acceleration_threshold(),
            z_score_threshold: default_z_score_threshold(),
            min_std: default_min_std(),
            history_len: default_outlier_history(),
            max_reject_streak: default_max_reject_streak(),
        }
    }
}

/// 重み付き時間平均
#[derive(Debug, Deserialize, Clone)]
pub struct AveragerConfig {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_decay")]
    pub decay: f64,
}

fn default_window() -> usize { 7 }
fn default_decay() -> f64 { 0.85 }

impl Default for AveragerConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            decay: default_decay(),
        }
    }
}

/// 閉区間 [min, max]
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// 体高（鼻〜足首の縦距離）に対する各体節の比率範囲
#[derive(Debug, Deserialize, Clone)]
pub struct ProportionRanges {
    #[serde(default = "default_shoulder_width")]
    pub shoulder_width: Bounds,
    #[serde(default = "default_hip_width")]
    pub hip_width: Bounds,
    #[serde(default = "default_upper_arm")]
    pub upper_arm: Bounds,
    #[serde(default = "default_forearm")]
    pub forearm: Bounds,
    #[serde(default = "default_thigh")]
    pub thigh: Bounds,
    #[serde(default = "default_shin")]
    pub shin: Bounds,
    #[serde(default = "default_torso")]
    pub torso: Bounds,
}

fn default_shoulder_width() -> Bounds { Bounds::new(0.15, 0.30) }
fn default_hip_width() -> Bounds { Bounds::new(0.08, 0.25) }
fn default_upper_arm() -> Bounds { Bounds::new(0.10, 0.28) }
fn default_forearm() -> Bounds { Bounds::new(0.08, 0.25) }
fn default_thigh() -> Bounds { Bounds::new(0.15, 0.35) }
fn default_shin() -> Bounds { Bounds::new(0.15, 0.35) }
fn default_torso() -> Bounds { Bounds::new(0.20, 0.45) }

impl ProportionRanges {
    pub fn get(&self, segment: BodySegment) -> Bounds {
        match segment {
            BodySegment::ShoulderWidth => self.shoulder_width,
            BodySegment::HipWidth => self.hip_width,
            BodySegment::UpperArm => self.upper_arm,
            BodySegment::Forearm => self.forearm,
            BodySegment::Thigh => self.thigh,
            BodySegment::Shin => self.shin,
            BodySegment::Torso => self.torso,
        }
    }
}

impl Default for ProportionRanges {
    fn default() -> Self {
        Self {
            shoulder_width: default_shoulder_width(),
            hip_width: default_hip_width(),
            upper_arm: default_upper_arm(),
            forearm: default_forearm(),
            thigh: default_thigh(),
            shin: default_shin(),
            torso: default_torso(),
        }
    }
}

/// 解剖学的妥当性チェック
#[derive(Debug, Deserialize, Clone)]
pub struct ValidatorConfig {
    #[serde(default = "default_validator_visibility")]
    pub visibility_threshold: f64,
    /// これ未満の体高ではプロポーション検査を行わない（px）
    #[serde(default = "default_min_body_height")]
    pub min_body_height: f64,
    #[serde(default)]
    pub proportions: ProportionRanges,
    /// 左右の非対称度の上限
    #[serde(default = "default_symmetry_threshold")]
    pub symmetry_threshold: f64,
    /// 肘の屈曲角（度）
    #[serde(default = "default_elbow_range")]
    pub elbow_range: Bounds,
    /// 膝の屈曲角（度）
    #[serde(default = "default_knee_range")]
    pub knee_range: Bounds,
    /// 手首が反対側の肩を越えてよい距離（肩幅比）
    #[serde(default = "default_wrist_cross_tolerance")]
    pub wrist_cross_tolerance: f64,
    /// 足首が腰の中心線を越えてよい距離（腰幅比）
    #[serde(default = "default_ankle_cross_tolerance")]
    pub ankle_cross_tolerance: f64,
    #[serde(default = "default_proportion_penalty")]
    pub proportion_penalty: f64,
    #[serde(default = "default_symmetry_penalty")]
    pub symmetry_penalty: f64,
    #[serde(default = "default_joint_angle_penalty")]
    pub joint_angle_penalty: f64,
    #[serde(default = "default_impossible_pose_penalty")]
    pub impossible_pose_penalty: f64,
    /// 欠損や退化した幾何に対する部分ペナルティ
    #[serde(default = "default_degenerate_penalty")]
    pub degenerate_penalty: f64,
    #[serde(default = "default_valid_score")]
    pub valid_score: f64,
}

fn default_validator_visibility() -> f64 { 0.3 }
fn default_min_body_height() -> f64 { 50.0 }
fn default_symmetry_threshold() -> f64 { 0.5 }
fn default_elbow_range() -> Bounds { Bounds::new(0.0, 150.0) }
fn default_knee_range() -> Bounds { Bounds::new(0.0, 140.0) }
fn default_wrist_cross_tolerance() -> f64 { 0.3 }
fn default_ankle_cross_tolerance() -> f64 { 0.5 }
fn default_proportion_penalty() -> f64 { 0.8 }
fn default_symmetry_penalty() -> f64 { 0.8 }
fn default_joint_angle_penalty() -> f64 { 0.7 }
fn default_impossible_pose_penalty() -> f64 { 0.5 }
fn default_degenerate_penalty() -> f64 { 0.9 }
fn default_valid_score() -> f64 { 0.6 }

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_validator_visibility(),
            min_body_height: default_min_body_height(),
            proportions: ProportionRanges::default(),
            symmetry_threshold: default_symmetry_threshold(),
            elbow_range: default_elbow_range(),
            knee_range: default_knee_range(),
            wrist_cross_tolerance: default_wrist_cross_tolerance(),
            ankle_cross_tolerance: default_ankle_cross_tolerance(),
            proportion_penalty: default_proportion_penalty(),
            symmetry_penalty: default_symmetry_penalty(),
            joint_angle_penalty: default_joint_angle_penalty(),
            impossible_pose_penalty: default_impossible_pose_penalty(),
            degenerate_penalty: default_degenerate_penalty(),
            valid_score: default_valid_score(),
        }
    }
}

/// 欠損点の補間
#[derive(Debug, Deserialize, Clone)]
pub struct InterpolationConfig {
    /// 補間の根拠として使える点の可視性
    #[serde(default = "default_interp_visibility")]
    pub visibility_threshold: f64,
    #[serde(default = "default_interp_history")]
    pub history_len: usize,
    #[serde(default = "default_temporal_min_samples")]
    pub temporal_min_samples: usize,
    /// 多項式フィットに使う直近サンプル数
    #[serde(default = "default_temporal_window")]
    pub temporal_window: usize,
    /// これより古い履歴からは外挿しない（秒）
    #[serde(default = "default_max_temporal_gap")]
    pub max_temporal_gap: f64,
    #[serde(default = "default_temporal_confidence")]
    pub temporal_confidence: f64,
    #[serde(default = "default_symmetry_confidence")]
    pub symmetry_confidence: f64,
    #[serde(default = "default_chain_confidence")]
    pub chain_confidence: f64,
    #[serde(default = "default_kinematic_confidence")]
    pub kinematic_confidence: f64,
}

fn default_interp_visibility() -> f64 { 0.5 }
fn default_interp_history() -> usize { 10 }
fn default_temporal_min_samples() -> usize { 3 }
fn default_temporal_window() -> usize { 8 }
fn default_max_temporal_gap() -> f64 { 1.0 }
fn default_temporal_confidence() -> f64 { 0.9 }
fn default_symmetry_confidence() -> f64 { 0.7 }
fn default_chain_confidence() -> f64 { 0.8 }
fn default_kinematic_confidence() -> f64 { 0.5 }

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_interp_visibility(),
            history_len: default_interp_history(),
            temporal_min_samples: default_temporal_min_samples(),
            temporal_window: default_temporal_window(),
            max_temporal_gap: default_max_temporal_gap(),
            temporal_confidence: default_temporal_confidence(),
            symmetry_confidence: default_symmetry_confidence(),
            chain_confidence: default_chain_confidence(),
            kinematic_confidence: default_kinematic_confidence(),
        }
    }
}

/// キャッシュの追い出し戦略
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    Lru,
    Temporal,
    Hybrid,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,
    /// 類似一致に必要な「近い点」の割合
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// 同じ位置とみなす点ごとの距離（px）。検出ノイズ程度
    #[serde(default = "default_similarity_tolerance")]
    pub similarity_tolerance: f64,
    /// 時間近傍マッチの窓（秒）
    #[serde(default = "default_temporal_window_secs")]
    pub temporal_window: f64,
    /// 時間近傍マッチでも最低限必要な類似度
    #[serde(default = "default_temporal_similarity_floor")]
    pub temporal_similarity_floor: f64,
    /// 完全一致フィンガープリントの量子化幅（px）
    #[serde(default = "default_fingerprint_grid")]
    pub fingerprint_grid: f64,
    /// 類似検索バケットの量子化幅（px）
    #[serde(default = "default_bucket_grid")]
    pub bucket_grid: f64,
    /// 1 回の追い出しで削除する割合
    #[serde(default = "default_eviction_fraction")]
    pub eviction_fraction: f64,
    #[serde(default = "default_strategy")]
    pub strategy: CacheStrategy,
    /// ヒット率に応じて戦略を切り替える
    #[serde(default = "default_true")]
    pub adaptive: bool,
    #[serde(default = "default_adapt_window")]
    pub adapt_window: usize,
    #[serde(default = "default_low_hit_rate")]
    pub low_hit_rate: f64,
    #[serde(default = "default_high_hit_rate")]
    pub high_hit_rate: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_frequency_weight")]
    pub frequency_weight: f64,
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,
}

fn default_capacity() -> usize { 512 }
fn default_max_memory_bytes() -> usize { 32 * 1024 * 1024 }
fn default_similarity_threshold() -> f64 { 0.92 }
fn default_similarity_tolerance() -> f64 { 2.0 }
fn default_temporal_window_secs() -> f64 { 10.0 }
fn default_temporal_similarity_floor() -> f64 { 0.75 }
fn default_fingerprint_grid() -> f64 { 2.0 }
fn default_bucket_grid() -> f64 { 32.0 }
fn default_eviction_fraction() -> f64 { 0.1 }
fn default_strategy() -> CacheStrategy { CacheStrategy::Lru }
fn default_adapt_window() -> usize { 100 }
fn default_low_hit_rate() -> f64 { 0.3 }
fn default_high_hit_rate() -> f64 { 0.7 }
fn default_recency_weight() -> f64 { 0.5 }
fn default_frequency_weight() -> f64 { 0.3 }
fn default_quality_weight() -> f64 { 0.2 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_memory_bytes: default_max_memory_bytes(),
            similarity_threshold: default_similarity_threshold(),
            similarity_tolerance: default_similarity_tolerance(),
            temporal_window: default_temporal_window_secs(),
            temporal_similarity_floor: default_temporal_similarity_floor(),
            fingerprint_grid: default_fingerprint_grid(),
            bucket_grid: default_bucket_grid(),
            eviction_fraction: default_eviction_fraction(),
            strategy: default_strategy(),
            adaptive: true,
            adapt_window: default_adapt_window(),
            low_hit_rate: default_low_hit_rate(),
            high_hit_rate: default_high_hit_rate(),
            recency_weight: default_recency_weight(),
            frequency_weight: default_frequency_weight(),
            quality_weight: default_quality_weight(),
        }
    }
}

/// 階層スケジューラの時間予算（ミリ秒）
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_frame_budget_ms")]
    pub frame_budget_ms: f64,
    #[serde(default = "default_critical_budget_ms")]
    pub critical_budget_ms: f64,
    #[serde(default = "default_high_budget_ms")]
    pub high_budget_ms: f64,
    #[serde(default = "default_medium_budget_ms")]
    pub medium_budget_ms: f64,
    #[serde(default = "default_low_budget_ms")]
    pub low_budget_ms: f64,
    #[serde(default = "default_critical_min_quality")]
    pub critical_min_quality: f64,
    #[serde(default = "default_high_min_quality")]
    pub high_min_quality: f64,
    #[serde(default = "default_medium_min_quality")]
    pub medium_min_quality: f64,
    #[serde(default = "default_low_min_quality")]
    pub low_min_quality: f64,
    #[serde(default = "default_early_exit_critical_quality")]
    pub early_exit_critical_quality: f64,
    #[serde(default = "default_early_exit_critical_remaining_ms")]
    pub early_exit_critical_remaining_ms: f64,
    #[serde(default = "default_early_exit_quality")]
    pub early_exit_quality: f64,
    #[serde(default = "default_early_exit_remaining_ms")]
    pub early_exit_remaining_ms: f64,
}

fn default_frame_budget_ms() -> f64 { 33.0 }
fn default_critical_budget_ms() -> f64 { 15.0 }
fn default_high_budget_ms() -> f64 { 8.0 }
fn default_medium_budget_ms() -> f64 { 5.0 }
fn default_low_budget_ms() -> f64 { 3.0 }
fn default_critical_min_quality() -> f64 { 0.9 }
fn default_high_min_quality() -> f64 { 0.8 }
fn default_medium_min_quality() -> f64 { 0.7 }
fn default_low_min_quality() -> f64 { 0.6 }
fn default_early_exit_critical_quality() -> f64 { 0.92 }
fn default_early_exit_critical_remaining_ms() -> f64 { 10.0 }
fn default_early_exit_quality() -> f64 { 0.95 }
fn default_early_exit_remaining_ms() -> f64 { 5.0 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: default_frame_budget_ms(),
            critical_budget_ms: default_critical_budget_ms(),
            high_budget_ms: default_high_budget_ms(),
            medium_budget_ms: default_medium_budget_ms(),
            low_budget_ms: default_low_budget_ms(),
            critical_min_quality: default_critical_min_quality(),
            high_min_quality: default_high_min_quality(),
            medium_min_quality: default_medium_min_quality(),
            low_min_quality: default_low_min_quality(),
            early_exit_critical_quality: default_early_exit_critical_quality(),
            early_exit_critical_remaining_ms: default_early_exit_critical_remaining_ms(),
            early_exit_quality: default_early_exit_quality(),
            early_exit_remaining_ms: default_early_exit_remaining_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.averager.window, 7);
        assert!((config.averager.decay - 0.85).abs() < 1e-12);
        assert!((config.cache.similarity_threshold - 0.92).abs() < 1e-12);
        assert_eq!(config.cache.strategy, CacheStrategy::Lru);
        assert!(config.features.enable_filter);
    }

    #[test]
    fn test_partial_override() {
        let src = r#"
            [scheduler]
            frame_budget_ms = 16.0

            [cache]
            strategy = "hybrid"
            capacity = 64

            [validator.proportions]
            shoulder_width = { min = 0.1, max = 0.25 }
        "#;
        let config: Config = toml::from_str(src).unwrap();
        assert_eq!(config.scheduler.frame_budget_ms, 16.0);
        assert_eq!(config.scheduler.critical_budget_ms, 15.0);
        assert_eq!(config.cache.strategy, CacheStrategy::Hybrid);
        assert_eq!(config.cache.capacity, 64);
        assert_eq!(config.validator.proportions.shoulder_width, Bounds::new(0.1, 0.25));
        assert_eq!(config.validator.proportions.hip_width, Bounds::new(0.08, 0.25));
    }

    #[test]
    fn test_bounds_inclusive() {
        let b = Bounds::new(0.15, 0.30);
        assert!(b.contains(0.15));
        assert!(b.contains(0.30));
        assert!(!b.contains(0.3001));
    }

    #[test]
    fn test_shipped_config_parses() {
        let config: Config = toml::from_str(include_str!("../config.toml")).unwrap();
        assert_eq!(config.scheduler.frame_budget_ms, 33.0);
        assert_eq!(config.cache.strategy, CacheStrategy::Lru);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("definitely/not/here.toml");
        assert_eq!(config.outlier.history_len, 10);
    }
}
