//! 欠損点を埋める個別の戦略

use nalgebra::DMatrix;

use super::{FillContext, FilledPoint, InterpolationMethod};
use crate::config::InterpolationConfig;
use crate::pose::{chain_for, mirror_of, neighbors, Keypoint, KeypointIndex};

/// 補間戦略。`SmartInterpolator` は登録順に試し、最初に成功したものを採用する
pub trait InterpolationStrategy: Send {
    fn method(&self) -> InterpolationMethod;

    fn attempt(&self, id: KeypointIndex, ctx: &FillContext<'_>) -> Option<FilledPoint>;
}

/// 履歴への多項式フィットによる外挿
pub struct TemporalStrategy {
    min_samples: usize,
    window: usize,
    max_gap: f64,
    confidence_scale: f64,
}

impl TemporalStrategy {
    pub fn from_config(config: &InterpolationConfig) -> Self {
        Self {
            min_samples: config.temporal_min_samples.max(2),
            window: config.temporal_window.max(config.temporal_min_samples),
            max_gap: config.max_temporal_gap,
            confidence_scale: config.temporal_confidence,
        }
    }
}

impl InterpolationStrategy for TemporalStrategy {
    fn method(&self) -> InterpolationMethod {
        InterpolationMethod::Temporal
    }

    fn attempt(&self, id: KeypointIndex, ctx: &FillContext<'_>) -> Option<FilledPoint> {
        let samples: Vec<&Keypoint> = ctx
            .history(id)
            .iter()
            .filter(|k| k.timestamp <= ctx.timestamp && ctx.timestamp - k.timestamp <= self.max_gap)
            .collect();
        if samples.len() < self.min_samples {
            return None;
        }
        let samples = &samples[samples.len().saturating_sub(self.window)..];

        // 最新サンプルを t=0 とする
        let t_ref = samples.last()?.timestamp;
        let times: Vec<f64> = samples.iter().map(|k| k.timestamp - t_ref).collect();
        let span = times.last()? - times.first()?;
        if span.abs() < 1e-9 {
            return None;
        }

        let degree = if samples.len() <= 3 { 1 } else { 3 };
        let values = DMatrix::from_fn(samples.len(), 3, |r, c| match c {
            0 => samples[r].x,
            1 => samples[r].y,
            _ => samples[r].z,
        });
        let coeffs = fit_polynomial(&times, &values, degree)?;
        let t = ctx.timestamp - t_ref;
        let position = [
            eval_polynomial(&coeffs, 0, t),
            eval_polynomial(&coeffs, 1, t),
            eval_polynomial(&coeffs, 2, t),
        ];
        if position.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let mean_vis = samples.iter().map(|k| k.visibility).sum::<f64>() / samples.len() as f64;
        Some(FilledPoint {
            position,
            confidence: mean_vis * self.confidence_scale,
            method: self.method(),
        })
    }
}

/// 最小二乗で `degree` 次多項式を当てはめる。戻り値は (degree+1) × 列数 の係数行列
pub fn fit_polynomial(times: &[f64], values: &DMatrix<f64>, degree: usize) -> Option<DMatrix<f64>> {
    let n = times.len();
    if n == 0 || values.nrows() != n {
        return None;
    }
    let degree = degree.min(n - 1);
    let design = DMatrix::from_fn(n, degree + 1, |r, c| times[r].powi(c as i32));
    design.svd(true, true).solve(values, 1e-12).ok()
}

fn eval_polynomial(coeffs: &DMatrix<f64>, column: usize, t: f64) -> f64 {
    // Horner
    (0..coeffs.nrows())
        .rev()
        .fold(0.0, |acc, k| acc * t + coeffs[(k, column)])
}

/// 腰中心を通る縦線に対して反対側の点を鏡映する
pub struct SymmetryStrategy {
    confidence_scale: f64,
}

impl SymmetryStrategy {
    pub fn from_config(config: &InterpolationConfig) -> Self {
        Self {
            confidence_scale: config.symmetry_confidence,
        }
    }
}

impl InterpolationStrategy for SymmetryStrategy {
    fn method(&self) -> InterpolationMethod {
        InterpolationMethod::Symmetry
    }

    fn attempt(&self, id: KeypointIndex, ctx: &FillContext<'_>) -> Option<FilledPoint> {
        let mirror = ctx.valid(mirror_of(id)?)?;
        let left_hip = ctx.valid(KeypointIndex::LeftHip)?;
        let right_hip = ctx.valid(KeypointIndex::RightHip)?;
        let cx = (left_hip.x + right_hip.x) / 2.0;
        Some(FilledPoint {
            position: [2.0 * cx - mirror.x, mirror.y, mirror.z],
            confidence: mirror.visibility * self.confidence_scale,
            method: self.method(),
        })
    }
}

/// 肘・膝を両端点の内分点で近似する
pub struct ChainStrategy {
    confidence_scale: f64,
}

impl ChainStrategy {
    pub fn from_config(config: &InterpolationConfig) -> Self {
        Self {
            confidence_scale: config.chain_confidence,
        }
    }
}

impl InterpolationStrategy for ChainStrategy {
    fn method(&self) -> InterpolationMethod {
        InterpolationMethod::AnatomicalChain
    }

    fn attempt(&self, id: KeypointIndex, ctx: &FillContext<'_>) -> Option<FilledPoint> {
        let chain = chain_for(id)?;
        let start = ctx.valid(chain.start)?;
        let end = ctx.valid(chain.end)?;
        let r = chain.ratio;
        Some(FilledPoint {
            position: [
                start.x + r * (end.x - start.x),
                start.y + r * (end.y - start.y),
                start.z + r * (end.z - start.z),
            ],
            confidence: start.visibility.min(end.visibility) * self.confidence_scale,
            method: self.method(),
        })
    }
}

/// 隣接点の順位重み付き平均
pub struct KinematicStrategy {
    confidence_scale: f64,
}

impl KinematicStrategy {
    pub fn from_config(config: &InterpolationConfig) -> Self {
        Self {
            confidence_scale: config.kinematic_confidence,
        }
    }
}

impl InterpolationStrategy for KinematicStrategy {
    fn method(&self) -> InterpolationMethod {
        InterpolationMethod::Kinematic
    }

    fn attempt(&self, id: KeypointIndex, ctx: &FillContext<'_>) -> Option<FilledPoint> {
        let mut acc = [0.0; 3];
        let mut vis = 0.0;
        let mut total = 0.0;
        for (rank, &n) in neighbors(id).iter().enumerate() {
            let Some(kp) = ctx.valid(n) else {
                continue;
            };
            let w = 1.0 / (rank as f64 + 1.0);
            acc[0] += w * kp.x;
            acc[1] += w * kp.y;
            acc[2] += w * kp.z;
            vis += w * kp.visibility;
            total += w;
        }
        if total <= 0.0 {
            return None;
        }
        Some(FilledPoint {
            position: [acc[0] / total, acc[1] / total, acc[2] / total],
            confidence: vis / total * self.confidence_scale,
            method: self.method(),
        })
    }
}
