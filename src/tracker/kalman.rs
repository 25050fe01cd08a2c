//! ランドマーク 1 点分の適応カルマンフィルタ
//!
//! 状態ベクトル: [x, y, vx, vy, ax, ay]ᵀ（等加速度モデル）
//! 直近の動きを分類してプロセスノイズ/観測ノイズを調整する。

use std::collections::VecDeque;

use nalgebra::{SMatrix, SVector};

use crate::config::FilterConfig;

type State = SVector<f64, 6>;
type Matrix6 = SMatrix<f64, 6, 6>;
type Matrix2x6 = SMatrix<f64, 2, 6>;
type Matrix6x2 = SMatrix<f64, 6, 2>;
type Matrix2 = SMatrix<f64, 2, 2>;
type Vector2 = SVector<f64, 2>;

/// 直近の軌跡の動きの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionClass {
    Static,
    Slow,
    Normal,
    Fast,
    Erratic,
    Sudden,
}

impl MotionClass {
    /// (プロセスノイズ倍率, 観測ノイズ倍率)
    fn noise_multipliers(self) -> (f64, f64) {
        match self {
            MotionClass::Static => (0.1, 1.5),
            MotionClass::Slow => (0.5, 1.2),
            MotionClass::Normal => (1.0, 1.0),
            MotionClass::Fast => (4.0, 0.7),
            // 予測寄り
            MotionClass::Erratic => (0.5, 2.5),
            // 観測寄り
            MotionClass::Sudden => (10.0, 0.3),
        }
    }

    fn gain_multiplier(self) -> f64 {
        match self {
            MotionClass::Static => 0.7,
            MotionClass::Slow => 0.85,
            MotionClass::Normal => 1.0,
            MotionClass::Fast => 1.15,
            MotionClass::Erratic => 0.6,
            MotionClass::Sudden => 1.3,
        }
    }
}

/// 動き分類に使う閾値
#[derive(Debug, Clone, Copy)]
pub struct MotionThresholds {
    pub static_velocity: f64,
    pub slow_velocity: f64,
    pub fast_velocity: f64,
    pub sudden_acceleration: f64,
    pub erratic_stability: f64,
}

impl MotionThresholds {
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            static_velocity: config.static_velocity,
            slow_velocity: config.slow_velocity,
            fast_velocity: config.fast_velocity,
            sudden_acceleration: config.sudden_acceleration,
            erratic_stability: config.erratic_stability,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MotionSample {
    position: (f64, f64),
    velocity: (f64, f64),
    dt: f64,
}

/// 連続する変位ベクトルのなす角の余弦の平均。変位がなければ 1.0
fn direction_stability(samples: &[MotionSample]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for pair in samples.windows(2) {
        let (ax, ay) = (
            pair[0].velocity.0 * pair[0].dt,
            pair[0].velocity.1 * pair[0].dt,
        );
        let (bx, by) = (
            pair[1].velocity.0 * pair[1].dt,
            pair[1].velocity.1 * pair[1].dt,
        );
        let na = (ax * ax + ay * ay).sqrt();
        let nb = (bx * bx + by * by).sqrt();
        if na < 1e-9 || nb < 1e-9 {
            continue;
        }
        sum += (ax * bx + ay * by) / (na * nb);
        count += 1;
    }
    if count == 0 {
        1.0
    } else {
        sum / count as f64
    }
}

fn classify(samples: &[MotionSample], thresholds: &MotionThresholds) -> MotionClass {
    // 速度は 2 点目から意味を持つ
    if samples.len() < 3 {
        return MotionClass::Normal;
    }
    let moving = &samples[1..];
    let speeds: Vec<f64> = moving
        .iter()
        .map(|s| (s.velocity.0.powi(2) + s.velocity.1.powi(2)).sqrt())
        .collect();
    let mean_speed = speeds.iter().sum::<f64>() / speeds.len() as f64;

    let accelerations: Vec<f64> = moving
        .windows(2)
        .map(|w| {
            let dvx = w[1].velocity.0 - w[0].velocity.0;
            let dvy = w[1].velocity.1 - w[0].velocity.1;
            (dvx * dvx + dvy * dvy).sqrt() / w[1].dt
        })
        .collect();
    let latest_acceleration = accelerations.last().copied().unwrap_or(0.0);

    if latest_acceleration > thresholds.sudden_acceleration {
        return MotionClass::Sudden;
    }
    if mean_speed < thresholds.static_velocity {
        return MotionClass::Static;
    }
    if mean_speed >= thresholds.slow_velocity
        && direction_stability(moving) < thresholds.erratic_stability
    {
        return MotionClass::Erratic;
    }
    if mean_speed < thresholds.slow_velocity {
        MotionClass::Slow
    } else if mean_speed < thresholds.fast_velocity {
        MotionClass::Normal
    } else {
        MotionClass::Fast
    }
}

/// 等加速度モデルの遷移行列
///
/// ```text
/// | 1  0  dt  0  0.5dt²  0      |
/// | 0  1  0   dt 0       0.5dt² |
/// | 0  0  1   0  dt      0      |
/// | 0  0  0   1  0       dt     |
/// | 0  0  0   0  1       0      |
/// | 0  0  0   0  0       1      |
/// ```
fn transition_matrix(dt: f64) -> Matrix6 {
    let dt2 = 0.5 * dt * dt;
    Matrix6::new(
        1.0, 0.0, dt, 0.0, dt2, 0.0,
        0.0, 1.0, 0.0, dt, 0.0, dt2,
        0.0, 0.0, 1.0, 0.0, dt, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0, dt,
        0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
    )
}

fn observation_matrix() -> Matrix2x6 {
    Matrix2x6::new(
        1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
    )
}

fn process_noise_matrix(q: f64) -> Matrix6 {
    Matrix6::from_diagonal(&State::from_column_slice(&[
        q,
        q,
        10.0 * q,
        10.0 * q,
        100.0 * q,
        100.0 * q,
    ]))
}

pub struct AdaptiveKalmanFilter {
    base_process_noise: f64,
    base_measurement_noise: f64,
    initial_covariance: f64,
    default_dt: f64,
    history_len: usize,
    stability_window: usize,
    noise_hysteresis: f64,
    min_gain_scale: f64,
    max_gain_scale: f64,
    thresholds: MotionThresholds,

    state: State,
    covariance: Matrix6,
    process_noise: Matrix6,
    measurement_noise: Matrix2,
    q_scale: f64,
    r_scale: f64,
    last_dt: f64,
    last_timestamp: Option<f64>,
    history: VecDeque<MotionSample>,
    motion: MotionClass,
    initialized: bool,
}

impl AdaptiveKalmanFilter {
    pub fn from_config(config: &FilterConfig) -> Self {
        let q = config.process_noise.max(1e-9);
        let r = config.measurement_noise.max(1e-9);
        Self {
            base_process_noise: q,
            base_measurement_noise: r,
            initial_covariance: config.initial_covariance.max(1e-9),
            default_dt: config.default_dt,
            history_len: config.history_len.max(3),
            stability_window: config.stability_window.max(3),
            noise_hysteresis: config.noise_hysteresis,
            min_gain_scale: config.min_gain_scale,
            max_gain_scale: config.max_gain_scale,
            thresholds: MotionThresholds::from_config(config),
            state: State::zeros(),
            covariance: Matrix6::identity() * config.initial_covariance,
            process_noise: process_noise_matrix(q),
            measurement_noise: Matrix2::identity() * r,
            q_scale: q,
            r_scale: r,
            last_dt: config.default_dt,
            last_timestamp: None,
            history: VecDeque::new(),
            motion: MotionClass::Normal,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn motion_class(&self) -> MotionClass {
        self.motion
    }

    pub fn position(&self) -> (f64, f64) {
        (self.state[0], self.state[1])
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.state[2], self.state[3])
    }

    pub fn covariance(&self) -> &SMatrix<f64, 6, 6> {
        &self.covariance
    }

    /// 直近の dt だけ状態を進めて予測位置を返す。未初期化なら (0, 0)
    pub fn predict(&mut self) -> (f64, f64) {
        if !self.initialized {
            return (0.0, 0.0);
        }
        self.predict_dt(self.last_dt);
        self.position()
    }

    fn predict_dt(&mut self, dt: f64) {
        let f = transition_matrix(dt);
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise;
    }

    /// 観測で更新してフィルタ後の位置を返す
    pub fn update(&mut self, measurement: (f64, f64), confidence: f64, timestamp: f64) -> (f64, f64) {
        let confidence = confidence.clamp(0.0, 1.0);

        if !self.initialized {
            self.state = State::from_column_slice(&[measurement.0, measurement.1, 0.0, 0.0, 0.0, 0.0]);
            self.covariance = Matrix6::identity() * self.initial_covariance;
            self.last_timestamp = Some(timestamp);
            self.push_sample(measurement, (0.0, 0.0), self.default_dt);
            self.initialized = true;
            return measurement;
        }

        let dt = match self.last_timestamp {
            Some(last) if timestamp - last > 0.0 && (timestamp - last).is_finite() => timestamp - last,
            _ => self.default_dt,
        };
        self.last_timestamp = Some(timestamp);
        self.last_dt = dt;

        let velocity = match self.history.back() {
            Some(prev) => (
                (measurement.0 - prev.position.0) / dt,
                (measurement.1 - prev.position.1) / dt,
            ),
            None => (0.0, 0.0),
        };
        self.push_sample(measurement, velocity, dt);

        let recent: Vec<MotionSample> = self
            .history
            .iter()
            .rev()
            .take(self.stability_window)
            .rev()
            .copied()
            .collect();
        self.motion = classify(&recent, &self.thresholds);
        self.adapt_noise(self.motion, confidence);

        self.predict_dt(dt);
        let gain_scale = (self.motion.gain_multiplier() * (0.5 + 0.5 * confidence))
            .clamp(self.min_gain_scale, self.max_gain_scale);

        match self.correct(measurement, gain_scale) {
            Some(position) => position,
            None => {
                tracing::warn!(
                    x = measurement.0,
                    y = measurement.1,
                    "innovation covariance not positive definite, passing measurement through"
                );
                self.state[0] = measurement.0;
                self.state[1] = measurement.1;
                self.covariance = Matrix6::identity() * self.initial_covariance;
                measurement
            }
        }
    }

    fn correct(&mut self, measurement: (f64, f64), gain_scale: f64) -> Option<(f64, f64)> {
        let h = observation_matrix();
        let z = Vector2::new(measurement.0, measurement.1);
        let innovation = z - h * self.state;
        let s = h * self.covariance * h.transpose() + self.measurement_noise;

        // K = P Hᵀ S⁻¹ を S Kᵀ = H P として解く
        let chol = s.cholesky()?;
        let kt = chol.solve(&(h * self.covariance));
        let k: Matrix6x2 = kt.transpose() * gain_scale;
        if k.iter().any(|v| !v.is_finite()) {
            return None;
        }

        self.state += k * innovation;

        // Joseph 形式: スケールしたゲインでも対称半正定値を保つ
        let i_kh = Matrix6::identity() - k * h;
        let p = i_kh * self.covariance * i_kh.transpose() + k * self.measurement_noise * k.transpose();
        self.covariance = (p + p.transpose()) * 0.5;

        Some(self.position())
    }

    fn adapt_noise(&mut self, motion: MotionClass, confidence: f64) {
        let (q_mult, r_mult) = motion.noise_multipliers();
        // 低信頼度ほど観測を疑う
        let confidence_factor = (1.0 + 3.0 * (1.0 - confidence)) * 0.8;
        let q = self.base_process_noise * q_mult;
        let r = self.base_measurement_noise * r_mult * confidence_factor;

        if (q - self.q_scale).abs() > self.noise_hysteresis * self.q_scale {
            self.q_scale = q;
            self.process_noise = process_noise_matrix(q);
        }
        if (r - self.r_scale).abs() > self.noise_hysteresis * self.r_scale {
            self.r_scale = r;
            self.measurement_noise = Matrix2::identity() * r;
        }
    }

    fn push_sample(&mut self, position: (f64, f64), velocity: (f64, f64), dt: f64) {
        self.history.push_back(MotionSample { position, velocity, dt });
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }
    }

    /// 現在適用中のノイズスケール (q, r)
    pub fn noise_scales(&self) -> (f64, f64) {
        (self.q_scale, self.r_scale)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.state = State::zeros();
        self.covariance = Matrix6::identity() * self.initial_covariance;
        self.q_scale = self.base_process_noise;
        self.r_scale = self.base_measurement_noise;
        self.process_noise = process_noise_matrix(self.q_scale);
        self.measurement_noise = Matrix2::identity() * self.r_scale;
        self.last_dt = self.default_dt;
        self.last_timestamp = None;
        self.history.clear();
        self.motion = MotionClass::Normal;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 30.0;

    fn filter() -> AdaptiveKalmanFilter {
        AdaptiveKalmanFilter::from_config(&FilterConfig::default())
    }

    fn sample(x: f64, y: f64, vx: f64, vy: f64) -> MotionSample {
        MotionSample { position: (x, y), velocity: (vx, vy), dt: DT }
    }

    #[test]
    fn test_predict_before_update() {
        let mut f = filter();
        assert_eq!(f.predict(), (0.0, 0.0));
    }

    #[test]
    fn test_first_update_passthrough() {
        let mut f = filter();
        let out = f.update((12.0, 34.0), 0.9, 0.0);
        assert_eq!(out, (12.0, 34.0));
        assert!(f.is_initialized());
        assert_eq!(f.velocity(), (0.0, 0.0));
    }

    #[test]
    fn test_converges_to_constant_measurement() {
        let mut f = filter();
        f.update((100.0, 100.0), 0.9, 0.0);
        let mut out = (0.0, 0.0);
        for i in 1..=200 {
            out = f.update((120.0, 80.0), 0.9, i as f64 * DT);
        }
        assert!((out.0 - 120.0).abs() < 0.5, "x={}", out.0);
        assert!((out.1 - 80.0).abs() < 0.5, "y={}", out.1);
        assert_eq!(f.motion_class(), MotionClass::Static);
    }

    #[test]
    fn test_covariance_stays_psd() {
        let mut f = filter();
        for i in 0..100 {
            let t = i as f64 * DT;
            let x = 200.0 + 50.0 * (t * 3.0).sin();
            let conf = if i % 7 == 0 { 0.1 } else { 0.95 };
            f.update((x, 150.0 + (i % 5) as f64), conf, t);
            let p = f.covariance();
            assert!((p - p.transpose()).abs().max() < 1e-6);
            let eig = p.symmetric_eigen();
            assert!(eig.eigenvalues.iter().all(|&v| v > -1e-6), "eigenvalues {:?}", eig.eigenvalues);
        }
    }

    #[test]
    fn test_tracks_linear_motion() {
        let mut f = filter();
        let mut out = (0.0, 0.0);
        for i in 0..60 {
            let t = i as f64 * DT;
            out = f.update((100.0 + 90.0 * t, 50.0), 0.95, t);
        }
        let expected = 100.0 + 90.0 * 59.0 * DT;
        assert!((out.0 - expected).abs() < 8.0, "x={} expected={}", out.0, expected);
    }

    #[test]
    fn test_low_confidence_trusts_prediction_more() {
        let mut hi = filter();
        let mut lo = filter();
        for i in 0..10 {
            let t = i as f64 * DT;
            hi.update((100.0, 100.0), 0.95, t);
            lo.update((100.0, 100.0), 0.95, t);
        }
        let t = 10.0 * DT;
        let a = hi.update((110.0, 100.0), 0.95, t);
        let b = lo.update((110.0, 100.0), 0.1, t);
        assert!(a.0 > b.0, "high confidence {} should move further than low {}", a.0, b.0);
    }

    #[test]
    fn test_classify_static_and_fast() {
        let th = MotionThresholds::from_config(&FilterConfig::default());
        let still: Vec<_> = (0..5).map(|_| sample(10.0, 10.0, 0.0, 0.0)).collect();
        assert_eq!(classify(&still, &th), MotionClass::Static);

        let fast: Vec<_> = (0..5).map(|i| sample(i as f64 * 20.0, 0.0, 600.0, 0.0)).collect();
        assert_eq!(classify(&fast, &th), MotionClass::Fast);

        let slow: Vec<_> = (0..5).map(|i| sample(i as f64, 0.0, 20.0, 0.0)).collect();
        assert_eq!(classify(&slow, &th), MotionClass::Slow);
    }

    #[test]
    fn test_classify_erratic_and_sudden() {
        let th = MotionThresholds::from_config(&FilterConfig::default());
        // 向きが毎回反転する往復運動
        let erratic: Vec<_> = (0..6)
            .map(|i| {
                let v = if i % 2 == 0 { 100.0 } else { -100.0 };
                sample(0.0, 0.0, v, 0.0)
            })
            .collect();
        // 速度変化 200px/s / dt = 6000 px/s² < 10000
        assert_eq!(classify(&erratic, &th), MotionClass::Erratic);

        let mut sudden: Vec<_> = (0..4).map(|_| sample(0.0, 0.0, 10.0, 0.0)).collect();
        sudden.push(sample(0.0, 0.0, 900.0, 0.0));
        assert_eq!(classify(&sudden, &th), MotionClass::Sudden);
    }

    #[test]
    fn test_classify_short_history_is_normal() {
        let th = MotionThresholds::from_config(&FilterConfig::default());
        assert_eq!(classify(&[sample(0.0, 0.0, 0.0, 0.0)], &th), MotionClass::Normal);
    }

    #[test]
    fn test_direction_stability() {
        let straight: Vec<_> = (0..4).map(|_| sample(0.0, 0.0, 30.0, 30.0)).collect();
        assert!((direction_stability(&straight) - 1.0).abs() < 1e-9);
        let still: Vec<_> = (0..4).map(|_| sample(0.0, 0.0, 0.0, 0.0)).collect();
        assert_eq!(direction_stability(&still), 1.0);
    }

    #[test]
    fn test_noise_hysteresis() {
        let mut f = filter();
        for i in 0..5 {
            f.update((0.0, 0.0), 0.9, i as f64 * DT);
        }
        assert_eq!(f.motion_class(), MotionClass::Static);
        let (_, r1) = f.noise_scales();
        // 信頼度のわずかな変化ではノイズ行列を作り直さない
        f.update((0.0, 0.0), 0.88, 5.0 * DT);
        let (_, r2) = f.noise_scales();
        assert_eq!(r1, r2);
        f.update((0.0, 0.0), 0.2, 6.0 * DT);
        let (_, r3) = f.noise_scales();
        assert!(r3 > r1);
    }

    #[test]
    fn test_reset() {
        let mut f = filter();
        f.update((1.0, 2.0), 0.9, 0.0);
        f.update((2.0, 3.0), 0.9, DT);
        f.reset();
        assert!(!f.is_initialized());
        assert_eq!(f.history_len(), 0);
        assert_eq!(f.update((10.0, 20.0), 0.9, 1.0), (10.0, 20.0));
    }
}
