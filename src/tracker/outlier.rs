use std::collections::VecDeque;

use crate::config::OutlierConfig;
use crate::pose::Keypoint;

/// 外れ値と判定した理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierReason {
    LowVisibility,
    Velocity,
    Acceleration,
    ZScore,
}

/// ランドマーク 1 点分の外れ値検出器
///
/// 受理した点だけを履歴に積む。運動学的な棄却が `max_reject_streak` 回続いたら
/// 実際に移動したとみなして履歴を捨て、その点から追跡し直す。
pub struct OutlierDetector {
    visibility_threshold: f64,
    velocity_threshold: f64,
    acceleration_threshold: f64,
    z_score_threshold: f64,
    min_std: f64,
    history_len: usize,
    max_reject_streak: u32,
    positions: VecDeque<(f64, f64)>,
    displacements: VecDeque<f64>,
    reject_streak: u32,
}

impl OutlierDetector {
    pub fn from_config(config: &OutlierConfig) -> Self {
        Self {
            visibility_threshold: config.visibility_threshold,
            velocity_threshold: config.velocity_threshold,
            acceleration_threshold: config.acceleration_threshold,
            z_score_threshold: config.z_score_threshold,
            min_std: config.min_std,
            history_len: config.history_len.max(2),
            max_reject_streak: config.max_reject_streak,
            positions: VecDeque::new(),
            displacements: VecDeque::new(),
            reject_streak: 0,
        }
    }

    pub fn is_outlier(&mut self, point: &Keypoint, previous: Option<&Keypoint>) -> bool {
        self.check(point, previous).is_some()
    }

    /// 判定して理由を返す。None なら受理済み
    pub fn check(&mut self, point: &Keypoint, previous: Option<&Keypoint>) -> Option<OutlierReason> {
        if point.visibility < self.visibility_threshold {
            return Some(OutlierReason::LowVisibility);
        }

        if self.positions.len() < 2 {
            self.accept(point.xy());
            return None;
        }

        let reason = self.kinematic_reason(point, previous);
        match reason {
            Some(reason) => {
                self.reject_streak += 1;
                if self.max_reject_streak > 0 && self.reject_streak >= self.max_reject_streak {
                    tracing::debug!(
                        streak = self.reject_streak,
                        ?reason,
                        "outlier reject streak reached, restarting history"
                    );
                    self.reset();
                    self.accept(point.xy());
                    return None;
                }
                tracing::trace!(x = point.x, y = point.y, ?reason, "outlier rejected");
                Some(reason)
            }
            None => {
                self.reject_streak = 0;
                self.accept(point.xy());
                None
            }
        }
    }

    fn kinematic_reason(&self, point: &Keypoint, previous: Option<&Keypoint>) -> Option<OutlierReason> {
        let (px, py) = match previous {
            Some(prev) => prev.xy(),
            None => *self.positions.back()?,
        };
        let displacement = ((point.x - px).powi(2) + (point.y - py).powi(2)).sqrt();
        if displacement > self.velocity_threshold {
            return Some(OutlierReason::Velocity);
        }

        if let Some(&last) = self.displacements.back() {
            if (displacement - last).abs() > self.acceleration_threshold {
                return Some(OutlierReason::Acceleration);
            }
        }

        if self.positions.len() >= 5 {
            let n = self.positions.len() as f64;
            let (sx, sy) = self
                .positions
                .iter()
                .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            let (mx, my) = (sx / n, sy / n);
            let (vx, vy) = self.positions.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| {
                (ax + (x - mx).powi(2), ay + (y - my).powi(2))
            });
            let std_x = (vx / n).sqrt().max(self.min_std);
            let std_y = (vy / n).sqrt().max(self.min_std);
            let zx = (point.x - mx).abs() / std_x;
            let zy = (point.y - my).abs() / std_y;
            if zx > self.z_score_threshold || zy > self.z_score_threshold {
                return Some(OutlierReason::ZScore);
            }
        }

        None
    }

    fn accept(&mut self, position: (f64, f64)) {
        if let Some(&(lx, ly)) = self.positions.back() {
            let d = ((position.0 - lx).powi(2) + (position.1 - ly).powi(2)).sqrt();
            self.displacements.push_back(d);
            while self.displacements.len() > self.history_len {
                self.displacements.pop_front();
            }
        }
        self.positions.push_back(position);
        while self.positions.len() > self.history_len {
            self.positions.pop_front();
        }
    }

    pub fn history_len(&self) -> usize {
        self.positions.len()
    }

    pub fn reset(&mut self) {
        self.positions.clear();
        self.displacements.clear();
        self.reject_streak = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(x: f64, y: f64, vis: f64) -> Keypoint {
        Keypoint::new(x, y, 0.0, vis, 0.0)
    }

    fn detector() -> OutlierDetector {
        OutlierDetector::from_config(&OutlierConfig::default())
    }

    #[test]
    fn test_low_visibility_rejected_without_recording() {
        let mut d = detector();
        assert_eq!(d.check(&kp(10.0, 10.0, 0.1), None), Some(OutlierReason::LowVisibility));
        assert_eq!(d.history_len(), 0);
    }

    #[test]
    fn test_short_history_accepts() {
        let mut d = detector();
        assert!(!d.is_outlier(&kp(0.0, 0.0, 0.9), None));
        // 履歴 1 点なので大きなジャンプでも受理
        assert!(!d.is_outlier(&kp(900.0, 0.0, 0.9), None));
        assert_eq!(d.history_len(), 2);
    }

    #[test]
    fn test_velocity_jump_rejected() {
        let mut d = detector();
        let mut prev = kp(100.0, 100.0, 0.9);
        for i in 0..4 {
            let p = kp(100.0 + i as f64, 100.0, 0.9);
            assert!(!d.is_outlier(&p, Some(&prev)));
            prev = p;
        }
        let jump = kp(prev.x + 500.0, 100.0, 0.9);
        assert_eq!(d.check(&jump, Some(&prev)), Some(OutlierReason::Velocity));
        // 棄却点は履歴に入らない
        assert_eq!(d.history_len(), 4);
    }

    #[test]
    fn test_acceleration_rejected() {
        let mut d = detector();
        d.is_outlier(&kp(0.0, 0.0, 0.9), None);
        d.is_outlier(&kp(1.0, 0.0, 0.9), None);
        // 変位 1 → 91: 加速度閾値 80 を超えるが速度閾値 100 は下回る
        assert_eq!(d.check(&kp(92.0, 0.0, 0.9), None), Some(OutlierReason::Acceleration));
    }

    #[test]
    fn test_z_score_rejected() {
        let mut d = detector();
        for x in [100.0, 101.0, 99.0, 100.0, 101.0, 99.0] {
            d.is_outlier(&kp(x, 50.0, 0.9), None);
        }
        // 変位 40 < 速度閾値、変位差 < 加速度閾値 だが z-score は大きい
        assert_eq!(d.check(&kp(139.0, 50.0, 0.9), None), Some(OutlierReason::ZScore));
    }

    #[test]
    fn test_reject_streak_recovers() {
        let config = OutlierConfig {
            max_reject_streak: 3,
            ..OutlierConfig::default()
        };
        let mut d = OutlierDetector::from_config(&config);
        for x in [0.0, 1.0, 2.0] {
            d.is_outlier(&kp(x, 0.0, 0.9), None);
        }
        let moved = kp(600.0, 0.0, 0.9);
        assert!(d.is_outlier(&moved, None));
        assert!(d.is_outlier(&moved, None));
        // 3 回目で受理して新しい位置から追跡
        assert!(!d.is_outlier(&moved, None));
        assert_eq!(d.history_len(), 1);
    }

    #[test]
    fn test_reset() {
        let mut d = detector();
        d.is_outlier(&kp(0.0, 0.0, 0.9), None);
        d.is_outlier(&kp(1.0, 0.0, 0.9), None);
        d.reset();
        assert_eq!(d.history_len(), 0);
    }
}
