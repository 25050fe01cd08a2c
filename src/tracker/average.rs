use std::collections::VecDeque;

use crate::config::AveragerConfig;

/// 指数減衰重みによる時間方向の平滑化
///
/// 最新サンプルの重みが最大（decay^0）。窓が埋まる前も存在するサンプル数で
/// 正規化するので、初期化直後から値を返す。
pub struct WeightedAverager {
    window: usize,
    decay: f64,
    samples: VecDeque<[f64; 3]>,
}

impl WeightedAverager {
    pub fn new(window: usize, decay: f64) -> Self {
        Self {
            window: window.max(1),
            decay: decay.clamp(0.0, 1.0),
            samples: VecDeque::with_capacity(window.max(1)),
        }
    }

    pub fn from_config(config: &AveragerConfig) -> Self {
        Self::new(config.window, config.decay)
    }

    pub fn apply(&mut self, position: [f64; 3]) -> [f64; 3] {
        self.samples.push_back(position);
        while self.samples.len() > self.window {
            self.samples.pop_front();
        }

        let mut acc = [0.0; 3];
        let mut total = 0.0;
        let mut weight = 1.0;
        for sample in self.samples.iter().rev() {
            acc[0] += weight * sample[0];
            acc[1] += weight * sample[1];
            acc[2] += weight * sample[2];
            total += weight;
            weight *= self.decay;
        }
        [acc[0] / total, acc[1] / total, acc[2] / total]
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

impl Default for WeightedAverager {
    fn default() -> Self {
        Self::from_config(&AveragerConfig::default())
    }
}
