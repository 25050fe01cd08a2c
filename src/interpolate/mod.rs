//! 欠損・棄却された点の補間
//!
//! 時間方向 → 左右対称 → 解剖学的チェーン → 隣接点 の順に試す。

pub mod strategies;

use std::collections::VecDeque;
use std::fmt;

use crate::config::InterpolationConfig;
use crate::pose::{Keypoint, KeypointIndex, KeypointSet};

pub use strategies::{
    ChainStrategy, InterpolationStrategy, KinematicStrategy, SymmetryStrategy, TemporalStrategy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpolationMethod {
    Temporal,
    Symmetry,
    AnatomicalChain,
    Kinematic,
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InterpolationMethod::Temporal => "temporal",
            InterpolationMethod::Symmetry => "symmetry",
            InterpolationMethod::AnatomicalChain => "anatomical_chain",
            InterpolationMethod::Kinematic => "kinematic",
        })
    }
}

/// 戦略が返す補間結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilledPoint {
    pub position: [f64; 3],
    pub confidence: f64,
    pub method: InterpolationMethod,
}

/// 戦略に渡す読み取り専用の文脈
pub struct FillContext<'a> {
    pub set: &'a KeypointSet,
    pub missing: &'a [KeypointIndex],
    pub timestamp: f64,
    pub visibility_threshold: f64,
    history: &'a [VecDeque<Keypoint>; KeypointIndex::COUNT],
}

impl<'a> FillContext<'a> {
    /// 補間の根拠として使える点。欠損リストに含まれる点は使わない
    pub fn valid(&self, id: KeypointIndex) -> Option<&'a Keypoint> {
        if self.missing.contains(&id) {
            return None;
        }
        let kp = self.set.get(id);
        if kp.is_valid(self.visibility_threshold) && kp.x.is_finite() && kp.y.is_finite() {
            Some(kp)
        } else {
            None
        }
    }

    /// 古い順の有効サンプル履歴
    pub fn history(&self, id: KeypointIndex) -> &'a VecDeque<Keypoint> {
        &self.history[id as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub id: KeypointIndex,
    pub method: InterpolationMethod,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct FillResult {
    pub set: KeypointSet,
    pub filled: Vec<Fill>,
    /// どの戦略でも埋められなかった点。生の値を可視性 0 で残す
    pub unfilled: Vec<KeypointIndex>,
}

impl FillResult {
    pub fn method_of(&self, id: KeypointIndex) -> Option<InterpolationMethod> {
        self.filled.iter().find(|f| f.id == id).map(|f| f.method)
    }

    pub fn confidence_of(&self, id: KeypointIndex) -> Option<f64> {
        self.filled.iter().find(|f| f.id == id).map(|f| f.confidence)
    }

    /// 補間対象のうち埋められた割合。対象がなければ 1.0
    pub fn success_ratio(&self) -> f64 {
        let total = self.filled.len() + self.unfilled.len();
        if total == 0 {
            1.0
        } else {
            self.filled.len() as f64 / total as f64
        }
    }
}

pub struct SmartInterpolator {
    visibility_threshold: f64,
    history_len: usize,
    strategies: Vec<Box<dyn InterpolationStrategy>>,
    history: [VecDeque<Keypoint>; KeypointIndex::COUNT],
}

impl SmartInterpolator {
    pub fn from_config(config: &InterpolationConfig) -> Self {
        let strategies: Vec<Box<dyn InterpolationStrategy>> = vec![
            Box::new(TemporalStrategy::from_config(config)),
            Box::new(SymmetryStrategy::from_config(config)),
            Box::new(ChainStrategy::from_config(config)),
            Box::new(KinematicStrategy::from_config(config)),
        ];
        Self::with_strategies(config, strategies)
    }

    /// 戦略の並びを差し替えて作る
    pub fn with_strategies(
        config: &InterpolationConfig,
        strategies: Vec<Box<dyn InterpolationStrategy>>,
    ) -> Self {
        let history_len = config.history_len.max(1);
        Self {
            visibility_threshold: config.visibility_threshold,
            history_len,
            strategies,
            history: std::array::from_fn(|_| VecDeque::with_capacity(history_len)),
        }
    }

    /// 有効な観測を履歴に積む。可視性が閾値未満なら無視
    pub fn record_point(&mut self, id: KeypointIndex, kp: &Keypoint) {
        if !kp.is_valid(self.visibility_threshold) || !kp.x.is_finite() || !kp.y.is_finite() {
            return;
        }
        let h = &mut self.history[id as usize];
        // 同時刻の再記録は置き換え
        if h.back().is_some_and(|last| last.timestamp >= kp.timestamp) {
            h.pop_back();
        }
        h.push_back(*kp);
        while h.len() > self.history_len {
            h.pop_front();
        }
    }

    pub fn record(&mut self, set: &KeypointSet) {
        for id in KeypointIndex::ALL {
            self.record_point(id, set.get(id));
        }
    }

    pub fn history_len(&self, id: KeypointIndex) -> usize {
        self.history[id as usize].len()
    }

    /// `missing` の各点を埋めた新しいセットを返す。入力は変更しない
    pub fn fill(&self, set: &KeypointSet, missing: &[KeypointIndex], timestamp: f64) -> FillResult {
        let ctx = FillContext {
            set,
            missing,
            timestamp,
            visibility_threshold: self.visibility_threshold,
            history: &self.history,
        };

        let mut out = set.clone();
        let mut filled = Vec::new();
        let mut unfilled = Vec::new();
        for &id in missing {
            let found = self.strategies.iter().find_map(|s| s.attempt(id, &ctx));
            match found {
                Some(p) => {
                    let confidence = p.confidence.clamp(0.0, 1.0);
                    out.set(
                        id,
                        Keypoint::new(p.position[0], p.position[1], p.position[2], confidence, timestamp),
                    );
                    filled.push(Fill {
                        id,
                        method: p.method,
                        confidence,
                    });
                }
                None => {
                    let raw = set.get(id);
                    out.set(id, Keypoint { visibility: 0.0, timestamp, ..*raw });
                    unfilled.push(id);
                }
            }
        }
        if !unfilled.is_empty() {
            tracing::trace!(count = unfilled.len(), "points left unfilled");
        }

        FillResult {
            set: out,
            filled,
            unfilled,
        }
    }

    pub fn reset(&mut self) {
        for h in self.history.iter_mut() {
            h.clear();
        }
    }
}
