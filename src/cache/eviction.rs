//! 追い出し対象の選択

use std::cmp::Ordering;

use crate::config::{CacheConfig, CacheStrategy};

/// 追い出し判断に必要なエントリのメタデータ
#[derive(Debug, Clone, Copy)]
pub struct EntryStats {
    pub key: u64,
    pub inserted_seq: u64,
    pub last_access_seq: u64,
    pub access_count: u64,
    pub quality: f64,
}

/// 残す価値のスコア。低いものから追い出す
#[derive(Debug, Clone, Copy)]
pub struct PriorityWeights {
    pub recency: f64,
    pub frequency: f64,
    pub quality: f64,
}

impl PriorityWeights {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            recency: config.recency_weight,
            frequency: config.frequency_weight,
            quality: config.quality_weight,
        }
    }

    fn score(&self, e: &EntryStats, max_seq: u64, max_count: u64) -> f64 {
        let recency = e.last_access_seq as f64 / max_seq.max(1) as f64;
        let frequency = e.access_count as f64 / max_count.max(1) as f64;
        self.recency * recency + self.frequency * frequency + self.quality * e.quality.clamp(0.0, 1.0)
    }
}

/// `count` 件の追い出し対象を選ぶ
pub fn select_victims(
    entries: &[EntryStats],
    strategy: CacheStrategy,
    weights: &PriorityWeights,
    count: usize,
) -> Vec<u64> {
    let mut ranked: Vec<(f64, u64)> = match strategy {
        CacheStrategy::Lru => entries
            .iter()
            .map(|e| (e.last_access_seq as f64, e.key))
            .collect(),
        CacheStrategy::Temporal => entries
            .iter()
            .map(|e| (e.inserted_seq as f64, e.key))
            .collect(),
        CacheStrategy::Hybrid => {
            let max_seq = entries.iter().map(|e| e.last_access_seq).max().unwrap_or(1);
            let max_count = entries.iter().map(|e| e.access_count).max().unwrap_or(1);
            entries
                .iter()
                .map(|e| (weights.score(e, max_seq, max_count), e.key))
                .collect()
        }
    };
    ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    ranked.into_iter().take(count).map(|(_, key)| key).collect()
}
