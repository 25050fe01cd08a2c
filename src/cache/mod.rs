//! フレーム結果のキャッシュ
//!
//! 完全一致 → 領域一致 → 類似一致 → 時間近傍一致 の順に引く。
//! 索引・エントリ・統計はすべて 1 つの `parking_lot::Mutex` の内側にある。
//!
//! 領域一致は `region` を渡す呼び出し側のためのもの。`LandmarkPipeline` は
//! フレーム全体の結果だけを保存するので常に `None` で引く。

pub mod eviction;
pub mod fingerprint;

use std::collections::{HashMap, VecDeque};
use std::mem;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{CacheConfig, CacheStrategy};
use crate::pose::{KeypointIndex, KeypointSet};
use eviction::{select_victims, EntryStats, PriorityWeights};
pub use fingerprint::{fingerprint, region_fingerprint, similarity, Fingerprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Exact,
    Region,
    Similarity,
    Temporal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
    pub value: T,
    pub kind: MatchKind,
    /// 一致度。完全一致・領域一致は 1.0
    pub similarity: f64,
    pub quality: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub exact_hits: u64,
    pub region_hits: u64,
    pub similarity_hits: u64,
    pub temporal_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub memory_bytes: usize,
    pub strategy: Option<CacheStrategy>,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.exact_hits + self.region_hits + self.similarity_hits + self.temporal_hits
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

struct CacheEntry<T> {
    value: T,
    keypoints: Option<KeypointSet>,
    region: Option<Fingerprint>,
    bucket: Option<(i64, i64)>,
    /// 保存したキーポイントのタイムスタンプ（秒）
    timestamp: Option<f64>,
    inserted_seq: u64,
    last_access_seq: u64,
    access_count: u64,
    quality: f64,
    size: usize,
}

struct CacheInner<T> {
    entries: HashMap<Fingerprint, CacheEntry<T>>,
    regions: HashMap<Fingerprint, Fingerprint>,
    buckets: HashMap<(i64, i64), Vec<Fingerprint>>,
    seq: u64,
    memory_bytes: usize,
    strategy: CacheStrategy,
    recent_lookups: VecDeque<bool>,
    stats: CacheStats,
}

impl<T> CacheInner<T> {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn remove(&mut self, key: Fingerprint) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(&key)?;
        self.memory_bytes = self.memory_bytes.saturating_sub(entry.size);
        if let Some(region) = entry.region {
            if self.regions.get(&region) == Some(&key) {
                self.regions.remove(&region);
            }
        }
        if let Some(cell) = entry.bucket {
            if let Some(keys) = self.buckets.get_mut(&cell) {
                keys.retain(|k| *k != key);
                if keys.is_empty() {
                    self.buckets.remove(&cell);
                }
            }
        }
        Some(entry)
    }
}

pub struct FrameCache<T> {
    config: CacheConfig,
    weights: PriorityWeights,
    inner: Mutex<CacheInner<T>>,
}

impl<T: Clone> FrameCache<T> {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            config: config.clone(),
            weights: PriorityWeights::from_config(config),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                regions: HashMap::new(),
                buckets: HashMap::new(),
                seq: 0,
                memory_bytes: 0,
                strategy: config.strategy,
                recent_lookups: VecDeque::with_capacity(config.adapt_window),
                stats: CacheStats::default(),
            }),
        }
    }

    /// 設定の格子でフィンガープリントを計算する
    pub fn fingerprint_of(&self, set: &KeypointSet) -> Fingerprint {
        fingerprint(set, self.config.fingerprint_grid)
    }

    /// `region` 付きの検索は、`put` で同じメンバーを渡したエントリにだけ領域一致する
    pub fn get(
        &self,
        key: Fingerprint,
        query: Option<&KeypointSet>,
        region: Option<&[KeypointIndex]>,
    ) -> Option<CacheHit<T>> {
        let mut inner = self.inner.lock();
        let found = self.lookup(&inner, key, query, region);

        match found {
            Some((hit_key, kind, sim)) => {
                let seq = inner.next_seq();
                let hit = inner.entries.get_mut(&hit_key).map(|e| {
                    e.last_access_seq = seq;
                    e.access_count += 1;
                    CacheHit {
                        value: e.value.clone(),
                        kind,
                        similarity: sim,
                        quality: e.quality,
                    }
                });
                match kind {
                    MatchKind::Exact => inner.stats.exact_hits += 1,
                    MatchKind::Region => inner.stats.region_hits += 1,
                    MatchKind::Similarity => inner.stats.similarity_hits += 1,
                    MatchKind::Temporal => inner.stats.temporal_hits += 1,
                }
                self.observe(&mut inner, true);
                hit
            }
            None => {
                inner.stats.misses += 1;
                self.observe(&mut inner, false);
                None
            }
        }
    }

    fn lookup(
        &self,
        inner: &CacheInner<T>,
        key: Fingerprint,
        query: Option<&KeypointSet>,
        region: Option<&[KeypointIndex]>,
    ) -> Option<(Fingerprint, MatchKind, f64)> {
        if inner.entries.contains_key(&key) {
            return Some((key, MatchKind::Exact, 1.0));
        }
        let query = query?;

        if let Some(members) = region {
            let rkey = region_fingerprint(query, members, self.config.fingerprint_grid);
            if let Some(&target) = inner.regions.get(&rkey) {
                if inner.entries.contains_key(&target) {
                    return Some((target, MatchKind::Region, 1.0));
                }
            }
        }

        if let Some((cx, cy)) = fingerprint::bucket_cell(query, self.config.bucket_grid) {
            let mut best: Option<(Fingerprint, f64)> = None;
            for dx in -1..=1 {
                for dy in -1..=1 {
                    let Some(keys) = inner.buckets.get(&(cx + dx, cy + dy)) else {
                        continue;
                    };
                    for k in keys {
                        let Some(stored) = inner.entries.get(k).and_then(|e| e.keypoints.as_ref()) else {
                            continue;
                        };
                        let sim = similarity(stored, query, self.config.similarity_tolerance);
                        if sim >= self.config.similarity_threshold
                            && best.map_or(true, |(_, b)| sim > b)
                        {
                            best = Some((*k, sim));
                        }
                    }
                }
            }
            if let Some((k, sim)) = best {
                return Some((k, MatchKind::Similarity, sim));
            }
        }

        if matches!(inner.strategy, CacheStrategy::Temporal | CacheStrategy::Hybrid) {
            let now = query.timestamp();
            let newest = inner
                .entries
                .iter()
                .filter_map(|(k, e)| e.timestamp.map(|t| (k, e, t)))
                .filter(|(_, _, t)| (now - t).abs() <= self.config.temporal_window)
                .max_by(|a, b| a.2.total_cmp(&b.2));
            if let Some((k, e, _)) = newest {
                let sim = e.keypoints.as_ref().map_or(0.0, |s| similarity(s, query, self.config.similarity_tolerance));
                if sim >= self.config.temporal_similarity_floor {
                    return Some((*k, MatchKind::Temporal, sim));
                }
            }
        }
        None
    }

    /// 直近の命中率から戦略を切り替える
    fn observe(&self, inner: &mut CacheInner<T>, hit: bool) {
        if !self.config.adaptive || self.config.adapt_window == 0 {
            return;
        }
        inner.recent_lookups.push_back(hit);
        while inner.recent_lookups.len() > self.config.adapt_window {
            inner.recent_lookups.pop_front();
        }
        if inner.recent_lookups.len() < self.config.adapt_window {
            return;
        }
        let hits = inner.recent_lookups.iter().filter(|h| **h).count();
        let rate = hits as f64 / inner.recent_lookups.len() as f64;
        let next = if rate < self.config.low_hit_rate {
            CacheStrategy::Temporal
        } else if rate > self.config.high_hit_rate {
            CacheStrategy::Lru
        } else {
            inner.strategy
        };
        if next != inner.strategy {
            debug!(from = ?inner.strategy, to = ?next, hit_rate = rate, "cache strategy switched");
            inner.strategy = next;
        }
    }

    pub fn put(
        &self,
        key: Fingerprint,
        value: T,
        keypoints: Option<&KeypointSet>,
        quality: f64,
        region: Option<&[KeypointIndex]>,
    ) {
        let mut inner = self.inner.lock();
        inner.remove(key);

        let region_key = match (keypoints, region) {
            (Some(set), Some(members)) => {
                Some(region_fingerprint(set, members, self.config.fingerprint_grid))
            }
            _ => None,
        };
        let bucket = keypoints.and_then(|s| fingerprint::bucket_cell(s, self.config.bucket_grid));
        let seq = inner.next_seq();
        let entry = CacheEntry {
            value,
            keypoints: keypoints.cloned(),
            region: region_key,
            bucket,
            timestamp: keypoints.map(|s| s.timestamp()),
            inserted_seq: seq,
            last_access_seq: seq,
            access_count: 0,
            quality: quality.clamp(0.0, 1.0),
            size: mem::size_of::<CacheEntry<T>>(),
        };

        inner.memory_bytes += entry.size;
        if let Some(r) = region_key {
            inner.regions.insert(r, key);
        }
        if let Some(cell) = bucket {
            inner.buckets.entry(cell).or_default().push(key);
        }
        inner.entries.insert(key, entry);

        self.evict_if_needed(&mut inner);
    }

    fn over_limit(&self, inner: &CacheInner<T>) -> bool {
        inner.entries.len() > self.config.capacity
            || inner.memory_bytes > self.config.max_memory_bytes
    }

    fn evict_if_needed(&self, inner: &mut CacheInner<T>) {
        while self.over_limit(inner) && !inner.entries.is_empty() {
            let count = ((inner.entries.len() as f64 * self.config.eviction_fraction).floor() as usize).max(1);
            let stats: Vec<EntryStats> = inner
                .entries
                .iter()
                .map(|(k, e)| EntryStats {
                    key: *k,
                    inserted_seq: e.inserted_seq,
                    last_access_seq: e.last_access_seq,
                    access_count: e.access_count,
                    quality: e.quality,
                })
                .collect();
            let victims = select_victims(&stats, inner.strategy, &self.weights, count);
            for key in &victims {
                inner.remove(*key);
            }
            inner.stats.evictions += victims.len() as u64;
            debug!(
                evicted = victims.len(),
                remaining = inner.entries.len(),
                strategy = ?inner.strategy,
                "cache eviction pass"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.inner.lock().strategy
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            memory_bytes: inner.memory_bytes,
            strategy: Some(inner.strategy),
            ..inner.stats.clone()
        }
    }

    /// 全エントリと統計を破棄する。戦略は設定値に戻す
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.regions.clear();
        inner.buckets.clear();
        inner.memory_bytes = 0;
        inner.recent_lookups.clear();
        inner.strategy = self.config.strategy;
        inner.stats = CacheStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{standing_pose, translated};

    fn cache() -> FrameCache<u32> {
        FrameCache::from_config(&CacheConfig::default())
    }

    fn config_with(f: impl FnOnce(&mut CacheConfig)) -> CacheConfig {
        let mut c = CacheConfig::default();
        f(&mut c);
        c
    }

    #[test]
    fn test_exact_roundtrip() {
        let c = cache();
        let set = standing_pose(0.9, 0.0);
        let key = c.fingerprint_of(&set);
        c.put(key, 42, Some(&set), 0.8, None);
        let hit = c.get(key, None, None).unwrap();
        assert_eq!(hit.value, 42);
        assert_eq!(hit.kind, MatchKind::Exact);
        assert_eq!(hit.quality, 0.8);
        assert_eq!(c.stats().exact_hits, 1);
    }

    #[test]
    fn test_miss_without_any_match() {
        let c = cache();
        let set = standing_pose(0.9, 0.0);
        c.put(c.fingerprint_of(&set), 1, Some(&set), 0.8, None);
        let far = translated(&set, 2000.0, 0.0);
        assert!(c.get(c.fingerprint_of(&far), Some(&far), None).is_none());
        assert!(c.get(12345, None, None).is_none());
        assert_eq!(c.stats().misses, 2);
    }

    /// 指定した点だけ原点へ飛ばしたコピー
    fn displaced(set: &KeypointSet, ids: &[KeypointIndex]) -> KeypointSet {
        let mut out = set.clone();
        for &id in ids {
            let kp = out.get(id).with_position(0.0, 0.0, 0.0);
            out.set(id, kp);
        }
        out
    }

    #[test]
    fn test_similarity_hit() {
        let c = cache();
        let set = standing_pose(0.9, 0.0);
        c.put(c.fingerprint_of(&set), 7, Some(&set), 0.8, None);
        // 格子をまたぐが全点 2px 以内
        let near = translated(&set, 1.0, 1.0);
        assert_ne!(c.fingerprint_of(&near), c.fingerprint_of(&set));
        let hit = c.get(c.fingerprint_of(&near), Some(&near), None).unwrap();
        assert_eq!(hit.kind, MatchKind::Similarity);
        assert_eq!(hit.value, 7);
        assert_eq!(hit.similarity, 1.0);
    }

    #[test]
    fn test_similarity_below_threshold_misses() {
        let c = cache();
        let set = standing_pose(0.9, 0.0);
        c.put(c.fingerprint_of(&set), 7, Some(&set), 0.8, None);
        // 一様な 3px の移動は近傍ではない
        let moved = translated(&set, 3.0, 0.0);
        assert!(c.get(c.fingerprint_of(&moved), Some(&moved), None).is_none());
        // 3 点外れると 30/33 ≈ 0.909 < 0.92
        let partial = displaced(
            &set,
            &[KeypointIndex::LeftWrist, KeypointIndex::RightWrist, KeypointIndex::LeftAnkle],
        );
        assert!(c.get(c.fingerprint_of(&partial), Some(&partial), None).is_none());
    }

    #[test]
    fn test_region_hit() {
        let c = cache();
        let set = standing_pose(0.9, 0.0);
        let head = [KeypointIndex::Nose, KeypointIndex::LeftEye, KeypointIndex::RightEye];
        c.put(c.fingerprint_of(&set), 3, Some(&set), 0.8, Some(&head));
        // 頭部以外を大きく動かす
        let mut query = translated(&set, 2000.0, 0.0);
        for id in head {
            query.set(id, *set.get(id));
        }
        let hit = c.get(c.fingerprint_of(&query), Some(&query), Some(&head)).unwrap();
        assert_eq!(hit.kind, MatchKind::Region);
        assert_eq!(hit.value, 3);
    }

    #[test]
    fn test_region_needs_region_on_put() {
        let c = cache();
        let set = standing_pose(0.9, 0.0);
        let head = [KeypointIndex::Nose, KeypointIndex::LeftEye, KeypointIndex::RightEye];
        // フレーム全体だけ保存した場合
        c.put(c.fingerprint_of(&set), 3, Some(&set), 0.8, None);
        let mut query = translated(&set, 2000.0, 0.0);
        for id in head {
            query.set(id, *set.get(id));
        }
        assert!(c.get(c.fingerprint_of(&query), Some(&query), Some(&head)).is_none());
        assert_eq!(c.stats().region_hits, 0);
    }

    #[test]
    fn test_temporal_hit_only_with_temporal_strategy() {
        let lru = FrameCache::from_config(&config_with(|c| c.adaptive = false));
        let temporal = FrameCache::from_config(&config_with(|c| {
            c.adaptive = false;
            c.strategy = CacheStrategy::Temporal;
        }));
        let set = standing_pose(0.9, 0.0);
        // 類似度 28/33 ≈ 0.85: 類似一致には届かないが時間一致の下限は超える
        let query = displaced(
            &set,
            &[
                KeypointIndex::LeftWrist,
                KeypointIndex::RightWrist,
                KeypointIndex::LeftElbow,
                KeypointIndex::RightElbow,
                KeypointIndex::LeftAnkle,
            ],
        )
        .restamped(2.0);
        for c in [&lru, &temporal] {
            c.put(c.fingerprint_of(&set), 9u32, Some(&set), 0.8, None);
        }
        assert!(lru.get(lru.fingerprint_of(&query), Some(&query), None).is_none());
        let hit = temporal
            .get(temporal.fingerprint_of(&query), Some(&query), None)
            .unwrap();
        assert_eq!(hit.kind, MatchKind::Temporal);

        let stale = query.restamped(30.0);
        assert!(temporal.get(temporal.fingerprint_of(&stale), Some(&stale), None).is_none());
    }

    #[test]
    fn test_capacity_eviction_lru() {
        let c = FrameCache::from_config(&config_with(|c| {
            c.capacity = 10;
            c.adaptive = false;
        }));
        for k in 0..10u64 {
            c.put(k, k as u32, None, 0.5, None);
        }
        // 0 に触れておくと最古扱いから外れる
        assert!(c.get(0, None, None).is_some());
        c.put(10, 10, None, 0.5, None);
        assert!(c.len() <= 10);
        assert_eq!(c.stats().evictions, 1);
        assert!(c.get(0, None, None).is_some());
        assert!(c.get(1, None, None).is_none());
    }

    #[test]
    fn test_memory_ceiling() {
        let entry_size = mem::size_of::<CacheEntry<u32>>();
        let c = FrameCache::from_config(&config_with(|c| {
            c.max_memory_bytes = entry_size * 5;
            c.adaptive = false;
        }));
        for k in 0..20u64 {
            c.put(k, 0u32, None, 0.5, None);
            let stats = c.stats();
            assert!(stats.memory_bytes <= entry_size * 5);
            assert!(stats.entries <= 5);
        }
    }

    #[test]
    fn test_adaptive_strategy_switch() {
        let c = FrameCache::from_config(&config_with(|c| c.adapt_window = 10));
        assert_eq!(c.strategy(), CacheStrategy::Lru);
        for k in 0..10u64 {
            assert!(c.get(k, None, None).is_none());
        }
        assert_eq!(c.strategy(), CacheStrategy::Temporal);

        c.put(99, 1u32, None, 0.5, None);
        for _ in 0..10 {
            assert!(c.get(99, None, None).is_some());
        }
        assert_eq!(c.strategy(), CacheStrategy::Lru);
    }

    #[test]
    fn test_clear_resets() {
        let c = cache();
        let set = standing_pose(0.9, 0.0);
        c.put(c.fingerprint_of(&set), 1, Some(&set), 0.8, None);
        c.get(0, None, None);
        c.clear();
        assert!(c.is_empty());
        let stats = c.stats();
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.memory_bytes, 0);
        assert!(c.get(c.fingerprint_of(&set), Some(&set), None).is_none());
    }

    #[test]
    fn test_overwrite_same_key() {
        let c = cache();
        c.put(1, 10u32, None, 0.5, None);
        c.put(1, 20u32, None, 0.5, None);
        assert_eq!(c.len(), 1);
        assert_eq!(c.get(1, None, None).unwrap().value, 20);
        assert_eq!(c.stats().memory_bytes, mem::size_of::<CacheEntry<u32>>());
    }
}
