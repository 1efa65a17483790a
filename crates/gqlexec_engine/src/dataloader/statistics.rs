//! Data loader counters.

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of one data loader.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    load_count: AtomicU64,
    load_error_count: AtomicU64,
    batch_invoke_count: AtomicU64,
    batch_load_count: AtomicU64,
    batch_load_exception_count: AtomicU64,
    cache_hit_count: AtomicU64,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_load_count(&self) {
        self.load_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_load_error_count(&self) {
        self.load_error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one batch call carrying `keys` keys.
    pub fn increment_batch_load_count(&self, keys: u64) {
        self.batch_invoke_count.fetch_add(1, Ordering::Relaxed);
        self.batch_load_count.fetch_add(keys, Ordering::Relaxed);
    }

    pub fn increment_batch_load_exception_count(&self) {
        self.batch_load_exception_count
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_hit_count(&self) {
        self.cache_hit_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of the counters.
    pub fn snapshot(&self) -> Statistics {
        Statistics {
            load_count: self.load_count.load(Ordering::Relaxed),
            load_error_count: self.load_error_count.load(Ordering::Relaxed),
            batch_invoke_count: self.batch_invoke_count.load(Ordering::Relaxed),
            batch_load_count: self.batch_load_count.load(Ordering::Relaxed),
            batch_load_exception_count: self.batch_load_exception_count.load(Ordering::Relaxed),
            cache_hit_count: self.cache_hit_count.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of data loader counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub load_count: u64,
    pub load_error_count: u64,
    pub batch_invoke_count: u64,
    pub batch_load_count: u64,
    pub batch_load_exception_count: u64,
    pub cache_hit_count: u64,
}

impl Statistics {
    pub fn load_error_ratio(&self) -> f64 {
        ratio(self.load_error_count, self.load_count)
    }

    pub fn batch_load_ratio(&self) -> f64 {
        ratio(self.batch_load_count, self.load_count)
    }

    pub fn batch_load_exception_ratio(&self) -> f64 {
        ratio(self.batch_load_exception_count, self.load_count)
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        ratio(self.cache_hit_count, self.load_count)
    }

    /// Adds two snapshots together.
    #[must_use]
    pub fn combine(&self, other: &Statistics) -> Statistics {
        Statistics {
            load_count: self.load_count + other.load_count,
            load_error_count: self.load_error_count + other.load_error_count,
            batch_invoke_count: self.batch_invoke_count + other.batch_invoke_count,
            batch_load_count: self.batch_load_count + other.batch_load_count,
            batch_load_exception_count: self.batch_load_exception_count
                + other.batch_load_exception_count,
            cache_hit_count: self.cache_hit_count + other.cache_hit_count,
        }
    }

    /// The serializable form reported in result extensions.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("loadCount".into(), self.load_count.into());
        map.insert("loadErrorCount".into(), self.load_error_count.into());
        map.insert("loadErrorRatio".into(), self.load_error_ratio().into());
        map.insert("batchInvokeCount".into(), self.batch_invoke_count.into());
        map.insert("batchLoadCount".into(), self.batch_load_count.into());
        map.insert("batchLoadRatio".into(), self.batch_load_ratio().into());
        map.insert(
            "batchLoadExceptionCount".into(),
            self.batch_load_exception_count.into(),
        );
        map.insert(
            "batchLoadExceptionRatio".into(),
            self.batch_load_exception_ratio().into(),
        );
        map.insert("cacheHitCount".into(), self.cache_hit_count.into());
        map.insert("cacheHitRatio".into(), self.cache_hit_ratio().into());
        map
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios_and_map() {
        let collector = StatisticsCollector::new();
        for _ in 0..4 {
            collector.increment_load_count();
        }
        collector.increment_cache_hit_count();
        collector.increment_batch_load_count(3);

        let stats = collector.snapshot();
        assert_eq!(stats.cache_hit_ratio(), 0.25);
        assert_eq!(stats.batch_load_ratio(), 0.75);

        let map = stats.to_map();
        assert_eq!(map["loadCount"], 4);
        assert_eq!(map["batchInvokeCount"], 1);
        assert_eq!(map["batchLoadCount"], 3);
        assert_eq!(map.keys().next().map(String::as_str), Some("loadCount"));
    }

    #[test]
    fn test_empty_ratios_are_zero() {
        assert_eq!(Statistics::default().load_error_ratio(), 0.0);
    }

    #[test]
    fn test_combine() {
        let a = Statistics {
            load_count: 2,
            cache_hit_count: 1,
            ..Statistics::default()
        };
        let b = Statistics {
            load_count: 3,
            batch_invoke_count: 1,
            ..Statistics::default()
        };
        let combined = a.combine(&b);
        assert_eq!(combined.load_count, 5);
        assert_eq!(combined.cache_hit_count, 1);
        assert_eq!(combined.batch_invoke_count, 1);
    }
}
