use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Category;

/// Counters and latency samples of one engine
///
/// Every attempt counts toward the message totals; the failure counters are
/// a subset of them. Only the owning engine writes; other engines' stats are
/// folded in with [`Stats::merge`] once they have terminated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    total_put_messages: u64,
    total_failed_puts: u64,
    total_get_messages: u64,
    total_failed_gets: u64,
    total_success_gets: u64,
    put_latencies: Vec<Duration>,
    get_latencies: Vec<Duration>,
    get_hops: Vec<u32>,
    row_sampling_latencies: Vec<Duration>,
    col_sampling_latencies: Vec<Duration>,
    random_sampling_latencies: Vec<Duration>,
    seeding_latencies: Vec<Duration>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put(&mut self, latency: Duration, succeeded: bool) {
        self.total_put_messages += 1;
        if !succeeded {
            self.total_failed_puts += 1;
        }
        self.put_latencies.push(latency);
    }

    /// `hops` is `Some` for a successful read
    pub(crate) fn record_get(&mut self, latency: Duration, hops: Option<u32>) {
        self.total_get_messages += 1;
        self.get_latencies.push(latency);
        match hops {
            Some(hops) => {
                self.total_success_gets += 1;
                self.get_hops.push(hops);
            }
            None => self.total_failed_gets += 1,
        }
    }

    pub(crate) fn record_sampling_latency(&mut self, category: Category, latency: Duration) {
        match category {
            Category::Row => self.row_sampling_latencies.push(latency),
            Category::Col => self.col_sampling_latencies.push(latency),
            Category::Random => self.random_sampling_latencies.push(latency),
        }
    }

    pub(crate) fn record_seeding_latency(&mut self, latency: Duration) {
        self.seeding_latencies.push(latency);
    }

    pub fn total_put_messages(&self) -> u64 {
        self.total_put_messages
    }

    pub fn total_failed_puts(&self) -> u64 {
        self.total_failed_puts
    }

    pub fn successful_puts(&self) -> u64 {
        self.total_put_messages - self.total_failed_puts
    }

    pub fn total_get_messages(&self) -> u64 {
        self.total_get_messages
    }

    pub fn total_failed_gets(&self) -> u64 {
        self.total_failed_gets
    }

    pub fn total_success_gets(&self) -> u64 {
        self.total_success_gets
    }

    pub fn put_latencies(&self) -> &[Duration] {
        &self.put_latencies
    }

    pub fn get_latencies(&self) -> &[Duration] {
        &self.get_latencies
    }

    pub fn get_hops(&self) -> &[u32] {
        &self.get_hops
    }

    pub fn row_sampling_latencies(&self) -> &[Duration] {
        &self.row_sampling_latencies
    }

    pub fn col_sampling_latencies(&self) -> &[Duration] {
        &self.col_sampling_latencies
    }

    pub fn random_sampling_latencies(&self) -> &[Duration] {
        &self.random_sampling_latencies
    }

    pub fn seeding_latencies(&self) -> &[Duration] {
        &self.seeding_latencies
    }

    pub fn sampling_latencies(&self, category: Category) -> &[Duration] {
        match category {
            Category::Row => &self.row_sampling_latencies,
            Category::Col => &self.col_sampling_latencies,
            Category::Random => &self.random_sampling_latencies,
        }
    }

    /// Fold another engine's stats into this one
    pub fn merge(&mut self, other: &Stats) {
        self.total_put_messages += other.total_put_messages;
        self.total_failed_puts += other.total_failed_puts;
        self.total_get_messages += other.total_get_messages;
        self.total_failed_gets += other.total_failed_gets;
        self.total_success_gets += other.total_success_gets;
        self.put_latencies.extend_from_slice(&other.put_latencies);
        self.get_latencies.extend_from_slice(&other.get_latencies);
        self.get_hops.extend_from_slice(&other.get_hops);
        self.row_sampling_latencies
            .extend_from_slice(&other.row_sampling_latencies);
        self.col_sampling_latencies
            .extend_from_slice(&other.col_sampling_latencies);
        self.random_sampling_latencies
            .extend_from_slice(&other.random_sampling_latencies);
        self.seeding_latencies.extend_from_slice(&other.seeding_latencies);
    }

    pub fn summary(&self) -> StatsSummary {
        let mean_hops = if self.get_hops.is_empty() {
            0.0
        } else {
            self.get_hops.iter().map(|h| *h as f64).sum::<f64>() / self.get_hops.len() as f64
        };

        StatsSummary {
            total_put_messages: self.total_put_messages,
            total_failed_puts: self.total_failed_puts,
            total_get_messages: self.total_get_messages,
            total_failed_gets: self.total_failed_gets,
            total_success_gets: self.total_success_gets,
            mean_hops,
            put_latency: LatencySummary::from_samples(&self.put_latencies),
            get_latency: LatencySummary::from_samples(&self.get_latencies),
            row_sampling: LatencySummary::from_samples(&self.row_sampling_latencies),
            col_sampling: LatencySummary::from_samples(&self.col_sampling_latencies),
            random_sampling: LatencySummary::from_samples(&self.random_sampling_latencies),
            seeding: LatencySummary::from_samples(&self.seeding_latencies),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub min: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub max: Duration,
}

impl LatencySummary {
    pub fn from_samples(samples: &[Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let total: Duration = sorted.iter().sum();
        let percentile = |p: f64| {
            let rank = ((sorted.len() - 1) as f64 * p).round() as usize;
            sorted[rank.min(sorted.len() - 1)]
        };

        Self {
            count: sorted.len(),
            min: sorted[0],
            mean: total / sorted.len() as u32,
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
            max: sorted[sorted.len() - 1],
        }
    }
}

/// Read-only digest of [`Stats`] for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_put_messages: u64,
    pub total_failed_puts: u64,
    pub total_get_messages: u64,
    pub total_failed_gets: u64,
    pub total_success_gets: u64,
    pub mean_hops: f64,
    pub put_latency: LatencySummary,
    pub get_latency: LatencySummary,
    pub row_sampling: LatencySummary,
    pub col_sampling: LatencySummary,
    pub random_sampling: LatencySummary,
    pub seeding: LatencySummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_failures_are_a_subset_of_attempts() {
        let mut stats = Stats::new();
        stats.record_put(ms(5), true);
        stats.record_put(ms(7), false);
        stats.record_get(ms(3), Some(2));
        stats.record_get(ms(4), None);

        assert_eq!(stats.total_put_messages(), 2);
        assert_eq!(stats.total_failed_puts(), 1);
        assert_eq!(stats.successful_puts(), 1);
        assert_eq!(stats.total_get_messages(), 2);
        assert_eq!(stats.total_failed_gets(), 1);
        assert_eq!(stats.total_success_gets(), 1);
        assert_eq!(stats.put_latencies().len(), 2);
        assert_eq!(stats.get_latencies().len(), 2);
        assert_eq!(stats.get_hops(), &[2]);
    }

    #[test]
    fn test_sampling_latencies_by_category() {
        let mut stats = Stats::new();
        stats.record_sampling_latency(Category::Row, ms(10));
        stats.record_sampling_latency(Category::Col, ms(20));
        stats.record_sampling_latency(Category::Random, ms(30));
        stats.record_seeding_latency(ms(40));

        assert_eq!(stats.row_sampling_latencies(), &[ms(10)]);
        assert_eq!(stats.sampling_latencies(Category::Col), &[ms(20)]);
        assert_eq!(stats.random_sampling_latencies(), &[ms(30)]);
        assert_eq!(stats.seeding_latencies(), &[ms(40)]);
    }

    #[test]
    fn test_merge() {
        let mut a = Stats::new();
        a.record_put(ms(1), true);
        a.record_seeding_latency(ms(100));

        let mut b = Stats::new();
        b.record_put(ms(2), false);
        b.record_get(ms(3), Some(4));
        b.record_sampling_latency(Category::Row, ms(50));

        a.merge(&b);
        assert_eq!(a.total_put_messages(), 2);
        assert_eq!(a.total_failed_puts(), 1);
        assert_eq!(a.total_success_gets(), 1);
        assert_eq!(a.put_latencies(), &[ms(1), ms(2)]);
        assert_eq!(a.row_sampling_latencies(), &[ms(50)]);
        assert_eq!(a.seeding_latencies(), &[ms(100)]);
    }

    #[test]
    fn test_latency_summary() {
        let samples: Vec<Duration> = (1..=100).map(ms).collect();
        let summary = LatencySummary::from_samples(&samples);

        assert_eq!(summary.count, 100);
        assert_eq!(summary.min, ms(1));
        assert_eq!(summary.max, ms(100));
        assert_eq!(summary.p50, ms(51));
        assert_eq!(summary.p99, ms(99));
        assert_eq!(summary.mean, Duration::from_micros(50_500));

        assert_eq!(LatencySummary::from_samples(&[]), LatencySummary::default());
    }

    #[test]
    fn test_summary_mean_hops() {
        let mut stats = Stats::new();
        stats.record_get(ms(1), Some(1));
        stats.record_get(ms(1), Some(3));
        let summary = stats.summary();
        assert_eq!(summary.mean_hops, 2.0);
        assert_eq!(summary.get_latency.count, 2);
    }
}
