use crate::scheduler::types::Tier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Concurrency-safe per-tier counters for the end-of-run report.
#[derive(Debug)]
pub struct MetricsAggregator {
    data: Arc<Mutex<MetricsData>>,
}

#[derive(Debug)]
struct MetricsData {
    started_at: DateTime<Utc>,
    tiers: BTreeMap<Tier, TierMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierMetrics {
    pub materialized: u64,
    pub failed: u64,
    /// Nodes never synthesized because an ancestor failed
    pub skipped: u64,
    /// Failures caused by a panic inside the task
    pub panicked: u64,
    pub attempts: u64,
    pub cumulative_duration: Duration,
}

impl TierMetrics {
    /// Terminated tasks, materialized or failed.
    pub fn terminations(&self) -> u64 {
        self.materialized + self.failed
    }

    pub fn average_duration(&self) -> Option<Duration> {
        let count = self.terminations();
        if count == 0 {
            return None;
        }
        Some(self.cumulative_duration / count as u32)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub tiers: BTreeMap<Tier, TierMetrics>,
}

impl MetricsSnapshot {
    pub fn tier(&self, tier: Tier) -> TierMetrics {
        self.tiers.get(&tier).cloned().unwrap_or_default()
    }

    pub fn total_failed(&self) -> u64 {
        self.tiers.values().map(|t| t.failed).sum()
    }

    pub fn total_materialized(&self) -> u64 {
        self.tiers.values().map(|t| t.materialized).sum()
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        let tiers = Tier::ALL
            .iter()
            .map(|tier| (*tier, TierMetrics::default()))
            .collect();
        Self {
            data: Arc::new(Mutex::new(MetricsData {
                started_at: Utc::now(),
                tiers,
            })),
        }
    }

    pub async fn record_success(&self, tier: Tier, duration: Duration, attempts: u32) {
        let mut data = self.data.lock().await;
        let entry = data.tiers.entry(tier).or_default();
        entry.materialized += 1;
        entry.attempts += attempts as u64;
        entry.cumulative_duration += duration;
    }

    pub async fn record_failure(&self, tier: Tier, duration: Duration, attempts: u32) {
        let mut data = self.data.lock().await;
        let entry = data.tiers.entry(tier).or_default();
        entry.failed += 1;
        entry.attempts += attempts as u64;
        entry.cumulative_duration += duration;
    }

    pub async fn record_panic(&self, tier: Tier, duration: Duration) {
        let mut data = self.data.lock().await;
        let entry = data.tiers.entry(tier).or_default();
        entry.failed += 1;
        entry.panicked += 1;
        entry.cumulative_duration += duration;
    }

    pub async fn record_skipped(&self, tier: Tier, count: usize) {
        if count == 0 {
            return;
        }
        let mut data = self.data.lock().await;
        data.tiers.entry(tier).or_default().skipped += count as u64;
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let data = self.data.lock().await;
        MetricsSnapshot {
            started_at: data.started_at,
            tiers: data.tiers.clone(),
        }
    }
}
