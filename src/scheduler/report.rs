use crate::scheduler::ledger::LedgerEntry;
use crate::scheduler::metrics::MetricsSnapshot;
use crate::scheduler::types::{FanoutPlan, Tier};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Concurrent,
    Sequential,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Concurrent => f.write_str("concurrent"),
            RunMode::Sequential => f.write_str("sequential"),
        }
    }
}

/// The failure that stopped a sequential run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaltRecord {
    pub tier: Tier,
    pub name: String,
    pub error: String,
}

/// Outcome of one provisioning pass, read after every task terminated.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub plan: FanoutPlan,
    pub metrics: MetricsSnapshot,
    pub resources: Vec<LedgerEntry>,
    pub elapsed: Duration,
    pub cancelled: bool,
    pub halted: Option<HaltRecord>,
}

impl RunReport {
    pub fn created(&self, tier: Tier) -> u64 {
        self.metrics.tier(tier).materialized
    }

    /// True when every planned node materialized.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self.halted.is_none()
            && Tier::ALL
                .iter()
                .all(|tier| self.created(*tier) as usize == self.plan.expected(*tier))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        for tier in Tier::ALL {
            writeln!(f, "Total {} Created: {}", tier.plural_title(), self.created(tier))?;
        }
        writeln!(f, "Total Time Taken: {:?}", self.elapsed)?;

        for tier in Tier::ALL {
            let stats = self.metrics.tier(tier);
            if let Some(average) = stats.average_duration() {
                writeln!(f, "Average time taken per {}: {:?}", tier, average)?;
            }
        }

        let failed = self.metrics.total_failed();
        let skipped: u64 = self.metrics.tiers.values().map(|t| t.skipped).sum();
        if failed > 0 || skipped > 0 {
            writeln!(f)?;
            for tier in Tier::ALL {
                let stats = self.metrics.tier(tier);
                if stats.failed > 0 || stats.skipped > 0 {
                    writeln!(
                        f,
                        "{}: {} failed, {} skipped",
                        tier.plural_title(),
                        stats.failed,
                        stats.skipped
                    )?;
                }
            }
        }

        if self.cancelled {
            writeln!(f, "Run was cancelled before completion")?;
        }
        if let Some(halt) = &self.halted {
            writeln!(
                f,
                "Stopped at {} '{}': {}",
                halt.tier, halt.name, halt.error
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::metrics::MetricsAggregator;

    async fn report(plan: FanoutPlan, metrics: &MetricsAggregator) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            mode: RunMode::Concurrent,
            plan,
            metrics: metrics.snapshot().await,
            resources: Vec::new(),
            elapsed: Duration::from_millis(1500),
            cancelled: false,
            halted: None,
        }
    }

    #[tokio::test]
    async fn test_summary_lists_every_tier() {
        let metrics = MetricsAggregator::new();
        for tier in Tier::ALL {
            metrics
                .record_success(tier, Duration::from_millis(10), 1)
                .await;
        }
        let report = report(FanoutPlan::new(1, 1, 1, 1), &metrics).await;

        let text = report.to_string();
        assert!(text.contains("Total Organizations Created: 1"));
        assert!(text.contains("Total Projects Created: 1"));
        assert!(text.contains("Total Applications Created: 1"));
        assert!(text.contains("Total Users Created: 1"));
        assert!(text.contains("Total Time Taken: 1.5s"));
        assert!(text.contains("Average time taken per organization: 10ms"));
        assert!(!text.contains("failed"));
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_summary_shows_failures_and_skips() {
        let metrics = MetricsAggregator::new();
        metrics
            .record_failure(Tier::Organization, Duration::from_millis(300), 3)
            .await;
        metrics.record_skipped(Tier::Project, 2).await;
        let report = report(FanoutPlan::new(1, 2, 1, 1), &metrics).await;

        let text = report.to_string();
        assert!(text.contains("Total Organizations Created: 0"));
        assert!(text.contains("Organizations: 1 failed, 0 skipped"));
        assert!(text.contains("Projects: 0 failed, 2 skipped"));
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_json_report_shape() {
        let metrics = MetricsAggregator::new();
        let report = report(FanoutPlan::new(1, 1, 1, 1), &metrics).await;
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["mode"], "concurrent");
        assert_eq!(value["plan"]["organizations"], 1);
        assert!(value["metrics"]["tiers"]["organization"].is_object());
        assert!(value["resources"].as_array().unwrap().is_empty());
    }
}
