use crate::scheduler::metrics::MetricsAggregator;
use crate::scheduler::queue::{BoundedTaskQueue, QueueError};
use crate::scheduler::types::{ProvisionTask, Tier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Worker capacity of each tier pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub organization: usize,
    pub project: usize,
    pub application: usize,
    pub user: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::uniform(100)
    }
}

impl PoolConfig {
    pub fn uniform(capacity: usize) -> Self {
        Self {
            organization: capacity,
            project: capacity,
            application: capacity,
            user: capacity,
        }
    }

    pub fn capacity(&self, tier: Tier) -> usize {
        match tier {
            Tier::Organization => self.organization,
            Tier::Project => self.project,
            Tier::Application => self.application,
            Tier::User => self.user,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for tier in Tier::ALL {
            if self.capacity(tier) == 0 {
                return Err(format!("{} pool capacity must be at least 1", tier));
            }
        }
        Ok(())
    }
}

/// Four independent bounded queues, one per tier.
///
/// Pools never signal each other. A child task only reaches its pool after
/// the parent materialized because the parent's own task submits it.
#[derive(Debug)]
pub struct TierPools {
    organizations: BoundedTaskQueue,
    projects: BoundedTaskQueue,
    applications: BoundedTaskQueue,
    users: BoundedTaskQueue,
}

impl TierPools {
    pub fn new(config: &PoolConfig, metrics: Arc<MetricsAggregator>) -> Self {
        let queue = |tier| BoundedTaskQueue::new(tier, config.capacity(tier), Arc::clone(&metrics));
        Self {
            organizations: queue(Tier::Organization),
            projects: queue(Tier::Project),
            applications: queue(Tier::Application),
            users: queue(Tier::User),
        }
    }

    pub fn pool(&self, tier: Tier) -> &BoundedTaskQueue {
        match tier {
            Tier::Organization => &self.organizations,
            Tier::Project => &self.projects,
            Tier::Application => &self.applications,
            Tier::User => &self.users,
        }
    }

    /// Route a task to the pool of its tier.
    pub fn submit(&self, task: ProvisionTask) -> Result<(), QueueError> {
        self.pool(task.tier).submit(task)
    }

    pub fn close(&self) {
        for tier in Tier::ALL {
            self.pool(tier).close();
        }
    }

    pub async fn join(&self) {
        for tier in Tier::ALL {
            self.pool(tier).join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::join::JoinCounter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_capacity_matches_worker_pool_size() {
        let config = PoolConfig::default();
        for tier in Tier::ALL {
            assert_eq!(config.capacity(tier), 100);
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PoolConfig {
            application: 0,
            ..PoolConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("application"));
    }

    #[tokio::test]
    async fn test_tasks_are_routed_by_tier() {
        let metrics = Arc::new(MetricsAggregator::new());
        let pools = TierPools::new(&PoolConfig::uniform(2), metrics);
        let join = JoinCounter::new();
        let ran = Arc::new(AtomicUsize::new(0));

        for tier in Tier::ALL {
            let ran = Arc::clone(&ran);
            pools
                .submit(ProvisionTask::new(tier, tier.as_str(), join.register(), async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        join.wait_for_zero().await;
        pools.close();
        pools.join().await;

        assert_eq!(ran.load(Ordering::SeqCst), 4);
        for tier in Tier::ALL {
            assert_eq!(pools.pool(tier).stats().submitted(), 1);
            assert_eq!(pools.pool(tier).capacity(), 2);
        }
    }

    #[tokio::test]
    async fn test_close_closes_every_pool() {
        let pools = TierPools::new(&PoolConfig::uniform(1), Arc::new(MetricsAggregator::new()));
        pools.close();
        for tier in Tier::ALL {
            assert!(pools.pool(tier).is_closed());
        }
        pools.join().await;
    }
}
