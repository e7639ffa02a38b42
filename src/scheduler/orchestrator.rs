//! Dependency-aware fan-out driver.
//!
//! ```text
//!   run() ──► organization pool ──► Create Organization
//!                                        │ materialized
//!                     ┌──────────────────┴──────────────────┐
//!                     ▼                                     ▼
//!               project pool                            user pool
//!                     │ materialized
//!                     ▼
//!             application pool
//! ```
//!
//! Children are registered with the [`JoinCounter`] and submitted from inside
//! their parent's task, after the parent materialized and before the parent's
//! own guard is released. A failed organization or project synthesizes no
//! children; the descendants it would have produced are counted as skipped.

use crate::scheduler::join::JoinCounter;
use crate::scheduler::ledger::ResourceLedger;
use crate::scheduler::metrics::MetricsAggregator;
use crate::scheduler::naming::{NameGenerator, NamingConfig, NamingScheme};
use crate::scheduler::pools::{PoolConfig, TierPools};
use crate::scheduler::report::{RunMode, RunReport};
use crate::scheduler::retry::{RetryConfig, RetryError, RetryExecutor, RetryOutcome};
use crate::scheduler::types::{FanoutPlan, ProvisionTask, ResourceNode, Tier};
use crate::service::provider::{IdentityService, ResolverTable};
use crate::service::types::{RemoteId, ServiceError, UserProfile};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use tracing::{debug, error, info, warn};

pub const DEFAULT_USER_PASSWORD: &str = "Secret@1234";

/// Scheduler settings shared by the concurrent and sequential drivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub pools: PoolConfig,
    pub retry: RetryConfig,
    pub naming: NamingConfig,
    pub user_password: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pools: PoolConfig::default(),
            retry: RetryConfig::default(),
            naming: NamingConfig::default(),
            user_password: DEFAULT_USER_PASSWORD.to_string(),
        }
    }
}

pub struct FanoutOrchestrator {
    service: Arc<dyn IdentityService>,
    config: OrchestratorConfig,
    resolvers: ResolverTable,
    cancel: CancellationToken,
}

/// State shared by every task of one run.
struct FanoutContext {
    service: Arc<dyn IdentityService>,
    pools: TierPools,
    join: JoinCounter,
    metrics: Arc<MetricsAggregator>,
    ledger: ResourceLedger,
    retry: RetryExecutor,
    resolvers: ResolverTable,
    names: NameGenerator,
    plan: FanoutPlan,
    user_password: String,
    cancel: CancellationToken,
}

impl FanoutOrchestrator {
    pub fn new(service: Arc<dyn IdentityService>, config: OrchestratorConfig) -> Self {
        Self {
            service,
            config,
            resolvers: ResolverTable::with_defaults(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_resolvers(mut self, resolvers: ResolverTable) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Stop fanning out and interrupt retries once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Provision the whole hierarchy described by `plan` and wait until every
    /// task, including the ones synthesized along the way, has terminated.
    pub async fn run(&self, plan: FanoutPlan) -> RunReport {
        let run_id = Uuid::new_v4();
        info!("Running in concurrent mode... (run {})", run_id);
        let started = Instant::now();
        let metrics = Arc::new(MetricsAggregator::new());

        let ctx = Arc::new(FanoutContext {
            service: Arc::clone(&self.service),
            pools: TierPools::new(&self.config.pools, Arc::clone(&metrics)),
            join: JoinCounter::new(),
            metrics: Arc::clone(&metrics),
            ledger: ResourceLedger::new(),
            retry: RetryExecutor::with_cancellation(self.config.retry.clone(), self.cancel.clone()),
            resolvers: self.resolvers.clone(),
            names: NameGenerator::new(self.config.naming.clone(), NamingScheme::Unique),
            plan,
            user_password: self.config.user_password.clone(),
            cancel: self.cancel.clone(),
        });

        for index in 1..=plan.organizations {
            ctx.submit_organization(index);
        }

        ctx.join.wait_for_zero().await;
        ctx.pools.close();
        ctx.pools.join().await;
        debug!(
            "All {} registered tasks terminated",
            ctx.join.registered()
        );

        RunReport {
            run_id,
            mode: RunMode::Concurrent,
            plan,
            metrics: metrics.snapshot().await,
            resources: ctx.ledger.entries(),
            elapsed: started.elapsed(),
            cancelled: self.cancel.is_cancelled(),
            halted: None,
        }
    }
}

fn task_label(tier: Tier, name: &str) -> String {
    format!("Create {}: {}", tier.title(), name)
}

impl FanoutContext {
    /// Register `work` with the join counter, then hand it to its tier pool.
    fn submit<F>(&self, tier: Tier, label: String, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = ProvisionTask::new(tier, label, self.join.register(), work)
            .with_abandons_on_panic(self.plan.abandoned_by(tier));
        if let Err(e) = self.pools.submit(task) {
            error!("Dropped task: {}", e);
        }
    }

    fn submit_organization(self: &Arc<Self>, index: usize) {
        let name = self.names.organization(index);
        let node = ResourceNode::pending(Tier::Organization, name.clone(), None);
        let ctx = Arc::clone(self);

        self.submit(Tier::Organization, task_label(Tier::Organization, &name), async move {
            let created = ctx
                .materialize(node, || ctx.service.create_organization(&name))
                .await;
            if let Some(org) = created {
                ctx.fan_out_organization(&org, index).await;
            }
        });
    }

    fn submit_project(self: &Arc<Self>, org_id: RemoteId, org_name: &str, index: usize) {
        let name = self.names.project(org_name, index);
        let node = ResourceNode::pending(Tier::Project, name.clone(), Some(org_id.clone()));
        let ctx = Arc::clone(self);

        self.submit(Tier::Project, task_label(Tier::Project, &name), async move {
            let created = ctx
                .materialize(node, || ctx.service.create_project(&org_id, &name))
                .await;
            if let Some(project) = created {
                ctx.fan_out_project(&org_id, &project).await;
            }
        });
    }

    fn submit_application(
        self: &Arc<Self>,
        org_id: RemoteId,
        project_id: RemoteId,
        project_name: &str,
        index: usize,
    ) {
        let name = self.names.application(project_name, index);
        let node = ResourceNode::pending(Tier::Application, name.clone(), Some(project_id.clone()));
        let ctx = Arc::clone(self);

        self.submit(Tier::Application, task_label(Tier::Application, &name), async move {
            ctx.materialize(node, || {
                ctx.service.create_application(&org_id, &project_id, &name)
            })
            .await;
        });
    }

    fn submit_user(self: &Arc<Self>, org_id: RemoteId, org_name: &str, org_index: usize, index: usize) {
        let username = self.names.username(org_name, org_index, index);
        let profile = UserProfile::synthesize(index, &username, &org_id, &self.user_password);
        let node = ResourceNode::pending(Tier::User, username.clone(), Some(org_id.clone()));
        let ctx = Arc::clone(self);

        self.submit(Tier::User, task_label(Tier::User, &username), async move {
            let user_id = profile.user_id.as_str();
            ctx.materialize(node, || {
                let created = ctx.service.create_user(&profile, &org_id);
                async move { created.await.map(|()| user_id.to_string()) }
            })
            .await;
        });
    }

    async fn fan_out_organization(self: &Arc<Self>, org: &ResourceNode, org_index: usize) {
        let Some(org_id) = org.remote_id() else {
            return;
        };
        if self.cancel.is_cancelled() {
            warn!("Cancelled, not fanning out organization {}", org.display_name);
            self.record_abandoned(Tier::Organization).await;
            return;
        }

        debug!(
            "Organization {} materialized as {}, submitting {} projects and {} users",
            org.display_name, org_id, self.plan.projects_per_org, self.plan.users_per_org
        );
        for index in 1..=self.plan.projects_per_org {
            self.submit_project(org_id.to_string(), &org.display_name, index);
        }
        for index in 1..=self.plan.users_per_org {
            self.submit_user(org_id.to_string(), &org.display_name, org_index, index);
        }
    }

    async fn fan_out_project(self: &Arc<Self>, org_id: &str, project: &ResourceNode) {
        let Some(project_id) = project.remote_id() else {
            return;
        };
        if self.cancel.is_cancelled() {
            warn!("Cancelled, not fanning out project {}", project.display_name);
            self.record_abandoned(Tier::Project).await;
            return;
        }

        for index in 1..=self.plan.applications_per_project {
            self.submit_application(
                org_id.to_string(),
                project_id.to_string(),
                &project.display_name,
                index,
            );
        }
    }

    /// Create `node` remotely with retries and conflict resolution.
    ///
    /// Returns the materialized node, or `None` once the failure has been
    /// logged and counted.
    async fn materialize<F, Fut>(&self, mut node: ResourceNode, mut create: F) -> Option<ResourceNode>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RemoteId, ServiceError>>,
    {
        let tier = node.tier;
        let label = task_label(tier, &node.display_name);
        let name = node.display_name.as_str();
        let service = self.service.as_ref();
        let resolvers = &self.resolvers;
        let started = Instant::now();

        let outcome = self
            .retry
            .run_with_retry(&label, || {
                let attempt = create();
                async move { resolvers.resolve(tier, service, name, attempt.await).await }
            })
            .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(RetryOutcome {
                value: remote_id,
                attempts,
                ..
            }) => {
                if let Err(e) = node.materialize(remote_id) {
                    error!("{}", e);
                    self.metrics.record_failure(tier, elapsed, attempts).await;
                    self.record_abandoned(tier).await;
                    return None;
                }
                self.metrics.record_success(tier, elapsed, attempts).await;
                self.ledger.record(&node);
                Some(node)
            }
            Err(RetryError::Cancelled { attempts }) => {
                warn!("{} cancelled after {} attempts", label, attempts);
                self.metrics.record_skipped(tier, 1).await;
                self.record_abandoned(tier).await;
                None
            }
            Err(e) => {
                error!("Error in {}: {}", label, e);
                self.metrics.record_failure(tier, elapsed, e.attempts()).await;
                self.record_abandoned(tier).await;
                None
            }
        }
    }

    async fn record_abandoned(&self, tier: Tier) {
        for (descendant, count) in self.plan.abandoned_by(tier) {
            self.metrics.record_skipped(descendant, count).await;
        }
    }
}
