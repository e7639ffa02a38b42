use crate::scheduler::ledger::ResourceLedger;
use crate::scheduler::metrics::MetricsAggregator;
use crate::scheduler::naming::{NameGenerator, NamingScheme};
use crate::scheduler::orchestrator::OrchestratorConfig;
use crate::scheduler::report::{HaltRecord, RunMode, RunReport};
use crate::scheduler::retry::{RetryError, RetryExecutor};
use crate::scheduler::types::{FanoutPlan, ResourceNode, Tier};
use crate::service::provider::{IdentityService, ResolverTable};
use crate::service::types::{RemoteId, ServiceError, UserProfile};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use tracing::{error, info, warn};

/// Depth-first provisioning, one remote call at a time.
///
/// Each organization is followed by its projects (each followed by its
/// applications) and then its users. The first failure stops the run.
pub struct SequentialProvisioner {
    service: Arc<dyn IdentityService>,
    config: OrchestratorConfig,
    resolvers: ResolverTable,
    cancel: CancellationToken,
}

struct SequentialRun<'a> {
    service: &'a dyn IdentityService,
    resolvers: &'a ResolverTable,
    retry: RetryExecutor,
    metrics: MetricsAggregator,
    ledger: ResourceLedger,
    plan: FanoutPlan,
}

impl SequentialProvisioner {
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

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, plan: FanoutPlan) -> RunReport {
        let run_id = Uuid::new_v4();
        info!("Running in sequential mode... (run {})", run_id);
        let started = Instant::now();
        let run = SequentialRun {
            service: self.service.as_ref(),
            resolvers: &self.resolvers,
            retry: RetryExecutor::with_cancellation(self.config.retry.clone(), self.cancel.clone()),
            metrics: MetricsAggregator::new(),
            ledger: ResourceLedger::new(),
            plan,
        };
        let names = NameGenerator::new(self.config.naming.clone(), NamingScheme::Sequential);

        let halted = self.provision(&run, &names).await.err();
        if let Some(halt) = &halted {
            error!(
                "Sequential run stopped at {} '{}': {}",
                halt.tier, halt.name, halt.error
            );
        }

        RunReport {
            run_id,
            mode: RunMode::Sequential,
            plan,
            metrics: run.metrics.snapshot().await,
            resources: run.ledger.entries(),
            elapsed: started.elapsed(),
            cancelled: self.cancel.is_cancelled(),
            halted,
        }
    }

    async fn provision(&self, run: &SequentialRun<'_>, names: &NameGenerator) -> Result<(), HaltRecord> {
        let plan = run.plan;
        for i in 1..=plan.organizations {
            let org_name = names.organization(i);
            let org = run
                .step(ResourceNode::pending(Tier::Organization, org_name.as_str(), None), || {
                    run.service.create_organization(&org_name)
                })
                .await?;
            let org_id = remote_id_of(&org);

            for j in 1..=plan.projects_per_org {
                let project_name = names.project(&org_name, j);
                let project = run
                    .step(
                        ResourceNode::pending(Tier::Project, project_name.as_str(), Some(org_id.clone())),
                        || run.service.create_project(&org_id, &project_name),
                    )
                    .await?;
                let project_id = remote_id_of(&project);

                for k in 1..=plan.applications_per_project {
                    let app_name = names.application(&project_name, k);
                    run.step(
                        ResourceNode::pending(Tier::Application, app_name.as_str(), Some(project_id.clone())),
                        || run.service.create_application(&org_id, &project_id, &app_name),
                    )
                    .await?;
                }
            }

            for l in 1..=plan.users_per_org {
                let username = names.username(&org_name, i, l);
                let profile =
                    UserProfile::synthesize(l, &username, &i.to_string(), &self.config.user_password);
                let user_id = profile.user_id.as_str();
                run.step(
                    ResourceNode::pending(Tier::User, username.as_str(), Some(org_id.clone())),
                    || {
                        let created = run.service.create_user(&profile, &org_id);
                        async move { created.await.map(|()| user_id.to_string()) }
                    },
                )
                .await?;
            }
        }
        Ok(())
    }
}

fn remote_id_of(node: &ResourceNode) -> RemoteId {
    node.remote_id().unwrap_or_default().to_string()
}

impl SequentialRun<'_> {
    async fn step<F, Fut>(&self, mut node: ResourceNode, mut create: F) -> Result<ResourceNode, HaltRecord>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RemoteId, ServiceError>>,
    {
        let tier = node.tier;
        let label = format!("Create {}: {}", tier.title(), node.display_name);
        let name = node.display_name.clone();
        let started = Instant::now();

        let outcome = self
            .retry
            .run_with_retry(&label, || {
                let attempt = create();
                let name = name.as_str();
                async move {
                    self.resolvers
                        .resolve(tier, self.service, name, attempt.await)
                        .await
                }
            })
            .await;
        let elapsed = started.elapsed();

        let halt = |error: String| HaltRecord {
            tier,
            name: name.clone(),
            error,
        };

        match outcome {
            Ok(outcome) => {
                node.materialize(outcome.value).map_err(|e| halt(e.to_string()))?;
                self.metrics
                    .record_success(tier, elapsed, outcome.attempts)
                    .await;
                self.ledger.record(&node);
                Ok(node)
            }
            Err(e) => {
                if let RetryError::Cancelled { attempts } = &e {
                    warn!("{} cancelled after {} attempts", label, attempts);
                    self.metrics.record_skipped(tier, 1).await;
                } else {
                    self.metrics.record_failure(tier, elapsed, e.attempts()).await;
                }
                for (descendant, count) in self.plan.abandoned_by(tier) {
                    self.metrics.record_skipped(descendant, count).await;
                }
                Err(halt(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::retry::RetryConfig;
    use crate::service::mock::MockIdentityService;

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            retry: RetryConfig {
                initial_backoff_ms: 1,
                ..RetryConfig::default()
            },
            ..OrchestratorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_depth_first_with_deterministic_names() {
        let service = Arc::new(MockIdentityService::new());
        let provisioner = SequentialProvisioner::new(service.clone(), config());

        let report = provisioner.run(FanoutPlan::new(2, 2, 1, 1)).await;
        assert!(report.is_complete());
        assert!(report.halted.is_none());

        let order: Vec<_> = report
            .resources
            .iter()
            .map(|e| e.node.display_name.clone())
            .collect();
        assert_eq!(
            order,
            vec![
                "org-1",
                "project-1",
                "app-1",
                "project-2",
                "app-1",
                "user-1-org-1",
                "org-2",
                "project-1",
                "app-1",
                "project-2",
                "app-1",
                "user-1-org-2",
            ]
        );
        assert_eq!(service.user_count(), 2);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let service = Arc::new(MockIdentityService::new());
        service.fail_always(
            Tier::Project,
            ServiceError::Status {
                status: 400,
                body: "bad project".to_string(),
            },
        );
        let provisioner = SequentialProvisioner::new(service.clone(), config());

        let report = provisioner.run(FanoutPlan::new(3, 1, 1, 1)).await;
        let halt = report.halted.clone().unwrap();
        assert_eq!(halt.tier, Tier::Project);
        assert_eq!(halt.name, "project-1");
        assert_eq!(report.created(Tier::Organization), 1);
        assert_eq!(service.calls(Tier::Organization), 1);
        assert_eq!(service.calls(Tier::User), 0);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_cancelled_step_is_skipped_not_failed() {
        let service = Arc::new(MockIdentityService::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let provisioner = SequentialProvisioner::new(service.clone(), config()).with_cancellation(cancel);

        let report = provisioner.run(FanoutPlan::new(2, 2, 3, 1)).await;
        assert!(report.cancelled);
        assert_eq!(report.metrics.total_failed(), 0);
        assert_eq!(report.metrics.tier(Tier::Organization).skipped, 1);
        assert_eq!(report.metrics.tier(Tier::Project).skipped, 2);
        assert_eq!(report.metrics.tier(Tier::Application).skipped, 6);
        assert_eq!(report.metrics.tier(Tier::User).skipped, 1);
        assert_eq!(service.calls(Tier::Organization), 0);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_existing_organization_is_reused() {
        let service = Arc::new(MockIdentityService::new());
        service.seed_organization("org-1", "org-existing");
        let provisioner = SequentialProvisioner::new(service.clone(), config());

        let report = provisioner.run(FanoutPlan::new(1, 1, 1, 1)).await;
        assert!(report.is_complete());
        assert_eq!(service.lookups(), 1);
        let project = report
            .resources
            .iter()
            .find(|e| e.node.tier == Tier::Project)
            .unwrap();
        assert_eq!(project.node.parent_id.as_deref(), Some("org-existing"));
    }
}
