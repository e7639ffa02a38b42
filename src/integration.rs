//! # High-Level System Integration
//!
//! Wires configuration, the identity service backend and the scheduler into
//! a single provisioning pass.
//!
//! ## Core Components
//!
//! - **[`ProvisionSystem`]**: builds the backend, runs a pass in the requested
//!   mode, applies the overall deadline, and writes the JSON report
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 ProvisionSystem                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────┐ │
//! │  │ Provision    │  │   Fanout     │  │ Zitadel │ │
//! │  │ Config       │─▶│ Orchestrator │─▶│ Client  │ │
//! │  └──────────────┘  └──────────────┘  └─────────┘ │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fanout_provisioner::{FanoutPlan, ProvisionConfig, ProvisionSystem, RunMode};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let system = ProvisionSystem::new(ProvisionConfig::default())?;
//!     let report = system.run(FanoutPlan::new(10, 2, 2, 5), RunMode::Concurrent).await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

use crate::cli::ProvisionConfig;
use crate::scheduler::{
    FanoutOrchestrator, FanoutPlan, RunMode, RunReport, SequentialProvisioner, Tier,
};
use crate::service::{IdentityService, ZitadelClient};
use anyhow::{Context, Result};
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ProvisionSystem {
    config: ProvisionConfig,
    service: Arc<dyn IdentityService>,
    cancel: CancellationToken,
}

impl ProvisionSystem {
    /// Build a system backed by the HTTP client, reading the token from the
    /// process environment when the configuration does not carry one.
    pub fn new(config: ProvisionConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let zitadel_config = config
            .zitadel_config(|name| std::env::var(name).ok())
            .context("Failed to configure the identity service")?;
        let client =
            ZitadelClient::new(zitadel_config).context("Failed to build the HTTP client")?;
        Ok(Self::with_service(config, Arc::new(client)))
    }

    /// Build a system around an already constructed backend.
    pub fn with_service(config: ProvisionConfig, service: Arc<dyn IdentityService>) -> Self {
        Self {
            config,
            service,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Token that stops the run when cancelled (Ctrl-C, deadline).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, plan: FanoutPlan, mode: RunMode) -> Result<RunReport> {
        plan.validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid provisioning plan")?;

        info!(
            "Provisioning {} organizations ({} projects, {} applications, {} users each) against {} in {} mode",
            plan.organizations,
            plan.projects_per_org,
            plan.applications_per_project,
            plan.users_per_org,
            self.service.service_name(),
            mode
        );

        let deadline = self.config.run_timeout().map(|limit| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        warn!("Run exceeded its {:?} deadline, cancelling", limit);
                        cancel.cancel();
                    }
                }
            })
        });

        let orchestrator_config = self.config.orchestrator_config();
        let report = match mode {
            RunMode::Concurrent => {
                FanoutOrchestrator::new(Arc::clone(&self.service), orchestrator_config)
                    .with_cancellation(self.cancel.clone())
                    .run(plan)
                    .await
            }
            RunMode::Sequential => {
                SequentialProvisioner::new(Arc::clone(&self.service), orchestrator_config)
                    .with_cancellation(self.cancel.clone())
                    .run(plan)
                    .await
            }
        };

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        info!(
            "Run finished in {:?}: {} materialized, {} failed",
            report.elapsed,
            report.metrics.total_materialized(),
            report.metrics.total_failed()
        );
        Ok(report)
    }

    /// Write the report as pretty JSON.
    pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
        let json = report.to_json().context("Failed to serialize run report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
        info!("Wrote run report to {:?}", path);
        Ok(())
    }

    /// Expected node counts for `--dry-run`.
    pub fn describe_plan(plan: &FanoutPlan, mode: RunMode) -> String {
        let mut out = format!("Dry run ({} mode), nothing will be created:\n", mode);
        for tier in Tier::ALL {
            out.push_str(&format!(
                "  {}: {}\n",
                tier.plural_title(),
                plan.expected(tier)
            ));
        }
        out
    }
}

/// Cancel `cancel` on the first interrupt, then wait for another one.
///
/// Returns `true` when a second interrupt arrived, in which case the caller
/// should stop waiting for the drain and exit. Returns `false` if the signal
/// source fails first.
pub async fn cancel_on_interrupt<S, Fut>(mut interrupt: S, cancel: CancellationToken) -> bool
where
    S: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if let Err(e) = interrupt().await {
        warn!("Unable to listen for interrupts: {}", e);
        return false;
    }
    warn!("Interrupt received, cancelling run (interrupt again to exit immediately)");
    cancel.cancel();

    interrupt().await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MockIdentityService;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_config() -> ProvisionConfig {
        let mut config = ProvisionConfig::default();
        config.retry.initial_backoff_ms = 1;
        config
    }

    #[tokio::test]
    async fn test_runs_both_modes_against_mock() {
        for mode in [RunMode::Concurrent, RunMode::Sequential] {
            let service = Arc::new(MockIdentityService::new());
            let system = ProvisionSystem::with_service(fast_config(), service.clone());

            let report = system.run(FanoutPlan::new(2, 2, 1, 1), mode).await.unwrap();
            assert_eq!(report.mode, mode);
            assert!(report.is_complete());
            assert_eq!(service.organization_count(), 2);
            assert_eq!(service.user_count(), 2);
        }
    }

    #[tokio::test]
    async fn test_invalid_plan_is_rejected() {
        let system =
            ProvisionSystem::with_service(fast_config(), Arc::new(MockIdentityService::new()));
        let err = system
            .run(FanoutPlan::new(1, 0, 1, 1), RunMode::Concurrent)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("projects per organization"));
    }

    #[tokio::test]
    async fn test_run_deadline_cancels() {
        let mut config = fast_config();
        config.run_timeout_secs = Some(1);
        let service = Arc::new(MockIdentityService::new().with_latency(200, 300));
        let system = ProvisionSystem::with_service(config, service);

        let report = tokio::time::timeout(
            Duration::from_secs(20),
            system.run(FanoutPlan::new(2, 20, 5, 20), RunMode::Sequential),
        )
        .await
        .expect("deadline must stop the run")
        .unwrap();
        assert!(report.cancelled);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_report_written_as_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.json");
        let system =
            ProvisionSystem::with_service(fast_config(), Arc::new(MockIdentityService::new()));

        let report = system
            .run(FanoutPlan::new(1, 1, 1, 1), RunMode::Concurrent)
            .await
            .unwrap();
        ProvisionSystem::write_report(&report, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["resources"].as_array().unwrap().len(), 4);
        assert_eq!(value["resources"][0]["tier"], "organization");
    }

    #[test]
    fn test_describe_plan() {
        let text = ProvisionSystem::describe_plan(&FanoutPlan::new(2, 3, 4, 5), RunMode::Concurrent);
        assert!(text.contains("Organizations: 2"));
        assert!(text.contains("Projects: 6"));
        assert!(text.contains("Applications: 24"));
        assert!(text.contains("Users: 10"));
    }

    #[test]
    fn test_missing_token_fails_construction() {
        let mut config = ProvisionConfig::default();
        config.service.token_env = "FANOUT_TEST_TOKEN_THAT_IS_NEVER_SET".to_string();
        let err = ProvisionSystem::new(config).err().unwrap();
        assert!(format!("{:#}", err).contains("No API token configured"));
    }

    fn scripted_interrupts(
        signals: usize,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = io::Result<()>> + Send>> {
        let mut remaining = signals;
        move || {
            let fired = remaining > 0;
            remaining = remaining.saturating_sub(1);
            Box::pin(async move {
                if fired {
                    Ok(())
                } else {
                    Err(io::Error::other("signal source closed"))
                }
            })
        }
    }

    #[tokio::test]
    async fn test_second_interrupt_requests_exit() {
        let cancel = CancellationToken::new();
        assert!(cancel_on_interrupt(scripted_interrupts(2), cancel.clone()).await);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_single_interrupt_only_cancels() {
        let cancel = CancellationToken::new();
        assert!(!cancel_on_interrupt(scripted_interrupts(1), cancel.clone()).await);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_failed_signal_source_leaves_run_alone() {
        let cancel = CancellationToken::new();
        assert!(!cancel_on_interrupt(scripted_interrupts(0), cancel.clone()).await);
        assert!(!cancel.is_cancelled());
    }
}
