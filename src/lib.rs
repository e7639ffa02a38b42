//! # Fanout Provisioner
//!
//! Bulk-provisions a four-level resource hierarchy (organizations, their
//! projects and users, and the projects' applications) against a remote
//! identity-management service, under configurable parallelism, while
//! tolerating transient failures.
//!
//! ## Architecture Overview
//!
//! - **[`scheduler`]**: per-tier bounded worker pools, retry with exponential
//!   backoff, the join counter that detects completion of a task tree which
//!   keeps growing while it runs, and the metrics aggregator
//! - **[`service`]**: the identity service capability contract, conflict
//!   resolvers, the HTTP backend and an in-memory backend
//! - **[`integration`]**: end-to-end provisioning pass built from configuration
//! - **[`cli`]**: argument parsing, prompting and configuration discovery
//!
//! ## Features
//!
//! ### 🌳 Dynamic Fan-out
//! - **Causal Ordering**: children are submitted only after their parent materialized
//! - **Independent Pools**: one bounded queue per tier, no pool-to-pool signaling
//! - **Exact Completion**: the join counter cannot reach zero while a task may still spawn work
//!
//! ### 🔁 Fault Tolerance
//! - **Bounded Retries**: doubling backoff with per-attempt deadlines
//! - **Error Classification**: terminal errors skip the remaining retry budget
//! - **Conflict Recovery**: existing organizations are looked up by name and reused
//! - **Panic Containment**: a panicking task is counted as a failure, never lost
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fanout_provisioner::{FanoutOrchestrator, FanoutPlan, MockIdentityService, OrchestratorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = Arc::new(MockIdentityService::new());
//!     let orchestrator = FanoutOrchestrator::new(service, OrchestratorConfig::default());
//!
//!     let report = orchestrator.run(FanoutPlan::new(2, 1, 1, 1)).await;
//!     println!("{}", report);
//! }
//! ```

/// Concurrent fan-out scheduler.
///
/// Bounded task queues, tier pools, retry executor, join counter, metrics,
/// and the concurrent and sequential drivers.
pub mod scheduler;

/// Remote identity service contract and its implementations.
pub mod service;

/// End-to-end provisioning built from configuration.
pub mod integration;

/// Environment constants and path utilities.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use cli::{ConfigDiscovery, ProvisionConfig};
pub use integration::ProvisionSystem;
pub use scheduler::{
    FanoutOrchestrator, FanoutPlan, MetricsSnapshot, OrchestratorConfig, RetryConfig,
    RetryExecutor, RunMode, RunReport, SequentialProvisioner, Tier,
};
pub use service::{IdentityService, MockIdentityService, ServiceError, ZitadelClient};
