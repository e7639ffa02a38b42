//! Scriptable in-memory [`IdentityService`] used by tests. It hands out
//! sequential identifiers, enforces organization name uniqueness, and can be
//! told to fail a tier a fixed number of times.

use crate::scheduler::types::Tier;
use crate::service::provider::IdentityService;
use crate::service::types::{RemoteId, ServiceError, UserProfile};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rand::Rng;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct FailureScript {
    /// `None` fails forever
    remaining: Option<usize>,
    error: ServiceError,
}

#[derive(Debug, Default)]
pub struct MockIdentityService {
    next_id: AtomicU64,
    organizations: DashMap<String, RemoteId>,
    org_names: DashMap<RemoteId, String>,
    projects: DashSet<RemoteId>,
    users: DashSet<String>,
    scripts: DashMap<Tier, FailureScript>,
    calls: DashMap<Tier, usize>,
    lookups: AtomicUsize,
    orphan_calls: AtomicUsize,
    latency: Option<(u64, u64)>,
    panic_on: Option<Tier>,
}

impl MockIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep a random number of milliseconds in `[min_ms, max_ms]` per call.
    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency = Some((min_ms, max_ms.max(min_ms)));
        self
    }

    /// Panic inside every creation call for `tier`.
    pub fn with_panic_on(mut self, tier: Tier) -> Self {
        self.panic_on = Some(tier);
        self
    }

    /// Fail the first `count` calls for `tier` with `error`.
    pub fn fail_first(&self, tier: Tier, count: usize, error: ServiceError) {
        self.scripts.insert(
            tier,
            FailureScript {
                remaining: Some(count),
                error,
            },
        );
    }

    /// Fail every call for `tier` with `error`.
    pub fn fail_always(&self, tier: Tier, error: ServiceError) {
        self.scripts.insert(
            tier,
            FailureScript {
                remaining: None,
                error,
            },
        );
    }

    /// Register an organization as if it had been created by an earlier run.
    pub fn seed_organization(&self, name: &str, id: &str) {
        self.organizations.insert(name.to_string(), id.to_string());
        self.org_names.insert(id.to_string(), name.to_string());
    }

    /// Number of creation calls received for `tier`, failed ones included.
    pub fn calls(&self, tier: Tier) -> usize {
        self.calls.get(&tier).map(|c| *c).unwrap_or(0)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Calls that referenced a parent identifier this service never issued.
    pub fn orphan_calls(&self) -> usize {
        self.orphan_calls.load(Ordering::SeqCst)
    }

    pub fn organization_count(&self) -> usize {
        self.organizations.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    async fn enter(&self, tier: Tier) -> Result<(), ServiceError> {
        *self.calls.entry(tier).or_insert(0) += 1;

        if let Some((min, max)) = self.latency {
            let delay = rand::rng().random_range(min..=max);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.panic_on == Some(tier) {
            panic!("mock identity service panicked while creating {}", tier);
        }

        if let Some(mut script) = self.scripts.get_mut(&tier) {
            match script.remaining {
                None => return Err(script.error.clone()),
                Some(0) => {}
                Some(ref mut left) => {
                    *left -= 1;
                    return Err(script.error.clone());
                }
            }
        }
        Ok(())
    }

    fn issue_id(&self, prefix: &str) -> RemoteId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}", prefix, n)
    }

    fn check_org(&self, org_id: &str) {
        if !self.org_names.contains_key(org_id) {
            self.orphan_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl IdentityService for MockIdentityService {
    async fn create_organization(&self, name: &str) -> Result<RemoteId, ServiceError> {
        self.enter(Tier::Organization).await?;

        if self.organizations.contains_key(name) {
            return Err(ServiceError::Conflict {
                resource: "organization".to_string(),
                name: name.to_string(),
            });
        }

        let id = self.issue_id("org");
        self.organizations.insert(name.to_string(), id.clone());
        self.org_names.insert(id.clone(), name.to_string());
        Ok(id)
    }

    async fn create_project(&self, org_id: &str, _name: &str) -> Result<RemoteId, ServiceError> {
        self.enter(Tier::Project).await?;
        self.check_org(org_id);

        let id = self.issue_id("proj");
        self.projects.insert(id.clone());
        Ok(id)
    }

    async fn create_application(
        &self,
        org_id: &str,
        project_id: &str,
        _name: &str,
    ) -> Result<RemoteId, ServiceError> {
        self.enter(Tier::Application).await?;
        self.check_org(org_id);
        if !self.projects.contains(project_id) {
            self.orphan_calls.fetch_add(1, Ordering::SeqCst);
        }

        Ok(self.issue_id("app"))
    }

    async fn create_user(&self, profile: &UserProfile, org_id: &str) -> Result<(), ServiceError> {
        self.enter(Tier::User).await?;
        self.check_org(org_id);

        if !self.users.insert(profile.user_id.clone()) {
            return Err(ServiceError::Status {
                status: 409,
                body: format!("user {} already exists", profile.user_id),
            });
        }
        Ok(())
    }

    async fn lookup_organization_id_by_name(&self, name: &str) -> Result<RemoteId, ServiceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.organizations
            .get(name)
            .map(|id| id.clone())
            .ok_or_else(|| ServiceError::Status {
                status: 404,
                body: format!("organization {} not found", name),
            })
    }

    fn service_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_organization_conflicts() {
        let service = MockIdentityService::new();
        let first = service.create_organization("acme").await.unwrap();
        let second = service.create_organization("acme").await;
        assert!(matches!(second, Err(ServiceError::Conflict { .. })));
        assert_eq!(
            service.lookup_organization_id_by_name("acme").await.unwrap(),
            first
        );
    }

    #[tokio::test]
    async fn test_fail_first_then_recover() {
        let service = MockIdentityService::new();
        service.fail_first(Tier::Organization, 2, ServiceError::Network("reset".into()));

        assert!(service.create_organization("a").await.is_err());
        assert!(service.create_organization("a").await.is_err());
        assert!(service.create_organization("a").await.is_ok());
        assert_eq!(service.calls(Tier::Organization), 3);
    }

    #[tokio::test]
    async fn test_orphan_calls_are_counted() {
        let service = MockIdentityService::new();
        service.create_project("org-unknown", "p").await.unwrap();
        assert_eq!(service.orphan_calls(), 1);
    }
}
