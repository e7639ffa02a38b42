use crate::scheduler::types::Tier;
use crate::service::types::{RemoteId, ServiceError, UserProfile};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Capability contract of the remote identity-management service.
///
/// Every call may block on network I/O and returns a typed error on any
/// non-success status. A name collision on organization creation must be
/// reported as [`ServiceError::Conflict`] so it can be told apart from other
/// failures.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn create_organization(&self, name: &str) -> Result<RemoteId, ServiceError>;

    async fn create_project(&self, org_id: &str, name: &str) -> Result<RemoteId, ServiceError>;

    async fn create_application(
        &self,
        org_id: &str,
        project_id: &str,
        name: &str,
    ) -> Result<RemoteId, ServiceError>;

    /// Create a human user. The user's identifier is the caller-chosen
    /// `profile.user_id`, so nothing is returned on success.
    async fn create_user(&self, profile: &UserProfile, org_id: &str) -> Result<(), ServiceError>;

    /// Recover the identifier of an existing organization by name.
    async fn lookup_organization_id_by_name(&self, name: &str) -> Result<RemoteId, ServiceError>;

    /// Backend name for logs and reports
    fn service_name(&self) -> &'static str;
}

/// Recovery path for "already exists" responses at one tier.
#[async_trait]
pub trait Resolvable: Send + Sync {
    fn tier(&self) -> Tier;

    /// Recover the remote identifier of the resource that already holds `name`.
    async fn on_conflict(
        &self,
        service: &dyn IdentityService,
        name: &str,
    ) -> Result<RemoteId, ServiceError>;
}

/// Resolves organization name collisions through a lookup-by-name.
#[derive(Debug, Default, Clone)]
pub struct OrganizationResolver;

#[async_trait]
impl Resolvable for OrganizationResolver {
    fn tier(&self) -> Tier {
        Tier::Organization
    }

    async fn on_conflict(
        &self,
        service: &dyn IdentityService,
        name: &str,
    ) -> Result<RemoteId, ServiceError> {
        info!("Organization {} already exists, proceeding with ID retrieval", name);
        let id = service.lookup_organization_id_by_name(name).await?;
        info!("Fetched existing organization ID: {}", id);
        Ok(id)
    }
}

/// Table of conflict resolvers keyed by tier.
///
/// Tiers without a resolver treat conflicts as hard failures.
#[derive(Clone, Default)]
pub struct ResolverTable {
    resolvers: HashMap<Tier, Arc<dyn Resolvable>>,
}

impl ResolverTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table with the organization resolver registered.
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        table.register(Arc::new(OrganizationResolver));
        table
    }

    pub fn register(&mut self, resolver: Arc<dyn Resolvable>) {
        self.resolvers.insert(resolver.tier(), resolver);
    }

    pub fn get(&self, tier: Tier) -> Option<Arc<dyn Resolvable>> {
        self.resolvers.get(&tier).cloned()
    }

    pub fn covers(&self, tier: Tier) -> bool {
        self.resolvers.contains_key(&tier)
    }

    /// Pass a creation result through the tier's resolver.
    ///
    /// A `Conflict` is replaced by the resolver's outcome when the tier has
    /// one; every other result is returned untouched.
    pub async fn resolve(
        &self,
        tier: Tier,
        service: &dyn IdentityService,
        name: &str,
        result: Result<RemoteId, ServiceError>,
    ) -> Result<RemoteId, ServiceError> {
        match result {
            Err(err) if err.is_conflict() => match self.get(tier) {
                Some(resolver) => resolver.on_conflict(service, name).await.map_err(|lookup| {
                    warn!("{} {} exists but failed to fetch ID: {}", tier, name, lookup);
                    lookup
                }),
                None => Err(err),
            },
            other => other,
        }
    }
}

impl std::fmt::Debug for ResolverTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tiers: Vec<_> = self.resolvers.keys().collect();
        tiers.sort();
        f.debug_struct("ResolverTable").field("tiers", &tiers).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::mock::MockIdentityService;

    #[tokio::test]
    async fn test_default_table_only_covers_organizations() {
        let table = ResolverTable::with_defaults();
        assert!(table.covers(Tier::Organization));
        assert!(!table.covers(Tier::Project));
        assert!(!table.covers(Tier::Application));
        assert!(!table.covers(Tier::User));
    }

    #[tokio::test]
    async fn test_conflict_resolved_through_lookup() {
        let service = MockIdentityService::new();
        service.seed_organization("acme", "org-existing");
        let table = ResolverTable::with_defaults();

        let conflict = Err(ServiceError::Conflict {
            resource: "organization".to_string(),
            name: "acme".to_string(),
        });
        let resolved = table
            .resolve(Tier::Organization, &service, "acme", conflict)
            .await;
        assert_eq!(resolved.unwrap(), "org-existing");
    }

    #[tokio::test]
    async fn test_conflict_without_resolver_is_hard_failure() {
        let service = MockIdentityService::new();
        let table = ResolverTable::with_defaults();

        let conflict = Err(ServiceError::Conflict {
            resource: "project".to_string(),
            name: "p".to_string(),
        });
        let resolved = table.resolve(Tier::Project, &service, "p", conflict).await;
        assert!(matches!(resolved, Err(ServiceError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_non_conflict_results_pass_through() {
        let service = MockIdentityService::new();
        let table = ResolverTable::with_defaults();

        let ok = table
            .resolve(Tier::Organization, &service, "x", Ok("id-1".to_string()))
            .await;
        assert_eq!(ok.unwrap(), "id-1");

        let failed = table
            .resolve(
                Tier::Organization,
                &service,
                "x",
                Err(ServiceError::Network("down".into())),
            )
            .await;
        assert!(matches!(failed, Err(ServiceError::Network(_))));
    }
}
