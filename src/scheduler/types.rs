use crate::scheduler::join::JoinGuard;
use crate::service::types::RemoteId;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource level in the provisioned hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Organization,
    Project,
    Application,
    User,
}

impl Tier {
    pub const ALL: [Tier; 4] = [
        Tier::Organization,
        Tier::Project,
        Tier::Application,
        Tier::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Organization => "organization",
            Tier::Project => "project",
            Tier::Application => "application",
            Tier::User => "user",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Tier::Organization => "Organization",
            Tier::Project => "Project",
            Tier::Application => "Application",
            Tier::User => "User",
        }
    }

    /// Plural, capitalized name used in the summary.
    pub fn plural_title(&self) -> &'static str {
        match self {
            Tier::Organization => "Organizations",
            Tier::Project => "Projects",
            Tier::Application => "Applications",
            Tier::User => "Users",
        }
    }

    /// Tier of the node this tier's nodes hang from.
    pub fn parent(&self) -> Option<Tier> {
        match self {
            Tier::Organization => None,
            Tier::Project | Tier::User => Some(Tier::Organization),
            Tier::Application => Some(Tier::Project),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("{tier} '{name}' is already materialized as {existing}")]
    AlreadyMaterialized {
        tier: Tier,
        name: String,
        existing: RemoteId,
    },
}

/// One resource of the hierarchy, before or after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub tier: Tier,
    pub display_name: String,
    pub parent_id: Option<RemoteId>,
    remote_id: Option<RemoteId>,
}

impl ResourceNode {
    pub fn pending(tier: Tier, display_name: impl Into<String>, parent_id: Option<RemoteId>) -> Self {
        Self {
            tier,
            display_name: display_name.into(),
            parent_id,
            remote_id: None,
        }
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn is_materialized(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Bind the identifier returned by the remote service. Once bound it never changes.
    pub fn materialize(&mut self, remote_id: RemoteId) -> Result<(), NodeError> {
        if let Some(existing) = &self.remote_id {
            return Err(NodeError::AlreadyMaterialized {
                tier: self.tier,
                name: self.display_name.clone(),
                existing: existing.clone(),
            });
        }
        self.remote_id = Some(remote_id);
        Ok(())
    }
}

/// How many nodes to create at each level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutPlan {
    pub organizations: usize,
    pub projects_per_org: usize,
    pub applications_per_project: usize,
    pub users_per_org: usize,
}

impl FanoutPlan {
    pub fn new(
        organizations: usize,
        projects_per_org: usize,
        applications_per_project: usize,
        users_per_org: usize,
    ) -> Self {
        Self {
            organizations,
            projects_per_org,
            applications_per_project,
            users_per_org,
        }
    }

    /// All counts must be positive and every tier's total must fit in a `usize`.
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("organizations", self.organizations),
            ("projects per organization", self.projects_per_org),
            ("applications per project", self.applications_per_project),
            ("users per organization", self.users_per_org),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(format!("number of {} must be a positive integer", name));
            }
        }
        for tier in Tier::ALL {
            if self.checked_expected(tier).is_none() {
                return Err(format!("total number of {} is too large", tier.plural_title()));
            }
        }
        Ok(())
    }

    fn checked_expected(&self, tier: Tier) -> Option<usize> {
        match tier {
            Tier::Organization => Some(self.organizations),
            Tier::Project => self.organizations.checked_mul(self.projects_per_org),
            Tier::Application => self
                .organizations
                .checked_mul(self.projects_per_org)?
                .checked_mul(self.applications_per_project),
            Tier::User => self.organizations.checked_mul(self.users_per_org),
        }
    }

    /// Children a single node of `parent` synthesizes at `child`.
    pub fn children_per_parent(&self, child: Tier) -> usize {
        match child {
            Tier::Organization => self.organizations,
            Tier::Project => self.projects_per_org,
            Tier::Application => self.applications_per_project,
            Tier::User => self.users_per_org,
        }
    }

    /// Total nodes at `tier` when every creation succeeds, saturating at `usize::MAX`.
    pub fn expected(&self, tier: Tier) -> usize {
        self.checked_expected(tier).unwrap_or(usize::MAX)
    }

    /// Descendants per tier that are never synthesized when one node of `tier` fails.
    pub fn abandoned_by(&self, tier: Tier) -> Vec<(Tier, usize)> {
        match tier {
            Tier::Organization => vec![
                (Tier::Project, self.projects_per_org),
                (
                    Tier::Application,
                    self.projects_per_org
                        .saturating_mul(self.applications_per_project),
                ),
                (Tier::User, self.users_per_org),
            ],
            Tier::Project => vec![(Tier::Application, self.applications_per_project)],
            Tier::Application | Tier::User => Vec::new(),
        }
    }
}

/// Executable unit bound to one node-to-be-created.
///
/// Holds the join guard taken before submission; the guard is released when
/// the task is dropped, which happens after `work` completes, after a panic
/// in `work` has been caught, or when a closed queue rejects the task.
pub struct ProvisionTask {
    pub tier: Tier,
    pub label: String,
    /// Descendants counted as skipped if `work` panics.
    pub abandons_on_panic: Vec<(Tier, usize)>,
    pub(crate) work: BoxFuture<'static, ()>,
    pub(crate) guard: JoinGuard,
}

impl ProvisionTask {
    pub fn new<F>(tier: Tier, label: impl Into<String>, guard: JoinGuard, work: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            tier,
            label: label.into(),
            abandons_on_panic: Vec::new(),
            work: Box::pin(work),
            guard,
        }
    }

    pub fn with_abandons_on_panic(mut self, descendants: Vec<(Tier, usize)>) -> Self {
        self.abandons_on_panic = descendants;
        self
    }
}

impl fmt::Debug for ProvisionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionTask")
            .field("tier", &self.tier)
            .field("label", &self.label)
            .finish()
    }
}
