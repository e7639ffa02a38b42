use serde::{Deserialize, Serialize};

/// Identifier assigned by the remote service once a resource is created.
pub type RemoteId = String;

/// Profile attributes for a human user created under an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

impl UserProfile {
    /// Synthesize the profile of the `index`-th (1-based) user of an organization.
    pub fn synthesize(index: usize, username: &str, org_id: &str, password: &str) -> Self {
        Self {
            user_id: format!("user-{}-org-{}", index, org_id),
            username: username.to_string(),
            given_name: format!("GivenName{}", index),
            family_name: format!("FamilyName{}", index),
            email: format!("user{}-org{}@example.com", index, org_id),
            phone: format!("+123456789{}", index.saturating_sub(1)),
            password: password.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{resource} '{name}' already exists")]
    Conflict { resource: String, name: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("{resource} created but no identifier returned: {body}")]
    MissingId { resource: String, body: String },
    #[error("Name mismatch, expected '{expected}', got '{actual}'")]
    NameMismatch { expected: String, actual: String },
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ServiceError {
    /// Whether retrying the same call may succeed.
    ///
    /// Network failures, timeouts, 5xx, 408 and 429 are transient. Conflicts
    /// are never transient: they are either resolved or terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Network(_) | ServiceError::Timeout(_) => true,
            ServiceError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            ServiceError::Conflict { .. }
            | ServiceError::MalformedResponse(_)
            | ServiceError::MissingId { .. }
            | ServiceError::NameMismatch { .. }
            | ServiceError::Configuration(_) => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Conflict { .. })
    }

    /// Short label used in logs and error statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Network(_) => "Network",
            ServiceError::Timeout(_) => "Timeout",
            ServiceError::Status { .. } => "Status",
            ServiceError::Conflict { .. } => "Conflict",
            ServiceError::MalformedResponse(_) => "MalformedResponse",
            ServiceError::MissingId { .. } => "MissingId",
            ServiceError::NameMismatch { .. } => "NameMismatch",
            ServiceError::Configuration(_) => "Configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::Network("reset".into()).is_transient());
        assert!(ServiceError::Timeout(std::time::Duration::from_secs(1)).is_transient());
        assert!(
            ServiceError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            ServiceError::Status {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !ServiceError::Status {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !ServiceError::Conflict {
                resource: "organization".into(),
                name: "org-1".into()
            }
            .is_transient()
        );
        assert!(!ServiceError::MalformedResponse("eof".into()).is_transient());
    }

    #[test]
    fn test_user_profile_synthesis() {
        let profile = UserProfile::synthesize(3, "org-1-user-3-42", "12345", "Secret@1234");
        assert_eq!(profile.user_id, "user-3-org-12345");
        assert_eq!(profile.given_name, "GivenName3");
        assert_eq!(profile.family_name, "FamilyName3");
        assert_eq!(profile.email, "user3-org12345@example.com");
        assert_eq!(profile.phone, "+1234567892");
    }
}
