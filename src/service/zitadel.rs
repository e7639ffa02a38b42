//! Zitadel management API backend
//!
//! Implements [`IdentityService`] over HTTP using a single shared
//! [`reqwest::Client`] (connection pool reused by every task).
//!
//! ## Endpoints
//!
//! | Operation            | Method | Path                                         |
//! |----------------------|--------|----------------------------------------------|
//! | create organization  | POST   | `/management/v1/orgs`                        |
//! | lookup organization  | GET    | `/management/v1/orgs/me`                     |
//! | create project       | POST   | `/management/v1/projects`                    |
//! | create application   | POST   | `/management/v1/projects/{id}/apps/api`      |
//! | create user          | POST   | `/v2/users/human`                            |
//!
//! Project, application and user calls are scoped with the `x-zitadel-orgid`
//! header. Both 200 and 201 are accepted as success; 409 on organization
//! creation is reported as [`ServiceError::Conflict`].

use crate::service::provider::IdentityService;
use crate::service::types::{RemoteId, ServiceError, UserProfile};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const ORG_HEADER: &str = "x-zitadel-orgid";

#[derive(Debug, Clone)]
pub struct ZitadelConfig {
    pub base_url: Url,
    pub api_token: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ZitadelClient {
    client: Client,
    config: ZitadelConfig,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct OrgLookupResponse {
    org: OrgDetails,
}

#[derive(Debug, Deserialize)]
struct OrgDetails {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppResponse {
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    client_id: String,
}

impl ZitadelClient {
    pub fn new(config: ZitadelConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| ServiceError::Configuration(format!("invalid endpoint {}: {}", path, e)))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ServiceError> {
        let url = self.endpoint(path)?;
        Ok(self
            .client
            .request(method, url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .bearer_auth(&self.config.api_token))
    }

    /// Send a request and return the status with the full body text.
    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, String), ServiceError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!("Response status: {}", status);
        debug!("Response body: {}", body);
        Ok((status, body))
    }

    fn transport_error(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout(self.config.request_timeout)
        } else {
            ServiceError::Network(err.to_string())
        }
    }
}

fn is_success(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::CREATED
}

fn ensure_success(status: StatusCode, body: &str) -> Result<(), ServiceError> {
    if is_success(status) {
        Ok(())
    } else {
        Err(ServiceError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        })
    }
}

fn decode<T: for<'de> Deserialize<'de>>(body: &str, what: &str) -> Result<T, ServiceError> {
    serde_json::from_str(body)
        .map_err(|e| ServiceError::MalformedResponse(format!("decoding {} response: {}", what, e)))
}

/// Interpret an organization creation response.
fn interpret_create_organization(
    name: &str,
    status: StatusCode,
    body: &str,
) -> Result<RemoteId, ServiceError> {
    if status == StatusCode::CONFLICT {
        return Err(ServiceError::Conflict {
            resource: "organization".to_string(),
            name: name.to_string(),
        });
    }
    ensure_success(status, body)?;

    let parsed: IdResponse = decode(body, "organization")?;
    if parsed.id.is_empty() {
        return Err(ServiceError::MissingId {
            resource: "organization".to_string(),
            body: body.to_string(),
        });
    }
    Ok(parsed.id)
}

fn interpret_lookup_organization(
    name: &str,
    status: StatusCode,
    body: &str,
) -> Result<RemoteId, ServiceError> {
    if status != StatusCode::OK {
        return Err(ServiceError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    let parsed: OrgLookupResponse = decode(body, "organization lookup")?;
    if parsed.org.name != name {
        return Err(ServiceError::NameMismatch {
            expected: name.to_string(),
            actual: parsed.org.name,
        });
    }
    if parsed.org.id.is_empty() {
        return Err(ServiceError::MissingId {
            resource: "organization".to_string(),
            body: body.to_string(),
        });
    }
    Ok(parsed.org.id)
}

fn interpret_create_project(status: StatusCode, body: &str) -> Result<RemoteId, ServiceError> {
    ensure_success(status, body)?;

    let parsed: IdResponse = decode(body, "project")?;
    if parsed.id.is_empty() {
        return Err(ServiceError::MissingId {
            resource: "project".to_string(),
            body: body.to_string(),
        });
    }
    Ok(parsed.id)
}

fn interpret_create_application(status: StatusCode, body: &str) -> Result<AppResponse, ServiceError> {
    ensure_success(status, body)?;

    let parsed: AppResponse = decode(body, "application")?;
    if parsed.app_id.is_empty() {
        return Err(ServiceError::MissingId {
            resource: "application".to_string(),
            body: body.to_string(),
        });
    }
    Ok(parsed)
}

fn user_payload(profile: &UserProfile, org_id: &str) -> serde_json::Value {
    json!({
        "userId": profile.user_id,
        "username": profile.username,
        "organization": { "orgId": org_id },
        "profile": {
            "givenName": profile.given_name,
            "familyName": profile.family_name,
        },
        "email": { "email": profile.email, "isVerified": true },
        "phone": { "phone": profile.phone, "isVerified": true },
        "password": { "password": profile.password, "changeRequired": false },
    })
}

#[async_trait]
impl IdentityService for ZitadelClient {
    async fn create_organization(&self, name: &str) -> Result<RemoteId, ServiceError> {
        let request = self
            .request(Method::POST, "management/v1/orgs")?
            .json(&json!({ "name": name }));
        let (status, body) = self.send(request).await?;

        let id = interpret_create_organization(name, status, &body)?;
        info!("Organization created successfully: {} (ID: {})", name, id);
        Ok(id)
    }

    async fn create_project(&self, org_id: &str, name: &str) -> Result<RemoteId, ServiceError> {
        let request = self
            .request(Method::POST, "management/v1/projects")?
            .header(ORG_HEADER, org_id)
            .json(&json!({
                "name": name,
                "projectRoleAssertion": true,
                "projectRoleCheck": true,
                "hasProjectCheck": true,
                "privateLabelingSetting": "PRIVATE_LABELING_SETTING_UNSPECIFIED",
            }));
        let (status, body) = self.send(request).await?;

        let id = interpret_create_project(status, &body)?;
        info!("Successfully created project: {} in organization: {}", name, org_id);
        Ok(id)
    }

    async fn create_application(
        &self,
        org_id: &str,
        project_id: &str,
        name: &str,
    ) -> Result<RemoteId, ServiceError> {
        let path = format!("management/v1/projects/{}/apps/api", project_id);
        let request = self
            .request(Method::POST, &path)?
            .header(ORG_HEADER, org_id)
            .json(&json!({
                "name": name,
                "authMethodType": "API_AUTH_METHOD_TYPE_BASIC",
            }));
        let (status, body) = self.send(request).await?;

        let app = interpret_create_application(status, &body)?;
        info!(
            "Successfully created application: {} in project: {} (client ID: {})",
            name, project_id, app.client_id
        );
        Ok(app.app_id)
    }

    async fn create_user(&self, profile: &UserProfile, org_id: &str) -> Result<(), ServiceError> {
        let request = self
            .request(Method::POST, "v2/users/human")?
            .header(ORG_HEADER, org_id)
            .json(&user_payload(profile, org_id));
        let (status, body) = self.send(request).await?;

        ensure_success(status, &body)?;
        info!("Successfully created user: {}", profile.username);
        Ok(())
    }

    async fn lookup_organization_id_by_name(&self, name: &str) -> Result<RemoteId, ServiceError> {
        let request = self.request(Method::GET, "management/v1/orgs/me")?;
        let (status, body) = self.send(request).await?;
        interpret_lookup_organization(name, status, &body)
    }

    fn service_name(&self) -> &'static str {
        "zitadel"
    }
}
