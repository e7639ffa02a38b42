//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./fanout.toml or ./.fanout/config.toml
//! 2. User config: ~/.fanout/config.toml
//! 3. System config: /etc/fanout/config.toml
//! 4. Built-in defaults

use crate::env;
use crate::scheduler::{NamingConfig, OrchestratorConfig, PoolConfig, RetryConfig};
use crate::service::ZitadelConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("No API token configured; set service.api_token or the {0} environment variable")]
    MissingToken(String),
}

/// Connection settings for the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub base_url: String,
    pub api_token: Option<String>,
    /// Environment variable consulted when `api_token` is unset
    pub token_env: String,
    pub request_timeout_secs: u64,
    pub user_password: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: env::DEFAULT_BASE_URL.to_string(),
            api_token: None,
            token_env: env::API_TOKEN_ENV.to_string(),
            request_timeout_secs: 30,
            user_password: crate::scheduler::DEFAULT_USER_PASSWORD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Overall deadline for a run; unset runs until every task terminates
    pub run_timeout_secs: Option<u64>,
    pub service: ServiceSettings,
    pub pools: PoolConfig,
    pub retry: RetryConfig,
    pub naming: NamingConfig,
}

impl ProvisionConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ProvisionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pools.validate().map_err(ConfigError::Invalid)?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.service.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "service.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.base_url()?;
        Ok(())
    }

    /// Base URL with a trailing slash so endpoint paths join under it.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let raw = self.service.base_url.trim();
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{}/", raw)
        };
        Url::parse(&normalized)
            .map_err(|e| ConfigError::Invalid(format!("service.base_url '{}': {}", raw, e)))
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            pools: self.pools.clone(),
            retry: self.retry.clone(),
            naming: self.naming.clone(),
            user_password: self.service.user_password.clone(),
        }
    }

    /// Resolve the API token: `service.api_token`, else `lookup(token_env)`.
    pub fn resolve_token<F>(&self, lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.service
            .api_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .or_else(|| lookup(&self.service.token_env).filter(|t| !t.trim().is_empty()))
            .ok_or_else(|| ConfigError::MissingToken(self.service.token_env.clone()))
    }

    pub fn zitadel_config<F>(&self, lookup: F) -> Result<ZitadelConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(ZitadelConfig {
            base_url: self.base_url()?,
            api_token: self.resolve_token(lookup)?,
            request_timeout: Duration::from_secs(self.service.request_timeout_secs),
        })
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load `override_path` if given, otherwise the first file found in the
    /// discovery hierarchy, otherwise the defaults.
    pub fn load(override_path: Option<&Path>) -> Result<(ProvisionConfig, Option<PathBuf>), ConfigError> {
        if let Some(path) = override_path {
            info!("Loading configuration override from: {:?}", path);
            return Ok((ProvisionConfig::from_toml_file(path)?, Some(path.to_path_buf())));
        }

        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            let config = ProvisionConfig::from_toml_file(&config_path)?;
            return Ok((config, Some(config_path)));
        }

        info!("No configuration file found, using defaults");
        Ok((ProvisionConfig::default(), None))
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        for candidate in Self::get_config_candidates() {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    fn get_config_candidates() -> Vec<PathBuf> {
        let current_dir = std::env::current_dir().ok();
        let home_dir = env::home_dir();
        Self::candidates_for(current_dir.as_deref(), home_dir.as_deref())
    }

    /// Configuration file candidates in priority order
    pub fn candidates_for(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(current_dir) = current_dir {
            candidates.push(env::local_root_config_file_path(current_dir));
            candidates.push(env::local_config_file_path(current_dir));
        }

        if let Some(home_dir) = home_dir {
            candidates.push(env::user_config_file_path(home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from(env::SYSTEM_CONFIG_FILE));

        candidates
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        for (i, candidate) in Self::get_config_candidates().iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        if let Some(found) = Self::find_config_file() {
            println!("Active configuration: {:?}", found);
        } else {
            println!("Active configuration: Built-in defaults");
        }
    }
}
