//! CLI-specific functionality for the provisioner
//!
//! This module contains argument parsing, interactive prompting for missing
//! counts, and configuration discovery.

pub mod args;
pub mod config;
pub mod prompt;

pub use args::{Args, CountOverrides, ExecutionMode, ModeArg, RunConfig};
pub use config::{ConfigDiscovery, ConfigError, ProvisionConfig, ServiceSettings};
pub use prompt::{PromptError, prompt_count, resolve_plan};
