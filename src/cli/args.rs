//! Command line argument parsing
//!
//! Subcommands:
//! - `run`: Provision organizations, projects, applications and users
//! - `show-config`: Show configuration discovery information

use crate::env;
use crate::scheduler::RunMode;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Run(RunConfig),
    ShowConfig,
}

/// Counts given on the command line. Missing ones are prompted for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountOverrides {
    pub organizations: Option<usize>,
    pub projects: Option<usize>,
    pub applications: Option<usize>,
    pub users: Option<usize>,
}

#[derive(Debug)]
pub struct RunConfig {
    pub counts: CountOverrides,
    pub mode: RunMode,
    pub config_override: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Concurrent,
    Sequential,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Concurrent => RunMode::Concurrent,
            ModeArg::Sequential => RunMode::Sequential,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "fanout")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bulk-provision organizations, projects, applications and users on an identity service")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision a resource hierarchy
    Run {
        /// Number of organizations
        #[arg(long = "orgs", value_parser = parse_positive)]
        orgs: Option<usize>,
        /// Number of projects per organization
        #[arg(long = "projects", value_parser = parse_positive)]
        projects: Option<usize>,
        /// Number of applications per project
        #[arg(long = "applications", value_parser = parse_positive)]
        applications: Option<usize>,
        /// Number of users per organization
        #[arg(long = "users", value_parser = parse_positive)]
        users: Option<usize>,
        /// Execution mode
        #[arg(short = 'm', long = "mode", value_enum, default_value_t = ModeArg::Concurrent)]
        mode: ModeArg,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Write logs to this file instead of stderr
        #[arg(
            long = "log-file",
            value_name = "FILE",
            num_args = 0..=1,
            default_missing_value = env::DEFAULT_LOG_FILE
        )]
        log_file: Option<PathBuf>,
        /// Write a JSON report of created resources and metrics
        #[arg(long = "report", value_name = "FILE")]
        report: Option<PathBuf>,
        /// Print the plan without contacting the service
        #[arg(short = 'n', long = "dry-run")]
        dry_run: bool,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Run {
                orgs,
                projects,
                applications,
                users,
                mode,
                config,
                log_file,
                report,
                dry_run,
            }) => Ok(ExecutionMode::Run(RunConfig {
                counts: CountOverrides {
                    organizations: *orgs,
                    projects: *projects,
                    applications: *applications,
                    users: *users,
                },
                mode: (*mode).into(),
                config_override: config.clone(),
                log_file: log_file.clone(),
                report: report.clone(),
                dry_run: *dry_run,
            })),
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => {
                Err("No command specified. Use 'fanout --help' to see available commands.".to_string())
            }
        }
    }

    /// Log file requested by the subcommand, if any
    pub fn log_file(&self) -> Option<&PathBuf> {
        match &self.command {
            Some(Commands::Run { log_file, .. }) => log_file.as_ref(),
            _ => None,
        }
    }
}

/// Parse a strictly positive count.
pub fn parse_positive(value: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err("must be a positive integer".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a positive integer", value.trim())),
    }
}
