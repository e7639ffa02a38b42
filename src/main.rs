use anyhow::{Context, Result};
use fanout_provisioner::ProvisionSystem;
use fanout_provisioner::cli::{Args, ConfigDiscovery, ExecutionMode, RunConfig, resolve_plan};
use fanout_provisioner::env;
use fanout_provisioner::integration::cancel_on_interrupt;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit status when the run finished but not every node materialized
const EXIT_INCOMPLETE: u8 = 2;

/// Exit status after a second interrupt
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_file().map(|p| p.as_path())) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env::DEFAULT_LOG_DIRECTIVE));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("error opening log file {:?}", path))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
            info!("Logging initialized successfully");
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn run(args: Args) -> Result<ExitCode> {
    match args.mode().map_err(anyhow::Error::msg)? {
        ExecutionMode::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            let (config, _) = ConfigDiscovery::load(None)?;
            println!();
            println!("Effective configuration:");
            println!("{}", config.to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
        ExecutionMode::Run(run_config) => run_provisioning(run_config).await,
    }
}

async fn run_provisioning(run: RunConfig) -> Result<ExitCode> {
    let (config, source) = ConfigDiscovery::load(run.config_override.as_deref())?;
    match &source {
        Some(path) => info!("Using configuration from {:?}", path),
        None => info!("Using built-in configuration defaults"),
    }

    let plan = {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        resolve_plan(run.counts, &mut input, &mut output)?
    };
    plan.validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid provisioning plan")?;

    if run.dry_run {
        print!("{}", ProvisionSystem::describe_plan(&plan, run.mode));
        return Ok(ExitCode::SUCCESS);
    }

    let system = ProvisionSystem::new(config)?;
    let cancel = system.cancellation_token();
    tokio::spawn(async move {
        if cancel_on_interrupt(tokio::signal::ctrl_c, cancel).await {
            error!("Second interrupt received, exiting without waiting for in-flight tasks");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });

    println!("Running in {} mode...", run.mode);
    let report = system.run(plan, run.mode).await?;
    print!("{}", report);

    if let Some(path) = &run.report {
        ProvisionSystem::write_report(&report, path)?;
    }

    if report.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_INCOMPLETE))
    }
}
