//! Command-line entry point for reconciling a service registry with the service catalog.
//!
//! Exit codes: `0` when every service was processed successfully, `1` when some service or environment failed, and
//! `2` when the run could not start (bad configuration, unreadable catalog, unknown environment, ...).

#![deny(missing_docs)]

use std::process::ExitCode;

use clap::Parser as _;
use regsync_app::prelude::*;
use regsync_config::{ConfigurationLoader, GenericConfiguration};
use regsync_error::GenericError;
use tracing::{error, info};

mod cli;
use self::cli::{Action, Cli};

mod config;

mod report;
use self::report::Reporter;

mod runner;
use self::runner::Runner;

const ENV_PREFIX: &str = "REGSYNC";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let configuration = load_configuration(&cli).unwrap_or_else(|e| {
        fatal_and_exit(format!("failed to load configuration: {:#}", e))
    });

    let logging_config = LoggingConfiguration::from_configuration(&configuration).unwrap_or_else(|e| {
        fatal_and_exit(format!("failed to read logging configuration: {:#}", e))
    });
    if let Err(e) = initialize_logging(&logging_config) {
        fatal_and_exit(format!("failed to initialize logging: {:#}", e));
    }

    info!("regsync starting...");

    match run(cli, &configuration).await {
        Ok(true) => {
            info!("regsync stopped.");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            error!("regsync stopped with failures.");
            ExitCode::from(1)
        }
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

fn load_configuration(cli: &Cli) -> Result<GenericConfiguration, GenericError> {
    let configuration = ConfigurationLoader::default()
        .try_from_yaml(&cli.config)
        .from_environment(ENV_PREFIX)?
        .into_generic();

    Ok(configuration)
}

async fn run(cli: Cli, configuration: &GenericConfiguration) -> Result<bool, GenericError> {
    let reporter = Reporter::new(cli.output);
    let runner = Runner::from_configuration(configuration).await?;

    match cli.action {
        Action::Update(cmd) => {
            let run = runner
                .update(&cmd.environment, &cmd.filter.to_filter(), cmd.force, cmd.schemes)
                .await?;
            reporter.report_update(&run);
            Ok(run.succeeded())
        }
        Action::Diff(cmd) => {
            let report = runner.diff(&cmd.environment, &cmd.filter.to_filter()).await?;
            reporter.report_diff(&cmd.environment, &report);
            Ok(!report.has_failures())
        }
        Action::Show(cmd) => {
            let report = runner.show(&cmd.environment, &cmd.filter.to_filter()).await?;
            reporter.report_show(&cmd.environment, &report);
            Ok(true)
        }
        Action::Schemes(cmd) => {
            let report = runner.schemes(&cmd.environment).await?;
            reporter.report_schemes(&cmd.environment, &report);
            Ok(report.status)
        }
        Action::Rollout(cmd) => {
            let report = runner
                .rollout(&cmd.environments, &cmd.filter.to_filter(), cmd.force, cmd.schemes)
                .await?;
            reporter.report_rollout(&report);
            Ok(report.failed.is_empty())
        }
    }
}
