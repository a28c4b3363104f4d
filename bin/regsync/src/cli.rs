use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use regsync_core::filter::ServiceFilter;

use crate::report::OutputFormat;

/// Reconciles a service registry with a catalog of service templates.
#[derive(Parser)]
#[command(about)]
pub struct Cli {
    /// Path to the configuration file.
    ///
    /// Missing files are ignored, in which case settings come from `REGSYNC_*` environment variables and defaults.
    #[arg(long, short = 'c', global = true, default_value = "conf/regsync.yaml")]
    pub config: PathBuf,

    /// Format of the report written to standard output.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand)]
pub enum Action {
    /// Registers the services of an environment.
    Update(UpdateCommand),

    /// Shows what an update would change, without changing anything.
    Diff(DiffCommand),

    /// Shows what the registry holds for an environment.
    Show(ShowCommand),

    /// Registers the deployment schemes of an environment.
    Schemes(SchemesCommand),

    /// Updates several environments, one after the other.
    Rollout(RolloutCommand),
}

/// Restrictions on the services to process.
///
/// Only the first non-empty one of `--only`, `--group` and `--exclude` applies.
#[derive(Args, Clone, Debug, Default)]
pub struct FilterArgs {
    /// Comma-separated list of services to process.
    #[arg(long, default_value = "")]
    pub only: String,

    /// Comma-separated list of services to process, along with the services sourcing their hosts from them.
    #[arg(long, default_value = "")]
    pub group: String,

    /// Comma-separated list of services to leave out.
    #[arg(long, default_value = "")]
    pub exclude: String,
}

impl FilterArgs {
    pub fn to_filter(&self) -> ServiceFilter {
        ServiceFilter::from_lists(&self.only, &self.group, &self.exclude)
    }
}

#[derive(Args)]
pub struct UpdateCommand {
    /// Name of the environment.
    pub environment: String,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Recreates services that are already registered when they differ from the catalog.
    #[arg(long)]
    pub force: bool,

    /// Also registers the environment's deployment schemes.
    #[arg(long)]
    pub schemes: bool,
}

#[derive(Args)]
pub struct DiffCommand {
    /// Name of the environment.
    pub environment: String,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args)]
pub struct ShowCommand {
    /// Name of the environment.
    pub environment: String,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args)]
pub struct SchemesCommand {
    /// Name of the environment.
    pub environment: String,
}

#[derive(Args)]
pub struct RolloutCommand {
    /// File listing one environment name per line.
    #[arg(long)]
    pub environments: PathBuf,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Recreates services that are already registered when they differ from the catalog.
    #[arg(long)]
    pub force: bool,

    /// Also registers each environment's deployment schemes.
    #[arg(long)]
    pub schemes: bool,
}
