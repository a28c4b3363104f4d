use clap::ValueEnum;
use regsync_core::{
    diff::ConfigChange,
    reconcile::{DiffReport, SchemesReport, ShowReport, UpdateReport},
};
use serde::Serialize;
use tracing::error;

/// Output format for run reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Result of an update run, optionally with the deployment schemes update.
#[derive(Clone, Debug, Serialize)]
pub struct UpdateRun {
    pub environment: String,
    pub services: UpdateReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemes: Option<SchemesReport>,
}

impl UpdateRun {
    pub fn succeeded(&self) -> bool {
        !self.services.has_failures() && self.schemes.as_ref().map_or(true, |schemes| schemes.status)
    }
}

/// Result of a rollout over several environments.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RolloutReport {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub runs: Vec<UpdateRun>,
}

/// Writes run reports to standard output.
pub struct Reporter {
    format: OutputFormat,
}

impl Reporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn report_update(&self, run: &UpdateRun) {
        match self.format {
            OutputFormat::Json => print_json(run),
            OutputFormat::Text => print_update(run),
        }
    }

    pub fn report_diff(&self, environment: &str, report: &DiffReport) {
        if matches!(self.format, OutputFormat::Json) {
            print_json(report);
            return;
        }

        println!("Diff for {}:", environment);
        for (service, result) in &report.by_service {
            if result.config_diff.is_empty() && result.status {
                continue;
            }

            println!("  {} [{}]", service, outcome_label(&report.fail, &report.add, &report.recreate, service));
            if !result.status {
                println!("    {}", result.message);
            }
            for change in result.config_diff.changes() {
                println!("    {}", describe_change(change));
            }
        }

        print_bucket("fail", &report.fail);
        print_bucket("add", &report.add);
        print_bucket("recreate", &report.recreate);
        print_bucket("skip", &report.skip);
        println!("{} service(s) with pending changes.", report.pending_changes());
    }

    pub fn report_show(&self, environment: &str, report: &ShowReport) {
        if matches!(self.format, OutputFormat::Json) {
            print_json(report);
            return;
        }

        println!("Registry contents for {}:", environment);
        for (service, records) in report {
            println!("  {} ({} record(s))", service, records.len());
            for record in records {
                println!(
                    "    {}:{} location={} physicalEnv={} group={}",
                    record.address.as_deref().unwrap_or("-"),
                    record.port.map_or_else(|| "-".to_string(), |port| port.to_string()),
                    record.location.as_deref().unwrap_or("-"),
                    record.physical_env.as_deref().unwrap_or("-"),
                    record.group.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    pub fn report_schemes(&self, environment: &str, report: &SchemesReport) {
        match self.format {
            OutputFormat::Json => print_json(report),
            OutputFormat::Text => print_schemes(environment, report),
        }
    }

    pub fn report_rollout(&self, report: &RolloutReport) {
        if matches!(self.format, OutputFormat::Json) {
            print_json(report);
            return;
        }

        for run in &report.runs {
            print_update(run);
        }
        print_bucket("completed", &report.completed);
        print_bucket("failed", &report.failed);
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!(error = %e, "Failed to serialize report."),
    }
}

fn print_update(run: &UpdateRun) {
    let report = &run.services;
    println!(
        "Update of {} ({} service(s), force: {}):",
        run.environment,
        report.services_to_process.len(),
        report.force_mode
    );
    print_bucket("added", &report.added);
    print_bucket("recreated", &report.recreated);
    print_bucket("skipped", &report.skipped);
    print_bucket("failed", &report.failed);

    for service in &report.failed {
        if let Some(message) = report.by_service.get(service).and_then(|result| result.message.as_deref()) {
            println!("    {}: {}", service, message);
        }
    }

    if let Some(schemes) = &run.schemes {
        print_schemes(&run.environment, schemes);
    }
}

fn print_schemes(environment: &str, report: &SchemesReport) {
    let class = report.environment_class.map_or("unknown", |class| class.as_str());
    let status = if report.status { "registered" } else { "failed" };
    println!("Deployment schemes of {} ({}): {}", environment, class, status);
    if !report.message.is_empty() {
        println!("  {}", report.message.join(", "));
    }
    if let Some(error) = &report.error {
        println!("  error: {}", error);
    }
}

fn print_bucket(label: &str, services: &[String]) {
    if services.is_empty() {
        println!("  {} (0)", label);
    } else {
        println!("  {} ({}): {}", label, services.len(), services.join(", "));
    }
}

fn outcome_label(fail: &[String], add: &[String], recreate: &[String], service: &str) -> &'static str {
    let contains = |list: &[String]| list.iter().any(|s| s == service);
    if contains(fail) {
        "fail"
    } else if contains(add) {
        "add"
    } else if contains(recreate) {
        "recreate"
    } else {
        "skip"
    }
}

fn describe_change(change: &ConfigChange) -> String {
    match change {
        ConfigChange::Added { key, value } => format!("+ {}: {}", key, value),
        ConfigChange::Removed { key, value } => format!("- {}: {}", key, value),
        ConfigChange::Modified {
            key,
            old_value,
            new_value,
        } => format!("~ {}: {} -> {}", key, old_value, new_value),
    }
}
