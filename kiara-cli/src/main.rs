//! Kiara CLI
//!
//! Fills the Kiara weekly timesheet from a spreadsheet, through a Chrome
//! started with `--remote-debugging-port=9222`.
//!
//! Usage:
//!   kiara                          # this week's sheet of the configured input file
//!   kiara -f hours.xlsx -s 2024-09-30
//!   kiara --dry-run                # show what would be written

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use kiara::authentication::{needs_authentication, run_authentication_flow};
use kiara::surface::CdpSurface;
use kiara::{group_work_items, KiaraError, Page, Project, Reconciler, RunReport};

mod config;
mod input;

use config::Config;
use input::InputError;

#[derive(ValueEnum, Clone, Copy, Debug)]
#[clap(rename_all = "lower")]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "kiara")]
#[command(version, about = "Fill the Kiara weekly timesheet from a spreadsheet")]
struct Args {
    /// The input spreadsheet (.xlsx, .xls, .ods or .csv)
    #[clap(long, short = 'f')]
    file: Option<PathBuf>,

    /// The sheet to read, defaults to the Monday of the current week (YYYY-MM-DD)
    #[clap(long, short = 's')]
    sheet: Option<String>,

    /// Configuration file, defaults to ./kiara.yaml or the user config directory
    #[clap(long, short = 'c', env = "KIARA_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured log level
    #[clap(long, value_enum)]
    log_level: Option<LogLevel>,

    /// Read and group the input, print the plan and exit without a browser
    #[clap(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = Config::locate(args.config.as_deref())?;
    let config = Config::load(config_path.as_deref())?;

    let level = match args.log_level {
        Some(level) => Level::from(level),
        None => parse_level(&config.log_level),
    };
    init_logging(level);

    match &config_path {
        Some(path) => {
            info!("Using configuration from {}", path.display());
            if !config.defaulted.is_empty() {
                warn!(
                    "{} not set in {}, using defaults",
                    config.defaulted.join(", "),
                    path.display()
                );
            }
        }
        None => warn!("No {} found, using default configuration", config::CONFIG_FILE_NAME),
    }

    let file = args
        .file
        .or_else(|| config.input_file.clone())
        .map(expand_home)
        .context("No input file, pass --file or set input_file in the configuration")?;
    let sheet = args
        .sheet
        .unwrap_or_else(|| week_start(Local::now().date_naive()));

    let ingested = input::read_work_items(&file, &sheet, &config.default_project)
        .with_context(|| format!("Failed to process input data from '{}'", file.display()))?;
    let rejected = ingested.rejected;
    let projects = group_work_items(ingested.items, &config.general_tasks)?;

    if args.dry_run {
        print_plan(&projects);
        print_rejected(&rejected);
        return Ok(());
    }

    let surface = CdpSurface::connect(&config.cdp_url, config.tab_url_pattern.as_deref())
        .await
        .map_err(KiaraError::DebugBrowserConnection)?;
    let page = Page::new(Arc::new(surface));
    let settings = config.settings();

    if needs_authentication(&page, &settings).await? {
        match &config.phone_number {
            Some(phone_number) => {
                run_authentication_flow(&page, &settings, phone_number)
                    .await
                    .context("Authentication failed")?;
            }
            None => warn!(
                "Browser is not on {} and no phone_number is configured, not logging in",
                settings.base_url
            ),
        }
    }

    let report = Reconciler::new(page, settings).run(&projects).await;
    print_report(&report);
    print_rejected(&rejected);
    Ok(())
}

fn init_logging(level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Monday of the week containing `today`, as a sheet name.
fn week_start(today: NaiveDate) -> String {
    let monday = today - chrono::Duration::days(today.weekday().num_days_from_monday() as i64);
    monday.format("%Y-%m-%d").to_string()
}

fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}

fn print_plan(projects: &[Project]) {
    for project in projects {
        let section = if project.is_general_task() { " (general)" } else { "" };
        println!("{}{section}", project.name());
        for item in project.items() {
            println!(
                "  {:<6} {:>6}h  {}",
                item.formatted_date(),
                item.formatted_time_spent(),
                item.insertion_description()
            );
        }
    }
}

fn print_report(report: &RunReport) {
    for project in &report.projects {
        if !project.located {
            println!("{}: not found in the timesheet", project.project);
            continue;
        }
        println!(
            "{}: {} updated, {} created, {} partially written, {} skipped, {} failed",
            project.project,
            project.updated,
            project.created,
            project.partial,
            project.skipped,
            project.failed
        );
    }
    match report.saved {
        Some(true) => println!("Timesheet saved provisionally"),
        Some(false) => println!("Saving the timesheet failed, save it manually"),
        None => println!("Review the timesheet and save it manually"),
    }
    if report.has_problems() {
        warn!("Some work items were not written, see the log above");
    }
}

fn print_rejected(rejected: &[InputError]) {
    if rejected.is_empty() {
        return;
    }
    println!("{} input rows were not processed:", rejected.len());
    for err in rejected {
        println!("  {err}");
    }
}
