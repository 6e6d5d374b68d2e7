//! Reaper - kills processes that outlive a configured lifetime
//!
//! Reaper polls the process table for every process carrying a given name and
//! kills the ones that have been running for at least the configured lifetime.
//!
//! # Lifecycle
//!
//! 1. Arguments and environment are read, the monitor configuration validated
//! 2. Every poll interval the process table is scanned and over-age processes killed
//! 3. Ctrl-C, SIGTERM or the console quit key set the shutdown signal
//! 4. The monitor finishes its current cycle or wakes from its sleep and stops
//!
//! # Usage
//!
//! ```bash
//! # Kill notepad instances older than 5 minutes, checking every minute
//! reaper notepad 5 1
//!
//! # Seconds instead of minutes, with kill confirmations
//! reaper sleep 30 2 --seconds --verbose
//! ```

mod config;
mod directory;
mod monitor;
mod shutdown;
mod sink;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use config::EnvSettings;
use directory::SystemDirectory;
use monitor::{MonitorConfig, MonitorLoop};
use shutdown::{
    listen_for_interrupt, listen_for_terminate, spawn_quit_key_listener, QuitKey, ShutdownSignal,
};
use sink::{FanoutSink, JournalSink, LogSink, TracingSink};

/// Command line arguments
#[derive(Debug, PartialEq, Eq)]
struct Args {
    /// Process name to watch
    process_name: String,

    /// Maximum lifetime before a process is killed
    lifetime: TimeDelta,

    /// Delay between scans
    interval: TimeDelta,

    /// Debug logging (kill confirmations)
    verbose: bool,

    /// JSON log lines
    json: bool,

    /// Journal path
    events_path: Option<PathBuf>,

    /// Journal at the default path
    record: bool,
}

/// Outcome of argument parsing that isn't a monitor run
#[derive(Debug, PartialEq, Eq)]
enum ArgsError {
    Help,
    Version,
    Invalid(String),
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        Self::parse_from(std::env::args().skip(1))
    }

    fn parse_from<I>(args: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut positional: Vec<String> = Vec::new();
        let mut seconds = false;
        let mut verbose = false;
        let mut json = false;
        let mut events_path: Option<PathBuf> = None;
        let mut record = false;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--seconds" => seconds = true,
                "--verbose" | "-v" => verbose = true,
                "--json" => json = true,
                "--record" => record = true,
                "--events" => {
                    let path = args
                        .next()
                        .ok_or_else(|| ArgsError::Invalid("--events requires a path".to_string()))?;
                    events_path = Some(PathBuf::from(path));
                }
                "--help" | "-h" => return Err(ArgsError::Help),
                "--version" | "-V" => return Err(ArgsError::Version),
                flag if flag.starts_with("--") => {
                    return Err(ArgsError::Invalid(format!("Unknown argument: {}", flag)));
                }
                _ => positional.push(arg),
            }
        }

        if positional.len() != 3 {
            return Err(ArgsError::Invalid(format!(
                "Expected 3 arguments <NAME> <LIFETIME> <INTERVAL>, got {}",
                positional.len()
            )));
        }
        let interval = positional.pop().unwrap_or_default();
        let lifetime = positional.pop().unwrap_or_default();
        let process_name = positional.pop().unwrap_or_default();

        Ok(Args {
            process_name,
            lifetime: parse_duration("LIFETIME", &lifetime, seconds)?,
            interval: parse_duration("INTERVAL", &interval, seconds)?,
            verbose,
            json,
            events_path,
            record,
        })
    }
}

/// Parse a whole number of minutes (or seconds). Sign is checked later by
/// the monitor configuration.
fn parse_duration(label: &str, value: &str, seconds: bool) -> Result<TimeDelta, ArgsError> {
    let amount: i64 = value
        .trim()
        .parse()
        .map_err(|_| ArgsError::Invalid(format!("{} must be a whole number, got '{}'", label, value)))?;

    let delta = if seconds {
        TimeDelta::try_seconds(amount)
    } else {
        TimeDelta::try_minutes(amount)
    };
    delta.ok_or_else(|| ArgsError::Invalid(format!("{} is out of range: {}", label, amount)))
}

fn print_help() {
    println!(
        r#"Reaper - kills processes that outlive a configured lifetime

USAGE:
    reaper <NAME> <LIFETIME> <INTERVAL> [OPTIONS]

ARGUMENTS:
    <NAME>        Process name to watch (exact match)
    <LIFETIME>    Kill processes running at least this long (minutes)
    <INTERVAL>    Time between scans (minutes)

OPTIONS:
    --seconds         Read LIFETIME and INTERVAL as seconds
    --verbose, -v     Debug logging, shows kill confirmations
    --json            Emit JSON log lines
    --events <PATH>   Append every monitor entry to a JSON-lines journal
    --record          Journal to ~/.reaper/events.log
    --help, -h        Show this help message
    --version, -V     Show version

ENVIRONMENT:
    REAPER_LOG           Tracing filter (default: info)
    REAPER_LOG_JSON      true/1 for JSON log lines
    REAPER_EVENTS_LOG    Journal path

EXAMPLE:
    reaper notepad 5 1
"#
    );
}

/// Install the tracing subscriber
fn init_logging(args: &Args, settings: &EnvSettings) {
    let default_filter = if args.verbose {
        config::VERBOSE_LOG_FILTER
    } else {
        config::DEFAULT_LOG_FILTER
    };
    let filter = settings
        .log_filter
        .as_deref()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if args.json || settings.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve the journal path: flag, then environment, then `--record` default
fn journal_path(args: &Args, settings: &EnvSettings) -> Option<PathBuf> {
    args.events_path
        .clone()
        .or_else(|| settings.events_log.clone())
        .or_else(|| if args.record { config::get_events_log_path() } else { None })
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse arguments
    let args = match Args::parse() {
        Ok(args) => args,
        Err(ArgsError::Help) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Err(ArgsError::Version) => {
            println!("reaper {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Err(ArgsError::Invalid(e)) => {
            eprintln!("Error: {}", e);
            eprintln!("Run 'reaper --help' for usage");
            return ExitCode::from(2);
        }
    };

    let settings = EnvSettings::from_env();
    init_logging(&args, &settings);

    let monitor_config = match MonitorConfig::new(&args.process_name, args.interval, args.lifetime) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let run_id = Uuid::new_v4();
    info!("Reaper v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Run ID: {}", run_id);

    // Build the sink
    let mut sinks: Vec<Arc<dyn LogSink>> =
        vec![Arc::new(TracingSink::new(monitor_config.target_name()))];
    match journal_path(&args, &settings) {
        Some(path) => {
            let journal = JournalSink::new(path, run_id);
            info!("Events journal: {}", journal.path().display());
            sinks.push(Arc::new(journal));
        }
        None if args.record => warn!("Could not determine home directory, journal disabled"),
        None => {}
    }
    let sink: Arc<dyn LogSink> = Arc::new(FanoutSink::new(sinks));

    // Shutdown signal and its triggers
    let shutdown_signal = ShutdownSignal::new();
    tokio::spawn(listen_for_interrupt(shutdown_signal.clone()));
    tokio::spawn(listen_for_terminate(shutdown_signal.clone()));
    if let Err(e) = spawn_quit_key_listener(shutdown_signal.clone(), QuitKey::detect()) {
        warn!("Console stop key unavailable: {}", e);
    }

    let mut monitor = match MonitorLoop::new(
        monitor_config,
        SystemDirectory::new(),
        shutdown_signal,
        Some(sink),
    ) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let summary = monitor.run().await;
    info!(
        "Reaper shutdown complete after {} cycles: {} processes seen, {} kill requests, {} killed, {} failed scans",
        summary.cycles,
        summary.processes_seen,
        summary.kill_requests,
        summary.kills,
        summary.list_failures
    );

    ExitCode::SUCCESS
}
