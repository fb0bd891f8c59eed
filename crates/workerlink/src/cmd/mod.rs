use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod request;
#[cfg(unix)]
pub mod stub_worker;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request to a worker and print its response.
    Request(RequestArgs),
    /// Print notifications emitted by one worker entity.
    Watch(WatchArgs),
    /// Run a scripted stand-in worker on a control socket.
    #[cfg(unix)]
    StubWorker(StubWorkerArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Request(args) => request::run(args, format),
        Command::Watch(args) => watch::run(args, format),
        #[cfg(unix)]
        Command::StubWorker(args) => stub_worker::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Worker control socket to connect to.
    pub path: PathBuf,
    /// Method name, e.g. `worker.dump`.
    #[arg(long, short = 'm')]
    pub method: String,
    /// Target selector as a JSON object, e.g. '{"routerId":"r1"}'.
    #[arg(long, value_name = "JSON")]
    pub internal: Option<String>,
    /// Request data as JSON.
    #[arg(long, value_name = "JSON")]
    pub data: Option<String>,
    /// Time to wait for the response (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Worker control socket to connect to.
    pub path: PathBuf,
    /// Target id whose notifications to print.
    #[arg(long)]
    pub target: String,
    /// Event names to subscribe to (comma-separated).
    #[arg(long, required = true, value_delimiter = ',')]
    pub event: Vec<String>,
    /// Exit after printing N notifications.
    #[arg(long)]
    pub count: Option<usize>,
}

#[cfg(unix)]
#[derive(Args, Debug)]
pub struct StubWorkerArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Target id of the notification sent after each request.
    #[arg(long, requires = "notify_event")]
    pub notify_target: Option<String>,
    /// Event name of the notification sent after each request.
    #[arg(long, requires = "notify_target")]
    pub notify_event: Option<String>,
    /// Also send the notification periodically (e.g. 200ms).
    #[arg(long, requires = "notify_target")]
    pub notify_interval: Option<String>,
    /// Disconnect a host that sends no request for this long (e.g. 30s).
    #[arg(long)]
    pub idle_timeout: Option<String>,
    /// Give up on a host that stops reading for this long (e.g. 5s).
    #[arg(long)]
    pub write_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub(crate) fn parse_json(flag: &str, input: &str) -> CliResult<serde_json::Value> {
    serde_json::from_str(input)
        .map_err(|err| CliError::new(USAGE, format!("--{flag} is not valid JSON: {err}")))
}

pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))
}
