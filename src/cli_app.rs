//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use dendr::core::config::Config;
use dendr::core::errors::DendrError;
use dendr::core::paths::{SnapshotLocation, inventory_file_name_for};
use dendr::diff::cancel::CancelToken;
use dendr::diff::change::{Change, ChangeEvent};
use dendr::diff::run::{RunBuilder, RunOutcome, RunReport};
use dendr::diff::sink::CollectorSink;
use dendr::scanner::filter::validate_glob_pattern;
use dendr::scanner::walker::WalkerConfig;
use dendr::snapshot::codec::{DecodePolicy, format_mtime};
use dendr::snapshot::reader::SnapshotReader;

/// dendr: detect what changed in a directory tree since the last snapshot.
#[derive(Debug, Parser)]
#[command(
    name = "dendr",
    author,
    version,
    about = "Directory tree change detection against persisted snapshots",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Also list unchanged paths.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (summary and errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Compare a tree against a past snapshot and write the next one.
    Diff(DiffArgs),
    /// Compare a tree against a SQLite keyed store and update it.
    #[cfg(feature = "sqlite")]
    Keyed(KeyedArgs),
    /// Decode a snapshot and list its entries.
    Show(ShowArgs),
    /// Print the conventional snapshot file name for a tree name.
    InventoryName(InventoryNameArgs),
}

/// Traversal and comparison options shared by `diff` and `keyed`.
#[derive(Debug, Clone, Args, Default)]
struct TraversalArgs {
    /// Follow symbolic links during traversal.
    #[arg(long)]
    follow_symlinks: bool,
    /// Exclude paths matching this glob (repeatable).
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
    /// Treat mtimes at most this many nanoseconds apart as equal.
    #[arg(long, value_name = "NANOS")]
    mtime_tolerance_ns: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct DiffArgs {
    /// Root of the tree to compare.
    #[arg(default_value = ".", value_name = "PATH")]
    path: PathBuf,
    /// Past snapshot to compare against (`-` for stdin).
    #[arg(long, default_value = "-", value_name = "FILE|-")]
    past: String,
    /// Where to write the next snapshot (`-` for stdout).
    #[arg(long, default_value = "-", value_name = "FILE|-")]
    next: String,
    /// Fail on malformed snapshot records instead of recovering.
    #[arg(long)]
    strict: bool,
    #[command(flatten)]
    traversal: TraversalArgs,
}

#[cfg(feature = "sqlite")]
#[derive(Debug, Clone, Args)]
struct KeyedArgs {
    /// Root of the tree to compare.
    #[arg(default_value = ".", value_name = "PATH")]
    path: PathBuf,
    /// SQLite database holding the keyed state.
    #[arg(long, value_name = "FILE")]
    db: PathBuf,
    #[command(flatten)]
    traversal: TraversalArgs,
}

#[derive(Debug, Clone, Args)]
struct ShowArgs {
    /// Snapshot to decode (`-` for stdin).
    #[arg(value_name = "SNAPSHOT")]
    snapshot: String,
    /// Fail on malformed snapshot records instead of recovering.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, Args)]
struct InventoryNameArgs {
    /// Tree name.
    name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI. Every failure to run is 1.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) | Self::Runtime(_) | Self::Json(_) | Self::Io(_) => 1,
        }
    }
}

impl From<DendrError> for CliError {
    fn from(err: DendrError) -> Self {
        match err {
            DendrError::InvalidConfig { .. }
            | DendrError::MissingConfig { .. }
            | DendrError::ConfigParse { .. } => Self::User(err.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Dispatch CLI commands. Returns the process exit code.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Diff(args) => run_diff(cli, args),
        #[cfg(feature = "sqlite")]
        Command::Keyed(args) => run_keyed(cli, args),
        Command::Show(args) => run_show(cli, args),
        Command::InventoryName(args) => run_inventory_name(cli, args),
    }
}

// ---------------------------------------------------------------------------
// diff / keyed
// ---------------------------------------------------------------------------

fn run_diff(cli: &Cli, args: &DiffArgs) -> Result<i32, CliError> {
    let mut config = load_config(cli)?;
    if args.strict {
        config.compare.decode_policy = DecodePolicy::Strict;
    }
    let walker = apply_traversal_args(&mut config, &args.path, &args.traversal)?;

    let past = SnapshotLocation::parse(&args.past);
    let next = SnapshotLocation::parse(&args.next);
    // The next snapshot owns stdout when written there.
    let dest = if next == SnapshotLocation::Stdio {
        Destination::Stderr
    } else {
        Destination::Stdout
    };
    let mode = output_mode(cli, dest);
    let mut sink = ReportSink::new(dest, mode, cli, !cli.no_color && dest.is_terminal());

    let report = RunBuilder::new()
        .configure(&config)
        .past(past)
        .next(next)
        .sink(&mut sink)
        .walker(walker)
        .cancel_token(cancel_token())
        .build()?
        .run(&args.path);

    sink.summarize("diff", &report)?;
    Ok(report.exit_code())
}

#[cfg(feature = "sqlite")]
fn run_keyed(cli: &Cli, args: &KeyedArgs) -> Result<i32, CliError> {
    use dendr::diff::classifier::Classifier;
    use dendr::logger::jsonl::JsonlWriter;
    use dendr::store::SqliteStore;

    let mut config = load_config(cli)?;
    let walker = apply_traversal_args(&mut config, &args.path, &args.traversal)?;
    let store = SqliteStore::open(&args.db)?;

    let dest = Destination::Stdout;
    let mode = output_mode(cli, dest);
    let mut sink = ReportSink::new(dest, mode, cli, !cli.no_color && dest.is_terminal());

    let report = dendr::store::run_keyed(
        &args.path,
        walker,
        store,
        &mut sink,
        Classifier::with_mtime_tolerance_ns(config.compare.mtime_tolerance_ns),
        JsonlWriter::from_config(&config.logging),
        cancel_token(),
    )?;

    sink.summarize("keyed", &report)?;
    Ok(report.exit_code())
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

/// Fold command-line traversal flags into the config and derive walker options.
fn apply_traversal_args(
    config: &mut Config,
    root: &std::path::Path,
    args: &TraversalArgs,
) -> Result<WalkerConfig, CliError> {
    if args.follow_symlinks {
        config.scanner.follow_symlinks = true;
    }
    for pattern in &args.exclude {
        validate_glob_pattern(pattern)?;
        config.scanner.exclude_patterns.push(pattern.clone());
    }
    if let Some(nanos) = args.mtime_tolerance_ns {
        if i64::try_from(nanos).is_err() {
            return Err(CliError::User(format!(
                "--mtime-tolerance-ns too large: {nanos}"
            )));
        }
        config.compare.mtime_tolerance_ns = nanos;
    }
    Ok(WalkerConfig::from_scanner(root, &config.scanner)?)
}

/// Token cancelled by SIGINT/SIGTERM. Registration failure only costs graceful stop.
fn cancel_token() -> CancelToken {
    let token = CancelToken::new();
    if let Err(e) = dendr::signals::install_cancel_handler(&token) {
        eprintln!("[DDR-SIGNAL] {e}");
    }
    token
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    Stdout,
    Stderr,
}

impl Destination {
    fn is_terminal(self) -> bool {
        match self {
            Self::Stdout => io::stdout().is_terminal(),
            Self::Stderr => io::stderr().is_terminal(),
        }
    }

    fn writer(self) -> Box<dyn Write> {
        match self {
            Self::Stdout => Box::new(io::stdout()),
            Self::Stderr => Box::new(io::stderr()),
        }
    }
}

/// Collector that prints each event as it is classified.
struct ReportSink {
    out: Box<dyn Write>,
    mode: OutputMode,
    verbose: bool,
    quiet: bool,
    color: bool,
}

impl ReportSink {
    fn new(dest: Destination, mode: OutputMode, cli: &Cli, color: bool) -> Self {
        Self {
            out: dest.writer(),
            mode,
            verbose: cli.verbose,
            quiet: cli.quiet,
            color,
        }
    }

    fn write_event(&mut self, event: &ChangeEvent) -> io::Result<()> {
        match self.mode {
            OutputMode::Json => {
                serde_json::to_writer(&mut self.out, event).map_err(io::Error::other)?;
                writeln!(self.out)
            }
            OutputMode::Human => {
                let marker = change_marker(event);
                if self.color {
                    let painted = match event.change {
                        Change::Added => marker.as_str().green(),
                        Change::Removed => marker.as_str().red(),
                        Change::StatsChanged => marker.as_str().yellow(),
                        Change::Unchanged => marker.as_str().dimmed(),
                    };
                    writeln!(self.out, "{painted}  {}", event.path)
                } else {
                    writeln!(self.out, "{marker}  {}", event.path)
                }
            }
        }
    }

    fn summarize(&mut self, command: &str, report: &RunReport) -> Result<(), CliError> {
        match self.mode {
            OutputMode::Json => {
                let payload = json!({
                    "command": command,
                    "report": serde_json::to_value(report)?,
                });
                write_json_line(&mut self.out, &payload)?;
            }
            OutputMode::Human => {
                for warning in report_warnings(report) {
                    eprintln!("dendr: warning: {warning}");
                }
                if let RunOutcome::Aborted { code, message } = &report.outcome {
                    eprintln!("dendr: run aborted [{code}]: {message}");
                }
                if !self.quiet || report.outcome != RunOutcome::Completed {
                    writeln!(self.out, "{}", summary_line(report))?;
                }
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

impl CollectorSink for ReportSink {
    fn record(&mut self, event: &ChangeEvent) -> dendr::core::errors::Result<()> {
        if self.quiet || (event.change == Change::Unchanged && !self.verbose) {
            return Ok(());
        }
        self.write_event(event).map_err(|err| DendrError::Sink {
            details: format!("report output: {err}"),
        })
    }
}

/// `+++` added, `---` removed, `=sm` with `.` for each attribute that did not change.
fn change_marker(event: &ChangeEvent) -> String {
    match event.change {
        Change::Added => "+++".to_string(),
        Change::Removed => "---".to_string(),
        Change::Unchanged | Change::StatsChanged => {
            let size = if event.stats.size_changed() { 's' } else { '.' };
            let mtime = if event.stats.mod_time_changed() { 'm' } else { '.' };
            format!("={size}{mtime}")
        }
    }
}

fn summary_line(report: &RunReport) -> String {
    let status = match &report.outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Cancelled => "cancelled",
        RunOutcome::Aborted { .. } => "aborted",
    };
    let c = report.counts;
    let mut line = format!(
        "{status}: {} added, {} removed, {} changed, {} unchanged in {} ms",
        c.added, c.removed, c.stats_changed, c.unchanged, report.duration_ms
    );
    if report.skipped_visits > 0 {
        line.push_str(&format!(", {} skipped", report.skipped_visits));
    }
    line
}

fn report_warnings(report: &RunReport) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(err) = &report.past_open_error {
        warnings.push(format!("past snapshot unavailable, treating as empty: {err}"));
    }
    if report.field_errors > 0 {
        warnings.push(format!(
            "{} malformed snapshot field(s) recovered",
            report.field_errors
        ));
    }
    if report.next_degraded {
        let reason = report.next_error.as_deref().unwrap_or("unknown error");
        warnings.push(format!("next snapshot not fully written: {reason}"));
    }
    warnings
}

// ---------------------------------------------------------------------------
// show / inventory-name
// ---------------------------------------------------------------------------

fn run_show(cli: &Cli, args: &ShowArgs) -> Result<i32, CliError> {
    let config = load_config(cli)?;
    let policy = if args.strict {
        DecodePolicy::Strict
    } else {
        config.compare.decode_policy
    };
    let location = SnapshotLocation::parse(&args.snapshot);
    let mut reader = SnapshotReader::open(&location, policy);
    if let Some(err) = reader.take_open_error() {
        return Err(err.into());
    }

    let mode = output_mode(cli, Destination::Stdout);
    let mut stdout = io::stdout().lock();
    while let Some(entry) = reader.read_entry()? {
        match mode {
            OutputMode::Json => {
                serde_json::to_writer(&mut stdout, &entry)?;
                writeln!(stdout)?;
            }
            OutputMode::Human => {
                writeln!(
                    stdout,
                    "{:>12}  {}  {}",
                    entry.size,
                    format_mtime(&entry.mtime),
                    entry.path
                )?;
            }
        }
    }

    if reader.field_errors() > 0 {
        eprintln!(
            "dendr: warning: {} malformed snapshot field(s) recovered",
            reader.field_errors()
        );
    }
    if mode == OutputMode::Human && cli.verbose {
        writeln!(stdout, "{} entries", reader.entries_read())?;
    }
    Ok(0)
}

fn run_inventory_name(cli: &Cli, args: &InventoryNameArgs) -> Result<i32, CliError> {
    let file = inventory_file_name_for(&args.name);
    match output_mode(cli, Destination::Stdout) {
        OutputMode::Human => println!("{file}"),
        OutputMode::Json => {
            write_json_line(
                &mut io::stdout().lock(),
                &json!({ "name": args.name, "file": file }),
            )?;
        }
    }
    Ok(0)
}

// ---------------------------------------------------------------------------
// output helpers
// ---------------------------------------------------------------------------

fn write_json_line<W: Write + ?Sized>(out: &mut W, payload: &Value) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, payload)?;
    writeln!(out)?;
    Ok(())
}

fn output_mode(cli: &Cli, dest: Destination) -> OutputMode {
    let env_mode = std::env::var("DENDR_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), dest.is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
