//! logtree CLI
//!
//! Thin wrapper around logtree-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Run producers, then show the last 20 warnings and errors they logged
//! logtree demo --workers 4 --dn demo --children --backlog 20 --min-severity W
//!
//! # Keep streaming for 5 seconds after the backlog
//! logtree demo --stream-secs 5 --dn demo --children
//!
//! # Import JSON-line entries and query them
//! logtree query entries.jsonl --dn net --children --only-leveled --json
//!
//! # Validate a DN
//! logtree dn net.dhcp.client
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use logtree_core::{
    Backlog, Dn, JournalConfig, LogEntry, LogReader, LogTree, LogTreeLayer, ReadOptions, Severity,
    StreamFiltering,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;

/// Target of the CLI's own diagnostics. Together with the layer root below,
/// they are recorded at `logtree.cli`.
const LOG_TARGET: &str = "cli";
const LOG_ROOT: &str = "logtree";

/// logtree - hierarchical in-memory log journal
#[derive(Parser)]
#[command(name = "logtree")]
#[command(version)]
#[command(about = "Hierarchical in-memory log journal")]
#[command(
    long_about = "Stores log entries per Distinguished Name with bounded retention, and serves backlog and streaming queries over whole subtrees."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Journal configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log from concurrent producers, then query the result
    Demo {
        /// Number of producer tasks
        #[arg(short, long, default_value_t = 4)]
        workers: usize,

        /// Entries logged by each producer before the query
        #[arg(short, long, default_value_t = 100)]
        entries: usize,

        /// Keep producers running and stream matching entries for this long
        #[arg(long)]
        stream_secs: Option<u64>,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Import entries from a JSON-lines file, then query them
    Query {
        /// File with one JSON entry per line
        file: PathBuf,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Validate a DN and show its segments
    Dn {
        /// DN to check, eg. net.dhcp.client
        dn: String,
    },
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// DN to read at (empty for the root)
    #[arg(long, default_value = "")]
    dn: String,

    /// Include all DNs below --dn
    #[arg(long)]
    children: bool,

    /// Number of most recent entries to show, or "all"
    #[arg(long, default_value = "all", value_parser = parse_backlog)]
    backlog: Backlog,

    /// Only show raw entries
    #[arg(long)]
    only_raw: bool,

    /// Only show leveled entries
    #[arg(long)]
    only_leveled: bool,

    /// Only show leveled entries at this severity or above (I, W, E, F)
    #[arg(long, value_parser = parse_severity)]
    min_severity: Option<Severity>,

    /// Retention per DN, overriding the configuration
    #[arg(long)]
    quota: Option<u64>,

    /// Only stream entries matching the query
    #[arg(long)]
    filtered_streams: bool,

    /// Print entries as JSON lines
    #[arg(long)]
    json: bool,
}

impl QueryArgs {
    fn options(&self) -> ReadOptions {
        let mut opts = ReadOptions::new().with_backlog(self.backlog);
        if self.children {
            opts = opts.with_children();
        }
        if self.only_raw {
            opts = opts.only_raw();
        }
        if self.only_leveled {
            opts = opts.only_leveled();
        }
        if let Some(severity) = self.min_severity {
            opts = opts.min_severity(severity);
        }
        opts
    }

    fn apply_to(&self, config: &mut JournalConfig) {
        if let Some(quota) = self.quota {
            config.default_quota = quota;
        }
        if self.filtered_streams {
            config.stream_filtering = StreamFiltering::Filtered;
        }
    }
}

fn parse_backlog(s: &str) -> Result<Backlog, String> {
    if s.eq_ignore_ascii_case("all") {
        return Ok(Backlog::All);
    }
    s.parse::<usize>()
        .map(Backlog::Count)
        .map_err(|_| format!("expected a number or \"all\", got {s:?}"))
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    s.parse::<Severity>().map_err(|e| e.to_string())
}

fn setup_logging(verbosity: u8, tree: &LogTree) -> Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let root = Dn::new(LOG_ROOT)?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(LogTreeLayer::new(tree.clone(), root))
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>, query: Option<&QueryArgs>) -> Result<JournalConfig> {
    let mut config = match path {
        Some(path) => JournalConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => JournalConfig::default(),
    };
    if let Some(query) = query {
        query.apply_to(&mut config);
    }
    Ok(config)
}

fn print_entry(entry: &LogEntry, json: bool) -> Result<()> {
    if json {
        println!("{}", entry.to_json_line()?);
    } else {
        println!("{}", entry);
    }
    Ok(())
}

/// Severity for the `i`th demo message: mostly info, some warnings and errors.
fn demo_severity(i: usize) -> Severity {
    if i % 11 == 10 {
        Severity::Error
    } else if i % 7 == 6 {
        Severity::Warning
    } else {
        Severity::Info
    }
}

/// Log one demo message: every fifth is a raw line.
fn demo_emit(tree: &LogTree, worker: usize, i: usize) -> Result<()> {
    let dn = format!("demo.worker{}", worker);
    if i % 5 == 4 {
        tree.raw_for(&dn)?
            .emit_str(&format!("worker {} raw output line {}", worker, i));
    } else {
        tree.leveled_for(&dn)?
            .log(demo_severity(i), format!("worker {} message {}", worker, i));
    }
    Ok(())
}

async fn run_demo(
    tree: &LogTree,
    workers: usize,
    entries: usize,
    stream_secs: Option<u64>,
    query: &QueryArgs,
) -> Result<()> {
    info!(target: LOG_TARGET, workers, entries, "Starting producers");
    let producers: Vec<_> = (0..workers)
        .map(|w| {
            let tree = tree.clone();
            tokio::spawn(async move {
                for i in 0..entries {
                    demo_emit(&tree, w, i)?;
                    if i % 16 == 15 {
                        tokio::task::yield_now().await;
                    }
                }
                anyhow::Ok(())
            })
        })
        .collect();
    for p in producers {
        p.await.context("Producer task panicked")??;
    }

    let mut opts = query.options();
    if stream_secs.is_some() {
        opts = opts.with_stream();
    }
    let mut reader = tree.read(&query.dn, opts).context("Query failed")?;
    for entry in &reader.backlog {
        print_entry(entry, query.json)?;
    }

    let Some(secs) = stream_secs else {
        return Ok(());
    };

    let cancel = CancellationToken::new();
    let producers: Vec<_> = (0..workers)
        .map(|w| {
            let tree = tree.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(10));
                let mut i = entries;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            demo_emit(&tree, w, i)?;
                            i += 1;
                        }
                    }
                }
                anyhow::Ok(())
            })
        })
        .collect();

    let streamed = stream_for(&mut reader, Duration::from_secs(secs), query.json).await?;
    cancel.cancel();
    for p in producers {
        p.await.context("Producer task panicked")??;
    }
    reader.close();

    if !query.json {
        println!();
        println!("Streamed: {}", streamed);
        println!("Missed:   {}", reader.missed());
    }
    if reader.missed() > 0 {
        warn!(target: LOG_TARGET, missed = reader.missed(), "Stream fell behind");
    }
    Ok(())
}

/// Print streamed entries until the deadline passes. Returns how many were
/// printed.
async fn stream_for(reader: &mut LogReader, duration: Duration, json: bool) -> Result<u64> {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut streamed = 0;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            entry = reader.recv() => match entry {
                Some(entry) => {
                    print_entry(&entry, json)?;
                    streamed += 1;
                }
                None => break,
            },
        }
    }
    Ok(streamed)
}

fn run_query(tree: &LogTree, file: &Path, query: &QueryArgs) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match LogEntry::from_json_line(line) {
            Ok(entry) => {
                tree.publish(entry);
                imported += 1;
            }
            Err(e) => {
                eprintln!("{}:{}: skipping entry: {}", file.display(), n + 1, e);
                skipped += 1;
            }
        }
    }
    debug!(target: LOG_TARGET, imported, skipped, "Imported entries");

    let reader = tree.read(&query.dn, query.options()).context("Query failed")?;
    for entry in &reader.backlog {
        print_entry(entry, query.json)?;
    }
    Ok(())
}

fn run_dn(dn: &str) -> Result<()> {
    let parsed = Dn::new(dn).with_context(|| format!("Invalid DN {:?}", dn))?;
    if parsed.is_root() {
        println!("DN: (root)");
        println!("Segments: 0");
        return Ok(());
    }

    let path = parsed.path();
    println!("DN: {}", parsed);
    println!("Segments: {}", path.len());
    for (i, segment) in path.iter().enumerate() {
        println!("  {}: {}", i, segment);
    }
    match parsed.parent() {
        Some(parent) if parent.is_root() => println!("Parent: (root)"),
        Some(parent) => println!("Parent: {}", parent),
        None => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let query = match &cli.command {
        Commands::Demo { query, .. } | Commands::Query { query, .. } => Some(query),
        Commands::Dn { .. } => None,
    };
    let config = load_config(cli.config.as_deref(), query)?;
    let tree = LogTree::with_config(config);

    setup_logging(cli.verbose, &tree)?;

    match &cli.command {
        Commands::Demo {
            workers,
            entries,
            stream_secs,
            query,
        } => run_demo(&tree, *workers, *entries, *stream_secs, query).await?,
        Commands::Query { file, query } => run_query(&tree, file, query)?,
        Commands::Dn { dn } => run_dn(dn)?,
    }

    Ok(())
}
