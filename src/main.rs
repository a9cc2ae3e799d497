//! sizetree - live, cancellable directory size tree.
//!
//! Usage:
//!   sizetree scan [PATH]            Scan and print the largest entries
//!   sizetree search TEXT [PATH]     Find entries by name
//!   sizetree export [PATH]          Export the scanned tree
//!   sizetree --help                 Show help

use std::cmp::Reverse;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use itertools::Itertools;
use serde_json::{Value, json};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sizetree_scan::{
    Completeness, Engine, FsEntry, JobHandle, ScanConfig, ScanEvent, ScanMode, ScanProgress,
    SearchQuery,
};

#[derive(Parser)]
#[command(
    name = "sizetree",
    version,
    about = "Live, cancellable directory size tree",
    long_about = "sizetree walks a directory tree on a pool of workers and reports \
                  folder sizes as they grow. Names can be searched while parts of \
                  the tree are still unscanned."
)]
struct Cli {
    /// JSON settings file; command line flags override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory and show the largest entries
    Scan {
        #[command(flatten)]
        scan: ScanArgs,

        /// Maximum depth to display
        #[arg(short, long, default_value = "3")]
        depth: u32,

        /// Show all entries (no depth limit on display)
        #[arg(short, long)]
        all: bool,

        /// Number of top entries to show per directory
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,

        /// Print progress to stderr while scanning
        #[arg(long)]
        progress: bool,
    },

    /// Search entry names
    Search {
        /// Text to look for (case-insensitive)
        text: String,

        #[command(flatten)]
        scan: ScanArgs,

        /// Match at the start of names only
        #[arg(long)]
        prefix: bool,

        /// List unscanned directories as needed instead of searching the known tree
        #[arg(short, long)]
        exhaustive: bool,

        /// Restrict the search to this directory
        #[arg(short, long)]
        within: Option<PathBuf>,
    },

    /// Export the scanned tree
    Export {
        #[command(flatten)]
        scan: ScanArgs,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Flags shared by every command that starts a scan.
#[derive(Args)]
struct ScanArgs {
    /// Path to scan
    #[arg(default_value = ".")]
    path: PathBuf,

    /// How far the initial traversal reaches
    #[arg(short, long)]
    mode: Option<ModeArg>,

    /// Count directories first so progress can be shown as a percentage
    #[arg(long)]
    precount: bool,

    /// Number of worker threads (0 = auto)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Skip entries matching this glob (repeatable)
    #[arg(short, long = "ignore")]
    ignore: Vec<String>,

    /// Skip hidden entries
    #[arg(long)]
    no_hidden: bool,

    /// Do not descend into symlinked directories
    #[arg(long)]
    no_follow: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Full,
    Shallow,
    OnDemand,
}

impl From<ModeArg> for ScanMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => ScanMode::Full,
            ModeArg::Shallow => ScanMode::Shallow,
            ModeArg::OnDemand => ScanMode::OnDemand,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum ExportFormat {
    #[default]
    Json,
    Paths,
}

impl ScanArgs {
    /// Apply these flags on top of the settings file (or the defaults).
    fn to_config(&self, settings: Option<&Path>) -> Result<ScanConfig> {
        let mut config = match settings {
            Some(file) => {
                let text = fs::read_to_string(file)
                    .wrap_err_with(|| format!("Failed to read settings {}", file.display()))?;
                serde_json::from_str::<ScanConfig>(&text)
                    .wrap_err_with(|| format!("Invalid settings {}", file.display()))?
                    .with_root(&self.path)
            }
            None => ScanConfig::new(&self.path),
        };

        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        config.precount |= self.precount;
        config.include_hidden &= !self.no_hidden;
        config.follow_symlinks &= !self.no_follow;
        config.ignore_patterns.extend(self.ignore.iter().cloned());
        Ok(config)
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sizetree=warn")),
        )
        .init();

    let cli = Cli::parse();
    let settings = cli.config.as_deref();

    match cli.command {
        Command::Scan {
            scan,
            depth,
            all,
            top,
            progress,
        } => {
            let config = scan.to_config(settings)?;
            run_scan(config, if all { None } else { Some(depth) }, top, progress)?;
        }
        Command::Search {
            text,
            scan,
            prefix,
            exhaustive,
            within,
        } => {
            let mut query = SearchQuery::new(text);
            if prefix {
                query = query.prefix();
            }
            if exhaustive {
                query = query.exhaustive();
            }
            if let Some(scope) = within {
                query = query.within(scope);
            }
            run_search(scan.to_config(settings)?, query)?;
        }
        Command::Export {
            scan,
            format,
            output,
        } => {
            run_export(scan.to_config(settings)?, format, output)?;
        }
    }

    Ok(())
}

/// Start a job and block until its initial traversal is over.
fn run_job(engine: &Engine, config: ScanConfig, show_progress: bool) -> Result<JobHandle> {
    debug!(?config, "starting scan");
    let mut handle = engine.start_job(config).context("Scan failed")?;
    eprintln!("Scanning {}...", handle.root().display());

    if show_progress {
        if let Some(mut events) = handle.take_events() {
            while let Some(event) = events.blocking_recv() {
                match event {
                    ScanEvent::Progress(progress) => print_progress(&progress),
                    event if event.is_terminal() => break,
                    _ => {}
                }
            }
            eprintln!();
        }
    }

    engine.wait(&handle).context("Scan failed")?;
    Ok(handle)
}

/// Run a scan and display the tree.
fn run_scan(config: ScanConfig, max_depth: Option<u32>, top_n: usize, show_progress: bool) -> Result<()> {
    let engine = Engine::new();
    let handle = run_job(&engine, config, show_progress)?;
    let root = engine
        .snapshot(handle.root())
        .ok_or_else(|| color_eyre::eyre::eyre!("Scan produced no root entry"))?;
    let progress = engine.progress().unwrap_or_default();

    // Print summary
    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {}", root.path.display(), format_entry_size(&root));
    println!(
        " {} files, {} directories listed",
        progress.files_seen, progress.dirs_listed
    );
    println!(" Scanned in {:.2}s", progress.elapsed.as_secs_f64());
    println!("{}", "─".repeat(60));
    println!();

    print_node(&engine, &root, 0, max_depth.unwrap_or(u32::MAX), top_n, root.size_bytes);

    if progress.errors > 0 {
        println!();
        println!("{} entr(ies) could not be read", progress.errors);
    }

    Ok(())
}

/// Run a search and print hits as they arrive.
fn run_search(config: ScanConfig, query: SearchQuery) -> Result<()> {
    let engine = Engine::new();
    let exhaustive = query.completeness == Completeness::Exhaustive;

    // A known-only search answers from whatever the scan found, so let it
    // finish first; an exhaustive one lists what it needs by itself.
    let handle = if exhaustive {
        debug!(?config, "starting scan");
        engine.start_job(config).context("Scan failed")?
    } else {
        run_job(&engine, config, false)?
    };

    let mut hits = engine.search(query).context("Search failed")?;
    let mut count = 0usize;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while let Some(hit) = hits.blocking_recv() {
        count += 1;
        writeln!(
            out,
            "{:>10}  {}{}",
            format_size(hit.size_bytes),
            hit.path.display(),
            if hit.kind.is_dir() { "/" } else { "" }
        )?;
    }

    engine.cancel(&handle);
    eprintln!("{count} match(es)");
    Ok(())
}

/// Export the scanned tree.
fn run_export(config: ScanConfig, format: ExportFormat, output: Option<PathBuf>) -> Result<()> {
    let engine = Engine::new();
    let handle = run_job(&engine, config, false)?;
    let root = engine
        .snapshot(handle.root())
        .ok_or_else(|| color_eyre::eyre::eyre!("Scan produced no root entry"))?;

    let text = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&entry_json(&engine, &root))?,
        ExportFormat::Paths => {
            let mut lines = Vec::new();
            collect_paths(&engine, &root, &mut lines);
            lines.join("\n") + "\n"
        }
    };

    match output {
        Some(output_path) => {
            fs::write(&output_path, text)
                .wrap_err_with(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            print!("{text}");
        }
    }

    Ok(())
}

/// Nested JSON for an entry and everything known below it.
fn entry_json(engine: &Engine, entry: &FsEntry) -> Value {
    let children: Vec<Value> = sorted_children(engine, &entry.path)
        .iter()
        .map(|child| entry_json(engine, child))
        .collect();
    json!({
        "path": entry.path,
        "name": entry.name,
        "kind": entry.kind,
        "size_bytes": entry.size_bytes,
        "scan_complete": entry.scan_complete,
        "error": entry.error,
        "children": children,
    })
}

/// One `size<TAB>path` line per entry, depth first.
fn collect_paths(engine: &Engine, entry: &FsEntry, lines: &mut Vec<String>) {
    lines.push(format!("{}\t{}", entry.size_bytes, entry.path.display()));
    for child in sorted_children(engine, &entry.path) {
        collect_paths(engine, &child, lines);
    }
}

/// Known children, largest first.
fn sorted_children(engine: &Engine, path: &Path) -> Vec<FsEntry> {
    engine
        .children(path)
        .into_iter()
        .sorted_by_key(|c| (Reverse(c.size_bytes), c.name.clone()))
        .collect()
}

/// Print a node and its children.
fn print_node(
    engine: &Engine,
    node: &FsEntry,
    depth: u32,
    max_depth: u32,
    top_n: usize,
    root_size: u64,
) {
    let indent = "  ".repeat(depth as usize);
    let ratio = if root_size > 0 {
        node.size_bytes as f64 / root_size as f64 * 100.0
    } else {
        0.0
    };

    let bar = make_bar(ratio / 100.0, 10);

    let name = if depth == 0 {
        node.path.display().to_string()
    } else {
        node.name.to_string()
    };

    let dir_marker = if node.is_dir() { "/" } else { "" };

    println!(
        "{}{}{:<40} {:>11} {:>5.1}% {}",
        indent,
        if node.is_dir() { "▼ " } else { "  " },
        truncate(&format!("{}{}", name, dir_marker), 40),
        format_entry_size(node),
        ratio,
        bar
    );

    if let Some(error) = &node.error {
        println!("{}    ! {}", indent, error);
    }

    if node.is_dir() && depth < max_depth {
        let children = sorted_children(engine, &node.path);
        let remaining = children.len().saturating_sub(top_n);

        for child in children.iter().take(top_n) {
            print_node(engine, child, depth + 1, max_depth, top_n, root_size);
        }

        if remaining > 0 {
            let indent = "  ".repeat((depth + 1) as usize);
            println!("{}  ... and {} more", indent, remaining);
        }
    }
}

fn print_progress(progress: &ScanProgress) {
    let done = match progress.percentage() {
        Some(pct) => format!("{pct:>5.1}%"),
        None => format!("{} dirs", progress.dirs_listed),
    };
    eprint!(
        "\r {}  {} files  {}    ",
        done,
        progress.files_seen,
        format_size(progress.bytes_seen)
    );
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::DECIMAL)
}

/// Size of an entry, marked with `+` while it is still a lower bound.
fn format_entry_size(entry: &FsEntry) -> String {
    let size = format_size(entry.size_bytes);
    if entry.scan_complete {
        size
    } else {
        format!("{size}+")
    }
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 1).collect();
        format!("{kept}…")
    }
}
