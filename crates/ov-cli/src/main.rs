//! CLI entry point for package source overrides.
//!
//! This binary drives the override engine outside a dev server: it prints
//! the indexes a project would get, answers single resolution requests, and
//! runs the watcher and invalidation engine against a logging host.
//!
//! # Usage
//!
//! ```bash
//! ov-dev [OPTIONS] <COMMAND>
//!
//! # Show targets and overrides
//! ov-dev scan --root ./my-app
//!
//! # Ask where an import from inside a target would resolve
//! ov-dev resolve ./Sidebar --importer node_modules/@acme/admin-ui/src/layout/Shell.tsx
//!
//! # Watch the override roots until Ctrl-C
//! ov-dev watch
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use ov_core::{Config, DEFAULT_CONFIG_FILE};
use ov_engine::{
    FsResolver, HostResolver, MemoryGraph, OverridePlugin, ReloadLog, ReloadSink, TransformRegistry,
};
use ov_scanner::{Conflict, OverrideIndex, ScanOutcome, Scanner};
use ov_watcher::FileWatcher;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Replace files inside installed packages with local overrides.
#[derive(Parser)]
#[command(name = "ov-dev", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Project root (where `node_modules` and the override roots live).
    #[arg(short, long, global = true, env = "OV_ROOT", default_value = ".")]
    root: Utf8PathBuf,

    /// Configuration file.
    ///
    /// Defaults to `ov.config.json` in the project root; a missing default
    /// file means the built-in defaults.
    #[arg(short, long, global = true, env = "OV_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Scan targets and override roots and print the resulting indexes.
    Scan {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Resolve one specifier as the dev server would.
    Resolve {
        /// The imported specifier, e.g. `./Sidebar` or `@acme/admin-ui`.
        specifier: String,

        /// The importing file.
        #[arg(short, long)]
        importer: Utf8PathBuf,
    },

    /// Watch the override roots and log invalidations until interrupted.
    Watch,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if verbose output was requested, or `info` level by default.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads the configuration and resolves the project root.
///
/// # Errors
///
/// Returns an error if the root is not a directory, an explicitly given
/// config file is missing, or the config cannot be parsed.
fn load_config(cli: &Cli) -> color_eyre::Result<(Config, Utf8PathBuf)> {
    if !cli.root.is_dir() {
        return Err(color_eyre::eyre::eyre!("Project root is not a directory: {}", cli.root));
    }
    let root = cli.root.canonicalize_utf8()?;

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let path = root.join(DEFAULT_CONFIG_FILE);
            if path.is_file() {
                Config::load(&path)?
            } else {
                Config::default()
            }
        }
    };
    Ok((config, root))
}

/// Activates the plugin with the filesystem resolver.
///
/// Transforms are registered by the embedding host, so patch declarations
/// cannot run here and are dropped.
fn activate(mut config: Config, root: &Utf8Path) -> color_eyre::Result<OverridePlugin> {
    if !config.patches.is_empty() {
        warn!(
            patches = config.patches.len(),
            "Patch transforms are provided by the host; ignoring patch declarations"
        );
        config.patches.clear();
    }
    let resolver = FsResolver::new(&config.extensions);
    Ok(OverridePlugin::activate(
        config,
        root,
        &TransformRegistry::new(),
        Arc::new(resolver),
    )?)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// JSON shape of the `scan` command.
#[derive(Serialize)]
struct ScanReport<'a> {
    targets: Vec<TargetReport<'a>>,
    overrides: &'a OverrideIndex,
    conflicts: &'a [Conflict],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetReport<'a> {
    package: &'a str,
    package_root: &'a Utf8Path,
    source_root: &'a Utf8Path,
    alias: &'a str,
    files: usize,
}

impl<'a> ScanReport<'a> {
    fn new(outcome: &'a ScanOutcome) -> Self {
        let targets = outcome
            .targets
            .iter()
            .map(|target| TargetReport {
                package: &target.package,
                package_root: &target.package_root,
                source_root: &target.source_root,
                alias: &target.alias,
                files: outcome
                    .target_indexes
                    .for_package(&target.package)
                    .map_or(0, |index| index.all_files.len()),
            })
            .collect();
        Self {
            targets,
            overrides: &outcome.overrides,
            conflicts: &outcome.conflicts,
        }
    }
}

/// Runs a one-shot scan and prints the indexes.
///
/// # Errors
///
/// Returns an error on a conflict under the `error` policy or if writing fails.
fn run_scan(config: Config, root: &Utf8Path, json: bool) -> color_eyre::Result<()> {
    info!(root = %root, "Starting scan");
    let outcome = Scanner::new(config, root).scan()?;
    let report = ScanReport::new(&outcome);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    writeln!(out, "Targets ({}):", report.targets.len())?;
    for target in &report.targets {
        writeln!(
            out,
            "  {} ({} files, alias {})\n    {}",
            target.package, target.files, target.alias, target.source_root
        )?;
    }

    writeln!(out)?;
    writeln!(out, "Flat overrides ({}):", outcome.overrides.flat.len())?;
    for (key, path) in &outcome.overrides.flat {
        writeln!(out, "  {key:<24} {path}")?;
    }

    if !outcome.overrides.namespaced.is_empty() {
        writeln!(out)?;
        writeln!(out, "Namespaced overrides:")?;
        for (package, map) in &outcome.overrides.namespaced {
            writeln!(out, "  {package} ({}):", map.len())?;
            for (key, path) in map {
                writeln!(out, "    {key:<22} {path}")?;
            }
        }
    }

    if !outcome.conflicts.is_empty() {
        writeln!(out)?;
        writeln!(out, "Conflicts ({}):", outcome.conflicts.len())?;
        for conflict in &outcome.conflicts {
            writeln!(
                out,
                "  {} in {} (using {})",
                conflict.key,
                conflict.targets.join(", "),
                conflict.selected().unwrap_or("-")
            )?;
        }
    }

    Ok(())
}

/// Resolves one specifier and prints where it goes.
///
/// # Errors
///
/// Returns an error if activation or writing fails.
async fn run_resolve(
    config: Config,
    root: &Utf8Path,
    specifier: &str,
    importer: &Utf8Path,
) -> color_eyre::Result<()> {
    let importer = if importer.is_absolute() {
        importer.to_owned()
    } else {
        root.join(importer)
    };
    let importer = importer.canonicalize_utf8().unwrap_or(importer);

    let fallback = FsResolver::new(&config.extensions);
    let plugin = activate(config, root)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if let Some(resolution) = plugin.resolve_id(specifier, Some(&importer)).await {
        writeln!(out, "{specifier} -> {}", resolution.path)?;
        writeln!(out, "  {}", serde_json::to_string(&resolution.reason)?)?;
        return Ok(());
    }

    match fallback.resolve(specifier, &importer).await {
        Some(path) => writeln!(out, "{specifier} -> {path} (not redirected)")?,
        None => writeln!(out, "{specifier}: unresolved")?,
    }
    Ok(())
}

/// Runs the watcher and invalidation engine until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if activation or the watcher fails.
async fn run_watch(config: Config, root: &Utf8Path) -> color_eyre::Result<()> {
    let plugin = activate(config, root)?;
    let roots = plugin.watch_roots();
    info!(roots = roots.len(), "Starting override watcher");

    let mut watcher = FileWatcher::new(&roots, plugin.watch_config(), plugin.watch_filter()).await?;
    let events = watcher
        .take_receiver()
        .ok_or_else(|| color_eyre::eyre::eyre!("Watcher event stream unavailable"))?;

    let graph = Arc::new(MemoryGraph::new());
    let reloads = Arc::new(ReloadLog::new());
    let sink = Arc::clone(&reloads) as Arc<dyn ReloadSink>;
    let engine = tokio::spawn(plugin.engine(graph, sink).run(events));

    // Handle SIGTERM for graceful shutdown on Unix
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!("Shutting down file watcher");
    watcher.shutdown().await?;
    let report = engine.await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(
        out,
        "{} events, {} recomputations, {} reloads",
        report.events, report.recomputations, report.reloads
    )?;
    for reason in reloads.reasons() {
        writeln!(out, "  reload: {reason}")?;
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Load configuration (its `debug` flag feeds the log level)
    let (config, root) = load_config(&cli)?;

    // 4. Initialize tracing
    init_tracing(cli.verbose || config.debug, cli.no_color);

    // 5. Route to appropriate command
    match &cli.command {
        Commands::Scan { json } => run_scan(config, &root, *json),
        Commands::Resolve {
            specifier,
            importer,
        } => run_resolve(config, &root, specifier, importer).await,
        Commands::Watch => run_watch(config, &root).await,
    }
}
