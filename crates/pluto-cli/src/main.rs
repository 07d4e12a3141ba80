//! Command-line interface for the MapPLUTO release pipeline.
//!
//! This binary wraps the [`pluto_core`] pipeline around a folder-backed
//! [`pluto_fgdb::FolderStore`]: it parses arguments, configures logging, and
//! delegates to command handlers.
//!
//! # Available Commands
//!
//! - `run` - Materialize, join, clip and publish one release
//! - `schema` - Display a schema resource as a table
//! - `reconcile` - Reconcile an extract's header and print its `schema.ini`

mod display;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{Level, debug, error, info};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use pluto_core::config::{Config, PipelineConfig};
use pluto_core::extract::RawExtract;
use pluto_core::pipeline::Pipeline;
use pluto_core::reconcile::{UnregisteredPolicy, reconcile};
use pluto_core::schema::SchemaSource;
use pluto_core::store::GeometryStore;
use pluto_core::types::{Borough, ReleaseVariant, RunDate, RunParameters};
use pluto_fgdb::FolderStore;

#[derive(Parser)]
#[command(
    name = "pluto",
    version,
    about = "Schema-driven MapPLUTO materialization, parcel join and shoreline clipping",
    long_about = "pluto turns the PLUTO tax lot extract into the MapPLUTO release:\n\
                  a typed attribute table joined onto parcel geometry, clipped to the\n\
                  shoreline and published under canonical names."
)]
/// Command-line arguments and options for the `pluto` CLI.
///
/// This struct defines the top-level CLI interface, including global flags for
/// logging verbosity and the subcommand to execute.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `pluto` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Runs the full release pipeline for one release.
    ///
    /// Stages run in order and the run stops at the first failure. A failed
    /// run appends its error report to the configured log file.
    Run {
        /// Path to the TOML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Release version, e.g. `19v2`.
        #[arg(short, long, value_name = "VERSION")]
        release: String,

        /// Release workflow: `original` or `corrected`.
        #[arg(long, default_value = "original")]
        variant: ReleaseVariant,

        /// Borough subset: `all`, `manhattan`, `bronx`, `brooklyn`, `queens` or `staten-island`.
        #[arg(long, default_value = "all")]
        borough: Borough,

        /// Date stamped into artifact names (`MM_DD_YYYY`), today when omitted.
        #[arg(long, value_name = "MM_DD_YYYY")]
        date: Option<String>,

        /// Dissolve the parcel geometry by key before joining.
        #[arg(long)]
        dissolve: bool,

        /// Rebuild a release that was already published.
        #[arg(long)]
        force: bool,
    },

    /// Displays a schema resource as a table.
    Schema {
        /// Path to a JSON schema; the built-in MapPLUTO schema when omitted.
        #[arg(short, long, value_name = "FILE")]
        path: Option<PathBuf>,
    },

    /// Reconciles an extract's header against a schema without touching any store.
    Reconcile {
        /// Path to the raw CSV extract.
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to a JSON schema; the built-in MapPLUTO schema when omitted.
        #[arg(short, long, value_name = "FILE")]
        schema: Option<PathBuf>,

        /// Fail on columns the schema does not declare instead of keeping them as text.
        #[arg(long)]
        reject_unregistered: bool,
    },
}

/// Entry point for the `pluto` command-line interface.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            config,
            release,
            variant,
            borough,
            date,
            dissolve,
            force,
        } => {
            let date = match date {
                Some(text) => RunDate::parse(&text)?,
                None => RunDate::today(),
            };
            let params = RunParameters {
                release,
                variant,
                borough,
                date,
                dissolve,
                force,
            };
            info!("Running {} {} from {}", params.release, params.variant, config.display());
            handle_run(&config, params)?;
        },
        Commands::Schema { path } => {
            handle_schema(path)?;
        },
        Commands::Reconcile {
            input,
            schema,
            reject_unregistered,
        } => {
            info!("Reconciling {}", input.display());
            handle_reconcile(&input, schema, reject_unregistered)?;
        },
    }

    Ok(())
}

fn handle_run(config_path: &Path, params: RunParameters) -> Result<()> {
    let config = Config::load(config_path)?;
    let paths = config.resolve(&params)?;
    let log_path = paths.log_path.clone();

    let mut store = FolderStore::new();
    let report = Pipeline::new(&mut store, params, paths, config.pipeline).run();
    display::display_run_report(&report);

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let Some(block) = report.failure_block(&timestamp, &store.diagnostics()) else {
        return Ok(());
    };

    eprint!("{block}");
    append_log(&log_path, &block)?;
    match &report.error {
        Some((stage, err)) => {
            error!("Run failed at stage {}: {}", stage, err);
            Err(anyhow!("MapPLUTO run failed at stage '{stage}': {}", err.user_message()))
        },
        None => Ok(()),
    }
}

/// Append a failure block to the flat log, creating it when absent.
fn append_log(path: &Path, block: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    file.write_all(block.as_bytes())
        .with_context(|| format!("Failed to write log file {}", path.display()))?;
    debug!("Appended failure report to {}", path.display());
    Ok(())
}

fn schema_source(path: Option<PathBuf>) -> SchemaSource {
    path.map_or(SchemaSource::Embedded, SchemaSource::File)
}

fn handle_schema(path: Option<PathBuf>) -> Result<()> {
    let registry = schema_source(path).load()?;
    display::display_schema(&registry);
    Ok(())
}

fn handle_reconcile(input: &Path, schema: Option<PathBuf>, reject_unregistered: bool) -> Result<()> {
    let registry = schema_source(schema).load()?;
    let raw = RawExtract::read(input, b',')?;
    let policy = if reject_unregistered {
        UnregisteredPolicy::Reject
    } else {
        UnregisteredPolicy::PassThrough
    };

    let fields = reconcile(raw.header(), &registry, &PipelineConfig::default().exclusions, policy)?;
    let csv_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("Input '{}' has no file name.", input.display()))?;
    display::display_reconciled(&fields, &fields.render_schema_ini(&csv_name));
    Ok(())
}
