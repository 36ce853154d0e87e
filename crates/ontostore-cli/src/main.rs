// crates/ontostore-cli/src/main.rs
// ============================================================================
// Module: Ontostore CLI Entry Point
// Description: Command dispatcher for DSN, cache, tag, and document tasks.
// Purpose: Give operators direct access to configured ontology resources.
// Dependencies: clap, ontostore-config, ontostore-core, ontostore-tags, tracing.
// ============================================================================

//! ## Overview
//! The `ontostore` binary loads `ontostore.toml`, installs a stderr log
//! subscriber, and runs one command against the configured resources.
//! Command results go to stdout; errors go to stderr with a failing exit code.
//! `dsn` commands work without a configuration file.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use ontostore_config::LoggingConfig;
use ontostore_config::OntostoreConfig;
use ontostore_config::TagsConfig;
use ontostore_core::CacheKey;
use ontostore_core::Outcome;
use ontostore_core::ResourceError;
use ontostore_core::dsn;
use ontostore_tags::Gid;
use ontostore_tags::Initialization;
use ontostore_tags::MissPolicy;
use ontostore_tags::Nid;
use ontostore_tags::SeedTable;
use ontostore_tags::TagCache;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "ontostore", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Configuration file; falls back to `ONTOSTORE_CONFIG`, then
    /// `ontostore.toml`.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// DSN parsing and normalization.
    Dsn {
        /// Selected DSN subcommand.
        #[command(subcommand)]
        command: DsnCommand,
    },
    /// Configured cache operations.
    Cache {
        /// Selected cache subcommand.
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Tag cache operations.
    Tags {
        /// Selected tags subcommand.
        #[command(subcommand)]
        command: TagsCommand,
    },
    /// Configured document store operations.
    Documents {
        /// Selected documents subcommand.
        #[command(subcommand)]
        command: DocumentsCommand,
    },
}

/// DSN subcommands.
#[derive(Subcommand, Debug)]
enum DsnCommand {
    /// Print the parameters a DSN parses to, as JSON.
    Parse {
        /// DSN to parse.
        dsn: String,
    },
    /// Print the canonical form of a DSN.
    Normalize {
        /// DSN to normalize.
        dsn: String,
    },
}

/// Cache subcommands.
#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Print backend statistics as JSON.
    Stats,
    /// Remove every entry from the cache.
    Flush,
    /// Print the value stored under a key.
    Get {
        /// Key to look up.
        key: String,
        /// Treat the key as an integer key.
        #[arg(long, action = ArgAction::SetTrue)]
        integer: bool,
    },
}

/// Tags subcommands.
#[derive(Subcommand, Debug)]
enum TagsCommand {
    /// Seed the tag cache if it is empty.
    Init,
    /// Print the native identifier of a global identifier.
    Id {
        /// Global identifier.
        gid: String,
    },
    /// Print the tag record stored under a native identifier.
    Object {
        /// Native identifier.
        nid: i64,
    },
}

/// Documents subcommands.
#[derive(Subcommand, Debug)]
enum DocumentsCommand {
    /// Print statistics for each configured tier as JSON.
    Stats,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for operator-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("ontostore {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let output = match command {
        Commands::Dsn {
            command,
        } => {
            init_logging(&LoggingConfig::default())?;
            command_dsn(&command)?
        }
        command => {
            let config = load_config(cli.config.as_deref())?;
            init_logging(&config.logging)?;
            debug!("configuration loaded");
            execute(&config, &command)?
        }
    };
    write_stdout_line(&output).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Runs a command that needs configuration and returns its output.
fn execute(config: &OntostoreConfig, command: &Commands) -> CliResult<String> {
    match command {
        Commands::Dsn {
            command,
        } => command_dsn(command),
        Commands::Cache {
            command,
        } => command_cache(config, command),
        Commands::Tags {
            command,
        } => command_tags(config, command),
        Commands::Documents {
            command,
        } => command_documents(config, command),
    }
}

/// Loads configuration from the explicit path or the default locations.
fn load_config(path: Option<&Path>) -> CliResult<OntostoreConfig> {
    OntostoreConfig::load(path).map_err(|err| CliError::new(format!("failed to load configuration: {err}")))
}

/// Installs the stderr log subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
fn init_logging(logging: &LoggingConfig) -> CliResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.filter)
            .map_err(|err| CliError::new(format!("invalid log filter {}: {err}", logging.filter)))?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| CliError::new(format!("failed to install logging: {err}")))
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    let help = command.render_help().to_string();
    write_stdout_line(help.trim_end()).map_err(|err| CliError::new(output_error("stdout", &err)))
}

// ============================================================================
// SECTION: DSN Commands
// ============================================================================

/// Executes a `dsn` subcommand.
fn command_dsn(command: &DsnCommand) -> CliResult<String> {
    match command {
        DsnCommand::Parse {
            dsn,
        } => {
            let params = dsn::parse(dsn).map_err(|err| CliError::new(err.to_string()))?;
            render_json(&params)
        }
        DsnCommand::Normalize {
            dsn,
        } => {
            let params = dsn::parse(dsn).map_err(|err| CliError::new(err.to_string()))?;
            Ok(dsn::build(&params))
        }
    }
}

// ============================================================================
// SECTION: Cache Commands
// ============================================================================

/// Executes a `cache` subcommand against the configured cache.
fn command_cache(config: &OntostoreConfig, command: &CacheCommand) -> CliResult<String> {
    let cache = config.cache.resource().map_err(|err| CliError::new(err.to_string()))?;
    match command {
        CacheCommand::Stats => {
            let stats = cache.stats().map_err(|err| CliError::new(format!("cache stats failed: {err}")))?;
            render_json(&stats)
        }
        CacheCommand::Flush => {
            cache.flush().map_err(|err| CliError::new(format!("cache flush failed: {err}")))?;
            Ok("cache flushed".to_string())
        }
        CacheCommand::Get {
            key,
            integer,
        } => {
            let key = cache_key(key, *integer)?;
            match cache.get(&key) {
                Outcome::Success(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
                Outcome::NotFound => Err(CliError::new(format!("key {key} not found"))),
                Outcome::Failure(err) => Err(CliError::new(format!("cache get failed: {err}"))),
            }
        }
    }
}

/// Builds the cache key named on the command line.
fn cache_key(key: &str, integer: bool) -> CliResult<CacheKey> {
    if !integer {
        return Ok(CacheKey::from(key));
    }
    key.parse::<i64>()
        .map(CacheKey::Integer)
        .map_err(|err| CliError::new(format!("invalid integer key {key}: {err}")))
}

// ============================================================================
// SECTION: Tags Commands
// ============================================================================

/// Executes a `tags` subcommand against the configured cache.
fn command_tags(config: &OntostoreConfig, command: &TagsCommand) -> CliResult<String> {
    let cache = config.cache.resource().map_err(|err| CliError::new(err.to_string()))?;
    let seeds = seed_table(&config.tags)?;
    let tags = TagCache::new(cache, &seeds).map_err(|err| CliError::new(format!("tag cache failed: {err}")))?;
    match command {
        TagsCommand::Init => Ok(match tags.initialization() {
            Initialization::Seeded {
                tags: count,
            } => format!("seeded {count} tags (seed version {})", seeds.version),
            Initialization::Warm => "tag cache already initialized".to_string(),
        }),
        TagsCommand::Id {
            gid,
        } => {
            let nid = tags
                .get_tag_id(&Gid::from(gid.as_str()), MissPolicy::Reject)
                .map_err(|err| CliError::new(err.to_string()))?;
            nid.map(|nid| nid.to_string()).ok_or_else(|| CliError::new(format!("unknown tag identifier: {gid}")))
        }
        TagsCommand::Object {
            nid,
        } => {
            let record = tags
                .get_tag_object(Nid::new(*nid), MissPolicy::Reject)
                .map_err(|err| CliError::new(err.to_string()))?
                .ok_or_else(|| CliError::new(format!("unknown tag identifier: {nid}")))?;
            render_json(&record)
        }
    }
}

/// Returns the configured seed table, or the built-in one.
fn seed_table(tags: &TagsConfig) -> CliResult<SeedTable> {
    let seeds = match &tags.seed_path {
        Some(path) => SeedTable::load(path),
        None => SeedTable::builtin(),
    };
    seeds.map_err(|err| CliError::new(err.to_string()))
}

// ============================================================================
// SECTION: Documents Commands
// ============================================================================

/// Executes a `documents` subcommand against the configured store.
fn command_documents(config: &OntostoreConfig, command: &DocumentsCommand) -> CliResult<String> {
    match command {
        DocumentsCommand::Stats => {
            let tiers = config.documents.tiers().map_err(|err| CliError::new(err.to_string()))?;
            let mut report = Map::new();
            report.insert("server".to_string(), tiers.server.stats().map_err(stats_error)?);
            if let Some(database) = &tiers.database {
                report.insert("database".to_string(), database.stats().map_err(stats_error)?);
            }
            if let Some(collection) = &tiers.collection {
                report.insert("collection".to_string(), collection.stats().map_err(stats_error)?);
            }
            render_json(&Value::Object(report))
        }
    }
}

/// Wraps a document statistics failure.
fn stats_error(err: ResourceError) -> CliError {
    CliError::new(format!("document stats failed: {err}"))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Renders a value as pretty JSON.
fn render_json<T: Serialize + ?Sized>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value).map_err(|err| CliError::new(format!("failed to render json: {err}")))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
