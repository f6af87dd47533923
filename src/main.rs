//! Binary entry point for auditlog.
//!
//! A thin CLI over the configured storage backend: create the schema,
//! record entries, and page through or filter them.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use anyhow::Result;
use auditlog::observability::{self, LoggingConfig};
use auditlog::{AuditConfig, Registry};
use clap::{Parser, Subcommand};
use commands::{Output, RecordArgs};
use std::path::Path;
use std::process::ExitCode;

/// auditlog - store and query immutable audit-log entries.
#[derive(Parser)]
#[command(name = "auditlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "AUDITLOG_CONFIG_PATH")]
    config: Option<String>,

    /// Print entries as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the storage schema.
    Setup,

    /// Record an entry.
    Record {
        /// Entry type (e.g. `user.login`).
        #[arg(short = 't', long = "type")]
        entry_type: String,

        /// Level name or integer.
        #[arg(short, long, default_value = "info")]
        level: String,

        /// Explicit identifier (UUID).
        #[arg(long)]
        id: Option<String>,

        /// When the event occurred (RFC 3339); defaults to now.
        #[arg(long)]
        timestamp: Option<String>,

        /// Acting subject (JSON or plain string).
        #[arg(short, long)]
        user: Option<String>,

        /// Affected object (JSON or plain string).
        #[arg(short, long)]
        object: Option<String>,

        /// Content type key of the affected object (`namespace.Name`).
        #[arg(long)]
        content_type: Option<String>,

        /// Payload as a JSON object.
        #[arg(short, long)]
        data: Option<String>,

        /// Extra payload field as KEY=VALUE (repeatable).
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },

    /// Show one entry.
    Show {
        /// Entry identifier.
        id: String,
    },

    /// List entries, newest first.
    List {
        /// Only entries of this type.
        #[arg(short = 't', long = "type")]
        entry_type: Option<String>,

        /// Page size (defaults to the configured page size).
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Entries to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// List entries matching every `--where` clause.
    Filter {
        /// Filter as NAME=V1,V2 (values are OR-ed, clauses AND-ed).
        #[arg(short = 'w', long = "where", required = true)]
        clauses: Vec<String>,

        /// Page size (defaults to the configured page size).
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Matching entries to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Count entries matching every `--where` clause.
    Count {
        /// Filter as NAME=V1,V2; counts everything when omitted.
        #[arg(short = 'w', long = "where")]
        clauses: Vec<String>,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig::from_settings(&config.logging, cli.verbose);
    if let Err(e) = observability::init(logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: &AuditConfig) -> Result<()> {
    let registry = Registry::from_config(config)?;
    let output = Output { json: cli.json };
    let page = |limit: Option<usize>| limit.unwrap_or(config.page_size);

    match cli.command {
        Commands::Setup => commands::cmd_setup(&registry),
        Commands::Record {
            entry_type,
            level,
            id,
            timestamp,
            user,
            object,
            content_type,
            data,
            fields,
        } => commands::cmd_record(
            &registry,
            RecordArgs {
                entry_type,
                level,
                id,
                timestamp,
                user,
                object,
                content_type,
                data,
                fields,
            },
        ),
        Commands::Show { id } => commands::cmd_show(&registry, &id, output),
        Commands::List {
            entry_type,
            limit,
            offset,
        } => commands::cmd_list(&registry, entry_type.as_deref(), page(limit), offset, output),
        Commands::Filter {
            clauses,
            limit,
            offset,
        } => commands::cmd_filter(&registry, &clauses, page(limit), offset, output),
        Commands::Count { clauses } => commands::cmd_count(&registry, &clauses),
    }
}

/// Loads configuration from `path` or the default location, then applies
/// environment overrides.
///
/// Starts from [`AuditConfig::cli_default`], so entries land in the `SQLite`
/// file unless another backend is configured.
fn load_config(path: Option<&str>) -> Result<AuditConfig> {
    let base = AuditConfig::cli_default();
    let config = match path.filter(|p| !p.trim().is_empty()) {
        Some(path) => base.merge_file(Path::new(path))?,
        None => base.merge_default_file(),
    };
    Ok(config.apply_env_overrides()?)
}
