//! Command-line probe for a model element store.
//!
//! # Responsibility
//! - Load configuration, open the configured store, and run one command.
//! - Print results and failures as JSON so output is scriptable.
//! - `health` always prints a report, even when the store cannot be opened.

use clap::{Parser, Subcommand};
use log::{info, warn};
use modelstore_core::{
    core_version, init_from_config, logging_status, ApiError, CreateElementInput, ElementFilter,
    ElementId, ErrorCode, HealthMonitor, HealthReport, ModelRepository, ModelStoreConfig,
    RepoError, SqliteVersionedStore,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "modelstore", version, about)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report store health
    Health,

    /// List elements in creation order
    List {
        #[arg(long, default_value_t = 0)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        size: i64,
        /// Case-insensitive match over reqId, name, and text
        #[arg(long)]
        keyword: Option<String>,
        /// Only list root-level elements
        #[arg(long, conflicts_with = "parent")]
        roots: bool,
        /// Only list children of this element
        #[arg(long)]
        parent: Option<ElementId>,
    },

    /// Show one element by id or reqId
    Show {
        #[arg(long, conflicts_with = "req_id", required_unless_present = "req_id")]
        id: Option<ElementId>,
        #[arg(long)]
        req_id: Option<String>,
    },

    /// Create one element
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        req_id: Option<String>,
        #[arg(long, default_value = "")]
        text: String,
        #[arg(long)]
        parent: Option<ElementId>,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", to_json(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ApiError> {
    let config = match cli.config.as_deref() {
        Some(path) => ModelStoreConfig::load(path)
            .map_err(|err| ApiError::new(ErrorCode::BadRequest, err.to_string()))?,
        None => ModelStoreConfig::default(),
    };
    init_from_config(&config.logging)
        .map_err(|err| ApiError::new(ErrorCode::BadRequest, err.to_string()))?;
    if let Some((level, log_dir)) = logging_status() {
        info!(
            "event=cli_start module=cli status=ok version={} level={} log_dir={}",
            core_version(),
            level,
            log_dir.display()
        );
    }

    match cli.command {
        Command::Health => {
            println!("{}", to_json(&health_report(&config)));
        }
        Command::List {
            page,
            size,
            keyword,
            roots,
            parent,
        } => {
            let mut filter = match (roots, parent) {
                (true, _) => ElementFilter::roots(),
                (false, Some(parent_id)) => ElementFilter::children_of(parent_id),
                (false, None) => ElementFilter::default(),
            };
            filter.keyword = keyword;
            let page = open_repository(&config)?.list(&filter, page, size)?;
            println!("{}", to_json(&page));
        }
        Command::Show { id, req_id } => {
            let repository = open_repository(&config)?;
            let element = match (id, req_id) {
                (Some(id), _) => repository.find_by_id(id)?,
                (None, Some(req_id)) => repository.find_by_req_id(&req_id)?,
                (None, None) => {
                    return Err(ApiError::new(
                        ErrorCode::BadRequest,
                        "either --id or --req-id is required",
                    ))
                }
            };
            println!("{}", to_json(&element));
        }
        Command::Create {
            name,
            req_id,
            text,
            parent,
            actor,
        } => {
            let mut input = CreateElementInput::new(name).with_text(text);
            input.req_id = req_id;
            input.parent_id = parent;
            let element = open_repository(&config)?.create(input, &actor)?;
            println!("{}", to_json(&element));
        }
    }
    Ok(())
}

fn open_repository(
    config: &ModelStoreConfig,
) -> Result<ModelRepository<SqliteVersionedStore>, ApiError> {
    let store = SqliteVersionedStore::open(&config.store).map_err(RepoError::from)?;
    Ok(ModelRepository::new(Arc::new(store), config.repository))
}

/// A store that fails to open is reported DOWN with the open error as cause.
fn health_report(config: &ModelStoreConfig) -> HealthReport {
    let timeout = config.health.timeout();
    match SqliteVersionedStore::open(&config.store) {
        Ok(store) => ModelRepository::new(Arc::new(store), config.repository)
            .health_monitor(timeout)
            .health(),
        Err(err) => {
            warn!(
                "event=cli_health module=cli status=down reason=open_failed error={}",
                err
            );
            HealthMonitor::without_store(format!("store could not be opened: {err}"), timeout)
                .health()
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|err| format!("{{\"code\":\"INTERNAL_ERROR\",\"details\":\"{err}\"}}"))
}
