//! tenantgraph CLI: operator tools for a tenantgraph store.
//!
//! Usage:
//!   tenantgraph validate <file.json> [--config path]
//!   tenantgraph namespace <tenant> <component>
//!   tenantgraph clear-tenant <tenant> [--data-dir path] [--config path]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tenantgraph::config::BackendMode;
use tenantgraph::metadata::{validate, InteractionMetadata};
use tenantgraph::tenant::validate_tenant_id;
use tenantgraph::{namespace_for, StoreConfig, TenantGraphApi};

#[derive(Parser)]
#[command(
    name = "tenantgraph",
    version,
    about = "Multi-tenant graph and vector storage coordination"
)]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate interaction metadata from a JSON file (one object or an array)
    Validate {
        /// JSON file to check
        file: PathBuf,
    },
    /// Print the storage namespace for a tenant and component
    Namespace {
        tenant: String,
        /// Component type, e.g. graph or embeddings
        component: String,
    },
    /// Delete every node, edge and embedding of a tenant from the local store
    ClearTenant {
        tenant: String,
        /// Data directory of the local store; overrides the config
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<StoreConfig, String> {
    StoreConfig::load_resolved(path).map_err(|e| format!("Failed to load config: {}", e))
}

fn read_records(file: &Path) -> Result<Vec<InteractionMetadata>, String> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read '{}': {}", file.display(), e))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| format!("'{}' is not valid JSON: {}", file.display(), e))?;
    let records = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    records
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item).map_err(|e| format!("record {}: {}", i + 1, e))
        })
        .collect()
}

fn cmd_validate(config: Option<&Path>, file: &Path) -> i32 {
    let config = match load_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let records = match read_records(file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let mut invalid = 0;
    for (i, record) in records.iter().enumerate() {
        let errors = validate(record, &config.validation);
        if errors.is_empty() {
            continue;
        }
        invalid += 1;
        for error in errors {
            println!("record {}: {}: {}", i + 1, error.field(), error);
        }
    }
    if invalid == 0 {
        println!("{} record(s) valid", records.len());
        0
    } else {
        println!("{} of {} record(s) invalid", invalid, records.len());
        1
    }
}

fn cmd_namespace(tenant: &str, component: &str) -> i32 {
    if let Err(e) = validate_tenant_id(tenant) {
        eprintln!("Error: {}", e);
        return 1;
    }
    if component.trim().is_empty() {
        eprintln!("Error: component cannot be empty");
        return 1;
    }
    println!("{}", namespace_for(tenant, component));
    0
}

fn cmd_clear_tenant(config: Option<&Path>, tenant: &str, data_dir: Option<PathBuf>) -> i32 {
    let mut config = match load_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Some(dir) = data_dir {
        config.backend.mode = BackendMode::Local;
        config.backend.data_dir = Some(dir);
    }
    if config.backend.mode != BackendMode::Local {
        eprintln!(
            "Error: clear-tenant works on the local store; backend mode is '{}'",
            config.backend.mode
        );
        return 1;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: cannot start runtime: {}", e);
            return 1;
        }
    };
    let api = match TenantGraphApi::from_config(config) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match runtime.block_on(api.clear_tenant(tenant)) {
        Ok(summary) => {
            println!(
                "Cleared tenant '{}': {} node(s), {} edge(s), {} vector(s)",
                tenant, summary.nodes, summary.edges, summary.vectors
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.config.as_deref();
    let code = match cli.command {
        Commands::Validate { file } => cmd_validate(config, &file),
        Commands::Namespace { tenant, component } => cmd_namespace(&tenant, &component),
        Commands::ClearTenant { tenant, data_dir } => cmd_clear_tenant(config, &tenant, data_dir),
    };
    std::process::exit(code);
}
