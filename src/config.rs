//! Store configuration
//!
//! Loaded from a YAML file, then overridden by `TENANTGRAPH_*` environment
//! variables. Every field has a default, so an empty file is a valid config.

use crate::metadata::{ValidationMode, ValidationRules};
use crate::tenant::TenantLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix for every environment override.
pub const ENV_PREFIX: &str = "TENANTGRAPH_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value '{value}' for {var}: {reason}")]
    Env {
        var: String,
        value: String,
        reason: String,
    },

    #[error("inconsistent config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which adapter implementations back the graph and vector roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// In-process maps; nothing survives the process.
    #[default]
    Memory,
    /// SQLite files under `data_dir`.
    Local,
    /// Externally supplied adapters for remote services.
    Networked,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Local => "local",
            Self::Networked => "networked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "local" => Some(Self::Local),
            "networked" => Some(Self::Networked),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters handed to networked adapters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkedConfig {
    pub graph_uri: Option<String>,
    pub graph_user: Option<String>,
    pub graph_password: Option<String>,
    pub graph_database: Option<String>,
    pub vector_index: Option<String>,
    pub vector_environment: Option<String>,
    pub vector_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub mode: BackendMode,
    /// Directory for local-mode database files; defaults to the user data dir.
    pub data_dir: Option<PathBuf>,
    pub networked: NetworkedConfig,
}

impl BackendConfig {
    /// `data_dir`, or `<user data dir>/tenantgraph` when unset.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(default_data_dir)
    }
}

/// `~/.local/share/tenantgraph` (or the platform equivalent)
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
        .map(|d| d.join("tenantgraph"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    pub max_active_tenants: usize,
    pub max_registry_size: usize,
    pub tenant_ttl_secs: u64,
    pub enforce_tenant_limits: bool,
    pub sweep_interval_secs: u64,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            max_active_tenants: 100,
            max_registry_size: 1000,
            tenant_ttl_secs: 3600,
            enforce_tenant_limits: true,
            sweep_interval_secs: 300,
        }
    }
}

impl TenantConfig {
    pub fn limits(&self) -> TenantLimits {
        TenantLimits {
            max_active_tenants: self.max_active_tenants,
            max_registry_size: self.max_registry_size,
            tenant_ttl: Duration::from_secs(self.tenant_ttl_secs),
            enforce_tenant_limits: self.enforce_tenant_limits,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub timeout_ms: u64,
    pub compensation_attempts: u32,
    pub compensation_backoff_ms: u64,
    pub compensation_timeout_ms: u64,
    /// Upper bound on vectors per `upsert_batch` call.
    pub vector_batch_size: usize,
    /// How long to wait for another transaction's target locks; unbounded if unset.
    pub lock_timeout_ms: Option<u64>,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            compensation_attempts: 3,
            compensation_backoff_ms: 50,
            compensation_timeout_ms: 5_000,
            vector_batch_size: 100,
            lock_timeout_ms: None,
        }
    }
}

impl TransactionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn compensation_backoff(&self) -> Duration {
        Duration::from_millis(self.compensation_backoff_ms)
    }

    pub fn compensation_timeout(&self) -> Duration {
        Duration::from_millis(self.compensation_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}

/// Complete configuration for one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub tenants: TenantConfig,
    pub embedding_dimension: usize,
    pub validation: ValidationRules,
    pub transaction: TransactionConfig,
    /// Append one JSON line per transaction report here when set.
    pub report_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            tenants: TenantConfig::default(),
            embedding_dimension: 1536,
            validation: ValidationRules::default(),
            transaction: TransactionConfig::default(),
            report_path: None,
        }
    }
}

impl StoreConfig {
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read a YAML config file. Environment overrides are not applied.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Apply `TENANTGRAPH_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let var = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&var).map(|value| (var, value))
        };

        if let Some((var, value)) = get("BACKEND_MODE") {
            self.backend.mode = BackendMode::parse(&value).ok_or_else(|| ConfigError::Env {
                var,
                value,
                reason: "expected memory, local or networked".into(),
            })?;
        }
        if let Some((_, value)) = get("DATA_DIR") {
            self.backend.data_dir = Some(PathBuf::from(value));
        }
        if let Some((var, value)) = get("EMBEDDING_DIMENSION") {
            self.embedding_dimension = parse_env(var, value)?;
        }
        if let Some((var, value)) = get("MAX_ACTIVE_TENANTS") {
            self.tenants.max_active_tenants = parse_env(var, value)?;
        }
        if let Some((var, value)) = get("MAX_REGISTRY_SIZE") {
            self.tenants.max_registry_size = parse_env(var, value)?;
        }
        if let Some((var, value)) = get("TENANT_TTL_SECS") {
            self.tenants.tenant_ttl_secs = parse_env(var, value)?;
        }
        if let Some((var, value)) = get("ENFORCE_TENANT_LIMITS") {
            self.tenants.enforce_tenant_limits = parse_bool(var, value)?;
        }
        if let Some((var, value)) = get("VALIDATION_MODE") {
            self.validation.mode = match value.trim().to_ascii_lowercase().as_str() {
                "strict" => ValidationMode::Strict,
                "relaxed" => ValidationMode::Relaxed,
                _ => {
                    return Err(ConfigError::Env {
                        var,
                        value,
                        reason: "expected strict or relaxed".into(),
                    })
                }
            };
        }

        let net = &mut self.backend.networked;
        for (suffix, slot) in [
            ("GRAPH_URI", &mut net.graph_uri),
            ("GRAPH_USER", &mut net.graph_user),
            ("GRAPH_PASSWORD", &mut net.graph_password),
            ("VECTOR_INDEX", &mut net.vector_index),
            ("VECTOR_API_KEY", &mut net.vector_api_key),
        ] {
            if let Some((_, value)) = get(suffix) {
                *slot = Some(value);
            }
        }
        Ok(())
    }

    /// Human-readable problems; empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.embedding_dimension == 0 {
            problems.push("embedding_dimension must be greater than zero".to_string());
        }
        if self.tenants.max_active_tenants == 0 {
            problems.push("tenants.max_active_tenants must be greater than zero".to_string());
        }
        if self.tenants.max_active_tenants > self.tenants.max_registry_size {
            problems.push(format!(
                "tenants.max_active_tenants ({}) exceeds tenants.max_registry_size ({})",
                self.tenants.max_active_tenants, self.tenants.max_registry_size
            ));
        }
        if self.transaction.vector_batch_size == 0 {
            problems.push("transaction.vector_batch_size must be greater than zero".to_string());
        }
        if self.transaction.compensation_attempts == 0 {
            problems.push("transaction.compensation_attempts must be at least 1".to_string());
        }
        if self.transaction.timeout_ms == 0 {
            problems.push("transaction.timeout_ms must be greater than zero".to_string());
        }
        if self.backend.mode == BackendMode::Local && self.backend.resolved_data_dir().is_none() {
            problems.push("backend.data_dir is required in local mode".to_string());
        }
        problems
    }

    /// `load` + `apply_env` + `validate`, failing on any problem.
    pub fn load_resolved(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        let problems = config.validate();
        if problems.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: String, value: String) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        reason: e.to_string(),
        var,
        value,
    })
}

fn parse_bool(var: String, value: String) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value,
            reason: "expected a boolean".into(),
        }),
    }
}
