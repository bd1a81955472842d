//! Service configuration.
//!
//! Loaded from `config/nl2sql.yaml` (or the file named by `NL2SQL_CONFIG`).
//! String values may reference the environment as `${VAR}` or
//! `${VAR:-default}`; interpolation runs on the raw text before parsing.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::graph::DEFAULT_MAX_ROUNDS;
use crate::agent_core::TokenUsage;
use crate::db_tools::{PoolConfig, DEFAULT_ROW_LIMIT};
use crate::inference::ModelsConfig;

/// Env var that points directly at the config file.
pub const CONFIG_PATH_ENV: &str = "NL2SQL_CONFIG";

/// Path searched for when walking upward from the working directory.
const CONFIG_RELATIVE_PATH: &str = "config/nl2sql.yaml";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {reason}")]
    NotFound { reason: String },

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub pricing: Pricing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// The database the agent answers questions about.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub pool: PoolConfig,
}

fn default_schema() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    /// Deadline for a whole turn. No deadline when absent.
    #[serde(default)]
    pub turn_timeout_secs: Option<u64>,
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

fn default_row_limit() -> usize {
    DEFAULT_ROW_LIMIT
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            row_limit: default_row_limit(),
            turn_timeout_secs: None,
        }
    }
}

/// Where conversations are kept between turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointConfig {
    #[default]
    Memory,
    /// SQLite file; defaults to `checkpoints.db` in the data directory.
    Sqlite {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

/// Prices in currency units per million tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub input_per_million: f64,
    #[serde(default)]
    pub output_per_million: f64,
}

impl Pricing {
    pub fn estimate(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_million
            + usage.output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

impl AppConfig {
    /// Parse config text, interpolating environment variables first.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(raw);
        let config: AppConfig = serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::Invalid {
                reason: "agent.max_rounds must be at least 1".into(),
            });
        }
        if self.agent.row_limit == 0 {
            return Err(ConfigError::Invalid {
                reason: "agent.row_limit must be at least 1".into(),
            });
        }
        if self.database.schema.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "database.schema must not be empty".into(),
            });
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// `NL2SQL_CONFIG` wins when set. Otherwise searches upward from `start` for
/// `config/nl2sql.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(&path);
        if candidate.exists() {
            return Ok(candidate);
        }
        return Err(ConfigError::NotFound {
            reason: format!("{CONFIG_PATH_ENV} points at missing file {path}"),
        });
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_RELATIVE_PATH);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ConfigError::NotFound {
        reason: format!("could not find {CONFIG_RELATIVE_PATH} above {}", start.display()),
    })
}

/// Load and parse the config file at `path`.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    AppConfig::from_yaml(&raw)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset without a default becomes empty.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
