//! Configuration schema (cte2dbt.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "cte2dbt.toml";

/// SQL dialect configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// BigQuery SQL dialect
    BigQuery,

    /// Snowflake SQL dialect
    Snowflake,

    /// PostgreSQL SQL dialect
    Postgres,

    /// DuckDB SQL dialect
    DuckDb,

    /// Generic ANSI SQL
    #[default]
    Ansi,
}

impl std::str::FromStr for DialectConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bigquery" => Ok(Self::BigQuery),
            "snowflake" => Ok(Self::Snowflake),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "duckdb" => Ok(Self::DuckDb),
            "ansi" | "generic" => Ok(Self::Ansi),
            other => Err(ConfigError::UnknownDialect(other.to_string())),
        }
    }
}

/// How generated dbt models and sources are named
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbtConfig {
    /// Source name used for tables referenced without a schema
    #[serde(default = "default_source")]
    pub default_source: String,

    /// Prefix prepended to every model generated from a CTE
    #[serde(default)]
    pub model_prefix: String,

    /// Name CTE models `<final model>__<cte>` so that several queries can
    /// share one models directory
    #[serde(default)]
    pub prefix_with_final_model: bool,
}

fn default_source() -> String {
    "raw".to_string()
}

impl Default for DbtConfig {
    fn default() -> Self {
        Self {
            default_source: default_source(),
            model_prefix: String::new(),
            prefix_with_final_model: false,
        }
    }
}

/// Where generated files are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one `.sql` file per model
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// File name of the generated dbt sources file, relative to `models_dir`
    #[serde(default = "default_sources_file")]
    pub sources_file: String,

    /// Replace files that already exist
    #[serde(default)]
    pub overwrite: bool,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_sources_file() -> String {
    "sources.yml".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            sources_file: default_sources_file(),
            overwrite: false,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQL dialect
    #[serde(default)]
    pub dialect: DialectConfig,

    /// dbt naming rules
    #[serde(default)]
    pub dbt: DbtConfig,

    /// Output locations
    #[serde(default)]
    pub output: OutputConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: DialectConfig::default(),
            dbt: DbtConfig::default(),
            output: OutputConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.display().to_string(), e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.project_root = std::env::current_dir().unwrap_or_default();
        Ok(config)
    }

    /// Load `cte2dbt.toml` from the working directory, or fall back to defaults
    pub fn discover() -> Result<Self, ConfigError> {
        let path = Path::new(CONFIG_FILE_NAME);
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(path.display().to_string(), e.to_string()))?;

        Ok(())
    }

    /// Models directory resolved against the project root
    pub fn models_dir(&self) -> PathBuf {
        if self.output.models_dir.is_absolute() {
            self.output.models_dir.clone()
        } else {
            self.project_root.join(&self.output.models_dir)
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {0}: {1}")]
    IoError(String, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Unknown SQL dialect: {0}")]
    UnknownDialect(String),
}
