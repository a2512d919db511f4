//! cte2dbt Core
//!
//! Shared configuration types for the decomposition engine, the dbt
//! project writer and the CLI.

pub mod config;

pub use config::{Config, ConfigError, DbtConfig, DialectConfig, OutputConfig};
