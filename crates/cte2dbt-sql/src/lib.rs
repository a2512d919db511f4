//! CTE decomposition and table reference rewriting
//!
//! This crate handles:
//! - Parsing SQL using datafusion-sqlparser-rs
//! - Splitting a query into one unit per CTE plus the trailing body
//! - Classifying table references as local units or external sources
//! - Rewriting references into placeholders produced by injected callbacks
//! - Tracking the distinct sources and per-unit dependencies

pub mod parser;
pub mod error;
pub mod tree;
pub mod classifier;
pub mod registry;
pub mod rewriter;
pub mod decomposer;
pub mod provider;

pub use parser::{SqlParser, ParsedSql, ParseError};
pub use error::{CallbackError, DecomposeError};
pub use tree::{TableRef, Placeholder, table_refs, transform_tables};
pub use classifier::{classify, LocalUnits, RefKind};
pub use registry::{SourceEntry, SourceRegistry};
pub use rewriter::{rewrite_body, rewrite_local, rewrite_source, RewrittenBody};
pub use decomposer::{decompose, Decomposition, Unit, UnitName};
pub use provider::{Model, Provider};
