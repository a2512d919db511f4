//! dbt project generation
//!
//! This crate handles:
//! - Naming models and rendering `ref()` / `source()` blocks
//! - Building dependency graphs (DAG) between generated models and sources
//! - Writing model files and the dbt sources file

pub mod naming;
pub mod dag;
pub mod project;

pub use naming::{sanitize_model_name, DbtNaming, NamingError};
pub use dag::{source_node_id, DependencyGraph, NodeId, NodeKind};
pub use project::{DbtProject, ModelFile, ProjectError, SourceDefinition, SourceTable, SourcesFile};
