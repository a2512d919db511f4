//! dbt project output
//!
//! Turns rewritten models into `.sql` model files and the distinct sources
//! into a dbt sources file.

use crate::naming::{DbtNaming, NamingError};
use cte2dbt_core::Config;
use cte2dbt_sql::{Model, SourceRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A model file ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    /// dbt model name
    pub model: String,

    pub path: PathBuf,

    /// Rewritten SQL with `ref()` / `source()` blocks
    pub sql: String,
}

/// dbt sources file (`version: 2`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesFile {
    pub version: u32,
    pub sources: Vec<SourceDefinition>,
}

/// One `sources:` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    pub tables: Vec<SourceTable>,
}

/// One table of a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTable {
    pub name: String,
}

impl SourcesFile {
    /// Group the registered tables by source
    ///
    /// Seeded registry entries carry no table and are skipped. A source name
    /// must map to a single catalog, since the rendered `source()` blocks do
    /// not mention it.
    pub fn from_registry(registry: &SourceRegistry, naming: &DbtNaming) -> Result<Self, ProjectError> {
        let mut sources: Vec<SourceDefinition> = Vec::new();

        for (key, entry) in registry.entries() {
            let Some(table) = &entry.table else {
                debug!(%key, "Skipping seeded source without table information");
                continue;
            };

            let name = naming.source_name(table);
            let source = match sources.iter().position(|source| source.name == name) {
                Some(index) => &mut sources[index],
                None => {
                    sources.push(SourceDefinition {
                        name: name.to_string(),
                        database: table.catalog.clone(),
                        schema: table.database.clone(),
                        tables: Vec::new(),
                    });
                    let last = sources.len() - 1;
                    &mut sources[last]
                }
            };

            if source.database != table.catalog {
                return Err(ProjectError::AmbiguousSource {
                    name: source.name.clone(),
                    catalogs: [&source.database, &table.catalog]
                        .into_iter()
                        .map(|catalog| catalog.as_deref().unwrap_or("<default>").to_string())
                        .collect(),
                });
            }

            if !source.tables.iter().any(|t| t.name == table.name) {
                source.tables.push(SourceTable {
                    name: table.name.clone(),
                });
            }
        }

        Ok(Self {
            version: 2,
            sources,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn to_yaml(&self) -> Result<String, ProjectError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ProjectError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Output location of generated dbt files
#[derive(Debug, Clone)]
pub struct DbtProject {
    models_dir: PathBuf,
    sources_file: String,
    overwrite: bool,
}

impl DbtProject {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            sources_file: "sources.yml".to_string(),
            overwrite: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            models_dir: config.models_dir(),
            sources_file: config.output.sources_file.clone(),
            overwrite: config.output.overwrite,
        }
    }

    pub fn with_models_dir(mut self, models_dir: impl Into<PathBuf>) -> Self {
        self.models_dir = models_dir.into();
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn sources_path(&self) -> PathBuf {
        self.models_dir.join(&self.sources_file)
    }

    /// One file per model, named after the dbt model
    pub fn plan_models(&self, models: &[Model], naming: &DbtNaming) -> Result<Vec<ModelFile>, ProjectError> {
        let mut seen = HashSet::new();

        models
            .iter()
            .map(|model| {
                let name = naming.model_name_for(&model.unit)?;
                if !seen.insert(name.clone()) {
                    return Err(ProjectError::DuplicateModel(name));
                }

                Ok(ModelFile {
                    path: self.models_dir.join(format!("{}.sql", name)),
                    model: name,
                    sql: format!("{}\n", model.rewritten),
                })
            })
            .collect()
    }

    /// Write model files
    ///
    /// Nothing is written when any target exists and overwriting is off.
    pub fn write_models(&self, files: &[ModelFile]) -> Result<(), ProjectError> {
        for file in files {
            self.check_target(&file.path)?;
        }

        self.create_models_dir()?;
        for file in files {
            write_file(&file.path, &file.sql)?;
            info!(model = %file.model, path = %file.path.display(), "Wrote model");
        }

        Ok(())
    }

    /// Write the sources file, returning its path
    pub fn write_sources(&self, sources: &SourcesFile) -> Result<PathBuf, ProjectError> {
        let path = self.sources_path();
        self.check_target(&path)?;

        let yaml = sources.to_yaml()?;
        self.create_models_dir()?;
        write_file(&path, &yaml)?;
        info!(path = %path.display(), sources = sources.sources.len(), "Wrote sources");

        Ok(path)
    }

    fn check_target(&self, path: &Path) -> Result<(), ProjectError> {
        if !self.overwrite && path.exists() {
            return Err(ProjectError::FileExists(path.to_path_buf()));
        }
        Ok(())
    }

    fn create_models_dir(&self) -> Result<(), ProjectError> {
        std::fs::create_dir_all(&self.models_dir).map_err(|source| ProjectError::Io {
            path: self.models_dir.clone(),
            source,
        })
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ProjectError> {
    std::fs::write(path, contents).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Project output errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} already exists (enable overwrite to replace it)", .0.display())]
    FileExists(PathBuf),

    #[error("Two units map to the model name '{0}'")]
    DuplicateModel(String),

    #[error("Source '{name}' is used with several catalogs: {}", .catalogs.join(", "))]
    AmbiguousSource {
        name: String,
        catalogs: Vec<String>,
    },

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
