//! dbt model naming and Jinja block rendering

use cte2dbt_core::DbtConfig;
use cte2dbt_sql::{CallbackError, TableRef, UnitName};
use regex::Regex;
use std::sync::LazyLock;

static INVALID_MODEL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9_]+").expect("valid model name pattern")
});

/// Replace every run of characters dbt does not accept in model names
pub fn sanitize_model_name(name: &str) -> Result<String, NamingError> {
    let sanitized = INVALID_MODEL_CHARS.replace_all(name.trim(), "_");

    if sanitized.trim_matches('_').is_empty() {
        return Err(NamingError::EmptyModelName(name.to_string()));
    }

    Ok(sanitized.into_owned())
}

/// Naming rules for the models generated from one query
#[derive(Debug, Clone)]
pub struct DbtNaming {
    config: DbtConfig,
    final_model: String,
}

impl DbtNaming {
    /// `final_model` names the model built from the trailing body
    pub fn new(config: &DbtConfig, final_model: impl Into<String>) -> Self {
        Self {
            config: config.clone(),
            final_model: final_model.into(),
        }
    }

    pub fn final_model(&self) -> &str {
        &self.final_model
    }

    /// Model name for the unit called `unit_name`
    ///
    /// The final model keeps its own name; CTE models get the configured
    /// prefixes. Only the unit name is known here, so a CTE named like the
    /// final model cannot be told apart; [`model_name_for`](Self::model_name_for)
    /// rejects such CTEs.
    pub fn model_name(&self, unit_name: &str) -> Result<String, NamingError> {
        if unit_name == self.final_model {
            return sanitize_model_name(&self.final_model);
        }
        self.cte_model_name(unit_name)
    }

    /// Model name for a decomposed unit
    ///
    /// Fails for a CTE named like the final model: its references were
    /// rendered as references to the final model.
    pub fn model_name_for(&self, unit: &UnitName) -> Result<String, NamingError> {
        match unit {
            UnitName::Cte(name) if *name == self.final_model => {
                Err(NamingError::ShadowsFinalModel(name.clone()))
            }
            UnitName::Cte(name) => self.cte_model_name(name),
            UnitName::Final => sanitize_model_name(&self.final_model),
        }
    }

    fn cte_model_name(&self, cte: &str) -> Result<String, NamingError> {
        let mut name = self.config.model_prefix.clone();
        if self.config.prefix_with_final_model {
            name.push_str(&self.final_model);
            name.push_str("__");
        }
        name.push_str(cte);
        sanitize_model_name(&name)
    }

    /// `{{ ref('<model>') }}`
    pub fn ref_block(&self, unit_name: &str) -> Result<String, NamingError> {
        Ok(format!("{{{{ ref('{}') }}}}", self.model_name(unit_name)?))
    }

    /// Source name a table belongs to: its schema, or the default source
    pub fn source_name<'a>(&'a self, table: &'a TableRef) -> &'a str {
        table
            .database
            .as_deref()
            .unwrap_or(&self.config.default_source)
    }

    /// `{{ source('<source>', '<table>') }}`
    pub fn source_block(&self, table: &TableRef) -> String {
        format!(
            "{{{{ source('{}', '{}') }}}}",
            self.source_name(table),
            table.name
        )
    }

    /// Naming callback for a provider
    pub fn unit_namer(&self) -> impl FnMut(&str) -> Result<String, CallbackError> + '_ {
        move |unit_name| self.ref_block(unit_name).map_err(CallbackError::from)
    }

    /// Source rendering callback for a provider
    pub fn source_renderer(&self) -> impl FnMut(&TableRef) -> Result<String, CallbackError> + '_ {
        move |table| Ok(self.source_block(table))
    }
}

/// Naming errors
#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    #[error("'{0}' does not contain any character usable in a dbt model name")]
    EmptyModelName(String),

    #[error("CTE '{0}' has the same name as the final model; rename the CTE or the final model")]
    ShadowsFinalModel(String),
}
