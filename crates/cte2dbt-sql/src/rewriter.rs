//! Table reference rewriting
//!
//! Turns classified table references into placeholders: local references
//! point at the generated id of a sibling unit, source references at the
//! placeholder stored in the shared [`SourceRegistry`].

use crate::classifier::{classify, LocalUnits, RefKind};
use crate::error::{CallbackError, DecomposeError, Result};
use crate::registry::SourceRegistry;
use crate::tree::{transform_tables, Placeholder, TableRef};
use sqlparser::ast::Query;
use std::collections::BTreeSet;

/// Placeholder for a reference to a sibling unit
///
/// The reference must have been classified [`RefKind::Local`]; a name missing
/// from `local_units` means declaration order was not respected.
pub fn rewrite_local(table: &TableRef, local_units: &LocalUnits) -> Result<Placeholder> {
    let unit_id = local_units
        .get(&table.name)
        .ok_or_else(|| DecomposeError::UnknownLocalUnit(table.name.clone()))?;

    Ok(Placeholder::new(unit_id, table.alias_or_name()))
}

/// Placeholder for a reference to an external table
///
/// `render` only runs when the table's qualified key is not registered yet.
pub fn rewrite_source<F>(
    table: &TableRef,
    registry: &mut SourceRegistry,
    render: F,
) -> Result<Placeholder>
where
    F: FnOnce(&TableRef) -> Result<String, CallbackError>,
{
    let key = table.qualified_key();
    let placeholder = registry
        .get_or_try_insert_with(key, table, || render(table))
        .map_err(DecomposeError::Callback)?;

    Ok(Placeholder::new(placeholder, table.alias_or_name()))
}

/// A unit body with every table reference replaced
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenBody {
    pub body: Query,

    /// Unit ids and source keys referenced by the body
    pub dependencies: BTreeSet<String>,
}

/// Rewrite every table reference of `body`, nested subqueries included
pub fn rewrite_body<R>(
    body: &Query,
    local_units: &LocalUnits,
    registry: &mut SourceRegistry,
    render: &mut R,
) -> Result<RewrittenBody>
where
    R: FnMut(&TableRef) -> Result<String, CallbackError>,
{
    let mut dependencies = BTreeSet::new();

    let rewritten = transform_tables(body, |table| {
        let placeholder = match classify(table, local_units) {
            RefKind::Local => {
                let placeholder = rewrite_local(table, local_units)?;
                dependencies.insert(placeholder.display.clone());
                placeholder
            }
            RefKind::Source => {
                let placeholder = rewrite_source(table, registry, |t| render(t))?;
                dependencies.insert(table.qualified_key());
                placeholder
            }
        };
        Ok(Some(placeholder))
    })?;

    Ok(RewrittenBody {
        body: rewritten,
        dependencies,
    })
}
