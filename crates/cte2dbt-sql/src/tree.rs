//! Table references in the sqlparser AST
//!
//! The rest of the crate never walks the AST directly: it enumerates table
//! references with [`table_refs`] and rewrites them with [`transform_tables`],
//! which always works on a structural copy of its input.

use crate::error::{DecomposeError, Result};
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    Ident, ObjectName, Query, TableAlias, TableFactor, Visit, VisitMut, Visitor, VisitorMut,
};
use std::fmt;
use std::ops::ControlFlow;

/// A table referenced from a query body
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    /// Catalog (project) qualifier
    pub catalog: Option<String>,

    /// Database (schema / dataset) qualifier
    pub database: Option<String>,

    /// Base table name
    pub name: String,

    /// Alias given in the FROM clause
    pub alias: Option<String>,
}

impl TableRef {
    /// Create an unqualified, unaliased reference
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            catalog: None,
            database: None,
            name: name.into(),
            alias: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Read the reference held by a table factor
    ///
    /// Returns `None` for factors that are not plain tables (derived tables,
    /// joins, table-valued functions such as `FROM generate_series(1, 3)`).
    pub fn from_table_factor(factor: &TableFactor) -> Option<Result<Self>> {
        match factor {
            TableFactor::Table {
                name,
                alias,
                args: None,
                ..
            } => Some(Self::from_object_name(name, alias.as_ref())),
            _ => None,
        }
    }

    fn from_object_name(name: &ObjectName, alias: Option<&TableAlias>) -> Result<Self> {
        let parts: Vec<&str> = name.0.iter().map(|ident| ident.value.as_str()).collect();

        let (catalog, database, base) = match parts.as_slice() {
            [base] => (None, None, *base),
            [database, base] => (None, Some(*database), *base),
            [catalog, database, base] => (Some(*catalog), Some(*database), *base),
            _ => return Err(DecomposeError::UnsupportedTableName(name.to_string())),
        };

        if base.is_empty() {
            return Err(DecomposeError::MalformedInput(format!(
                "table reference '{}' has an empty name",
                name
            )));
        }

        Ok(Self {
            catalog: catalog.filter(|c| !c.is_empty()).map(str::to_string),
            database: database.filter(|d| !d.is_empty()).map(str::to_string),
            name: base.to_string(),
            alias: alias.map(|a| a.name.value.clone()),
        })
    }

    /// True when a catalog or database qualifier is present
    pub fn is_qualified(&self) -> bool {
        self.catalog.is_some() || self.database.is_some()
    }

    /// Key identifying the physical table
    ///
    /// Present segments of `(database, catalog, name)` joined with `.`, so
    /// `project.dataset.orders` yields `dataset.project.orders`. The order is
    /// fixed; changing it would change every key of a seeded registry.
    pub fn qualified_key(&self) -> String {
        [self.database.as_deref(), self.catalog.as_deref(), Some(self.name.as_str())]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Alias if present, base name otherwise
    pub fn alias_or_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for qualifier in [&self.catalog, &self.database].into_iter().flatten() {
            write!(f, "{}.", qualifier)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        Ok(())
    }
}

/// Replacement for a table reference node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Text inserted verbatim (unquoted) in place of the table name
    pub display: String,

    /// Alias the rewritten node carries
    pub alias: String,
}

impl Placeholder {
    pub fn new(display: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            alias: alias.into(),
        }
    }

    /// Replace the table name of `factor` with this placeholder
    ///
    /// An existing alias is kept as written (quoting and column list
    /// included); an unaliased table gets its own base name as alias.
    fn apply(self, factor: &mut TableFactor) {
        if let TableFactor::Table { name, alias, .. } = factor {
            let quote_style = name.0.last().and_then(|ident| ident.quote_style);

            // Raw text, never quoted: the placeholder is a template block
            *name = ObjectName(vec![Ident::new(self.display)]);

            if alias.is_none() {
                let alias_ident = match quote_style {
                    Some(quote) => Ident::with_quote(quote, self.alias),
                    None => Ident::new(self.alias),
                };
                *alias = Some(TableAlias {
                    name: alias_ident,
                    columns: vec![],
                });
            }
        }
    }
}

struct TableCollector {
    tables: Vec<TableRef>,
}

impl Visitor for TableCollector {
    type Break = DecomposeError;

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        match TableRef::from_table_factor(factor) {
            Some(Ok(table)) => {
                self.tables.push(table);
                ControlFlow::Continue(())
            }
            Some(Err(e)) => ControlFlow::Break(e),
            None => ControlFlow::Continue(()),
        }
    }
}

/// Every table reference under `query`, nested subqueries included, in
/// traversal order
pub fn table_refs(query: &Query) -> Result<Vec<TableRef>> {
    let mut collector = TableCollector { tables: Vec::new() };

    match Visit::visit(query, &mut collector) {
        ControlFlow::Break(e) => Err(e),
        ControlFlow::Continue(()) => Ok(collector.tables),
    }
}

struct TableTransformer<F> {
    transform: F,
}

impl<F> VisitorMut for TableTransformer<F>
where
    F: FnMut(&TableRef) -> Result<Option<Placeholder>>,
{
    type Break = DecomposeError;

    fn pre_visit_table_factor(&mut self, factor: &mut TableFactor) -> ControlFlow<Self::Break> {
        let table = match TableRef::from_table_factor(factor) {
            Some(Ok(table)) => table,
            Some(Err(e)) => return ControlFlow::Break(e),
            None => return ControlFlow::Continue(()),
        };

        match (self.transform)(&table) {
            Ok(Some(placeholder)) => {
                placeholder.apply(factor);
                ControlFlow::Continue(())
            }
            Ok(None) => ControlFlow::Continue(()),
            Err(e) => ControlFlow::Break(e),
        }
    }
}

/// Copy `query`, replacing every table reference for which `transform`
/// returns a placeholder
///
/// The input is left untouched. Nodes for which `transform` returns `None`
/// are copied as they are; the first error stops the traversal.
pub fn transform_tables<F>(query: &Query, transform: F) -> Result<Query>
where
    F: FnMut(&TableRef) -> Result<Option<Placeholder>>,
{
    let mut copy = query.clone();
    let mut transformer = TableTransformer { transform };

    match VisitMut::visit(&mut copy, &mut transformer) {
        ControlFlow::Break(e) => Err(e),
        ControlFlow::Continue(()) => Ok(copy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SqlParser;
    use pretty_assertions::assert_eq;

    fn query(sql: &str) -> Query {
        SqlParser::new().parse_query(sql, None).unwrap()
    }

    #[test]
    fn qualified_name_predicate() {
        assert!(TableRef::new("name").with_database("db").with_catalog("catalog").is_qualified());
        assert!(TableRef::new("name").with_catalog("catalog").is_qualified());
        assert!(!TableRef::new("name").with_alias("alias").is_qualified());
        assert!(!TableRef::new("name").is_qualified());
    }

    #[test]
    fn qualified_key_puts_database_first() {
        assert_eq!(TableRef::new("t").qualified_key(), "t");
        assert_eq!(TableRef::new("t").with_database("s").qualified_key(), "s.t");
        assert_eq!(
            TableRef::new("table").with_database("catalog").with_catalog("db").qualified_key(),
            "catalog.db.table"
        );
    }

    #[test]
    fn qualified_key_ignores_alias() {
        let plain = TableRef::new("orders").with_database("raw");
        let aliased = plain.clone().with_alias("o");
        assert_eq!(plain.qualified_key(), aliased.qualified_key());
    }

    #[test]
    fn collects_nested_references() {
        let tables = table_refs(&query(
            "SELECT * FROM a JOIN s.b AS bb ON a.id = bb.id \
             WHERE a.x IN (SELECT x FROM c.d.e)",
        ))
        .unwrap();

        assert_eq!(
            tables,
            vec![
                TableRef::new("a"),
                TableRef::new("b").with_database("s").with_alias("bb"),
                TableRef::new("e").with_database("d").with_catalog("c"),
            ]
        );
    }

    #[test]
    fn table_functions_are_not_references() {
        let tables = table_refs(&query("SELECT * FROM generate_series(1, 3)")).unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn four_part_names_are_rejected() {
        let result = table_refs(&query("SELECT * FROM a.b.c.d"));
        assert!(matches!(result, Err(DecomposeError::UnsupportedTableName(_))));
    }

    #[test]
    fn transform_leaves_input_untouched() {
        let original = query("SELECT * FROM t");
        let rewritten = transform_tables(&original, |table| {
            Ok(Some(Placeholder::new(format!("X({})", table.name), table.alias_or_name())))
        })
        .unwrap();

        assert_eq!(original.to_string(), "SELECT * FROM t");
        assert_eq!(rewritten.to_string(), "SELECT * FROM X(t) AS t");
    }

    #[test]
    fn transform_keeps_existing_alias() {
        let rewritten = transform_tables(&query("SELECT * FROM t AS x(a, b)"), |table| {
            Ok(Some(Placeholder::new("P", table.alias_or_name())))
        })
        .unwrap();

        let sql = rewritten.to_string();
        assert!(sql.starts_with("SELECT * FROM P AS x"), "{sql}");
        assert!(sql.contains("(a, b)"), "{sql}");
    }

    #[test]
    fn transform_keeps_quoting_of_generated_alias() {
        let rewritten = transform_tables(&query(r#"SELECT * FROM "My Table""#), |table| {
            Ok(Some(Placeholder::new("P", table.alias_or_name())))
        })
        .unwrap();

        assert_eq!(rewritten.to_string(), r#"SELECT * FROM P AS "My Table""#);
    }

    #[test]
    fn transform_skips_unmatched_nodes() {
        let rewritten = transform_tables(&query("SELECT * FROM a JOIN b ON a.id = b.id"), |table| {
            Ok((table.name == "b").then(|| Placeholder::new("B", table.alias_or_name())))
        })
        .unwrap();

        assert_eq!(rewritten.to_string(), "SELECT * FROM a JOIN B AS b ON a.id = b.id");
    }

    #[test]
    fn transform_stops_on_first_error() {
        let mut seen = 0;
        let result = transform_tables(&query("SELECT * FROM a, b"), |_| {
            seen += 1;
            Err(DecomposeError::MalformedInput("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(seen, 1);
    }
}
