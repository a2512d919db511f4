//! Query decomposition into units
//!
//! Splits a query into one unit per CTE of its top-level WITH-clause plus
//! the trailing body. WITH-clauses nested inside a CTE body stay where they
//! are: the body is returned verbatim, and a CTE declared there with the
//! same name as an outer CTE is not told apart from it.

use crate::error::{DecomposeError, Result};
use sqlparser::ast::Query;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// Name of a decomposed unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitName {
    /// A CTE, by its declared name
    Cte(String),

    /// The trailing body of the query
    Final,
}

impl UnitName {
    /// Declared CTE name, `None` for the trailing body
    pub fn cte_name(&self) -> Option<&str> {
        match self {
            Self::Cte(name) => Some(name),
            Self::Final => None,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final)
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cte(name) => write!(f, "{}", name),
            Self::Final => write!(f, "<final>"),
        }
    }
}

/// One decomposed query piece with its original body
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: UnitName,
    pub body: Query,
}

/// A query split into its CTEs and its trailing body
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// `(name, body)` per CTE, in declaration order
    pub ctes: Vec<(String, Query)>,

    /// The query without its WITH-clause
    pub trailing: Query,
}

impl Decomposition {
    /// All units in processing order, the trailing body last
    pub fn into_units(self) -> Vec<Unit> {
        self.ctes
            .into_iter()
            .map(|(name, body)| Unit {
                name: UnitName::Cte(name),
                body,
            })
            .chain(std::iter::once(Unit {
                name: UnitName::Final,
                body: self.trailing,
            }))
            .collect()
    }
}

/// Split `query` into its CTEs and trailing body
///
/// Every returned body is an independent copy; `query` itself is not
/// modified.
pub fn decompose(query: &Query) -> Result<Decomposition> {
    let mut trailing = query.clone();
    let Some(with) = trailing.with.take() else {
        debug!("Query has no WITH-clause");
        return Ok(Decomposition {
            ctes: Vec::new(),
            trailing,
        });
    };

    let mut seen = HashSet::new();
    let mut ctes = Vec::with_capacity(with.cte_tables.len());

    for (index, cte) in with.cte_tables.into_iter().enumerate() {
        let name = cte.alias.name.value;

        if name.is_empty() {
            return Err(DecomposeError::MalformedInput(format!(
                "CTE #{} has no name",
                index + 1
            )));
        }

        if !seen.insert(name.clone()) {
            return Err(DecomposeError::DuplicateCte(name));
        }

        if !cte.alias.columns.is_empty() {
            warn!(cte = %name, "CTE column list is not carried over to the unit body");
        }

        debug!(cte = %name, index, "Extracted CTE");
        ctes.push((name, *cte.query));
    }

    Ok(Decomposition { ctes, trailing })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SqlParser;
    use pretty_assertions::assert_eq;

    fn query(sql: &str) -> Query {
        SqlParser::new().parse_query(sql, None).unwrap()
    }

    fn names_and_sql(decomposition: &Decomposition) -> Vec<(String, String)> {
        decomposition
            .ctes
            .iter()
            .map(|(name, body)| (name.clone(), body.to_string()))
            .collect()
    }

    #[test]
    fn query_without_ctes() {
        let decomposition = decompose(&query("SELECT 1")).unwrap();

        assert!(decomposition.ctes.is_empty());
        assert_eq!(decomposition.trailing.to_string(), "SELECT 1");
    }

    #[test]
    fn ctes_in_declaration_order() {
        let decomposition =
            decompose(&query("WITH cte1 AS (SELECT 1), cte2 AS (SELECT 2) SELECT 3")).unwrap();

        assert_eq!(
            names_and_sql(&decomposition),
            vec![
                ("cte1".to_string(), "SELECT 1".to_string()),
                ("cte2".to_string(), "SELECT 2".to_string()),
            ]
        );
        assert_eq!(decomposition.trailing.to_string(), "SELECT 3");
    }

    #[test]
    fn nested_with_is_kept_verbatim() {
        let decomposition =
            decompose(&query("WITH cte1 AS (WITH cte2 AS (SELECT 1) SELECT 2) SELECT 3")).unwrap();

        assert_eq!(
            names_and_sql(&decomposition),
            vec![("cte1".to_string(), "WITH cte2 AS (SELECT 1) SELECT 2".to_string())]
        );
    }

    #[test]
    fn trailing_body_keeps_order_and_limit() {
        let decomposition =
            decompose(&query("WITH c AS (SELECT 1 AS x) SELECT x FROM c ORDER BY x LIMIT 5")).unwrap();

        assert_eq!(decomposition.trailing.to_string(), "SELECT x FROM c ORDER BY x LIMIT 5");
    }

    #[test]
    fn input_is_not_modified() {
        let original = query("WITH c AS (SELECT 1) SELECT * FROM c");
        let before = original.clone();

        let _ = decompose(&original).unwrap();
        assert_eq!(original, before);
    }

    #[test]
    fn duplicate_cte_names_are_rejected() {
        let result = decompose(&query("WITH c AS (SELECT 1), c AS (SELECT 2) SELECT * FROM c"));
        assert!(matches!(result, Err(DecomposeError::DuplicateCte(name)) if name == "c"));
    }

    #[test]
    fn units_end_with_the_trailing_body() {
        let units = decompose(&query("WITH a AS (SELECT 1), b AS (SELECT 2) SELECT 3"))
            .unwrap()
            .into_units();

        let names: Vec<_> = units.iter().map(|unit| unit.name.clone()).collect();
        assert_eq!(
            names,
            vec![
                UnitName::Cte("a".to_string()),
                UnitName::Cte("b".to_string()),
                UnitName::Final,
            ]
        );
    }
}
