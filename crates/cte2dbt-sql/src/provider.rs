//! Decomposition driver
//!
//! [`Provider`] ties the pieces together: it decomposes a query into units,
//! names every unit through an injected callback, rewrites each unit body in
//! declaration order against the local units seen so far and a shared source
//! registry, and exposes the resulting models, sources and dependencies.

use crate::classifier::LocalUnits;
use crate::decomposer::{decompose, Unit, UnitName};
use crate::error::{CallbackError, DecomposeError, Result};
use crate::registry::SourceRegistry;
use crate::rewriter::rewrite_body;
use crate::tree::TableRef;
use sqlparser::ast::Query;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;

/// A unit after rewriting
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// CTE name, or the final unit name for the trailing body
    pub name: String,

    pub unit: UnitName,

    /// Id produced by the naming callback
    pub unit_id: String,

    /// Body as written in the query
    pub body: Query,

    /// Body with every table reference replaced
    pub rewritten: Query,

    /// Unit ids and source keys referenced by `rewritten`
    pub dependencies: BTreeSet<String>,
}

#[derive(Debug)]
enum State {
    Pending,
    Done(Vec<Model>),
    Failed,
}

/// Decomposes one query and rewrites its units
///
/// `N` names units (`name_unit(cte_name) -> id`), `R` renders sources
/// (`render_source(table) -> placeholder`). Each is called at most once per
/// unit and per distinct source table respectively. Rewriting happens on
/// the first call to [`models`](Self::models), [`sources`](Self::sources)
/// or [`dependencies`](Self::dependencies) and is not repeated.
pub struct Provider<N, R> {
    final_unit_name: String,
    units: Vec<Unit>,
    name_unit: N,
    render_source: R,
    unit_ids: HashMap<UnitName, String>,
    registry: SourceRegistry,
    state: State,
}

impl<N, R> Provider<N, R>
where
    N: FnMut(&str) -> Result<String, CallbackError>,
    R: FnMut(&TableRef) -> Result<String, CallbackError>,
{
    /// Decompose `query`; the trailing body becomes the unit `final_unit_name`
    pub fn new(
        final_unit_name: impl Into<String>,
        query: &Query,
        name_unit: N,
        render_source: R,
    ) -> Result<Self> {
        Self::with_registry(final_unit_name, query, name_unit, render_source, SourceRegistry::new())
    }

    /// Like [`new`](Self::new), reusing the sources registered by an earlier run
    pub fn with_registry(
        final_unit_name: impl Into<String>,
        query: &Query,
        name_unit: N,
        render_source: R,
        registry: SourceRegistry,
    ) -> Result<Self> {
        let units = decompose(query)?.into_units();

        Ok(Self {
            final_unit_name: final_unit_name.into(),
            units,
            name_unit,
            render_source,
            unit_ids: HashMap::new(),
            registry,
            state: State::Pending,
        })
    }

    pub fn final_unit_name(&self) -> &str {
        &self.final_unit_name
    }

    /// `(CTE name, original body)` per unit; the trailing body has no name
    ///
    /// Does not trigger rewriting.
    pub fn units(&self) -> Vec<(Option<&str>, &Query)> {
        self.units
            .iter()
            .map(|unit| (unit.name.cte_name(), &unit.body))
            .collect()
    }

    /// Rewritten units in declaration order, the trailing body last
    pub fn models(&mut self) -> Result<&[Model]> {
        self.evaluate()
    }

    /// Distinct `(qualified key, placeholder)` pairs after a full pass
    pub fn sources(&mut self) -> Result<Vec<(String, String)>> {
        self.evaluate()?;
        Ok(self
            .registry
            .iter()
            .map(|(key, placeholder)| (key.to_string(), placeholder.to_string()))
            .collect())
    }

    /// Registry state after a full pass
    pub fn registry(&mut self) -> Result<&SourceRegistry> {
        self.evaluate()?;
        Ok(&self.registry)
    }

    /// Unit ids and source keys referenced by each model
    ///
    /// Every CTE appears, with an empty set when it references nothing. The
    /// trailing body only appears when it references something.
    pub fn dependencies(&mut self) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let models = self.evaluate()?;

        Ok(models
            .iter()
            .filter(|model| !(model.unit.is_final() && model.dependencies.is_empty()))
            .map(|model| (model.name.clone(), model.dependencies.clone()))
            .collect())
    }

    /// Hand back the registry, e.g. to seed the next decomposition
    pub fn into_registry(self) -> SourceRegistry {
        self.registry
    }

    fn evaluate(&mut self) -> Result<&[Model]> {
        if matches!(self.state, State::Pending) {
            // Stays failed unless every unit is rewritten
            self.state = State::Failed;
            let models = self.rewrite_units()?;
            self.state = State::Done(models);
        }

        match &self.state {
            State::Done(models) => Ok(models.as_slice()),
            _ => Err(DecomposeError::ProviderPoisoned),
        }
    }

    fn rewrite_units(&mut self) -> Result<Vec<Model>> {
        let Self {
            final_unit_name,
            units,
            name_unit,
            render_source,
            unit_ids,
            registry,
            ..
        } = self;

        let mut local_units = LocalUnits::new();
        let mut models = Vec::with_capacity(units.len());

        for unit in units.iter() {
            let model_name = match &unit.name {
                UnitName::Cte(name) => name.as_str(),
                UnitName::Final => final_unit_name.as_str(),
            };
            let unit_id = memoized_unit_id(unit_ids, name_unit, &unit.name, model_name)?;

            // Visible from its own body onwards, never to earlier units
            if let UnitName::Cte(name) = &unit.name {
                local_units.register(name.clone(), unit_id.clone());
            }

            info!(unit = %unit.name, %unit_id, "Rewriting unit");
            let rewritten = rewrite_body(&unit.body, &local_units, registry, render_source)?;

            models.push(Model {
                name: model_name.to_string(),
                unit: unit.name.clone(),
                unit_id,
                body: unit.body.clone(),
                rewritten: rewritten.body,
                dependencies: rewritten.dependencies,
            });
        }

        Ok(models)
    }
}

fn memoized_unit_id<N>(
    unit_ids: &mut HashMap<UnitName, String>,
    name_unit: &mut N,
    unit: &UnitName,
    model_name: &str,
) -> Result<String>
where
    N: FnMut(&str) -> Result<String, CallbackError>,
{
    if let Some(unit_id) = unit_ids.get(unit) {
        return Ok(unit_id.clone());
    }

    let unit_id = name_unit(model_name).map_err(DecomposeError::Callback)?;
    unit_ids.insert(unit.clone(), unit_id.clone());
    Ok(unit_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SqlParser;
    use pretty_assertions::assert_eq;

    fn query(sql: &str) -> Query {
        SqlParser::new().parse_query(sql, None).unwrap()
    }

    fn ref_block(name: &str) -> Result<String, CallbackError> {
        Ok(format!("REF({})", name))
    }

    fn src_block(table: &TableRef) -> Result<String, CallbackError> {
        Ok(format!("SRC({})", table.name))
    }

    #[test]
    fn units_do_not_trigger_rewriting() {
        let mut calls = 0;
        let provider = Provider::new(
            "final",
            &query("WITH c AS (SELECT 1) SELECT * FROM c"),
            |name: &str| {
                calls += 1;
                ref_block(name)
            },
            src_block,
        )
        .unwrap();

        let units: Vec<_> = provider
            .units()
            .into_iter()
            .map(|(name, body)| (name.map(str::to_string), body.to_string()))
            .collect();
        assert_eq!(
            units,
            vec![
                (Some("c".to_string()), "SELECT 1".to_string()),
                (None, "SELECT * FROM c".to_string()),
            ]
        );

        drop(provider);
        assert_eq!(calls, 0);
    }

    #[test]
    fn every_unit_is_named_once() {
        let mut named = Vec::new();
        let mut provider = Provider::new(
            "final",
            &query("WITH a AS (SELECT 1), b AS (SELECT * FROM a) SELECT * FROM a JOIN b ON true"),
            |name: &str| {
                named.push(name.to_string());
                ref_block(name)
            },
            src_block,
        )
        .unwrap();

        provider.models().unwrap();
        provider.sources().unwrap();
        provider.dependencies().unwrap();
        drop(provider);

        assert_eq!(named, vec!["a", "b", "final"]);
    }

    #[test]
    fn unit_sees_itself_but_not_later_units() {
        let mut provider = Provider::new(
            "final",
            &query(
                "WITH RECURSIVE a AS (SELECT * FROM b UNION ALL SELECT * FROM a), \
                 b AS (SELECT 1) SELECT * FROM a",
            ),
            ref_block,
            src_block,
        )
        .unwrap();

        let models = provider.models().unwrap();
        assert_eq!(
            models[0].rewritten.to_string(),
            "SELECT * FROM SRC(b) AS b UNION ALL SELECT * FROM REF(a) AS a"
        );
        assert_eq!(
            models[0].dependencies,
            BTreeSet::from(["REF(a)".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn final_model_name_does_not_shadow_tables() {
        let mut provider =
            Provider::new("orders", &query("SELECT * FROM orders"), ref_block, src_block).unwrap();

        let models = provider.models().unwrap();
        assert_eq!(models[0].rewritten.to_string(), "SELECT * FROM SRC(orders) AS orders");
        assert_eq!(models[0].unit_id, "REF(orders)");
    }

    #[test]
    fn naming_failure_poisons_the_provider() {
        let mut provider = Provider::new(
            "final",
            &query("WITH c AS (SELECT 1) SELECT * FROM c"),
            |_: &str| -> Result<String, CallbackError> { Err("naming service down".into()) },
            src_block,
        )
        .unwrap();

        match provider.models() {
            Err(DecomposeError::Callback(e)) => assert_eq!(e.to_string(), "naming service down"),
            other => panic!("expected callback error, got {:?}", other.map(|m| m.len())),
        }
        assert!(matches!(provider.sources(), Err(DecomposeError::ProviderPoisoned)));
        assert!(matches!(provider.dependencies(), Err(DecomposeError::ProviderPoisoned)));
    }

    #[test]
    fn malformed_query_fails_at_construction() {
        let result = Provider::new(
            "final",
            &query("WITH c AS (SELECT 1), c AS (SELECT 2) SELECT 3"),
            ref_block,
            src_block,
        );
        assert!(matches!(result, Err(DecomposeError::DuplicateCte(_))));
    }

    #[test]
    fn seeded_registry_is_carried_over() {
        let first_query = query("SELECT * FROM raw.customers");
        let mut first = Provider::new("first", &first_query, ref_block, src_block).unwrap();
        first.models().unwrap();
        let registry = first.into_registry();

        let mut rendered = Vec::new();
        let mut second = Provider::with_registry(
            "second",
            &query("SELECT * FROM raw.customers JOIN raw.orders USING (customer_id)"),
            ref_block,
            |table: &TableRef| {
                rendered.push(table.qualified_key());
                src_block(table)
            },
            registry,
        )
        .unwrap();

        assert_eq!(
            second.sources().unwrap(),
            vec![
                ("raw.customers".to_string(), "SRC(customers)".to_string()),
                ("raw.orders".to_string(), "SRC(orders)".to_string()),
            ]
        );
        drop(second);
        assert_eq!(rendered, vec!["raw.orders"]);
    }
}
