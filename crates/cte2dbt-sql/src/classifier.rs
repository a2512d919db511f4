//! Local unit vs. external source classification

use crate::tree::TableRef;
use indexmap::IndexMap;
use tracing::debug;

/// What a table reference denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// A sibling unit (a CTE of the same query)
    Local,

    /// A physical table outside the query
    Source,
}

/// CTE names visible so far, mapped to their generated unit ids
///
/// Grows strictly forward in declaration order: a unit only sees the CTEs
/// registered before it, plus itself once its own processing has begun.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalUnits {
    ids: IndexMap<String, String>,
}

impl LocalUnits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` visible as a local unit with id `unit_id`
    pub fn register(&mut self, name: impl Into<String>, unit_id: impl Into<String>) {
        self.ids.insert(name.into(), unit_id.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    /// Generated id of the unit declared as `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.ids.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// `(name, unit id)` pairs in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ids.iter().map(|(name, id)| (name.as_str(), id.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LocalUnits {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut units = Self::new();
        for (name, unit_id) in iter {
            units.register(name, unit_id);
        }
        units
    }
}

/// Decide whether `table` denotes a local unit or an external source
///
/// Local iff the reference is unqualified and its bare name is a known unit.
/// A qualified reference is always a source, even when its bare name
/// collides with a CTE name.
pub fn classify(table: &TableRef, local_units: &LocalUnits) -> RefKind {
    let kind = if !table.is_qualified() && local_units.contains(&table.name) {
        RefKind::Local
    } else {
        RefKind::Source
    };

    debug!(table = %table, ?kind, "Classified table reference");
    kind
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units() -> LocalUnits {
        LocalUnits::from_iter([("cte1", "stg_cte1")])
    }

    #[test]
    fn unqualified_known_name_is_local() {
        assert_eq!(classify(&TableRef::new("cte1"), &units()), RefKind::Local);
        assert_eq!(
            classify(&TableRef::new("cte1").with_alias("cte1"), &units()),
            RefKind::Local
        );
        assert_eq!(
            classify(&TableRef::new("cte1").with_alias("alias"), &units()),
            RefKind::Local
        );
    }

    #[test]
    fn qualified_name_is_always_a_source() {
        let units = units();

        assert_eq!(
            classify(&TableRef::new("cte1").with_database("catalog"), &units),
            RefKind::Source
        );
        assert_eq!(
            classify(
                &TableRef::new("cte1").with_database("catalog").with_catalog("db"),
                &units
            ),
            RefKind::Source
        );
        assert_eq!(
            classify(&TableRef::new("cte1").with_catalog("db"), &units),
            RefKind::Source
        );
    }

    #[test]
    fn unknown_name_is_a_source() {
        assert_eq!(classify(&TableRef::new("orders"), &units()), RefKind::Source);
        assert_eq!(classify(&TableRef::new("cte1"), &LocalUnits::new()), RefKind::Source);
    }

    #[test]
    fn alias_does_not_make_a_reference_local() {
        // Only the base name is looked up
        let units = LocalUnits::from_iter([("my_alias", "stg_my_alias")]);
        assert_eq!(
            classify(&TableRef::new("cte1").with_alias("my_alias"), &units),
            RefKind::Source
        );
    }

    #[test]
    fn classification_is_repeatable() {
        let units = units();
        let table = TableRef::new("cte1").with_alias("c");

        let first = classify(&table, &units);
        for _ in 0..3 {
            assert_eq!(classify(&table, &units), first);
        }
    }

    #[test]
    fn registration_order_is_kept() {
        let mut units = LocalUnits::new();
        units.register("b", "REF(b)");
        units.register("a", "REF(a)");

        let names: Vec<_> = units.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(units.get("a"), Some("REF(a)"));
        assert_eq!(units.len(), 2);
    }
}
