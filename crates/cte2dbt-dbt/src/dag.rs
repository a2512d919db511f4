//! Dependency graph (DAG) construction and traversal
//!
//! Builds forward and reverse dependency graphs between the models of one
//! decomposition and the sources they read, for build ordering and impact
//! analysis.

use cte2dbt_sql::Model;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Node identifier: a model name, or `source.<key>` for a source table
pub type NodeId = String;

const SOURCE_PREFIX: &str = "source.";

/// Node id of the source table registered under `key`
///
/// Sources live in their own namespace so that a table named like one of
/// the models (`SELECT * FROM orders` in `orders.sql`) stays a distinct node.
pub fn source_node_id(key: &str) -> NodeId {
    format!("{}{}", SOURCE_PREFIX, key)
}

/// What a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Model,
    Source,
}

/// Dependency graph with forward and reverse edges
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Forward edges: node -> nodes it depends on (parents)
    parents: HashMap<NodeId, Vec<NodeId>>,

    /// Reverse edges: node -> nodes that depend on it (children)
    children: HashMap<NodeId, Vec<NodeId>>,

    /// All nodes in insertion order, with their kind
    nodes: Vec<(NodeId, NodeKind)>,
}

impl DependencyGraph {
    /// Build a dependency graph from rewritten models
    ///
    /// Model dependencies hold unit ids for local references and source keys
    /// otherwise; unit ids are mapped back to model names.
    pub fn from_models(models: &[Model]) -> Self {
        let mut graph = Self::default();
        for model in models {
            graph.add_node(&model.name, NodeKind::Model);
        }

        for (index, model) in models.iter().enumerate() {
            for dependency in &model.dependencies {
                // Only the model itself and earlier ones are visible by unit id
                let local = models[..=index]
                    .iter()
                    .find(|candidate| candidate.unit_id == *dependency);

                let parent = match local {
                    Some(parent) => parent.name.clone(),
                    None => {
                        let source = source_node_id(dependency);
                        graph.add_node(&source, NodeKind::Source);
                        source
                    }
                };
                graph.add_edge(parent, model.name.clone());
            }
        }

        graph
    }

    /// Build a graph from a plain `node -> parents` map, all nodes being models
    pub fn from_parent_map(parent_map: &BTreeMap<String, Vec<String>>) -> Self {
        let mut graph = Self::default();

        for (node, parents) in parent_map {
            graph.add_node(node, NodeKind::Model);
            for parent in parents {
                graph.add_node(parent, NodeKind::Model);
                graph.add_edge(parent.clone(), node.clone());
            }
        }

        graph
    }

    fn add_node(&mut self, node: &str, kind: NodeKind) {
        if !self.nodes.iter().any(|(id, _)| id == node) {
            self.nodes.push((node.to_string(), kind));
        }
    }

    fn add_edge(&mut self, parent: NodeId, child: NodeId) {
        let parents = self.parents.entry(child.clone()).or_default();
        if !parents.contains(&parent) {
            parents.push(parent.clone());
            self.children.entry(parent).or_default().push(child);
        }
    }

    /// Get all nodes in the graph
    pub fn all_nodes(&self) -> Vec<&NodeId> {
        self.nodes.iter().map(|(id, _)| id).collect()
    }

    /// Kind of a node, if present
    pub fn kind(&self, node_id: &str) -> Option<NodeKind> {
        self.nodes
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, kind)| *kind)
    }

    /// Get immediate parents (dependencies) of a node
    pub fn parents(&self, node_id: &str) -> Vec<&NodeId> {
        self.parents
            .get(node_id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get immediate children (dependents) of a node
    pub fn children(&self, node_id: &str) -> Vec<&NodeId> {
        self.children
            .get(node_id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get all downstream nodes (transitive closure of children)
    ///
    /// This is the "blast radius": every model affected if this node changes.
    pub fn downstream(&self, node_id: &str) -> Vec<NodeId> {
        Self::closure(&self.children, node_id)
    }

    /// Get all upstream nodes (transitive closure of parents)
    pub fn upstream(&self, node_id: &str) -> Vec<NodeId> {
        Self::closure(&self.parents, node_id)
    }

    fn closure(edges: &HashMap<NodeId, Vec<NodeId>>, node_id: &str) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<&NodeId> = edges
            .get(node_id)
            .map(|next| next.iter().collect())
            .unwrap_or_default();
        let mut result = Vec::new();

        // BFS over the chosen edge direction
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current.clone());

            if let Some(next) = edges.get(current) {
                queue.extend(next.iter().filter(|node| !visited.contains(node)));
            }
        }

        result
    }

    /// Check if there's a path from source to target
    pub fn has_path(&self, source: &str, target: &str) -> bool {
        self.downstream(source).iter().any(|node| node == target)
    }

    /// Topological sort of all nodes, `None` if the graph has a cycle
    ///
    /// Ties are broken by insertion order, so the result is stable.
    pub fn topological_sort(&self) -> Option<Vec<NodeId>> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(id, _)| (id.as_str(), self.parents.get(id).map_or(0, Vec::len)))
            .collect();

        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .map(|(id, _)| id.as_str())
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        // Kahn's algorithm
        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());

            for child in self.children.get(node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(child.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child.as_str());
                    }
                }
            }
        }

        // Every node visited means no cycles
        (result.len() == self.nodes.len()).then_some(result)
    }

    /// Models in an order where each one comes after everything it reads
    pub fn build_order(&self) -> Option<Vec<NodeId>> {
        let sorted = self.topological_sort()?;
        Some(
            sorted
                .into_iter()
                .filter(|node| self.kind(node) == Some(NodeKind::Model))
                .collect(),
        )
    }
}
