//! The validated pipeline graph.

use super::{Binding, StepSpec};
use std::collections::{BTreeSet, HashMap};

/// A validated, acyclic graph of step nodes.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    /// The pipeline name.
    name: String,
    /// Nodes in declaration order.
    nodes: Vec<StepSpec>,
    /// Execution order (topologically sorted).
    execution_order: Vec<String>,
}

impl PipelineGraph {
    /// Creates a graph from nodes already checked by the builder.
    pub(crate) fn new(name: String, nodes: Vec<StepSpec>) -> Self {
        let execution_order = topological_sort(&nodes);
        Self {
            name,
            nodes,
            execution_order,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[StepSpec] {
        &self.nodes
    }

    /// Looks up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&StepSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Node names in the order they run.
    ///
    /// Every producer precedes its consumers; ties are broken by declaration
    /// order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// External bindings as `(node, slot, key)`.
    pub fn external_bindings(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.nodes.iter().flat_map(|node| {
            node.bindings.iter().filter_map(move |(slot, binding)| match binding {
                Binding::External { key } => Some((node.name.as_str(), slot.as_str(), key.as_str())),
                _ => None,
            })
        })
    }
}

/// Kahn's algorithm; the ready set is ordered by declaration index.
fn topological_sort(nodes: &[StepSpec]) -> Vec<String> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.name.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        let producers: BTreeSet<usize> = node
            .dependencies()
            .filter_map(|dep| index.get(dep).copied())
            .collect();
        in_degree[i] = producers.len();
        for p in producers {
            dependents[p].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = ready.pop_first() {
        order.push(nodes[i].name.clone());
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingStep;
    use std::sync::Arc;

    fn node(name: &str) -> StepSpec {
        StepSpec::new(name, Arc::new(CountingStep::new("count")))
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let graph = PipelineGraph::new(
            "test".to_string(),
            vec![
                node("c").bind("value", "a", "value"),
                node("a"),
                node("b"),
                node("d").bind("value", "b", "value"),
            ],
        );
        assert_eq!(graph.execution_order(), &["a", "c", "b", "d"]);
    }

    #[test]
    fn test_diamond() {
        let graph = PipelineGraph::new(
            "test".to_string(),
            vec![
                node("root"),
                node("left").bind("value", "root", "value"),
                node("right").bind("value", "root", "value"),
                node("join")
                    .bind("value", "right", "value")
                    .bind("other", "left", "value"),
            ],
        );
        assert_eq!(graph.execution_order(), &["root", "left", "right", "join"]);
        assert_eq!(graph.len(), 4);
        assert!(graph.node("join").is_some());
    }
}
