use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::graph::ResourceGraph;
use crate::models::{EdgeId, NodeId};

/// Nodes and edges strictly below a node, in breadth-first order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subtree {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
}

pub fn adjacency_map(graph: &ResourceGraph) -> BTreeMap<NodeId, Vec<NodeId>> {
    let mut adjacency = BTreeMap::new();
    for node in graph.nodes() {
        adjacency.entry(node.id).or_insert_with(Vec::new);
    }
    for edge in graph.edges() {
        if !graph.contains_node(edge.domain_node_id) || !graph.contains_node(edge.range_node_id) {
            // Best-effort behavior: skip dangling edges instead of failing the whole computation.
            continue;
        }
        adjacency
            .entry(edge.domain_node_id)
            .or_insert_with(Vec::new)
            .push(edge.range_node_id);
    }
    adjacency
}

pub fn has_cycle(graph: &ResourceGraph) -> bool {
    let adjacency = adjacency_map(graph);
    let mut indegree: BTreeMap<NodeId, usize> = adjacency.keys().map(|id| (*id, 0)).collect();
    for children in adjacency.values() {
        for child in children {
            if let Some(degree) = indegree.get_mut(child) {
                *degree += 1;
            }
        }
    }

    let mut queue: VecDeque<NodeId> = indegree
        .iter()
        .filter_map(|(node_id, degree)| (*degree == 0).then_some(*node_id))
        .collect();

    let mut visited_count = 0usize;
    while let Some(node_id) = queue.pop_front() {
        visited_count += 1;
        if let Some(children) = adjacency.get(&node_id) {
            for child in children {
                if let Some(child_degree) = indegree.get_mut(child) {
                    *child_degree -= 1;
                    if *child_degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }
    }

    visited_count != adjacency.len()
}

pub fn reachable_nodes(graph: &ResourceGraph, root: NodeId) -> BTreeSet<NodeId> {
    let mut reachable = BTreeSet::from([root]);
    let mut queue = VecDeque::from([root]);

    while let Some(node_id) = queue.pop_front() {
        for child in graph.children(node_id) {
            if reachable.insert(child) {
                queue.push_back(child);
            }
        }
    }

    reachable
}

/// Full downstream closure of `root`, ignoring group boundaries. The root
/// itself and its incoming edge are not part of the result.
pub fn subtree(graph: &ResourceGraph, root: NodeId) -> Subtree {
    let mut subtree = Subtree::default();
    let mut seen = BTreeSet::from([root]);
    let mut queue = VecDeque::from([root]);

    while let Some(node_id) = queue.pop_front() {
        for edge in graph.outgoing_edges(node_id) {
            subtree.edges.push(edge.id);
            if seen.insert(edge.range_node_id) {
                subtree.nodes.push(edge.range_node_id);
                queue.push_back(edge.range_node_id);
            }
        }
    }

    subtree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, GraphId, Node, NodeGroupId};

    fn sample_graph() -> (ResourceGraph, NodeId, NodeId, NodeId) {
        let graph_id = GraphId::new_v4();
        let ids = [NodeId::new_v4(), NodeId::new_v4(), NodeId::new_v4()];
        let root = ids[0];
        let group = NodeGroupId::anchored_at(root);
        let nodes = ids.map(|id| Node {
            id,
            graph_id,
            name: "N".to_string(),
            description: None,
            is_top_node: id == root,
            ontology_class: "E1_CRM_Entity".to_string(),
            datatype: "string".to_string(),
            status: None,
            nodegroup_id: group,
        });
        let edges = [(ids[0], ids[1]), (ids[1], ids[2])].map(|(from, to)| Edge {
            id: EdgeId::new_v4(),
            graph_id,
            domain_node_id: from,
            range_node_id: to,
            property: "P1".to_string(),
        });

        (
            ResourceGraph::from_parts(nodes, edges, []),
            ids[0],
            ids[1],
            ids[2],
        )
    }

    #[test]
    fn chain_has_no_cycle() {
        let (graph, a, _, c) = sample_graph();
        assert!(!has_cycle(&graph));
        assert!(reachable_nodes(&graph, a).contains(&c));
    }

    #[test]
    fn cycle_detects_properly() {
        let (mut graph, a, _, c) = sample_graph();
        graph.insert_edge(Edge {
            id: EdgeId::new_v4(),
            graph_id: GraphId::new_v4(),
            domain_node_id: c,
            range_node_id: a,
            property: "P1".to_string(),
        });
        assert!(has_cycle(&graph));
    }

    #[test]
    fn subtree_excludes_root_and_covers_every_descendant() {
        let (graph, a, b, c) = sample_graph();
        let below_a = subtree(&graph, a);
        assert_eq!(below_a.nodes, vec![b, c]);
        assert_eq!(below_a.edges.len(), 2);

        let below_c = subtree(&graph, c);
        assert!(below_c.nodes.is_empty());
        assert!(below_c.edges.is_empty());
    }
}
