use anyhow::anyhow;

use crate::algorithms::{has_cycle, reachable_nodes};
use crate::error::{LibError, Result};
use crate::graph::ResourceGraph;
use crate::models::{GraphInvariantViolation, NodeId};

/// Structural checks over one resource graph: tree shape, the top-node flag,
/// group membership and group parents mirroring the edge tree.
///
/// An empty graph has no violations; it is what remains after the root of a
/// graph is deleted.
pub fn graph_invariant_violations(graph: &ResourceGraph) -> Vec<GraphInvariantViolation> {
    if graph.is_empty() {
        return Vec::new();
    }

    let mut violations = Vec::new();
    for edge in graph.edges() {
        for endpoint in [edge.domain_node_id, edge.range_node_id] {
            if !graph.contains_node(endpoint) {
                violations.push(GraphInvariantViolation::UnknownNodeReference {
                    edge_id: edge.id,
                    missing_node_id: endpoint,
                });
            }
        }
        if edge.domain_node_id == edge.range_node_id {
            violations.push(GraphInvariantViolation::SelfLoop {
                node_id: edge.domain_node_id,
            });
        }
    }

    for node in graph.nodes() {
        let degree = graph.in_degree(node.id);
        if degree > 1 {
            violations.push(GraphInvariantViolation::InDegreeExceeded {
                node_id: node.id,
                in_degree: degree,
            });
        }
    }

    if has_cycle(graph) {
        violations.push(GraphInvariantViolation::CycleDetected);
    }

    let roots = graph.roots();
    if let [root] = roots.as_slice() {
        let reachable = reachable_nodes(graph, *root);
        let unreachable: Vec<NodeId> = graph
            .nodes()
            .map(|node| node.id)
            .filter(|node_id| !reachable.contains(node_id))
            .collect();
        if !unreachable.is_empty() {
            violations.push(GraphInvariantViolation::DisconnectedTree {
                unreachable_node_ids: unreachable,
            });
        }
    } else {
        violations.push(GraphInvariantViolation::InvalidRootCount {
            root_count: roots.len(),
        });
    }

    for node in graph.nodes() {
        let is_root = graph.in_degree(node.id) == 0;
        if node.is_top_node != is_root {
            violations.push(GraphInvariantViolation::TopNodeMismatch {
                node_id: node.id,
                is_top_node: node.is_top_node,
            });
        }
        if graph.nodegroup(node.nodegroup_id).is_none() {
            violations.push(GraphInvariantViolation::UnknownNodeGroup {
                node_id: node.id,
                nodegroup_id: node.nodegroup_id,
            });
        }
    }

    for edge in graph.edges() {
        let (Some(domain), Some(range)) = (
            graph.node(edge.domain_node_id),
            graph.node(edge.range_node_id),
        ) else {
            continue;
        };
        if domain.nodegroup_id == range.nodegroup_id {
            continue;
        }
        let Some(group) = graph.nodegroup(range.nodegroup_id) else {
            continue;
        };
        if group.parent_nodegroup_id != Some(domain.nodegroup_id) {
            violations.push(GraphInvariantViolation::GroupParentMismatch {
                node_id: range.id,
                nodegroup_id: group.id,
                expected_parent_id: domain.nodegroup_id,
                actual_parent_id: group.parent_nodegroup_id,
            });
        }
    }

    violations
}

pub fn ensure_graph_invariants(graph: &ResourceGraph) -> Result<()> {
    let violations = graph_invariant_violations(graph);
    if let Some(first) = violations.first() {
        return Err(LibError::invalid_with_code(
            first.error_code(),
            first.public_message(),
            anyhow!("graph invariant validation failed: {:?}", violations),
        ));
    }

    Ok(())
}
