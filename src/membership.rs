//! Group membership: which nodes travel with a node when its group changes,
//! and the cascade that moves them.

use std::collections::{BTreeSet, VecDeque};

use anyhow::anyhow;

use crate::config::EngineConfig;
use crate::error::{LibError, Result};
use crate::graph::ResourceGraph;
use crate::models::{
    DownstreamSet, GroupTarget, Node, NodeGroup, NodeGroupId, NodeId, NodeUpdate,
    UpdateNodePayload,
};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone)]
pub struct ReassignmentPlan {
    pub unit_of_work: UnitOfWork,
    pub update: NodeUpdate,
}

/// Nodes reachable from `node_id` without leaving its group, and the
/// collectors entered directly below them.
///
/// Traversal never crosses into a collector's own group: a collector's
/// descendants already belong to a group with its own identity.
pub fn compute_downstream(graph: &ResourceGraph, node_id: NodeId) -> Result<DownstreamSet> {
    let node = graph.node(node_id).ok_or_else(|| {
        LibError::not_found("Node not found", anyhow!("node {} not found", node_id))
    })?;
    let group_id = node.nodegroup_id;

    let mut downstream = DownstreamSet::default();
    let mut seen = BTreeSet::from([node_id]);
    let mut queue = VecDeque::from([node_id]);
    while let Some(current) = queue.pop_front() {
        for child_id in graph.children(current) {
            if !seen.insert(child_id) {
                continue;
            }
            let Some(child) = graph.node(child_id) else {
                continue;
            };
            if child.nodegroup_id == group_id {
                downstream.nodes.push(child_id);
                queue.push_back(child_id);
            } else {
                downstream.collectors.push(child_id);
            }
        }
    }

    Ok(downstream)
}

/// Applies the field edits of `payload` to `node_id` and, when a group change
/// is requested, moves the node and its downstream set to the resolved group.
pub fn plan_reassignment(
    graph: &ResourceGraph,
    node_id: NodeId,
    payload: UpdateNodePayload,
    config: &EngineConfig,
) -> Result<ReassignmentPlan> {
    let current = graph.node(node_id).ok_or_else(|| {
        LibError::not_found("Node not found", anyhow!("node {} not found", node_id))
    })?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(LibError::invalid(
            "Node name is required",
            anyhow!("node {} update had empty name", node_id),
        ));
    }

    let mut node = Node {
        name,
        description: payload.description,
        is_top_node: payload.is_top_node,
        ontology_class: payload.ontology_class,
        datatype: payload.datatype,
        status: payload.status,
        ..current.clone()
    };

    // Computed against the pre-image: group pointers have not moved yet.
    let downstream = compute_downstream(graph, node_id)?;

    let mut unit_of_work = UnitOfWork::new();
    let mut updated_nodegroups = Vec::new();
    let resolved = match payload.nodegroup {
        GroupTarget::Unchanged => None,
        target => resolve_target(graph, current, target, config, &mut updated_nodegroups)?,
    };

    let mut group_nodes = Vec::with_capacity(downstream.nodes.len());
    for moved_id in &downstream.nodes {
        let Some(moved) = graph.node(*moved_id) else {
            continue;
        };
        let mut moved = moved.clone();
        if let Some(group_id) = resolved {
            moved.nodegroup_id = group_id;
        }
        group_nodes.push(moved);
    }

    let collectors: Vec<Node> = downstream
        .collectors
        .iter()
        .filter_map(|collector_id| graph.node(*collector_id).cloned())
        .collect();

    if let Some(group_id) = resolved {
        let mut reparented = BTreeSet::new();
        for collector in &collectors {
            if !reparented.insert(collector.nodegroup_id) {
                continue;
            }
            let Some(group) = graph.nodegroup(collector.nodegroup_id) else {
                continue;
            };
            if group.parent_nodegroup_id != Some(group_id) {
                updated_nodegroups.push(NodeGroup {
                    parent_nodegroup_id: Some(group_id),
                    ..group.clone()
                });
            }
        }
        node.nodegroup_id = group_id;
    }

    for group in &updated_nodegroups {
        unit_of_work.put_nodegroup(group.clone());
    }
    unit_of_work.put_node(node.clone());
    if resolved.is_some() {
        for moved in &group_nodes {
            unit_of_work.put_node(moved.clone());
        }
    }

    tracing::debug!(
        node_id = %node_id,
        target = ?payload.nodegroup,
        resolved = ?resolved,
        moved = group_nodes.len(),
        collectors = collectors.len(),
        "planned node update"
    );

    Ok(ReassignmentPlan {
        unit_of_work,
        update: NodeUpdate {
            node,
            group_nodes,
            collectors,
            updated_nodegroups,
        },
    })
}

/// Resolves a requested group change to the group the node will end up in.
/// `None` means the request leaves the node where it already is.
fn resolve_target(
    graph: &ResourceGraph,
    current: &Node,
    target: GroupTarget,
    config: &EngineConfig,
    updated_nodegroups: &mut Vec<NodeGroup>,
) -> Result<Option<NodeGroupId>> {
    let Some(incoming) = graph.incoming_edge(current.id) else {
        return Err(LibError::invalid_with_code(
            "root_nodegroup_reassignment",
            "The root node's group cannot be reassigned",
            anyhow!("node {} has no incoming edge", current.id),
        ));
    };
    let domain = graph.node(incoming.domain_node_id).ok_or_else(|| {
        LibError::not_found(
            "Parent node not found",
            anyhow!(
                "edge {} references missing domain node {}",
                incoming.id,
                incoming.domain_node_id
            ),
        )
    })?;
    let parent_group_id = domain.nodegroup_id;
    if graph.nodegroup(parent_group_id).is_none() {
        return Err(LibError::not_found(
            "Node-group not found",
            anyhow!("parent nodegroup {} not found", parent_group_id),
        ));
    }

    match target {
        GroupTarget::Unchanged => Ok(None),
        GroupTarget::PromoteNew => {
            let anchored = NodeGroupId::anchored_at(current.id);
            if current.nodegroup_id == anchored {
                return Ok(None);
            }
            // Upsert: a group anchored here earlier keeps its cardinality.
            let group = match graph.nodegroup(anchored) {
                Some(existing) => NodeGroup {
                    parent_nodegroup_id: Some(parent_group_id),
                    ..existing.clone()
                },
                None => NodeGroup {
                    id: anchored,
                    cardinality: config.promoted_cardinality,
                    parent_nodegroup_id: Some(parent_group_id),
                },
            };
            updated_nodegroups.push(group);
            Ok(Some(anchored))
        }
        GroupTarget::MergeInto { nodegroup_id } => {
            if graph.nodegroup(nodegroup_id).is_none() {
                return Err(LibError::not_found(
                    "Node-group not found",
                    anyhow!("nodegroup {} not found", nodegroup_id),
                ));
            }
            if nodegroup_id == current.nodegroup_id {
                return Ok(None);
            }
            if nodegroup_id != parent_group_id
                && !graph
                    .nodegroup_ancestors(parent_group_id)
                    .contains(&nodegroup_id)
            {
                return Err(LibError::conflict(
                    "Nodes can only merge into an ancestor group",
                    anyhow!(
                        "nodegroup {} is not an ancestor of node {}",
                        nodegroup_id,
                        current.id
                    ),
                ));
            }
            if parent_group_id == current.nodegroup_id {
                return Ok(None);
            }
            Ok(Some(parent_group_id))
        }
    }
}
