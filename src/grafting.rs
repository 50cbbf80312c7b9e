use std::collections::{BTreeMap, BTreeSet};

use anyhow::anyhow;

use crate::algorithms;
use crate::error::{LibError, Result};
use crate::graph::ResourceGraph;
use crate::models::{
    BranchTemplate, Edge, EdgeId, GraftedSubgraph, Node, NodeGroup, NodeGroupId, NodeId,
};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone)]
pub struct GraftPlan {
    pub unit_of_work: UnitOfWork,
    pub grafted: GraftedSubgraph,
}

/// Clones `branch` under `target_node_id` through a new `property` edge.
///
/// Every cloned node, edge and group gets a fresh id. Groups anchored at a
/// template node are re-anchored at that node's clone, and the cloned root
/// always anchors its own group whose parent is the target's group.
pub fn plan_graft(
    target: &ResourceGraph,
    target_node_id: NodeId,
    property: &str,
    branch: &BranchTemplate,
    template: &ResourceGraph,
) -> Result<GraftPlan> {
    let property = property.trim();
    if property.is_empty() {
        return Err(LibError::invalid(
            "Edge property is required",
            anyhow!("graft onto {} had empty property", target_node_id),
        ));
    }

    let target_node = target.node(target_node_id).ok_or_else(|| {
        LibError::conflict(
            "Target node not found",
            anyhow!("graft target {} not found", target_node_id),
        )
    })?;
    let template_root = template.node(branch.root_node_id).ok_or_else(|| {
        LibError::not_found(
            "Branch root node not found",
            anyhow!(
                "branch {} root {} missing from its graph",
                branch.id,
                branch.root_node_id
            ),
        )
    })?;

    let subtree = algorithms::subtree(template, template_root.id);
    let template_nodes: Vec<&Node> = std::iter::once(template_root)
        .chain(
            subtree
                .nodes
                .iter()
                .filter_map(|node_id| template.node(*node_id)),
        )
        .collect();

    let node_ids: BTreeMap<NodeId, NodeId> = template_nodes
        .iter()
        .map(|node| (node.id, NodeId::new_v4()))
        .collect();
    let cloned_root_id = node_ids[&template_root.id];
    let root_group_id = NodeGroupId::anchored_at(cloned_root_id);

    let mut group_ids: BTreeMap<NodeGroupId, NodeGroupId> = BTreeMap::new();
    group_ids.insert(template_root.nodegroup_id, root_group_id);
    for node in &template_nodes {
        group_ids.entry(node.nodegroup_id).or_insert_with(|| {
            let anchor = node.nodegroup_id.anchor();
            match node_ids.get(&anchor) {
                Some(clone) if *clone != cloned_root_id => NodeGroupId::anchored_at(*clone),
                _ => NodeGroupId::new_v4(),
            }
        });
    }

    // Breadth-first node order means a parent group is always met, and
    // therefore written, before any of its child groups.
    let mut nodegroups = Vec::with_capacity(group_ids.len());
    let mut written_groups = BTreeSet::new();
    for node in &template_nodes {
        if !written_groups.insert(node.nodegroup_id) {
            continue;
        }
        let cloned_id = group_ids[&node.nodegroup_id];
        let template_group = template.nodegroup(node.nodegroup_id);
        let cardinality = template_group
            .map(|group| group.cardinality)
            .unwrap_or_default();
        let parent_nodegroup_id = if node.nodegroup_id == template_root.nodegroup_id {
            Some(target_node.nodegroup_id)
        } else {
            let parent = template_group
                .and_then(|group| group.parent_nodegroup_id)
                .and_then(|parent| group_ids.get(&parent).copied());
            Some(parent.unwrap_or(root_group_id))
        };
        nodegroups.push(NodeGroup {
            id: cloned_id,
            cardinality,
            parent_nodegroup_id,
        });
    }

    let nodes: Vec<Node> = template_nodes
        .iter()
        .map(|node| Node {
            id: node_ids[&node.id],
            graph_id: target_node.graph_id,
            is_top_node: false,
            nodegroup_id: group_ids[&node.nodegroup_id],
            ..(*node).clone()
        })
        .collect();

    let mut edges = Vec::with_capacity(subtree.edges.len() + 1);
    edges.push(Edge {
        id: EdgeId::new_v4(),
        graph_id: target_node.graph_id,
        domain_node_id: target_node_id,
        range_node_id: cloned_root_id,
        property: property.to_string(),
    });
    for edge_id in &subtree.edges {
        let Some(edge) = template.edge(*edge_id) else {
            continue;
        };
        let (Some(domain), Some(range)) = (
            node_ids.get(&edge.domain_node_id),
            node_ids.get(&edge.range_node_id),
        ) else {
            continue;
        };
        edges.push(Edge {
            id: EdgeId::new_v4(),
            graph_id: target_node.graph_id,
            domain_node_id: *domain,
            range_node_id: *range,
            property: edge.property.clone(),
        });
    }

    let mut unit_of_work = UnitOfWork::new();
    for group in &nodegroups {
        unit_of_work.put_nodegroup(group.clone());
    }
    for node in &nodes {
        unit_of_work.put_node(node.clone());
    }
    for edge in &edges {
        unit_of_work.put_edge(edge.clone());
    }

    tracing::debug!(
        branch_id = %branch.id,
        target_node_id = %target_node_id,
        nodes = nodes.len(),
        edges = edges.len(),
        nodegroups = nodegroups.len(),
        "planned branch graft"
    );

    Ok(GraftPlan {
        unit_of_work,
        grafted: GraftedSubgraph {
            branch_id: branch.id,
            root_node_id: cloned_root_id,
            nodes,
            edges,
            nodegroups,
        },
    })
}
