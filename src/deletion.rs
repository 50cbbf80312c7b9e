use std::collections::BTreeSet;

use anyhow::anyhow;

use crate::algorithms;
use crate::error::{LibError, Result};
use crate::graph::ResourceGraph;
use crate::models::{BranchTemplate, DeletedSubgraph, NodeGroup, NodeGroupId, NodeId};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone)]
pub struct DeletionPlan {
    pub unit_of_work: UnitOfWork,
    pub deleted: DeletedSubgraph,
}

/// Removes `node_id`, its incoming edge and its whole subtree regardless of
/// group boundaries, then every group left without members or anchor.
///
/// A template in `branches` whose root node is removed is deleted with it.
pub fn plan_deletion(
    graph: &ResourceGraph,
    node_id: NodeId,
    branches: &[BranchTemplate],
) -> Result<DeletionPlan> {
    if !graph.contains_node(node_id) {
        return Err(LibError::not_found(
            "Node not found",
            anyhow!("node {} not found", node_id),
        ));
    }

    let subtree = algorithms::subtree(graph, node_id);
    let mut deleted = DeletedSubgraph::default();
    deleted
        .edge_ids
        .extend(graph.incoming_edges(node_id).map(|edge| edge.id));
    deleted.edge_ids.extend(subtree.edges.iter().copied());
    deleted.node_ids.extend(subtree.nodes.iter().copied());
    deleted.node_ids.push(node_id);

    let removed: BTreeSet<NodeId> = deleted.node_ids.iter().copied().collect();
    let survivors = || graph.nodes().filter(|node| !removed.contains(&node.id));

    let mut candidates = BTreeSet::new();
    for removed_id in &removed {
        if let Some(node) = graph.node(*removed_id) {
            candidates.insert(node.nodegroup_id);
        }
        let anchored = NodeGroupId::anchored_at(*removed_id);
        if graph.nodegroup(anchored).is_some() {
            candidates.insert(anchored);
        }
    }
    for group_id in candidates {
        let still_referenced = survivors().any(|node| node.nodegroup_id == group_id);
        let still_anchored = survivors().any(|node| group_id.is_anchored_at(node.id));
        if !still_referenced && !still_anchored {
            deleted.nodegroup_ids.push(group_id);
        }
    }

    deleted.branch_ids.extend(
        branches
            .iter()
            .filter(|branch| removed.contains(&branch.root_node_id))
            .map(|branch| branch.id),
    );

    let mut unit_of_work = UnitOfWork::new();
    for branch_id in &deleted.branch_ids {
        unit_of_work.delete_branch(*branch_id);
    }
    for edge_id in &deleted.edge_ids {
        unit_of_work.delete_edge(*edge_id);
    }
    for removed_id in &deleted.node_ids {
        unit_of_work.delete_node(*removed_id);
    }
    let dropped: BTreeSet<NodeGroupId> = deleted.nodegroup_ids.iter().copied().collect();
    for group in graph.nodegroups() {
        // Surviving groups never point at a deleted parent.
        if dropped.contains(&group.id) {
            continue;
        }
        if let Some(parent) = group.parent_nodegroup_id
            && dropped.contains(&parent)
        {
            unit_of_work.put_nodegroup(NodeGroup {
                parent_nodegroup_id: None,
                ..group.clone()
            });
        }
    }
    for group_id in &deleted.nodegroup_ids {
        unit_of_work.delete_nodegroup(*group_id);
    }

    tracing::debug!(
        node_id = %node_id,
        nodes = deleted.node_ids.len(),
        edges = deleted.edge_ids.len(),
        nodegroups = deleted.nodegroup_ids.len(),
        branches = deleted.branch_ids.len(),
        "planned cascade deletion"
    );

    Ok(DeletionPlan {
        unit_of_work,
        deleted,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::error::ErrorKind;
    use crate::invariants::graph_invariant_violations;
    use crate::models::{BranchId, Cardinality, Edge, EdgeId, GraphId, Node};
    use crate::unit_of_work::PendingWrite;

    struct Tree {
        graph: ResourceGraph,
        root: NodeId,
        event: NodeId,
        date: NodeId,
        actor: NodeId,
        label: NodeId,
    }

    /// root -> event (own group) -> date (event group)
    ///                           -> actor (own group) -> label (actor group)
    /// root -> label_root (root group)
    fn tree() -> Tree {
        let graph_id = GraphId::new_v4();
        let ids: Vec<NodeId> = (0..6).map(|_| NodeId::new_v4()).collect();
        let (root, event, date, actor, label, label_root) =
            (ids[0], ids[1], ids[2], ids[3], ids[4], ids[5]);
        let root_group = NodeGroupId::anchored_at(root);
        let event_group = NodeGroupId::anchored_at(event);
        let actor_group = NodeGroupId::anchored_at(actor);

        let node = |id: NodeId, group: NodeGroupId| Node {
            id,
            graph_id,
            name: "N".to_string(),
            description: None,
            is_top_node: id == root,
            ontology_class: "E1_CRM_Entity".to_string(),
            datatype: "string".to_string(),
            status: None,
            nodegroup_id: group,
        };
        let edge = |from: NodeId, to: NodeId| Edge {
            id: EdgeId::new_v4(),
            graph_id,
            domain_node_id: from,
            range_node_id: to,
            property: "P1".to_string(),
        };
        let group = |id: NodeGroupId, parent: Option<NodeGroupId>| NodeGroup {
            id,
            cardinality: Cardinality::Many,
            parent_nodegroup_id: parent,
        };

        let graph = ResourceGraph::from_parts(
            [
                node(root, root_group),
                node(event, event_group),
                node(date, event_group),
                node(actor, actor_group),
                node(label, actor_group),
                node(label_root, root_group),
            ],
            [
                edge(root, event),
                edge(event, date),
                edge(event, actor),
                edge(actor, label),
                edge(root, label_root),
            ],
            [
                group(root_group, None),
                group(event_group, Some(root_group)),
                group(actor_group, Some(event_group)),
            ],
        );
        assert!(graph_invariant_violations(&graph).is_empty());

        Tree {
            graph,
            root,
            event,
            date,
            actor,
            label,
        }
    }

    #[test]
    fn deletion_removes_whole_subtree_across_groups() {
        let tree = tree();
        let plan = plan_deletion(&tree.graph, tree.event, &[]).expect("plan");

        let mut post = tree.graph.clone();
        plan.unit_of_work.apply_to(&mut post);
        for removed in [tree.event, tree.date, tree.actor, tree.label] {
            assert!(post.node(removed).is_none());
        }
        assert_eq!(post.node_count(), 2);
        assert!(post.edges().all(|edge| {
            post.contains_node(edge.domain_node_id) && post.contains_node(edge.range_node_id)
        }));
        assert!(post.nodegroup(NodeGroupId::anchored_at(tree.event)).is_none());
        assert!(post.nodegroup(NodeGroupId::anchored_at(tree.actor)).is_none());
        assert!(post.nodegroup(NodeGroupId::anchored_at(tree.root)).is_some());
        assert!(graph_invariant_violations(&post).is_empty());
    }

    #[test]
    fn deleting_a_leaf_keeps_its_shared_group() {
        let tree = tree();
        let plan = plan_deletion(&tree.graph, tree.date, &[]).expect("plan");
        assert_eq!(plan.deleted.node_ids, vec![tree.date]);
        assert_eq!(plan.deleted.edge_ids.len(), 1);
        assert!(plan.deleted.nodegroup_ids.is_empty());
    }

    #[test]
    fn deleting_the_root_empties_the_graph() {
        let tree = tree();
        let plan = plan_deletion(&tree.graph, tree.root, &[]).expect("plan");
        let mut post = tree.graph.clone();
        plan.unit_of_work.apply_to(&mut post);
        assert!(post.is_empty());
        assert_eq!(post.edge_count(), 0);
        assert_eq!(post.nodegroups().count(), 0);
    }

    #[test]
    fn orphaned_anchored_group_is_dropped_with_its_anchor() {
        let mut tree = tree();
        // A group left behind by an earlier demotion of `date`.
        let stale = NodeGroupId::anchored_at(tree.date);
        tree.graph.insert_nodegroup(NodeGroup {
            id: stale,
            cardinality: Cardinality::Many,
            parent_nodegroup_id: Some(NodeGroupId::anchored_at(tree.event)),
        });

        let plan = plan_deletion(&tree.graph, tree.date, &[]).expect("plan");
        assert_eq!(plan.deleted.nodegroup_ids, vec![stale]);
    }

    #[test]
    fn templates_rooted_in_the_subtree_are_removed() {
        let tree = tree();
        let template = |id: u128, root_node_id: NodeId| BranchTemplate {
            id: BranchId(Uuid::from_u128(id)),
            name: "Actor".to_string(),
            description: None,
            graph_id: tree.graph.node(tree.root).map(|n| n.graph_id).expect("root"),
            root_node_id,
            created_at: Utc::now().naive_utc(),
        };
        let branches = [template(1, tree.actor), template(2, tree.date)];

        let plan = plan_deletion(&tree.graph, tree.actor, &branches).expect("plan");
        assert_eq!(plan.deleted.branch_ids, vec![BranchId(Uuid::from_u128(1))]);
        assert!(matches!(
            plan.unit_of_work.writes().first(),
            Some(PendingWrite::DeleteBranch(id)) if *id == BranchId(Uuid::from_u128(1))
        ));
    }

    #[test]
    fn missing_node_is_not_found() {
        let tree = tree();
        let err = plan_deletion(&tree.graph, NodeId::new_v4(), &[]).expect_err("should fail");
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
