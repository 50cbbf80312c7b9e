//! Property-based tests for resource graph mutations.
//!
//! Random trees are mutated through the planners and every resulting
//! post-image must still satisfy the structural invariants.

use std::collections::BTreeSet;

use chrono::Utc;
use proptest::prelude::*;
use proptest::sample::Index;

use resource_graph::config::EngineConfig;
use resource_graph::deletion::plan_deletion;
use resource_graph::grafting::plan_graft;
use resource_graph::graph::ResourceGraph;
use resource_graph::invariants::graph_invariant_violations;
use resource_graph::membership::{compute_downstream, plan_reassignment};
use resource_graph::models::{
    BranchId, BranchTemplate, Cardinality, Edge, EdgeId, GraphId, GroupTarget, Node, NodeGroup,
    NodeGroupId, NodeId, UpdateNodePayload,
};

/// Node `i + 1` hangs under the node picked by `shape[i].0` among the nodes
/// built so far, and anchors its own group when `shape[i].1` is set.
fn build_tree(shape: &[(Index, bool)]) -> (ResourceGraph, Vec<NodeId>) {
    let graph_id = GraphId::new_v4();
    let root = NodeId::new_v4();
    let root_group = NodeGroupId::anchored_at(root);
    let mut graph = ResourceGraph::new();
    graph.insert_nodegroup(NodeGroup {
        id: root_group,
        cardinality: Cardinality::Single,
        parent_nodegroup_id: None,
    });
    graph.insert_node(node(graph_id, root, root_group, true));

    let mut ids = vec![root];
    for (parent_pick, anchors) in shape {
        let parent = ids[parent_pick.index(ids.len())];
        let parent_group = graph
            .node(parent)
            .map(|node| node.nodegroup_id)
            .unwrap_or(root_group);
        let id = NodeId::new_v4();
        let group_id = if *anchors {
            let anchored = NodeGroupId::anchored_at(id);
            graph.insert_nodegroup(NodeGroup {
                id: anchored,
                cardinality: Cardinality::Many,
                parent_nodegroup_id: Some(parent_group),
            });
            anchored
        } else {
            parent_group
        };
        graph.insert_node(node(graph_id, id, group_id, false));
        graph.insert_edge(Edge {
            id: EdgeId::new_v4(),
            graph_id,
            domain_node_id: parent,
            range_node_id: id,
            property: "P1".to_string(),
        });
        ids.push(id);
    }

    (graph, ids)
}

fn node(graph_id: GraphId, id: NodeId, group: NodeGroupId, is_top_node: bool) -> Node {
    Node {
        id,
        graph_id,
        name: "N".to_string(),
        description: None,
        is_top_node,
        ontology_class: "E1_CRM_Entity".to_string(),
        datatype: "semantic".to_string(),
        status: None,
        nodegroup_id: group,
    }
}

fn shape_strategy() -> impl Strategy<Value = Vec<(Index, bool)>> {
    prop::collection::vec((any::<Index>(), any::<bool>()), 0..30)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Random trees built with consistent group parents are valid.
    #[test]
    fn prop_generated_trees_are_valid(shape in shape_strategy()) {
        let (graph, _) = build_tree(&shape);
        prop_assert!(graph_invariant_violations(&graph).is_empty());
    }

    /// Any sequence of promotions, merges and deletions keeps the graph valid.
    #[test]
    fn prop_mutations_preserve_invariants(
        shape in shape_strategy(),
        mutations in prop::collection::vec((any::<Index>(), 0u8..4), 0..20),
    ) {
        let (mut graph, _) = build_tree(&shape);
        let config = EngineConfig::default();

        for (pick, kind) in mutations {
            let ids: Vec<NodeId> = graph.nodes().map(|node| node.id).collect();
            if ids.is_empty() {
                break;
            }
            let node_id = ids[pick.index(ids.len())];
            let Some(current) = graph.node(node_id).cloned() else {
                continue;
            };
            let is_root = graph.in_degree(node_id) == 0;

            let unit_of_work = match kind {
                0 | 1 => {
                    let target = if kind == 0 {
                        GroupTarget::PromoteNew
                    } else {
                        match graph.parent(node_id).and_then(|parent| graph.node(parent)) {
                            Some(parent) => GroupTarget::MergeInto {
                                nodegroup_id: parent.nodegroup_id,
                            },
                            None => GroupTarget::PromoteNew,
                        }
                    };
                    let payload = UpdateNodePayload::from_node(&current, target);
                    match plan_reassignment(&graph, node_id, payload, &config) {
                        Ok(plan) => plan.unit_of_work,
                        Err(err) => {
                            prop_assert!(is_root, "only the root may refuse: {}", err);
                            continue;
                        }
                    }
                }
                2 => {
                    let mut payload = UpdateNodePayload::from_node(&current, GroupTarget::Unchanged);
                    payload.name = format!("{} (edited)", current.name);
                    let plan = plan_reassignment(&graph, node_id, payload, &config)
                        .expect("field edits always plan");
                    plan.unit_of_work
                }
                _ => plan_deletion(&graph, node_id, &[]).expect("existing node").unit_of_work,
            };

            unit_of_work.apply_to(&mut graph);
            let violations = graph_invariant_violations(&graph);
            prop_assert!(violations.is_empty(), "violations: {:?}", violations);
        }
    }

    /// Moving a node takes its whole same-group downstream set along.
    #[test]
    fn prop_promotion_moves_downstream(shape in shape_strategy(), pick in any::<Index>()) {
        let (graph, ids) = build_tree(&shape);
        prop_assume!(ids.len() > 1);
        let node_id = ids[1 + pick.index(ids.len() - 1)];
        let current = graph.node(node_id).cloned().expect("node exists");
        let downstream = compute_downstream(&graph, node_id).expect("downstream");

        let payload = UpdateNodePayload::from_node(&current, GroupTarget::PromoteNew);
        let plan = plan_reassignment(&graph, node_id, payload, &EngineConfig::default())
            .expect("promotion plans");
        let mut post = graph.clone();
        plan.unit_of_work.apply_to(&mut post);

        let anchored = NodeGroupId::anchored_at(node_id);
        for moved in std::iter::once(node_id).chain(downstream.nodes.iter().copied()) {
            prop_assert_eq!(post.node(moved).map(|node| node.nodegroup_id), Some(anchored));
        }
        for collector in &downstream.collectors {
            let group_id = post.node(*collector).map(|node| node.nodegroup_id);
            let parent = group_id
                .and_then(|group_id| post.nodegroup(group_id))
                .and_then(|group| group.parent_nodegroup_id);
            prop_assert_eq!(parent, Some(anchored));
        }
    }

    /// Grafted copies never share ids with the template or the target.
    #[test]
    fn prop_graft_ids_are_fresh(
        target_shape in shape_strategy(),
        template_shape in shape_strategy(),
        pick in any::<Index>(),
    ) {
        let (target, target_ids) = build_tree(&target_shape);
        let (template, template_ids) = build_tree(&template_shape);
        let branch = BranchTemplate {
            id: BranchId::new_v4(),
            name: "Template".to_string(),
            description: None,
            graph_id: template.nodes().next().map(|node| node.graph_id).expect("template root"),
            root_node_id: template_ids[0],
            created_at: Utc::now().naive_utc(),
        };
        let target_node_id = target_ids[pick.index(target_ids.len())];

        let plan = plan_graft(&target, target_node_id, "P2", &branch, &template)
            .expect("graft plans");
        prop_assert_eq!(plan.grafted.nodes.len(), template.node_count());

        let mut existing = BTreeSet::new();
        existing.extend(target.nodes().map(|node| node.id.0));
        existing.extend(target.edges().map(|edge| edge.id.0));
        existing.extend(target.nodegroups().map(|group| group.id.0));
        existing.extend(template.nodes().map(|node| node.id.0));
        existing.extend(template.edges().map(|edge| edge.id.0));
        existing.extend(template.nodegroups().map(|group| group.id.0));
        for node in &plan.grafted.nodes {
            prop_assert!(!existing.contains(&node.id.0));
        }
        for edge in &plan.grafted.edges {
            prop_assert!(!existing.contains(&edge.id.0));
        }
        for group in &plan.grafted.nodegroups {
            prop_assert!(!existing.contains(&group.id.0));
        }

        let mut post = target.clone();
        plan.unit_of_work.apply_to(&mut post);
        prop_assert!(graph_invariant_violations(&post).is_empty());
    }
}
