use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LibError, Result};
use crate::graph::ResourceGraph;
use crate::invariants;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(
    /// Partition key shared by every node and edge of one resource graph.
    GraphId
);
uuid_id!(NodeId);
uuid_id!(EdgeId);
uuid_id!(
    /// A node-group id. When it equals a node id the group is anchored at
    /// that node.
    NodeGroupId
);
uuid_id!(BranchId);

impl NodeGroupId {
    pub const fn anchored_at(node_id: NodeId) -> Self {
        Self(node_id.0)
    }

    pub const fn anchor(self) -> NodeId {
        NodeId(self.0)
    }

    pub fn is_anchored_at(self, node_id: NodeId) -> bool {
        self.0 == node_id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Cardinality {
    #[serde(rename = "1")]
    Single,
    #[default]
    #[serde(rename = "n")]
    Many,
}

impl Cardinality {
    pub const fn as_db_value(self) -> &'static str {
        match self {
            Cardinality::Single => "1",
            Cardinality::Many => "n",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "1" => Some(Cardinality::Single),
            "n" => Some(Cardinality::Many),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub graph_id: GraphId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_top_node: bool,
    pub ontology_class: String,
    pub datatype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub nodegroup_id: NodeGroupId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub graph_id: GraphId,
    pub domain_node_id: NodeId,
    pub range_node_id: NodeId,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    pub id: NodeGroupId,
    pub cardinality: Cardinality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_nodegroup_id: Option<NodeGroupId>,
}

/// A reusable prototype subgraph. Its nodes and edges live in their own
/// graph partition (`graph_id`) and are cloned on every graft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchTemplate {
    pub id: BranchId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub graph_id: GraphId,
    pub root_node_id: NodeId,
    pub created_at: NaiveDateTime,
}

/// Requested change to a node's group membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GroupTarget {
    #[default]
    Unchanged,
    /// Fold the node back into an ancestor group.
    MergeInto {
        #[serde(rename = "nodegroupId")]
        nodegroup_id: NodeGroupId,
    },
    /// Anchor a new group at the node.
    PromoteNew,
}

/// Full replacement field values for a node plus the requested group change.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNodePayload {
    pub name: String,
    pub description: Option<String>,
    pub is_top_node: bool,
    pub ontology_class: String,
    pub datatype: String,
    pub status: Option<String>,
    #[serde(default)]
    pub nodegroup: GroupTarget,
}

impl UpdateNodePayload {
    /// Payload that keeps every field of `node` and requests `nodegroup`.
    pub fn from_node(node: &Node, nodegroup: GroupTarget) -> Self {
        Self {
            name: node.name.clone(),
            description: node.description.clone(),
            is_top_node: node.is_top_node,
            ontology_class: node.ontology_class.clone(),
            datatype: node.datatype.clone(),
            status: node.status.clone(),
            nodegroup,
        }
    }
}

/// Nodes that move together when a node's group changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamSet {
    pub nodes: Vec<NodeId>,
    pub collectors: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub node: Node,
    pub group_nodes: Vec<Node>,
    pub collectors: Vec<Node>,
    pub updated_nodegroups: Vec<NodeGroup>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraftedSubgraph {
    pub branch_id: BranchId,
    pub root_node_id: NodeId,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub nodegroups: Vec<NodeGroup>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedSubgraph {
    pub node_ids: Vec<NodeId>,
    pub edge_ids: Vec<EdgeId>,
    pub nodegroup_ids: Vec<NodeGroupId>,
    /// Templates whose root node was removed.
    pub branch_ids: Vec<BranchId>,
}

/// Plain-data view of a graph rooted at `root_node_id`, sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphModel {
    pub root_node_id: NodeId,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub nodegroups: Vec<NodeGroup>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchLibraryEntry {
    pub branch: BranchTemplate,
    pub root_node: Node,
    pub graph: GraphModel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphInvariantViolation {
    UnknownNodeReference {
        edge_id: EdgeId,
        missing_node_id: NodeId,
    },
    SelfLoop {
        node_id: NodeId,
    },
    CycleDetected,
    InDegreeExceeded {
        node_id: NodeId,
        in_degree: usize,
    },
    InvalidRootCount {
        root_count: usize,
    },
    DisconnectedTree {
        unreachable_node_ids: Vec<NodeId>,
    },
    TopNodeMismatch {
        node_id: NodeId,
        is_top_node: bool,
    },
    UnknownNodeGroup {
        node_id: NodeId,
        nodegroup_id: NodeGroupId,
    },
    GroupParentMismatch {
        node_id: NodeId,
        nodegroup_id: NodeGroupId,
        expected_parent_id: NodeGroupId,
        actual_parent_id: Option<NodeGroupId>,
    },
}

impl GraphInvariantViolation {
    pub const fn error_code(&self) -> &'static str {
        match self {
            GraphInvariantViolation::UnknownNodeReference { .. } => "graph_unknown_node_reference",
            GraphInvariantViolation::SelfLoop { .. } => "graph_self_loop_violation",
            GraphInvariantViolation::CycleDetected => "graph_tree_cycle",
            GraphInvariantViolation::InDegreeExceeded { .. } => "graph_tree_indegree_exceeded",
            GraphInvariantViolation::InvalidRootCount { .. } => "graph_tree_root_count",
            GraphInvariantViolation::DisconnectedTree { .. } => "graph_tree_disconnected",
            GraphInvariantViolation::TopNodeMismatch { .. } => "graph_top_node_mismatch",
            GraphInvariantViolation::UnknownNodeGroup { .. } => "graph_unknown_nodegroup",
            GraphInvariantViolation::GroupParentMismatch { .. } => {
                "graph_nodegroup_parent_mismatch"
            }
        }
    }

    pub const fn public_message(&self) -> &'static str {
        match self {
            GraphInvariantViolation::UnknownNodeReference { .. } => {
                "Edge references a node that does not exist"
            }
            GraphInvariantViolation::SelfLoop { .. } => "Self-loop edges are not allowed",
            GraphInvariantViolation::CycleDetected => "Resource graphs must be acyclic",
            GraphInvariantViolation::InDegreeExceeded { .. } => {
                "Nodes cannot have more than one incoming edge"
            }
            GraphInvariantViolation::InvalidRootCount { .. } => {
                "Resource graphs must have exactly one root node"
            }
            GraphInvariantViolation::DisconnectedTree { .. } => {
                "Resource graphs must be rooted and connected"
            }
            GraphInvariantViolation::TopNodeMismatch { .. } => {
                "Only the root node may be flagged as the top node"
            }
            GraphInvariantViolation::UnknownNodeGroup { .. } => {
                "Node references a node-group that does not exist"
            }
            GraphInvariantViolation::GroupParentMismatch { .. } => {
                "Node-group parent does not match the group of the parent node"
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNode {
    pub id: Option<NodeId>,
    pub name: String,
    pub description: Option<String>,
    pub ontology_class: String,
    pub datatype: String,
    pub status: Option<String>,
    /// Defaults to the group of the node's parent; a root without a group
    /// gets a group anchored at itself.
    pub nodegroup_id: Option<NodeGroupId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEdge {
    pub id: Option<EdgeId>,
    pub domain_node_id: NodeId,
    pub range_node_id: NodeId,
    pub property: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNodeGroup {
    pub id: NodeGroupId,
    #[serde(default)]
    pub cardinality: Cardinality,
    pub parent_nodegroup_id: Option<NodeGroupId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGraphPayload {
    pub nodes: Vec<NewNode>,
    pub edges: Vec<NewEdge>,
    #[serde(default)]
    pub nodegroups: Vec<NewNodeGroup>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchPayload {
    pub name: String,
    pub description: Option<String>,
    pub nodes: Vec<NewNode>,
    pub edges: Vec<NewEdge>,
    #[serde(default)]
    pub nodegroups: Vec<NewNodeGroup>,
}

/// A normalized, invariant-checked graph ready to be persisted.
#[derive(Debug, Clone)]
pub struct GraphDefinition {
    pub graph_id: GraphId,
    pub root_node_id: NodeId,
    pub graph: ResourceGraph,
}

#[derive(Debug, Clone)]
pub struct BranchDefinition {
    pub name: String,
    pub description: Option<String>,
    pub definition: GraphDefinition,
}

impl CreateGraphPayload {
    pub fn normalize(self) -> Result<GraphDefinition> {
        normalize_graph_definition(self.nodes, self.edges, self.nodegroups)
    }
}

impl CreateBranchPayload {
    pub fn normalize(self) -> Result<BranchDefinition> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(LibError::invalid(
                "Branch name is required",
                anyhow!("empty branch name"),
            ));
        }

        let definition = normalize_graph_definition(self.nodes, self.edges, self.nodegroups)?;
        Ok(BranchDefinition {
            name,
            description: self.description,
            definition,
        })
    }
}

fn normalize_graph_definition(
    nodes: Vec<NewNode>,
    edges: Vec<NewEdge>,
    nodegroups: Vec<NewNodeGroup>,
) -> Result<GraphDefinition> {
    if nodes.is_empty() {
        return Err(LibError::invalid(
            "At least one node is required",
            anyhow!("graph has no nodes"),
        ));
    }

    let graph_id = GraphId::new_v4();
    let nodes = normalize_nodes(nodes)?;
    let edges = normalize_edges(graph_id, edges, &nodes)?;

    let mut groups = BTreeMap::new();
    for group in nodegroups {
        let normalized = NodeGroup {
            id: group.id,
            cardinality: group.cardinality,
            parent_nodegroup_id: group.parent_nodegroup_id,
        };
        if groups.insert(group.id, normalized).is_some() {
            return Err(LibError::invalid(
                "Node-group IDs must be unique within a graph",
                anyhow!("duplicate nodegroup id {}", group.id),
            ));
        }
    }

    let mut indegree: BTreeMap<NodeId, usize> = nodes.iter().map(|(_, id)| (*id, 0)).collect();
    let mut children: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for edge in &edges {
        *indegree.entry(edge.range_node_id).or_default() += 1;
        children
            .entry(edge.domain_node_id)
            .or_default()
            .push(edge.range_node_id);
    }
    let roots: Vec<NodeId> = indegree
        .iter()
        .filter_map(|(node_id, degree)| (*degree == 0).then_some(*node_id))
        .collect();
    let root_node_id = match roots.as_slice() {
        [root] => *root,
        _ => {
            let violation = GraphInvariantViolation::InvalidRootCount {
                root_count: roots.len(),
            };
            return Err(LibError::invalid_with_code(
                violation.error_code(),
                violation.public_message(),
                anyhow!("graph has {} roots", roots.len()),
            ));
        }
    };

    // Resolve inherited memberships top-down so every node lands in a group.
    let requested: BTreeMap<NodeId, (NewNode, Option<NodeGroupId>)> = nodes
        .into_iter()
        .map(|(node, id)| {
            let group = node.nodegroup_id;
            (id, (node, group))
        })
        .collect();
    let mut resolved: BTreeMap<NodeId, NodeGroupId> = BTreeMap::new();
    let mut queue = VecDeque::from([(root_node_id, None::<NodeGroupId>)]);
    while let Some((node_id, inherited)) = queue.pop_front() {
        if resolved.contains_key(&node_id) {
            continue;
        }
        let Some((_, requested_group)) = requested.get(&node_id) else {
            continue;
        };
        let group_id = match (requested_group, inherited) {
            (Some(group_id), _) => *group_id,
            (None, Some(parent_group)) => parent_group,
            (None, None) => {
                let anchored = NodeGroupId::anchored_at(node_id);
                groups.entry(anchored).or_insert(NodeGroup {
                    id: anchored,
                    cardinality: Cardinality::Single,
                    parent_nodegroup_id: None,
                });
                anchored
            }
        };
        resolved.insert(node_id, group_id);
        for child in children.get(&node_id).into_iter().flatten() {
            queue.push_back((*child, Some(group_id)));
        }
    }

    let mut graph = ResourceGraph::new();
    for group in groups.into_values() {
        graph.insert_nodegroup(group);
    }
    for (node_id, (node, requested_group)) in requested {
        // Unreachable nodes keep their requested group (or none) and are
        // reported by the invariant check below.
        let nodegroup_id = resolved
            .get(&node_id)
            .copied()
            .or(requested_group)
            .unwrap_or_else(|| NodeGroupId::anchored_at(node_id));
        graph.insert_node(Node {
            id: node_id,
            graph_id,
            name: node.name,
            description: node.description,
            is_top_node: node_id == root_node_id,
            ontology_class: node.ontology_class,
            datatype: node.datatype,
            status: node.status,
            nodegroup_id,
        });
    }
    for edge in edges {
        graph.insert_edge(edge);
    }

    invariants::ensure_graph_invariants(&graph)?;

    Ok(GraphDefinition {
        graph_id,
        root_node_id,
        graph,
    })
}

fn normalize_nodes(nodes: Vec<NewNode>) -> Result<Vec<(NewNode, NodeId)>> {
    let mut seen_nodes = HashSet::with_capacity(nodes.len());
    let mut output_nodes = Vec::with_capacity(nodes.len());
    for mut node in nodes {
        let node_id = node.id.unwrap_or_else(NodeId::new_v4);
        let name = node.name.trim().to_string();
        if name.is_empty() {
            return Err(LibError::invalid(
                "Node name is required",
                anyhow!("node {} had empty name", node_id),
            ));
        }

        if !seen_nodes.insert(node_id) {
            return Err(LibError::invalid(
                "Node IDs must be unique within a graph",
                anyhow!("duplicate node id {}", node_id),
            ));
        }

        node.name = name;
        output_nodes.push((node, node_id));
    }

    Ok(output_nodes)
}

fn normalize_edges(
    graph_id: GraphId,
    edges: Vec<NewEdge>,
    nodes: &[(NewNode, NodeId)],
) -> Result<Vec<Edge>> {
    let node_ids: HashSet<NodeId> = nodes.iter().map(|(_, id)| *id).collect();
    let mut seen_edges = HashSet::with_capacity(edges.len());
    let mut output_edges = Vec::with_capacity(edges.len());

    for edge in edges {
        if !node_ids.contains(&edge.domain_node_id) {
            return Err(LibError::invalid(
                "Edge domain node not found",
                anyhow!("missing domain_node_id {}", edge.domain_node_id),
            ));
        }
        if !node_ids.contains(&edge.range_node_id) {
            return Err(LibError::invalid(
                "Edge range node not found",
                anyhow!("missing range_node_id {}", edge.range_node_id),
            ));
        }
        let property = edge.property.trim().to_string();
        if property.is_empty() {
            return Err(LibError::invalid(
                "Edge property is required",
                anyhow!(
                    "edge {} -> {} had empty property",
                    edge.domain_node_id,
                    edge.range_node_id
                ),
            ));
        }

        if !seen_edges.insert((edge.domain_node_id, edge.range_node_id)) {
            continue;
        }

        output_edges.push(Edge {
            id: edge.id.unwrap_or_else(EdgeId::new_v4),
            graph_id,
            domain_node_id: edge.domain_node_id,
            range_node_id: edge.range_node_id,
            property,
        });
    }

    Ok(output_edges)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn new_node(id: NodeId, name: &str, nodegroup_id: Option<NodeGroupId>) -> NewNode {
        NewNode {
            id: Some(id),
            name: name.to_string(),
            description: None,
            ontology_class: "E1_CRM_Entity".to_string(),
            datatype: "string".to_string(),
            status: None,
            nodegroup_id,
        }
    }

    fn new_edge(domain: NodeId, range: NodeId) -> NewEdge {
        NewEdge {
            id: None,
            domain_node_id: domain,
            range_node_id: range,
            property: "P1_is_identified_by".to_string(),
        }
    }

    #[test]
    fn normalize_graph_generates_ids_and_root_group() {
        let payload = CreateGraphPayload {
            nodes: vec![NewNode {
                id: None,
                name: "  Heritage Resource ".to_string(),
                description: None,
                ontology_class: "E18_Physical_Thing".to_string(),
                datatype: "semantic".to_string(),
                status: None,
                nodegroup_id: None,
            }],
            edges: vec![],
            nodegroups: vec![],
        };

        let definition = payload.normalize().expect("payload should normalize");
        let root = definition
            .graph
            .node(definition.root_node_id)
            .expect("root should exist");
        assert_eq!(root.name, "Heritage Resource");
        assert!(root.is_top_node);
        assert!(root.nodegroup_id.is_anchored_at(root.id));
        assert_eq!(definition.graph.nodegroups().count(), 1);
    }

    #[test]
    fn normalize_graph_inherits_parent_group() {
        let root = NodeId::new_v4();
        let name = NodeId::new_v4();
        let names_group = NodeGroupId::anchored_at(name);
        let name_type = NodeId::new_v4();

        let payload = CreateGraphPayload {
            nodes: vec![
                new_node(root, "Resource", None),
                new_node(name, "Name", Some(names_group)),
                new_node(name_type, "Name Type", None),
            ],
            edges: vec![new_edge(root, name), new_edge(name, name_type)],
            nodegroups: vec![NewNodeGroup {
                id: names_group,
                cardinality: Cardinality::Many,
                parent_nodegroup_id: Some(NodeGroupId::anchored_at(root)),
            }],
        };

        let definition = payload.normalize().expect("payload should normalize");
        let graph = &definition.graph;
        assert_eq!(
            graph.node(name_type).map(|node| node.nodegroup_id),
            Some(names_group)
        );
        assert!(!graph.node(name).expect("name node").is_top_node);
    }

    #[test]
    fn normalize_graph_rejects_unknown_edge_nodes() {
        let node_id = NodeId::new_v4();
        let missing = NodeId::new_v4();
        let payload = CreateGraphPayload {
            nodes: vec![new_node(node_id, "Resource", None)],
            edges: vec![new_edge(node_id, missing)],
            nodegroups: vec![],
        };

        let err = payload.normalize().expect_err("should reject missing node");
        assert_eq!(err.public, "Edge range node not found");
    }

    #[test]
    fn normalize_graph_rejects_multiple_roots() {
        let payload = CreateGraphPayload {
            nodes: vec![
                new_node(NodeId::new_v4(), "A", None),
                new_node(NodeId::new_v4(), "B", None),
            ],
            edges: vec![],
            nodegroups: vec![],
        };

        let err = payload.normalize().expect_err("two roots should fail");
        assert_eq!(err.code, "graph_tree_root_count");
    }

    #[test]
    fn normalize_graph_rejects_group_parent_mismatch() {
        let root = NodeId::new_v4();
        let child = NodeId::new_v4();
        let child_group = NodeGroupId::anchored_at(child);

        let payload = CreateGraphPayload {
            nodes: vec![
                new_node(root, "Resource", None),
                new_node(child, "Child", Some(child_group)),
            ],
            edges: vec![new_edge(root, child)],
            nodegroups: vec![NewNodeGroup {
                id: child_group,
                cardinality: Cardinality::Many,
                parent_nodegroup_id: None,
            }],
        };

        let err = payload.normalize().expect_err("detached group should fail");
        assert_eq!(err.code, "graph_nodegroup_parent_mismatch");
    }

    #[test]
    fn normalize_branch_requires_name() {
        let payload = CreateBranchPayload {
            name: "   ".to_string(),
            description: None,
            nodes: vec![new_node(NodeId::new_v4(), "Name", None)],
            edges: vec![],
            nodegroups: vec![],
        };

        let err = payload.normalize().expect_err("blank branch name should fail");
        assert_eq!(err.public, "Branch name is required");
    }

    #[test]
    fn group_target_parses_tagged_actions() {
        let group = NodeGroupId::new_v4();
        let merge: GroupTarget =
            serde_json::from_value(json!({"action": "merge_into", "nodegroupId": group}))
                .expect("merge should parse");
        assert_eq!(merge, GroupTarget::MergeInto { nodegroup_id: group });

        let promote: GroupTarget = serde_json::from_value(json!({"action": "promote_new"}))
            .expect("promote should parse");
        assert_eq!(promote, GroupTarget::PromoteNew);

        let payload: UpdateNodePayload = serde_json::from_value(json!({
            "name": "Name",
            "description": null,
            "isTopNode": false,
            "ontologyClass": "E41_Appellation",
            "datatype": "string",
            "status": null
        }))
        .expect("payload without nodegroup should parse");
        assert_eq!(payload.nodegroup, GroupTarget::Unchanged);
    }

    #[test]
    fn cardinality_uses_db_values() {
        assert_eq!(Cardinality::from_db_value("n"), Some(Cardinality::Many));
        assert_eq!(Cardinality::Single.as_db_value(), "1");
        assert_eq!(
            serde_json::to_value(Cardinality::Many).expect("serialize"),
            json!("n")
        );
    }
}
