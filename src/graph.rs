use std::collections::{BTreeMap, BTreeSet};

use crate::algorithms;
use crate::models::{Edge, EdgeId, GraphModel, Node, NodeGroup, NodeGroupId, NodeId};

/// Arena of the nodes, edges and node-groups of one resource graph.
///
/// Entities reference each other by id only. Adjacency indexes are kept in
/// step with the edge map by the insert/remove methods.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    nodegroups: BTreeMap<NodeGroupId, NodeGroup>,
    outgoing: BTreeMap<NodeId, BTreeSet<EdgeId>>,
    incoming: BTreeMap<NodeId, BTreeSet<EdgeId>>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
        nodegroups: impl IntoIterator<Item = NodeGroup>,
    ) -> Self {
        let mut graph = Self::new();
        for group in nodegroups {
            graph.insert_nodegroup(group);
        }
        for node in nodes {
            graph.insert_node(node);
        }
        for edge in edges {
            graph.insert_edge(edge);
        }
        graph
    }

    pub fn insert_node(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.id, node)
    }

    pub fn insert_edge(&mut self, edge: Edge) -> Option<Edge> {
        let previous = self.remove_edge(edge.id);
        self.outgoing
            .entry(edge.domain_node_id)
            .or_default()
            .insert(edge.id);
        self.incoming
            .entry(edge.range_node_id)
            .or_default()
            .insert(edge.id);
        self.edges.insert(edge.id, edge);
        previous
    }

    pub fn insert_nodegroup(&mut self, group: NodeGroup) -> Option<NodeGroup> {
        self.nodegroups.insert(group.id, group)
    }

    /// Removes the node only; edges touching it stay until removed explicitly.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        self.nodes.remove(&node_id)
    }

    pub fn remove_edge(&mut self, edge_id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&edge_id)?;
        if let Some(ids) = self.outgoing.get_mut(&edge.domain_node_id) {
            ids.remove(&edge_id);
            if ids.is_empty() {
                self.outgoing.remove(&edge.domain_node_id);
            }
        }
        if let Some(ids) = self.incoming.get_mut(&edge.range_node_id) {
            ids.remove(&edge_id);
            if ids.is_empty() {
                self.incoming.remove(&edge.range_node_id);
            }
        }
        Some(edge)
    }

    pub fn remove_nodegroup(&mut self, nodegroup_id: NodeGroupId) -> Option<NodeGroup> {
        self.nodegroups.remove(&nodegroup_id)
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn edge(&self, edge_id: EdgeId) -> Option<&Edge> {
        self.edges.get(&edge_id)
    }

    pub fn nodegroup(&self, nodegroup_id: NodeGroupId) -> Option<&NodeGroup> {
        self.nodegroups.get(&nodegroup_id)
    }

    pub fn contains_node(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn nodegroups(&self) -> impl Iterator<Item = &NodeGroup> {
        self.nodegroups.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn incoming_edges(&self, node_id: NodeId) -> impl Iterator<Item = &Edge> {
        self.incoming
            .get(&node_id)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| self.edges.get(edge_id))
    }

    pub fn outgoing_edges(&self, node_id: NodeId) -> impl Iterator<Item = &Edge> {
        self.outgoing
            .get(&node_id)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| self.edges.get(edge_id))
    }

    /// The single incoming edge of a non-root node.
    pub fn incoming_edge(&self, node_id: NodeId) -> Option<&Edge> {
        self.incoming_edges(node_id).next()
    }

    pub fn in_degree(&self, node_id: NodeId) -> usize {
        self.incoming.get(&node_id).map_or(0, BTreeSet::len)
    }

    pub fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.incoming_edge(node_id).map(|edge| edge.domain_node_id)
    }

    pub fn children(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing_edges(node_id).map(|edge| edge.range_node_id)
    }

    /// Nodes with no incoming edge.
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .filter(|node_id| self.in_degree(**node_id) == 0)
            .copied()
            .collect()
    }

    /// A node is a collector when it is where a child group is entered: its
    /// parent sits in a different group.
    pub fn is_collector(&self, node_id: NodeId) -> bool {
        let Some(node) = self.node(node_id) else {
            return false;
        };
        self.parent(node_id)
            .and_then(|parent_id| self.node(parent_id))
            .is_some_and(|parent| parent.nodegroup_id != node.nodegroup_id)
    }

    /// Ancestors of a group following parent pointers, nearest first.
    pub fn nodegroup_ancestors(&self, nodegroup_id: NodeGroupId) -> Vec<NodeGroupId> {
        let mut ancestors = Vec::new();
        let mut seen = BTreeSet::from([nodegroup_id]);
        let mut current = self
            .nodegroup(nodegroup_id)
            .and_then(|group| group.parent_nodegroup_id);
        while let Some(group_id) = current {
            if !seen.insert(group_id) {
                break;
            }
            ancestors.push(group_id);
            current = self
                .nodegroup(group_id)
                .and_then(|group| group.parent_nodegroup_id);
        }
        ancestors
    }

    /// Everything reachable from `root_node_id`, with the groups the reached
    /// nodes belong to.
    pub fn subgraph_from(&self, root_node_id: NodeId) -> ResourceGraph {
        let subtree = algorithms::subtree(self, root_node_id);
        let nodes: Vec<Node> = std::iter::once(root_node_id)
            .chain(subtree.nodes.iter().copied())
            .filter_map(|node_id| self.node(node_id).cloned())
            .collect();
        let group_ids: BTreeSet<NodeGroupId> = nodes.iter().map(|node| node.nodegroup_id).collect();
        let groups: Vec<NodeGroup> = group_ids
            .into_iter()
            .filter_map(|group_id| self.nodegroup(group_id).cloned())
            .collect();
        let edges: Vec<Edge> = subtree
            .edges
            .iter()
            .filter_map(|edge_id| self.edge(*edge_id).cloned())
            .collect();

        ResourceGraph::from_parts(nodes, edges, groups)
    }

    pub fn to_model(&self, root_node_id: NodeId) -> GraphModel {
        GraphModel {
            root_node_id,
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
            nodegroups: self.nodegroups.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cardinality, GraphId};

    fn node(graph_id: GraphId, id: NodeId, group: NodeGroupId) -> Node {
        Node {
            id,
            graph_id,
            name: "N".to_string(),
            description: None,
            is_top_node: false,
            ontology_class: "E1_CRM_Entity".to_string(),
            datatype: "string".to_string(),
            status: None,
            nodegroup_id: group,
        }
    }

    fn edge(graph_id: GraphId, from: NodeId, to: NodeId) -> Edge {
        Edge {
            id: EdgeId::new_v4(),
            graph_id,
            domain_node_id: from,
            range_node_id: to,
            property: "P1".to_string(),
        }
    }

    #[test]
    fn edge_indexes_follow_inserts_and_removals() {
        let graph_id = GraphId::new_v4();
        let (a, b) = (NodeId::new_v4(), NodeId::new_v4());
        let group = NodeGroupId::anchored_at(a);
        let link = edge(graph_id, a, b);
        let link_id = link.id;

        let mut graph = ResourceGraph::from_parts(
            [node(graph_id, a, group), node(graph_id, b, group)],
            [link],
            [NodeGroup {
                id: group,
                cardinality: Cardinality::Single,
                parent_nodegroup_id: None,
            }],
        );
        assert_eq!(graph.parent(b), Some(a));
        assert_eq!(graph.children(a).collect::<Vec<_>>(), vec![b]);
        assert_eq!(graph.roots(), vec![a]);

        graph.remove_edge(link_id);
        assert_eq!(graph.parent(b), None);
        assert_eq!(graph.children(a).count(), 0);
        assert_eq!(graph.roots().len(), 2);
    }

    #[test]
    fn collectors_sit_below_a_group_boundary() {
        let graph_id = GraphId::new_v4();
        let (a, b, c) = (NodeId::new_v4(), NodeId::new_v4(), NodeId::new_v4());
        let outer = NodeGroupId::anchored_at(a);
        let inner = NodeGroupId::anchored_at(b);
        let graph = ResourceGraph::from_parts(
            [
                node(graph_id, a, outer),
                node(graph_id, b, inner),
                node(graph_id, c, inner),
            ],
            [edge(graph_id, a, b), edge(graph_id, b, c)],
            [
                NodeGroup {
                    id: outer,
                    cardinality: Cardinality::Single,
                    parent_nodegroup_id: None,
                },
                NodeGroup {
                    id: inner,
                    cardinality: Cardinality::Many,
                    parent_nodegroup_id: Some(outer),
                },
            ],
        );

        assert!(!graph.is_collector(a));
        assert!(graph.is_collector(b));
        assert!(!graph.is_collector(c));
        assert_eq!(graph.nodegroup_ancestors(inner), vec![outer]);
    }

    #[test]
    fn subgraph_from_keeps_only_reachable_entities() {
        let graph_id = GraphId::new_v4();
        let (a, b, c) = (NodeId::new_v4(), NodeId::new_v4(), NodeId::new_v4());
        let group = NodeGroupId::anchored_at(a);
        let graph = ResourceGraph::from_parts(
            [
                node(graph_id, a, group),
                node(graph_id, b, group),
                node(graph_id, c, group),
            ],
            [edge(graph_id, a, b), edge(graph_id, a, c)],
            [NodeGroup {
                id: group,
                cardinality: Cardinality::Single,
                parent_nodegroup_id: None,
            }],
        );

        let sub = graph.subgraph_from(b);
        assert_eq!(sub.node_count(), 1);
        assert_eq!(sub.edge_count(), 0);
        assert!(sub.nodegroup(group).is_some());
    }
}
