use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::models::{
    BranchId, BranchTemplate, Edge, EdgeId, Node, NodeGroup, NodeGroupId, NodeId,
};
use crate::store::GraphTransaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    PutNodeGroup(NodeGroup),
    PutNode(Node),
    PutEdge(Edge),
    PutBranch(BranchTemplate),
    DeleteBranch(BranchId),
    DeleteEdge(EdgeId),
    DeleteNode(NodeId),
    DeleteNodeGroup(NodeGroupId),
}

/// Writes collected by an engine and applied as one unit.
///
/// Writes are replayed in the order they were recorded, so callers record
/// groups before the nodes that reference them and edges before the nodes
/// they connect when deleting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    writes: Vec<PendingWrite>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_nodegroup(&mut self, group: NodeGroup) {
        self.writes.push(PendingWrite::PutNodeGroup(group));
    }

    pub fn put_node(&mut self, node: Node) {
        self.writes.push(PendingWrite::PutNode(node));
    }

    pub fn put_edge(&mut self, edge: Edge) {
        self.writes.push(PendingWrite::PutEdge(edge));
    }

    pub fn put_branch(&mut self, branch: BranchTemplate) {
        self.writes.push(PendingWrite::PutBranch(branch));
    }

    pub fn delete_edge(&mut self, edge_id: EdgeId) {
        self.writes.push(PendingWrite::DeleteEdge(edge_id));
    }

    pub fn delete_node(&mut self, node_id: NodeId) {
        self.writes.push(PendingWrite::DeleteNode(node_id));
    }

    pub fn delete_branch(&mut self, branch_id: BranchId) {
        self.writes.push(PendingWrite::DeleteBranch(branch_id));
    }

    pub fn delete_nodegroup(&mut self, nodegroup_id: NodeGroupId) {
        self.writes.push(PendingWrite::DeleteNodeGroup(nodegroup_id));
    }

    pub fn writes(&self) -> &[PendingWrite] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Replays the writes on an in-memory graph to obtain the post-image.
    pub fn apply_to(&self, graph: &mut ResourceGraph) {
        for write in &self.writes {
            match write {
                PendingWrite::PutNodeGroup(group) => {
                    graph.insert_nodegroup(group.clone());
                }
                PendingWrite::PutNode(node) => {
                    graph.insert_node(node.clone());
                }
                PendingWrite::PutEdge(edge) => {
                    graph.insert_edge(edge.clone());
                }
                PendingWrite::PutBranch(_) | PendingWrite::DeleteBranch(_) => {}
                PendingWrite::DeleteEdge(edge_id) => {
                    graph.remove_edge(*edge_id);
                }
                PendingWrite::DeleteNode(node_id) => {
                    graph.remove_node(*node_id);
                }
                PendingWrite::DeleteNodeGroup(nodegroup_id) => {
                    graph.remove_nodegroup(*nodegroup_id);
                }
            }
        }
    }

    /// Sends every write through an open transaction. The caller commits or
    /// rolls back; nothing here is visible until then.
    pub async fn write<T>(&self, tx: &mut T) -> Result<()>
    where
        T: GraphTransaction + ?Sized,
    {
        for write in &self.writes {
            match write {
                PendingWrite::PutNodeGroup(group) => tx.put_nodegroup(group).await?,
                PendingWrite::PutNode(node) => tx.put_node(node).await?,
                PendingWrite::PutEdge(edge) => tx.put_edge(edge).await?,
                PendingWrite::PutBranch(branch) => tx.put_branch(branch).await?,
                PendingWrite::DeleteBranch(branch_id) => tx.delete_branch(*branch_id).await?,
                PendingWrite::DeleteEdge(edge_id) => tx.delete_edge(*edge_id).await?,
                PendingWrite::DeleteNode(node_id) => tx.delete_node(*node_id).await?,
                PendingWrite::DeleteNodeGroup(nodegroup_id) => {
                    tx.delete_nodegroup(*nodegroup_id).await?
                }
            }
        }
        Ok(())
    }
}
