//! Persistence boundary for resource graphs.
//!
//! Every public operation runs inside one [`GraphTransaction`]: reads and
//! writes go through it and nothing becomes visible until [`commit`]. Dropping
//! a transaction without committing discards it.
//!
//! [`commit`]: GraphTransaction::commit

use async_trait::async_trait;

use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::models::{
    BranchId, BranchTemplate, Edge, EdgeId, GraphId, Node, NodeGroup, NodeGroupId, NodeId,
};

#[async_trait]
pub trait GraphStore: Send + Sync {
    type Transaction: GraphTransaction;

    async fn begin(&self) -> Result<Self::Transaction>;
}

#[async_trait]
pub trait GraphTransaction: Send {
    async fn get_node(&mut self, node_id: NodeId) -> Result<Option<Node>>;

    async fn get_edge(&mut self, edge_id: EdgeId) -> Result<Option<Edge>>;

    async fn get_nodegroup(&mut self, nodegroup_id: NodeGroupId) -> Result<Option<NodeGroup>>;

    async fn get_branch(&mut self, branch_id: BranchId) -> Result<Option<BranchTemplate>>;

    async fn list_branches(&mut self) -> Result<Vec<BranchTemplate>>;

    /// Every node and edge partitioned under `graph_id`, plus the node-groups
    /// those nodes reference or anchor.
    async fn load_graph(&mut self, graph_id: GraphId) -> Result<ResourceGraph>;

    async fn put_node(&mut self, node: &Node) -> Result<()>;

    async fn put_edge(&mut self, edge: &Edge) -> Result<()>;

    async fn put_nodegroup(&mut self, group: &NodeGroup) -> Result<()>;

    async fn put_branch(&mut self, branch: &BranchTemplate) -> Result<()>;

    async fn delete_node(&mut self, node_id: NodeId) -> Result<()>;

    async fn delete_edge(&mut self, edge_id: EdgeId) -> Result<()>;

    async fn delete_nodegroup(&mut self, nodegroup_id: NodeGroupId) -> Result<()>;

    async fn delete_branch(&mut self, branch_id: BranchId) -> Result<()>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
