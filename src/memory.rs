use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{LibError, Result};
use crate::graph::ResourceGraph;
use crate::models::{
    BranchId, BranchTemplate, Edge, EdgeId, GraphId, Node, NodeGroup, NodeGroupId, NodeId,
};
use crate::store::{GraphStore, GraphTransaction};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    nodegroups: BTreeMap<NodeGroupId, NodeGroup>,
    branches: BTreeMap<BranchId, BranchTemplate>,
}

/// In-process store with serializable transactions.
///
/// A transaction holds the store lock and works on a staged copy of the
/// state, which replaces the committed state on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    failing_writes: Arc<Mutex<BTreeSet<Uuid>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `put_*` or `delete_*` of the entity with this id
    /// fail with a storage error. Used to exercise rollback paths.
    pub async fn fail_writes_to(&self, id: Uuid) {
        self.failing_writes.lock().await.insert(id);
    }

    pub async fn clear_write_failures(&self) {
        self.failing_writes.lock().await.clear();
    }

    pub async fn node_count(&self) -> usize {
        self.state.lock().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.state.lock().await.edges.len()
    }

    pub async fn nodegroup_count(&self) -> usize {
        self.state.lock().await.nodegroups.len()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTransaction {
            guard,
            staged,
            failing_writes: Arc::clone(&self.failing_writes),
        })
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    failing_writes: Arc<Mutex<BTreeSet<Uuid>>>,
}

impl MemoryTransaction {
    async fn check_write(&self, id: Uuid) -> Result<()> {
        if self.failing_writes.lock().await.contains(&id) {
            return Err(LibError::storage(
                "Failed to write graph entity",
                anyhow!("injected write failure for {}", id),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphTransaction for MemoryTransaction {
    async fn get_node(&mut self, node_id: NodeId) -> Result<Option<Node>> {
        Ok(self.staged.nodes.get(&node_id).cloned())
    }

    async fn get_edge(&mut self, edge_id: EdgeId) -> Result<Option<Edge>> {
        Ok(self.staged.edges.get(&edge_id).cloned())
    }

    async fn get_nodegroup(&mut self, nodegroup_id: NodeGroupId) -> Result<Option<NodeGroup>> {
        Ok(self.staged.nodegroups.get(&nodegroup_id).cloned())
    }

    async fn get_branch(&mut self, branch_id: BranchId) -> Result<Option<BranchTemplate>> {
        Ok(self.staged.branches.get(&branch_id).cloned())
    }

    async fn list_branches(&mut self) -> Result<Vec<BranchTemplate>> {
        let mut branches: Vec<BranchTemplate> = self.staged.branches.values().cloned().collect();
        branches.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(branches)
    }

    async fn load_graph(&mut self, graph_id: GraphId) -> Result<ResourceGraph> {
        let nodes: Vec<Node> = self
            .staged
            .nodes
            .values()
            .filter(|node| node.graph_id == graph_id)
            .cloned()
            .collect();
        let edges = self
            .staged
            .edges
            .values()
            .filter(|edge| edge.graph_id == graph_id)
            .cloned();
        let group_ids: BTreeSet<NodeGroupId> = nodes
            .iter()
            .flat_map(|node| [node.nodegroup_id, NodeGroupId::anchored_at(node.id)])
            .collect();
        let nodegroups = group_ids
            .into_iter()
            .filter_map(|group_id| self.staged.nodegroups.get(&group_id).cloned());

        Ok(ResourceGraph::from_parts(nodes, edges, nodegroups))
    }

    async fn put_node(&mut self, node: &Node) -> Result<()> {
        self.check_write(node.id.0).await?;
        self.staged.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn put_edge(&mut self, edge: &Edge) -> Result<()> {
        self.check_write(edge.id.0).await?;
        self.staged.edges.insert(edge.id, edge.clone());
        Ok(())
    }

    async fn put_nodegroup(&mut self, group: &NodeGroup) -> Result<()> {
        self.check_write(group.id.0).await?;
        self.staged.nodegroups.insert(group.id, group.clone());
        Ok(())
    }

    async fn put_branch(&mut self, branch: &BranchTemplate) -> Result<()> {
        self.check_write(branch.id.0).await?;
        self.staged.branches.insert(branch.id, branch.clone());
        Ok(())
    }

    async fn delete_node(&mut self, node_id: NodeId) -> Result<()> {
        self.check_write(node_id.0).await?;
        self.staged.nodes.remove(&node_id);
        Ok(())
    }

    async fn delete_edge(&mut self, edge_id: EdgeId) -> Result<()> {
        self.check_write(edge_id.0).await?;
        self.staged.edges.remove(&edge_id);
        Ok(())
    }

    async fn delete_nodegroup(&mut self, nodegroup_id: NodeGroupId) -> Result<()> {
        self.check_write(nodegroup_id.0).await?;
        self.staged.nodegroups.remove(&nodegroup_id);
        for group in self.staged.nodegroups.values_mut() {
            if group.parent_nodegroup_id == Some(nodegroup_id) {
                group.parent_nodegroup_id = None;
            }
        }
        Ok(())
    }

    async fn delete_branch(&mut self, branch_id: BranchId) -> Result<()> {
        self.check_write(branch_id.0).await?;
        self.staged.branches.remove(&branch_id);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let MemoryTransaction {
            mut guard, staged, ..
        } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
