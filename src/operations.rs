use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::datatypes::DatatypeRegistry;
use crate::deletion;
use crate::error::{LibError, Result};
use crate::grafting;
use crate::graph::ResourceGraph;
use crate::invariants;
use crate::membership;
use crate::models::{
    BranchId, BranchLibraryEntry, BranchTemplate, CreateBranchPayload, CreateGraphPayload,
    DeletedSubgraph, DownstreamSet, GraftedSubgraph, GraphModel, GroupTarget, Node, NodeId,
    NodeUpdate, UpdateNodePayload,
};
use crate::store::{GraphStore, GraphTransaction};
use crate::unit_of_work::UnitOfWork;

/// Every graph operation as one tagged request, for tool and RPC callers.
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "operation",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum GraphOperation {
    LoadGraph {
        root_node_id: NodeId,
    },
    ComputeDownstream {
        node_id: NodeId,
    },
    UpdateNode {
        node_id: NodeId,
        payload: UpdateNodePayload,
    },
    DeleteNode {
        node_id: NodeId,
    },
    AppendBranch {
        target_node_id: NodeId,
        property: String,
        branch_id: BranchId,
    },
    CreateGraph {
        payload: CreateGraphPayload,
    },
    CreateBranch {
        payload: CreateBranchPayload,
    },
    ListBranches,
    ListDatatypes,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum GraphOperationResult {
    Graph { graph: GraphModel },
    Downstream { downstream: DownstreamSet },
    NodeUpdated { update: NodeUpdate },
    Deleted { deleted: DeletedSubgraph },
    Grafted { grafted: GraftedSubgraph },
    Branch { branch: BranchTemplate },
    Branches { branches: Vec<BranchLibraryEntry> },
    Datatypes { datatypes: Vec<String> },
}

/// High-level graph actions. Each call runs in exactly one store
/// transaction, which is committed on success and rolled back on any error.
pub struct GraphOperations<S: GraphStore> {
    store: Arc<S>,
    config: EngineConfig,
    datatypes: DatatypeRegistry,
}

impl<S: GraphStore> Clone for GraphOperations<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            datatypes: self.datatypes.clone(),
        }
    }
}

impl<S: GraphStore> GraphOperations<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            datatypes: DatatypeRegistry::default(),
        }
    }

    pub fn with_datatypes(mut self, datatypes: DatatypeRegistry) -> Self {
        self.datatypes = datatypes;
        self
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn execute(&self, operation: GraphOperation) -> Result<GraphOperationResult> {
        match operation {
            GraphOperation::LoadGraph { root_node_id } => {
                let graph = self.load_graph(root_node_id).await?;
                Ok(GraphOperationResult::Graph { graph })
            }
            GraphOperation::ComputeDownstream { node_id } => {
                let downstream = self.compute_downstream(node_id).await?;
                Ok(GraphOperationResult::Downstream { downstream })
            }
            GraphOperation::UpdateNode { node_id, payload } => {
                let update = self.update_node(node_id, payload).await?;
                Ok(GraphOperationResult::NodeUpdated { update })
            }
            GraphOperation::DeleteNode { node_id } => {
                let deleted = self.delete_node(node_id).await?;
                Ok(GraphOperationResult::Deleted { deleted })
            }
            GraphOperation::AppendBranch {
                target_node_id,
                property,
                branch_id,
            } => {
                let grafted = self
                    .append_branch(target_node_id, &property, branch_id)
                    .await?;
                Ok(GraphOperationResult::Grafted { grafted })
            }
            GraphOperation::CreateGraph { payload } => {
                let graph = self.create_graph(payload).await?;
                Ok(GraphOperationResult::Graph { graph })
            }
            GraphOperation::CreateBranch { payload } => {
                let branch = self.create_branch(payload).await?;
                Ok(GraphOperationResult::Branch { branch })
            }
            GraphOperation::ListBranches => {
                let branches = self.list_branches().await?;
                Ok(GraphOperationResult::Branches { branches })
            }
            GraphOperation::ListDatatypes => Ok(GraphOperationResult::Datatypes {
                datatypes: self.list_datatypes(),
            }),
        }
    }

    /// Every node and edge reachable from `root_node_id`, sorted by id.
    pub async fn load_graph(&self, root_node_id: NodeId) -> Result<GraphModel> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let graph = load_containing_graph(&mut tx, root_node_id).await?;
            Ok::<_, LibError>(graph.subgraph_from(root_node_id).to_model(root_node_id))
        }
        .await;
        let model: GraphModel = finish(tx, outcome).await?;

        tracing::debug!(
            root_node_id = %root_node_id,
            nodes = model.nodes.len(),
            edges = model.edges.len(),
            "loaded graph"
        );
        Ok(model)
    }

    pub async fn compute_downstream(&self, node_id: NodeId) -> Result<DownstreamSet> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let graph = load_containing_graph(&mut tx, node_id).await?;
            membership::compute_downstream(&graph, node_id)
        }
        .await;
        finish(tx, outcome).await
    }

    /// Applies field edits to a node and carries out its requested group
    /// change, moving the node's downstream set with it.
    pub async fn update_node(
        &self,
        node_id: NodeId,
        payload: UpdateNodePayload,
    ) -> Result<NodeUpdate> {
        self.warn_unknown_datatype(node_id, &payload.datatype);

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let graph = load_containing_graph(&mut tx, node_id).await?;
            if let GroupTarget::MergeInto { nodegroup_id } = payload.nodegroup
                && graph.nodegroup(nodegroup_id).is_none()
                && tx.get_nodegroup(nodegroup_id).await?.is_some()
            {
                return Err(LibError::conflict(
                    "Nodes can only merge into an ancestor group",
                    anyhow!(
                        "nodegroup {} belongs to another graph than node {}",
                        nodegroup_id,
                        node_id
                    ),
                ));
            }
            let plan = membership::plan_reassignment(&graph, node_id, payload, &self.config)?;
            self.verify(&graph, &plan.unit_of_work)?;
            plan.unit_of_work.write(&mut tx).await?;
            Ok::<_, LibError>(plan.update)
        }
        .await;
        let update = finish(tx, outcome).await?;

        tracing::info!(
            node_id = %node_id,
            nodegroup_id = %update.node.nodegroup_id,
            moved = update.group_nodes.len(),
            reparented = update.updated_nodegroups.len(),
            "updated node"
        );
        Ok(update)
    }

    /// Removes a node with its entire subtree, any node-group left without
    /// members or anchor, and any branch template rooted in the subtree.
    pub async fn delete_node(&self, node_id: NodeId) -> Result<DeletedSubgraph> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let graph = load_containing_graph(&mut tx, node_id).await?;
            let branches = tx.list_branches().await?;
            let plan = deletion::plan_deletion(&graph, node_id, &branches)?;
            self.verify(&graph, &plan.unit_of_work)?;
            plan.unit_of_work.write(&mut tx).await?;
            Ok::<_, LibError>(plan.deleted)
        }
        .await;
        let deleted = finish(tx, outcome).await?;

        tracing::info!(
            node_id = %node_id,
            nodes = deleted.node_ids.len(),
            edges = deleted.edge_ids.len(),
            nodegroups = deleted.nodegroup_ids.len(),
            branches = deleted.branch_ids.len(),
            "deleted node"
        );
        Ok(deleted)
    }

    /// Grafts a fresh copy of a branch template under `target_node_id`.
    pub async fn append_branch(
        &self,
        target_node_id: NodeId,
        property: &str,
        branch_id: BranchId,
    ) -> Result<GraftedSubgraph> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let branch = tx.get_branch(branch_id).await?.ok_or_else(|| {
                LibError::not_found(
                    "Branch not found",
                    anyhow!("branch {} not found", branch_id),
                )
            })?;
            let target_node = tx.get_node(target_node_id).await?.ok_or_else(|| {
                LibError::conflict(
                    "Target node not found",
                    anyhow!("graft target {} not found", target_node_id),
                )
            })?;
            let template = tx.load_graph(branch.graph_id).await?;
            let target = tx.load_graph(target_node.graph_id).await?;

            let plan = grafting::plan_graft(&target, target_node_id, property, &branch, &template)?;
            self.verify(&target, &plan.unit_of_work)?;
            plan.unit_of_work.write(&mut tx).await?;
            Ok::<_, LibError>(plan.grafted)
        }
        .await;
        let grafted = finish(tx, outcome).await?;

        tracing::info!(
            branch_id = %branch_id,
            target_node_id = %target_node_id,
            root_node_id = %grafted.root_node_id,
            nodes = grafted.nodes.len(),
            "appended branch"
        );
        Ok(grafted)
    }

    pub async fn create_graph(&self, payload: CreateGraphPayload) -> Result<GraphModel> {
        let definition = payload.normalize()?;
        for node in definition.graph.nodes() {
            self.warn_unknown_datatype(node.id, &node.datatype);
        }

        let mut tx = self.store.begin().await?;
        let outcome = async {
            ensure_ids_unused(&mut tx, &definition.graph).await?;
            whole_graph_writes(&definition.graph).write(&mut tx).await
        }
        .await;
        finish(tx, outcome).await?;

        tracing::info!(
            graph_id = %definition.graph_id,
            root_node_id = %definition.root_node_id,
            nodes = definition.graph.node_count(),
            "created graph"
        );
        Ok(definition.graph.to_model(definition.root_node_id))
    }

    /// Stores a template graph and the branch record naming its root.
    pub async fn create_branch(&self, payload: CreateBranchPayload) -> Result<BranchTemplate> {
        let branch = payload.normalize()?;
        for node in branch.definition.graph.nodes() {
            self.warn_unknown_datatype(node.id, &node.datatype);
        }

        let template = BranchTemplate {
            id: BranchId::new_v4(),
            name: branch.name,
            description: branch.description,
            graph_id: branch.definition.graph_id,
            root_node_id: branch.definition.root_node_id,
            created_at: Utc::now().naive_utc(),
        };
        let mut unit_of_work = whole_graph_writes(&branch.definition.graph);
        unit_of_work.put_branch(template.clone());

        let mut tx = self.store.begin().await?;
        let outcome = async {
            ensure_ids_unused(&mut tx, &branch.definition.graph).await?;
            unit_of_work.write(&mut tx).await
        }
        .await;
        finish(tx, outcome).await?;

        tracing::info!(
            branch_id = %template.id,
            name = %template.name,
            nodes = branch.definition.graph.node_count(),
            "created branch"
        );
        Ok(template)
    }

    /// The branch library: every template with its root node and graph.
    pub async fn list_branches(&self) -> Result<Vec<BranchLibraryEntry>> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let mut entries = Vec::new();
            for branch in tx.list_branches().await? {
                let graph = tx.load_graph(branch.graph_id).await?;
                let Some(root_node) = graph.node(branch.root_node_id).cloned() else {
                    tracing::warn!(
                        branch_id = %branch.id,
                        root_node_id = %branch.root_node_id,
                        "skipping branch without a root node"
                    );
                    continue;
                };
                let graph = graph.subgraph_from(root_node.id).to_model(root_node.id);
                entries.push(BranchLibraryEntry {
                    branch,
                    root_node,
                    graph,
                });
            }
            Ok::<_, LibError>(entries)
        }
        .await;
        finish(tx, outcome).await
    }

    pub fn list_datatypes(&self) -> Vec<String> {
        self.datatypes.tags()
    }

    fn verify(&self, pre_image: &ResourceGraph, unit_of_work: &UnitOfWork) -> Result<()> {
        if !self.config.verify_invariants {
            return Ok(());
        }
        let mut post_image = pre_image.clone();
        unit_of_work.apply_to(&mut post_image);
        invariants::ensure_graph_invariants(&post_image)
    }

    fn warn_unknown_datatype(&self, node_id: NodeId, datatype: &str) {
        if !self.datatypes.contains(datatype) {
            tracing::warn!(node_id = %node_id, datatype, "unknown datatype tag");
        }
    }
}

async fn load_containing_graph<T: GraphTransaction>(
    tx: &mut T,
    node_id: NodeId,
) -> Result<ResourceGraph> {
    let node: Node = tx.get_node(node_id).await?.ok_or_else(|| {
        LibError::not_found("Node not found", anyhow!("node {} not found", node_id))
    })?;
    tx.load_graph(node.graph_id).await
}

/// Authored graphs only ever insert; an id already stored anywhere is refused.
async fn ensure_ids_unused<T: GraphTransaction>(
    tx: &mut T,
    graph: &ResourceGraph,
) -> Result<()> {
    for group in graph.nodegroups() {
        if tx.get_nodegroup(group.id).await?.is_some() {
            return Err(LibError::conflict(
                "Node-group ID already exists",
                anyhow!("nodegroup {} already stored", group.id),
            ));
        }
    }
    for node in graph.nodes() {
        if tx.get_node(node.id).await?.is_some() {
            return Err(LibError::conflict(
                "Node ID already exists",
                anyhow!("node {} already stored", node.id),
            ));
        }
    }
    for edge in graph.edges() {
        if tx.get_edge(edge.id).await?.is_some() {
            return Err(LibError::conflict(
                "Edge ID already exists",
                anyhow!("edge {} already stored", edge.id),
            ));
        }
    }
    Ok(())
}

fn whole_graph_writes(graph: &ResourceGraph) -> UnitOfWork {
    let mut unit_of_work = UnitOfWork::new();
    for group in graph.nodegroups() {
        unit_of_work.put_nodegroup(group.clone());
    }
    for node in graph.nodes() {
        unit_of_work.put_node(node.clone());
    }
    for edge in graph.edges() {
        unit_of_work.put_edge(edge.clone());
    }
    unit_of_work
}

async fn finish<T, X: GraphTransaction>(tx: X, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "failed to roll back graph transaction");
            }
            Err(err)
        }
    }
}
