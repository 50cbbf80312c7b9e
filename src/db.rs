use std::collections::BTreeSet;

use anyhow::anyhow;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{LibError, Result};
use crate::graph::ResourceGraph;
use crate::models::{
    BranchId, BranchTemplate, Cardinality, Edge, EdgeId, GraphId, Node, NodeGroup, NodeGroupId,
    NodeId,
};
use crate::store::{GraphStore, GraphTransaction};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_graph_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[derive(Debug, Clone, FromRow)]
struct NodeRow {
    id: Uuid,
    graph_id: Uuid,
    name: String,
    description: Option<String>,
    is_top_node: bool,
    ontology_class: String,
    datatype: String,
    status: Option<String>,
    nodegroup_id: Uuid,
}

#[derive(Debug, Clone, FromRow)]
struct EdgeRow {
    id: Uuid,
    graph_id: Uuid,
    domain_node_id: Uuid,
    range_node_id: Uuid,
    property: String,
}

#[derive(Debug, Clone, FromRow)]
struct NodeGroupRow {
    id: Uuid,
    cardinality: String,
    parent_nodegroup_id: Option<Uuid>,
}

#[derive(Debug, Clone, FromRow)]
struct BranchRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    graph_id: Uuid,
    root_node_id: Uuid,
    created_at: chrono::NaiveDateTime,
}

impl From<NodeRow> for Node {
    fn from(value: NodeRow) -> Self {
        Self {
            id: NodeId(value.id),
            graph_id: GraphId(value.graph_id),
            name: value.name,
            description: value.description,
            is_top_node: value.is_top_node,
            ontology_class: value.ontology_class,
            datatype: value.datatype,
            status: value.status,
            nodegroup_id: NodeGroupId(value.nodegroup_id),
        }
    }
}

impl From<EdgeRow> for Edge {
    fn from(value: EdgeRow) -> Self {
        Self {
            id: EdgeId(value.id),
            graph_id: GraphId(value.graph_id),
            domain_node_id: NodeId(value.domain_node_id),
            range_node_id: NodeId(value.range_node_id),
            property: value.property,
        }
    }
}

impl TryFrom<NodeGroupRow> for NodeGroup {
    type Error = LibError;

    fn try_from(value: NodeGroupRow) -> Result<Self> {
        let cardinality = Cardinality::from_db_value(&value.cardinality).ok_or_else(|| {
            LibError::storage(
                "Stored node-group is malformed",
                anyhow!(
                    "nodegroup {} has unknown cardinality '{}'",
                    value.id,
                    value.cardinality
                ),
            )
        })?;
        Ok(Self {
            id: NodeGroupId(value.id),
            cardinality,
            parent_nodegroup_id: value.parent_nodegroup_id.map(NodeGroupId),
        })
    }
}

impl From<BranchRow> for BranchTemplate {
    fn from(value: BranchRow) -> Self {
        Self {
            id: BranchId(value.id),
            name: value.name,
            description: value.description,
            graph_id: GraphId(value.graph_id),
            root_node_id: NodeId(value.root_node_id),
            created_at: value.created_at,
        }
    }
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::storage(public, anyhow!(err))
}

/// Postgres-backed store. Foreign keys are deferred to commit so a unit of
/// work may write rows in any order.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool and applies pending migrations.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|err| db_err("Failed to connect to database", err))?;
        create_graph_tables(&pool).await.map_err(|err| {
            LibError::storage("Failed to apply graph migrations", anyhow!(err))
        })?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl GraphStore for PgStore {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;
        sqlx::query("SET CONSTRAINTS ALL DEFERRED")
            .execute(&mut *tx)
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;
        Ok(PgTransaction { tx })
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl GraphTransaction for PgTransaction {
    async fn get_node(&mut self, node_id: NodeId) -> Result<Option<Node>> {
        let row = sqlx::query_as::<_, NodeRow>(
            r#"
            SELECT id, graph_id, name, description, is_top_node, ontology_class,
                   datatype, status, nodegroup_id
            FROM resource_graph.nodes
            WHERE id = $1
            "#,
        )
        .bind(node_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query node", err))?;

        Ok(row.map(Node::from))
    }

    async fn get_edge(&mut self, edge_id: EdgeId) -> Result<Option<Edge>> {
        let row = sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT id, graph_id, domain_node_id, range_node_id, property
            FROM resource_graph.edges
            WHERE id = $1
            "#,
        )
        .bind(edge_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query edge", err))?;

        Ok(row.map(Edge::from))
    }

    async fn get_nodegroup(&mut self, nodegroup_id: NodeGroupId) -> Result<Option<NodeGroup>> {
        let row = sqlx::query_as::<_, NodeGroupRow>(
            r#"
            SELECT id, cardinality, parent_nodegroup_id
            FROM resource_graph.node_groups
            WHERE id = $1
            "#,
        )
        .bind(nodegroup_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query node-group", err))?;

        row.map(NodeGroup::try_from).transpose()
    }

    async fn get_branch(&mut self, branch_id: BranchId) -> Result<Option<BranchTemplate>> {
        let row = sqlx::query_as::<_, BranchRow>(
            r#"
            SELECT id, name, description, graph_id, root_node_id, created_at
            FROM resource_graph.branch_templates
            WHERE id = $1
            "#,
        )
        .bind(branch_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query branch", err))?;

        Ok(row.map(BranchTemplate::from))
    }

    async fn list_branches(&mut self) -> Result<Vec<BranchTemplate>> {
        let rows = sqlx::query_as::<_, BranchRow>(
            r#"
            SELECT id, name, description, graph_id, root_node_id, created_at
            FROM resource_graph.branch_templates
            ORDER BY name ASC, id ASC
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to list branches", err))?;

        Ok(rows.into_iter().map(BranchTemplate::from).collect())
    }

    async fn load_graph(&mut self, graph_id: GraphId) -> Result<ResourceGraph> {
        let nodes: Vec<Node> = sqlx::query_as::<_, NodeRow>(
            r#"
            SELECT id, graph_id, name, description, is_top_node, ontology_class,
                   datatype, status, nodegroup_id
            FROM resource_graph.nodes
            WHERE graph_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(graph_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query graph nodes", err))?
        .into_iter()
        .map(Node::from)
        .collect();

        let edges: Vec<Edge> = sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT id, graph_id, domain_node_id, range_node_id, property
            FROM resource_graph.edges
            WHERE graph_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(graph_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query graph edges", err))?
        .into_iter()
        .map(Edge::from)
        .collect();

        let group_ids: Vec<Uuid> = nodes
            .iter()
            .flat_map(|node| [node.nodegroup_id.0, node.id.0])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let nodegroups = sqlx::query_as::<_, NodeGroupRow>(
            r#"
            SELECT id, cardinality, parent_nodegroup_id
            FROM resource_graph.node_groups
            WHERE id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(&group_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query graph node-groups", err))?
        .into_iter()
        .map(NodeGroup::try_from)
        .collect::<Result<Vec<_>>>()?;

        Ok(ResourceGraph::from_parts(nodes, edges, nodegroups))
    }

    async fn put_node(&mut self, node: &Node) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_graph.nodes (
                id, graph_id, name, description, is_top_node, ontology_class,
                datatype, status, nodegroup_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE
            SET graph_id = EXCLUDED.graph_id,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                is_top_node = EXCLUDED.is_top_node,
                ontology_class = EXCLUDED.ontology_class,
                datatype = EXCLUDED.datatype,
                status = EXCLUDED.status,
                nodegroup_id = EXCLUDED.nodegroup_id
            "#,
        )
        .bind(node.id.0)
        .bind(node.graph_id.0)
        .bind(&node.name)
        .bind(&node.description)
        .bind(node.is_top_node)
        .bind(&node.ontology_class)
        .bind(&node.datatype)
        .bind(&node.status)
        .bind(node.nodegroup_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to write node", err))?;

        Ok(())
    }

    async fn put_edge(&mut self, edge: &Edge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_graph.edges (
                id, graph_id, domain_node_id, range_node_id, property
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET graph_id = EXCLUDED.graph_id,
                domain_node_id = EXCLUDED.domain_node_id,
                range_node_id = EXCLUDED.range_node_id,
                property = EXCLUDED.property
            "#,
        )
        .bind(edge.id.0)
        .bind(edge.graph_id.0)
        .bind(edge.domain_node_id.0)
        .bind(edge.range_node_id.0)
        .bind(&edge.property)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to write edge", err))?;

        Ok(())
    }

    async fn put_nodegroup(&mut self, group: &NodeGroup) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_graph.node_groups (id, cardinality, parent_nodegroup_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET cardinality = EXCLUDED.cardinality,
                parent_nodegroup_id = EXCLUDED.parent_nodegroup_id
            "#,
        )
        .bind(group.id.0)
        .bind(group.cardinality.as_db_value())
        .bind(group.parent_nodegroup_id.map(|id| id.0))
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to write node-group", err))?;

        Ok(())
    }

    async fn put_branch(&mut self, branch: &BranchTemplate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_graph.branch_templates (
                id, name, description, graph_id, root_node_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                root_node_id = EXCLUDED.root_node_id
            "#,
        )
        .bind(branch.id.0)
        .bind(&branch.name)
        .bind(&branch.description)
        .bind(branch.graph_id.0)
        .bind(branch.root_node_id.0)
        .bind(branch.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to write branch", err))?;

        Ok(())
    }

    async fn delete_node(&mut self, node_id: NodeId) -> Result<()> {
        sqlx::query("DELETE FROM resource_graph.nodes WHERE id = $1")
            .bind(node_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| db_err("Failed to delete node", err))?;
        Ok(())
    }

    async fn delete_edge(&mut self, edge_id: EdgeId) -> Result<()> {
        sqlx::query("DELETE FROM resource_graph.edges WHERE id = $1")
            .bind(edge_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| db_err("Failed to delete edge", err))?;
        Ok(())
    }

    async fn delete_nodegroup(&mut self, nodegroup_id: NodeGroupId) -> Result<()> {
        sqlx::query("DELETE FROM resource_graph.node_groups WHERE id = $1")
            .bind(nodegroup_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| db_err("Failed to delete node-group", err))?;
        Ok(())
    }

    async fn delete_branch(&mut self, branch_id: BranchId) -> Result<()> {
        sqlx::query("DELETE FROM resource_graph.branch_templates WHERE id = $1")
            .bind(branch_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| db_err("Failed to delete branch", err))?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|err| db_err("Failed to commit transaction", err))
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|err| db_err("Failed to roll back transaction", err))
    }
}
