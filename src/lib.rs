pub mod algorithms;
pub mod config;
pub mod datatypes;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod deletion;
pub mod error;
pub mod grafting;
pub mod graph;
pub mod invariants;
pub mod membership;
pub mod memory;
pub mod models;
pub mod operations;
pub mod store;
pub mod unit_of_work;

pub mod prelude {
    pub use crate::algorithms::{adjacency_map, has_cycle, reachable_nodes, subtree};
    pub use crate::config::{EngineConfig, StoreConfig};
    pub use crate::datatypes::DatatypeRegistry;
    #[cfg(feature = "sqlx")]
    pub use crate::db::{PgStore, PgTransaction, create_graph_tables};
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::graph::ResourceGraph;
    pub use crate::invariants::{ensure_graph_invariants, graph_invariant_violations};
    pub use crate::membership::compute_downstream;
    pub use crate::memory::MemoryStore;
    pub use crate::models::{
        BranchId, BranchLibraryEntry, BranchTemplate, Cardinality, CreateBranchPayload,
        CreateGraphPayload, DeletedSubgraph, DownstreamSet, Edge, EdgeId, GraftedSubgraph,
        GraphId, GraphModel, GroupTarget, NewEdge, NewNode, NewNodeGroup, Node, NodeGroup,
        NodeGroupId, NodeId, NodeUpdate, UpdateNodePayload,
    };
    pub use crate::operations::{GraphOperation, GraphOperationResult, GraphOperations};
    pub use crate::store::{GraphStore, GraphTransaction};
}
