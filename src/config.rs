use std::env;

use anyhow::Context;

use crate::models::Cardinality;

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_ENV: &str = "RESOURCE_GRAPH_MAX_CONNECTIONS";
pub const VERIFY_INVARIANTS_ENV: &str = "RESOURCE_GRAPH_VERIFY_INVARIANTS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Check the post-image of every mutation against the structural
    /// invariants before writing it.
    pub verify_invariants: bool,
    /// Cardinality given to a group created by promoting a node.
    pub promoted_cardinality: Cardinality,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verify_invariants: true,
            promoted_cardinality: Cardinality::Many,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var(VERIFY_INVARIANTS_ENV) {
            config.verify_invariants = parse_flag(&value);
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl StoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var(DATABASE_URL_ENV)
            .with_context(|| format!("{} is required to open the graph store", DATABASE_URL_ENV))?;
        let max_connections = match env::var(MAX_CONNECTIONS_ENV) {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid {} '{}'", MAX_CONNECTIONS_ENV, raw))?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes"
}
