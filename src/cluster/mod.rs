//! Cluster module - replica discovery and failover above plain clients.
//!
//! The wrapper never touches framing: it picks a [`Client`](crate::Client)
//! for the right replica and retries whole operations on redirection signals.

mod client;
mod database;
mod replica;
mod session;

pub use client::{
    ClusterClient, ClusterConfig, Connector, DEFAULT_FETCH_REPLICAS_MAX_RETRIES,
    DEFAULT_PRIMARY_TASK_MAX_RETRIES, DEFAULT_WAIT_FOR_PRIMARY_SELECTION,
};
pub use database::{ClusterDatabase, ClusterDatabaseManager};
pub use replica::DatabaseReplicas;
pub use session::ClusterSession;
