//! Database manager of a cluster.
//!
//! Creating, checking and listing go to any reachable member; deletion goes
//! to the primary replica of the database.

use super::client::ClusterClient;
use super::replica::DatabaseReplicas;
use crate::connection::Client;
use crate::error::{Result, TypeDBError};

#[derive(Debug, Clone)]
pub struct ClusterDatabaseManager {
    cluster: ClusterClient,
}

impl ClusterDatabaseManager {
    pub(crate) fn new(cluster: ClusterClient) -> Self {
        Self { cluster }
    }

    pub async fn create(&self, name: &str) -> Result<()> {
        self.cluster
            .run_any_member(|client: Client| {
                let name = name.to_string();
                async move { client.databases().create(name).await }
            })
            .await
    }

    pub async fn contains(&self, name: &str) -> Result<bool> {
        self.cluster
            .run_any_member(|client: Client| {
                let name = name.to_string();
                async move { client.databases().contains(name).await }
            })
            .await
    }

    pub async fn all(&self) -> Result<Vec<String>> {
        self.cluster
            .run_any_member(|client: Client| async move { client.databases().all().await })
            .await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.cluster
            .run_primary_replica(name, |client: Client, _| {
                let name = name.to_string();
                async move { client.databases().delete(name).await }
            })
            .await
    }

    /// An existing database with its current replica set.
    pub async fn get(&self, name: &str) -> Result<ClusterDatabase> {
        if !self.contains(name).await? {
            return Err(TypeDBError::DatabaseNotFound(name.to_string()));
        }
        let replicas = self.cluster.fetch_replicas(name).await?;
        Ok(ClusterDatabase { replicas })
    }
}

/// A database of a cluster and where its replicas live.
#[derive(Debug, Clone)]
pub struct ClusterDatabase {
    replicas: DatabaseReplicas,
}

impl ClusterDatabase {
    pub fn name(&self) -> &str {
        self.replicas.name()
    }

    pub fn replicas(&self) -> &DatabaseReplicas {
        &self.replicas
    }
}
