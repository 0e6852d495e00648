//! Database manager: create, check, list and delete databases.

use super::client::Client;
use crate::error::{Result, TypeDBError};
use crate::protocol::{UnaryRequest, UnaryResponse};

/// Database operations of one server.
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    client: Client,
}

impl DatabaseManager {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn create(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        match self.client.call(UnaryRequest::DatabaseCreate { name }).await? {
            UnaryResponse::DatabaseCreated => Ok(()),
            other => Err(TypeDBError::unexpected_response("database create", other)),
        }
    }

    pub async fn contains(&self, name: impl Into<String>) -> Result<bool> {
        let name = name.into();
        match self.client.call(UnaryRequest::DatabaseContains { name }).await? {
            UnaryResponse::DatabaseContains(contains) => Ok(contains),
            other => Err(TypeDBError::unexpected_response("database contains", other)),
        }
    }

    /// Handle onto an existing database.
    pub async fn get(&self, name: impl Into<String>) -> Result<Database> {
        let name = name.into();
        if self.contains(name.clone()).await? {
            Ok(Database {
                name,
                client: self.client.clone(),
            })
        } else {
            Err(TypeDBError::DatabaseNotFound(name))
        }
    }

    pub async fn delete(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        match self.client.call(UnaryRequest::DatabaseDelete { name }).await? {
            UnaryResponse::DatabaseDeleted => Ok(()),
            other => Err(TypeDBError::unexpected_response("database delete", other)),
        }
    }

    /// Names of every database on the server.
    pub async fn all(&self) -> Result<Vec<String>> {
        match self.client.call(UnaryRequest::DatabasesAll).await? {
            UnaryResponse::Databases(names) => Ok(names),
            other => Err(TypeDBError::unexpected_response("databases all", other)),
        }
    }
}

/// A database known to exist when the handle was created.
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    client: Client,
}

impl Database {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn delete(self) -> Result<()> {
        DatabaseManager::new(self.client).delete(self.name).await
    }
}
