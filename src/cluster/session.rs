//! Sessions that follow their database across replicas.
//!
//! When opening a transaction fails with a replica-failure signal, the
//! session is reopened through the failover wrapper once and the transaction
//! retried on the new replica.

use std::sync::Arc;

use parking_lot::Mutex;

use super::client::ClusterClient;
use crate::connection::{Options, Session, Transaction};
use crate::error::Result;
use crate::protocol::{SessionType, TransactionType};

pub struct ClusterSession {
    cluster: ClusterClient,
    database: String,
    session_type: SessionType,
    options: Options,
    session: Mutex<Arc<Session>>,
}

impl ClusterSession {
    pub(crate) fn new(
        cluster: ClusterClient,
        database: String,
        session_type: SessionType,
        options: Options,
        session: Session,
    ) -> Self {
        Self {
            cluster,
            database,
            session_type,
            options,
            session: Mutex::new(Arc::new(session)),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn is_open(&self) -> bool {
        self.current().is_open()
    }

    fn current(&self) -> Arc<Session> {
        self.session.lock().clone()
    }

    pub async fn transaction(
        &self,
        transaction_type: TransactionType,
        options: Options,
    ) -> Result<Transaction> {
        let session = self.current();
        match session.transaction(transaction_type, options.clone()).await {
            Err(e) if e.is_replica_failure() => {
                tracing::warn!(
                    "Transaction on '{}' failed with {}, reopening session",
                    self.database,
                    e
                );
                let session = self.reopen(&session).await?;
                session.transaction(transaction_type, options).await
            }
            result => result,
        }
    }

    async fn reopen(&self, stale: &Session) -> Result<Arc<Session>> {
        if let Err(e) = stale.close().await {
            tracing::debug!("Closing stale session failed: {}", e);
        }
        let session = Arc::new(
            self.cluster
                .open_session(&self.database, self.session_type, &self.options)
                .await?,
        );
        *self.session.lock() = session.clone();
        Ok(session)
    }

    pub async fn close(&self) -> Result<()> {
        self.current().close().await
    }
}

impl std::fmt::Debug for ClusterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSession")
            .field("database", &self.database)
            .field("session_type", &self.session_type)
            .field("is_open", &self.is_open())
            .finish()
    }
}
