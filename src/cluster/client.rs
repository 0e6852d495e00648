//! Cluster client: one [`Client`] per member, replica discovery and failover.
//!
//! # Failover
//!
//! ```text
//! run_primary_replica(db, task)
//!   primary = cached or seek_primary(db)
//!   loop (bounded by primary_task_max_retries):
//!     task(primary client)
//!       NotPrimary   -> seek_primary, retry
//!       Unreachable  -> wait, seek_primary, retry
//!       other result -> return it
//!   -> ClusterUnavailable
//! ```
//!
//! `run_any_replica` walks the preferred replica, then the others, moving on
//! only when a replica is unreachable.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::database::ClusterDatabaseManager;
use super::replica::DatabaseReplicas;
use super::session::ClusterSession;
use crate::connection::{Client, Options};
use crate::error::{Result, TypeDBError};
use crate::protocol::{ReplicaInfo, SessionType, UnaryRequest, UnaryResponse};
use crate::stream::{RequestTransmitter, TransmitterConfig};
use crate::transport::{TcpTransport, Transport};

/// Default number of attempts of a task against the primary replica.
pub const DEFAULT_PRIMARY_TASK_MAX_RETRIES: usize = 10;

/// Default number of replica fetches while waiting for a primary.
pub const DEFAULT_FETCH_REPLICAS_MAX_RETRIES: usize = 10;

/// Default wait for the cluster to elect a primary.
pub const DEFAULT_WAIT_FOR_PRIMARY_SELECTION: Duration = Duration::from_secs(2);

/// Retry policy of the failover wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Attempts of one task before giving up with `ClusterUnavailable`.
    pub primary_task_max_retries: usize,
    /// Replica fetches while no replica claims to be primary.
    pub fetch_replicas_max_retries: usize,
    /// Pause after an unreachable primary, and between replica fetches.
    pub wait_for_primary_selection: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            primary_task_max_retries: DEFAULT_PRIMARY_TASK_MAX_RETRIES,
            fetch_replicas_max_retries: DEFAULT_FETCH_REPLICAS_MAX_RETRIES,
            wait_for_primary_selection: DEFAULT_WAIT_FOR_PRIMARY_SELECTION,
        }
    }
}

/// Creates the transport for a member address.
pub type Connector = Arc<dyn Fn(&str) -> Arc<dyn Transport> + Send + Sync>;

struct ClusterInner {
    members: Vec<String>,
    clients: Mutex<HashMap<String, Client>>,
    connector: Connector,
    transmitter: Arc<RequestTransmitter>,
    replicas: Mutex<HashMap<String, DatabaseReplicas>>,
    config: ClusterConfig,
    is_open: AtomicBool,
}

/// Handle onto a cluster deployment. Cheap to clone.
#[derive(Clone)]
pub struct ClusterClient {
    inner: Arc<ClusterInner>,
}

impl ClusterClient {
    /// Discover the cluster through any of `addresses`, over TCP.
    pub async fn connect<I, S>(addresses: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let connector: Connector = Arc::new(|address: &str| -> Arc<dyn Transport> {
            Arc::new(TcpTransport::new(address))
        });
        Self::with_connector(
            addresses,
            connector,
            ClusterConfig::default(),
            TransmitterConfig::default(),
        )
        .await
    }

    /// Discover the cluster through any of `addresses`, asking each in turn
    /// for the member list.
    pub async fn with_connector<I, S>(
        addresses: I,
        connector: Connector,
        config: ClusterConfig,
        transmitter_config: TransmitterConfig,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let transmitter = Arc::new(RequestTransmitter::new(transmitter_config));

        let mut members = None;
        for address in addresses {
            let address = address.into();
            let client = Client::with_transport(connector(&address), transmitter.clone());
            match client.servers().await {
                Ok(servers) => {
                    tracing::debug!("Cluster members reported by {}: {:?}", address, servers);
                    members = Some(servers);
                    break;
                }
                Err(e) => tracing::warn!("Cluster discovery via {} failed: {}", address, e),
            }
        }
        let members = members.ok_or(TypeDBError::ClusterUnavailable)?;

        let clients = members
            .iter()
            .map(|member| {
                let client = Client::with_transport(connector(member), transmitter.clone());
                (member.clone(), client)
            })
            .collect();

        Ok(Self {
            inner: Arc::new(ClusterInner {
                members,
                clients: Mutex::new(clients),
                connector,
                transmitter,
                replicas: Mutex::new(HashMap::new()),
                config,
                is_open: AtomicBool::new(true),
            }),
        })
    }

    pub fn members(&self) -> &[String] {
        &self.inner.members
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TypeDBError::ClientClosed)
        }
    }

    /// Client for a replica address, connecting on first use.
    pub(crate) fn client(&self, address: &str) -> Client {
        self.inner
            .clients
            .lock()
            .entry(address.to_string())
            .or_insert_with(|| {
                Client::with_transport(
                    (self.inner.connector)(address),
                    self.inner.transmitter.clone(),
                )
            })
            .clone()
    }

    pub fn databases(&self) -> ClusterDatabaseManager {
        ClusterDatabaseManager::new(self.clone())
    }

    /// Open a session on the primary replica, or on any replica when
    /// `options` allow reading from one.
    pub async fn session(
        &self,
        database: impl Into<String>,
        session_type: SessionType,
        options: Options,
    ) -> Result<ClusterSession> {
        let database = database.into();
        let session = self
            .open_session(&database, session_type, &options)
            .await?;
        Ok(ClusterSession::new(
            self.clone(),
            database,
            session_type,
            options,
            session,
        ))
    }

    pub(crate) async fn open_session(
        &self,
        database: &str,
        session_type: SessionType,
        options: &Options,
    ) -> Result<crate::connection::Session> {
        let open = |client: Client, _is_first_run: bool| {
            let database = database.to_string();
            let options = options.clone();
            async move { client.session(database, session_type, options).await }
        };

        if options.allows_any_replica() {
            self.run_any_replica(database, open).await
        } else {
            self.run_primary_replica(database, open).await
        }
    }

    /// Run `task` against the primary replica of `database`, following the
    /// primary across elections.
    pub async fn run_primary_replica<T, F, Fut>(&self, database: &str, task: F) -> Result<T>
    where
        F: Fn(Client, bool) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_open()?;
        let mut primary = match self.cached_primary(database) {
            Some(primary) => primary,
            None => self.seek_primary(database).await?,
        };

        for attempt in 0..self.inner.config.primary_task_max_retries {
            let is_first_run = attempt == 0;
            match task(self.client(&primary.address), is_first_run).await {
                Err(TypeDBError::NotPrimary) => {
                    tracing::warn!(
                        "{} is no longer primary for '{}', seeking the new primary",
                        primary.address,
                        database
                    );
                }
                Err(TypeDBError::Unreachable { address }) => {
                    tracing::warn!(
                        "Primary {} for '{}' is unreachable, waiting {:?} for a new election",
                        address,
                        database,
                        self.inner.config.wait_for_primary_selection
                    );
                    tokio::time::sleep(self.inner.config.wait_for_primary_selection).await;
                }
                result => return result,
            }
            primary = self.seek_primary(database).await?;
        }

        Err(TypeDBError::ClusterUnavailable)
    }

    /// Run `task` against the preferred replica of `database`, falling back
    /// to every other replica while they are unreachable.
    pub async fn run_any_replica<T, F, Fut>(&self, database: &str, task: F) -> Result<T>
    where
        F: Fn(Client, bool) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_open()?;
        let replicas = match self.cached_replicas(database) {
            Some(replicas) => replicas,
            None => self.fetch_replicas(database).await?,
        };

        for (attempt, replica) in replicas.read_order().into_iter().enumerate() {
            match task(self.client(&replica.address), attempt == 0).await {
                Err(TypeDBError::Unreachable { address }) => {
                    tracing::debug!("Replica {} of '{}' is unreachable", address, database);
                }
                result => return result,
            }
        }

        Err(TypeDBError::ClusterUnavailable)
    }

    /// Fetch replicas until one claims to be primary.
    async fn seek_primary(&self, database: &str) -> Result<ReplicaInfo> {
        for attempt in 0..self.inner.config.fetch_replicas_max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.inner.config.wait_for_primary_selection).await;
            }
            let replicas = self.fetch_replicas(database).await?;
            if let Some(primary) = replicas.primary() {
                return Ok(primary.clone());
            }
            tracing::debug!("No primary replica for '{}' yet", database);
        }
        Err(TypeDBError::ClusterUnavailable)
    }

    /// Ask the members in turn for the replica set of `database` and cache it.
    pub async fn fetch_replicas(&self, database: &str) -> Result<DatabaseReplicas> {
        self.ensure_open()?;
        for member in &self.inner.members {
            let request = UnaryRequest::DatabaseReplicas {
                name: database.to_string(),
            };
            match self.client(member).call(request).await {
                Ok(UnaryResponse::Replicas(replicas)) => {
                    let replicas = DatabaseReplicas::new(database, replicas);
                    self.inner
                        .replicas
                        .lock()
                        .insert(database.to_string(), replicas.clone());
                    return Ok(replicas);
                }
                Ok(other) => return Err(TypeDBError::unexpected_response("replicas", other)),
                Err(TypeDBError::Unreachable { address }) => {
                    tracing::debug!("Member {} unreachable while fetching replicas", address);
                }
                Err(e) => return Err(e),
            }
        }
        Err(TypeDBError::ClusterUnavailable)
    }

    fn cached_replicas(&self, database: &str) -> Option<DatabaseReplicas> {
        self.inner.replicas.lock().get(database).cloned()
    }

    fn cached_primary(&self, database: &str) -> Option<ReplicaInfo> {
        self.cached_replicas(database)?.primary().cloned()
    }

    /// Run `task` on each member in turn until one is reachable.
    pub(crate) async fn run_any_member<T, F, Fut>(&self, task: F) -> Result<T>
    where
        F: Fn(Client) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_open()?;
        for member in &self.inner.members {
            match task(self.client(member)).await {
                Err(TypeDBError::Unreachable { address }) => {
                    tracing::debug!("Member {} unreachable", address);
                }
                result => return result,
            }
        }
        Err(TypeDBError::ClusterUnavailable)
    }

    /// Close every member client and the shared transmitter.
    pub fn close(&self) {
        if self.inner.is_open.swap(false, Ordering::AcqRel) {
            for client in self.inner.clients.lock().values() {
                client.close();
            }
            self.inner.transmitter.close();
            tracing::debug!("Cluster client closed");
        }
    }
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("members", &self.inner.members)
            .field("is_open", &self.is_open())
            .finish()
    }
}
