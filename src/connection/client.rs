//! Client builder and client handle.
//!
//! A [`Client`] pairs one [`Transport`] with a [`RequestTransmitter`]. Every
//! transaction opened through the client gets a dispatcher from that
//! transmitter, so all transactions of a client share its batching workers.
//!
//! # Example
//!
//! ```ignore
//! use typedb_client::{Client, Options, SessionType, TransactionType};
//!
//! #[tokio::main]
//! async fn main() -> typedb_client::Result<()> {
//!     let client = Client::connect("127.0.0.1:1729").await?;
//!     client.databases().create("social").await?;
//!
//!     let session = client.session("social", SessionType::Data, Options::new()).await?;
//!     let transaction = session.transaction(TransactionType::Write, Options::new()).await?;
//!     transaction.query().insert("insert $p isa person;")?;
//!     transaction.commit().await?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::database::DatabaseManager;
use super::session::Session;
use super::Options;
use crate::error::{Result, TypeDBError};
use crate::protocol::{SessionType, UnaryRequest, UnaryResponse};
use crate::stream::{RequestTransmitter, TransmitterConfig};
use crate::transport::{TcpTransport, Transport, DEFAULT_CONNECT_TIMEOUT};

/// Builder for configuring and creating a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    transmitter_config: TransmitterConfig,
    connect_timeout: Duration,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            transmitter_config: TransmitterConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Replace the whole batching configuration.
    pub fn transmitter_config(mut self, config: TransmitterConfig) -> Self {
        self.transmitter_config = config;
        self
    }

    /// Set the number of batching workers.
    ///
    /// Default: 2
    pub fn parallelisation(mut self, workers: usize) -> Self {
        self.transmitter_config.parallelisation = workers;
        self
    }

    /// Set the batching windows.
    ///
    /// Default: 1 ms first flush, 3 ms between flushes
    pub fn batch_windows(mut self, small: Duration, large: Duration) -> Self {
        self.transmitter_config.batch_window_small = small;
        self.transmitter_config.batch_window_large = large;
        self
    }

    /// Set the TCP connect timeout.
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build a client talking TCP to `address`.
    pub async fn connect(self, address: impl Into<String>) -> Result<Client> {
        let transport = TcpTransport::new(address).connect_timeout(self.connect_timeout);
        Ok(self.build_with_transport(Arc::new(transport)))
    }

    /// Build a client over any transport, owning a new transmitter.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build_with_transport(self, transport: Arc<dyn Transport>) -> Client {
        let transmitter = Arc::new(RequestTransmitter::new(self.transmitter_config));
        Client::new(transport, transmitter, true)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    transmitter: Arc<RequestTransmitter>,
    owns_transmitter: bool,
    is_open: AtomicBool,
}

/// Handle onto one server. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect with default settings.
    pub async fn connect(address: impl Into<String>) -> Result<Self> {
        ClientBuilder::new().connect(address).await
    }

    /// Client over `transport` sharing an existing transmitter.
    ///
    /// Closing this client leaves the transmitter running.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        transmitter: Arc<RequestTransmitter>,
    ) -> Self {
        Self::new(transport, transmitter, false)
    }

    fn new(
        transport: Arc<dyn Transport>,
        transmitter: Arc<RequestTransmitter>,
        owns_transmitter: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                transmitter,
                owns_transmitter,
                is_open: AtomicBool::new(true),
            }),
        }
    }

    pub fn address(&self) -> &str {
        self.inner.transport.address()
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open.load(Ordering::Acquire) && self.inner.transmitter.is_open()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TypeDBError::ClientClosed)
        }
    }

    pub fn databases(&self) -> DatabaseManager {
        DatabaseManager::new(self.clone())
    }

    /// Open a session on `database`.
    pub async fn session(
        &self,
        database: impl Into<String>,
        session_type: SessionType,
        options: Options,
    ) -> Result<Session> {
        Session::open(self.clone(), database.into(), session_type, options).await
    }

    /// Member addresses of the deployment, as reported by this server.
    pub async fn servers(&self) -> Result<Vec<String>> {
        match self.call(UnaryRequest::ServersAll).await? {
            UnaryResponse::Servers(servers) => Ok(servers),
            other => Err(TypeDBError::unexpected_response("servers", other)),
        }
    }

    /// Close the client; later operations fail with `ClientClosed`.
    pub fn close(&self) {
        if self.inner.is_open.swap(false, Ordering::AcqRel) {
            if self.inner.owns_transmitter {
                self.inner.transmitter.close();
            }
            tracing::debug!("Client for {} closed", self.address());
        }
    }

    /// Unary call guarded by the open check.
    pub(crate) async fn call(&self, request: UnaryRequest) -> Result<UnaryResponse> {
        self.ensure_open()?;
        self.inner.transport.call(request).await
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    pub(crate) fn transmitter(&self) -> &RequestTransmitter {
        &self.inner.transmitter
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.address())
            .field("is_open", &self.is_open())
            .finish()
    }
}
