//! Sessions and their keep-alive pulse.
//!
//! Opening a session measures the network latency as the round trip minus
//! the time the server reports spending on the open; transactions pass it to
//! the server so its timeouts account for the wire.
//!
//! A background task pulses the server every [`PULSE_INTERVAL`]. A negative
//! or failed pulse marks the session closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::client::Client;
use super::transaction::Transaction;
use super::Options;
use crate::error::{Result, TypeDBError};
use crate::protocol::{SessionId, SessionType, TransactionType, UnaryRequest, UnaryResponse};

/// Interval between keep-alive pulses.
pub const PULSE_INTERVAL: Duration = Duration::from_secs(5);

struct SessionInner {
    client: Client,
    database: String,
    session_type: SessionType,
    options: Options,
    session_id: SessionId,
    network_latency_millis: u32,
    is_open: AtomicBool,
    pulse: Mutex<Option<JoinHandle<()>>>,
}

impl SessionInner {
    /// Flip to closed; `true` for the caller that did it.
    fn mark_closed(&self) -> bool {
        let was_open = self.is_open.swap(false, Ordering::AcqRel);
        if was_open {
            if let Some(pulse) = self.pulse.lock().take() {
                pulse.abort();
            }
        }
        was_open
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if !self.mark_closed() {
            return;
        }
        // Best effort: tell the server unless the runtime is already gone.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            let session_id = self.session_id.clone();
            handle.spawn(async move {
                if let Err(e) = client.call(UnaryRequest::SessionClose { session_id }).await {
                    tracing::debug!("Closing dropped session failed: {}", e);
                }
            });
        }
    }
}

/// An open session on one database.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) async fn open(
        client: Client,
        database: String,
        session_type: SessionType,
        options: Options,
    ) -> Result<Self> {
        let started = Instant::now();
        let response = client
            .call(UnaryRequest::SessionOpen {
                database: database.clone(),
                session_type,
                options: options.clone(),
            })
            .await?;

        let (session_id, server_duration_millis) = match response {
            UnaryResponse::SessionOpened {
                session_id,
                server_duration_millis,
            } => (session_id, server_duration_millis),
            other => return Err(TypeDBError::unexpected_response("session open", other)),
        };
        let round_trip_millis = u32::try_from(started.elapsed().as_millis()).unwrap_or(u32::MAX);
        let network_latency_millis = round_trip_millis.saturating_sub(server_duration_millis);

        let inner = Arc::new(SessionInner {
            client,
            database,
            session_type,
            options,
            session_id,
            network_latency_millis,
            is_open: AtomicBool::new(true),
            pulse: Mutex::new(None),
        });
        let pulse = tokio::spawn(pulse_loop(Arc::downgrade(&inner)));
        *inner.pulse.lock() = Some(pulse);

        tracing::debug!(
            "Opened {:?} session on '{}' ({} ms latency)",
            session_type,
            inner.database,
            network_latency_millis
        );
        Ok(Self { inner })
    }

    pub fn database(&self) -> &str {
        &self.inner.database
    }

    pub fn session_type(&self) -> SessionType {
        self.inner.session_type
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.session_id
    }

    pub fn network_latency_millis(&self) -> u32 {
        self.inner.network_latency_millis
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open.load(Ordering::Acquire)
    }

    /// Open a transaction; it lives independently of later session changes.
    pub async fn transaction(
        &self,
        transaction_type: TransactionType,
        options: Options,
    ) -> Result<Transaction> {
        if !self.is_open() {
            return Err(TypeDBError::SessionClosed);
        }
        let client = &self.inner.client;
        client.ensure_open()?;
        Transaction::open(
            client.transport(),
            client.transmitter(),
            self.inner.session_id.clone(),
            transaction_type,
            options,
            self.inner.network_latency_millis,
        )
        .await
    }

    /// Close the session on the server. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if !self.inner.mark_closed() {
            return Ok(());
        }
        let session_id = self.inner.session_id.clone();
        match self
            .inner
            .client
            .call(UnaryRequest::SessionClose { session_id })
            .await?
        {
            UnaryResponse::SessionClosed => Ok(()),
            other => Err(TypeDBError::unexpected_response("session close", other)),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.inner.database)
            .field("session_type", &self.inner.session_type)
            .field("is_open", &self.is_open())
            .finish()
    }
}

async fn pulse_loop(session: Weak<SessionInner>) {
    let mut interval =
        tokio::time::interval_at(tokio::time::Instant::now() + PULSE_INTERVAL, PULSE_INTERVAL);

    loop {
        interval.tick().await;
        let Some(inner) = session.upgrade() else {
            return;
        };
        if !inner.is_open.load(Ordering::Acquire) {
            return;
        }

        let session_id = inner.session_id.clone();
        let alive = match inner
            .client
            .call(UnaryRequest::SessionPulse { session_id })
            .await
        {
            Ok(UnaryResponse::SessionPulse { alive }) => alive,
            Ok(other) => {
                tracing::warn!("Unexpected pulse reply: {:?}", other);
                false
            }
            Err(e) => {
                tracing::warn!("Session pulse to '{}' failed: {}", inner.database, e);
                false
            }
        };

        if !alive {
            inner.is_open.store(false, Ordering::Release);
            return;
        }
    }
}
