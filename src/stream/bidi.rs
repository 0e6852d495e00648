//! Bidirectional stream: one transaction's duplex call.
//!
//! # Architecture
//!
//! ```text
//! single()/stream() ─► ResponseCollector::new_queue(id)
//!                   ─► Dispatcher (batched or now) ─► RequestQueue ─► Transport
//! Transport inbound ─► reader task ─► ResponseCollector::route ─► caller's queue
//! ```
//!
//! One reader task per stream routes every inbound message; callers only
//! ever wait on their own queue. Any of these closes the whole stream and
//! fails every waiter at once:
//!
//! - a transport error on the inbound half, or its end
//! - an unknown request id
//! - a failure reported by the transport's writer
//! - a batch the outbound queue refuses

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::collector::{ResponseCollector, ResponseQueue};
use super::iterator::ResponsePartIterator;
use super::queue::{request_queue, OutboundFailure};
use super::transmitter::{Dispatcher, RequestTransmitter};
use crate::error::{Result, TypeDBError};
use crate::protocol::{Request, RequestId, RequestPayload, ResponsePayload, ServerMessage};
use crate::transport::{InboundStream, Transport};

struct StreamInner {
    dispatcher: Dispatcher,
    collector: ResponseCollector,
    is_open: AtomicBool,
    next_request_id: AtomicU32,
    reader: Mutex<Option<JoinHandle<()>>>,
    address: String,
}

impl StreamInner {
    fn close(&self, error: Option<TypeDBError>) -> bool {
        if self
            .is_open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        match &error {
            Some(e) => tracing::debug!("Closing transaction stream to {}: {}", self.address, e),
            None => tracing::debug!("Closing transaction stream to {}", self.address),
        }
        self.collector.close_all(error);
        self.dispatcher.close();
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        true
    }
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        self.close(None);
    }
}

/// Handle onto one transaction's duplex call. Cheap to clone.
#[derive(Clone)]
pub struct BidiStream {
    inner: Arc<StreamInner>,
}

impl BidiStream {
    /// Start the duplex call and its reader task.
    pub async fn open(transport: &dyn Transport, transmitter: &RequestTransmitter) -> Result<Self> {
        let (queue, receiver) = request_queue();
        let outbound_failure = queue.outbound_failure();
        let dispatcher = transmitter.dispatcher(queue)?;
        let inbound = transport.transaction(receiver).await?;

        let inner = Arc::new(StreamInner {
            dispatcher,
            collector: ResponseCollector::new(),
            is_open: AtomicBool::new(true),
            next_request_id: AtomicU32::new(1),
            reader: Mutex::new(None),
            address: transport.address().to_string(),
        });

        let stream = Arc::downgrade(&inner);
        inner.dispatcher.on_failure(move |error| {
            if let Some(inner) = stream.upgrade() {
                inner.close(Some(error));
            }
        });

        let reader = tokio::spawn(read_loop(
            Arc::downgrade(&inner),
            inbound,
            outbound_failure,
        ));
        *inner.reader.lock() = Some(reader);
        tracing::debug!("Opened transaction stream to {}", inner.address);

        Ok(Self { inner })
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TypeDBError::TransactionClosed)
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId(self.inner.next_request_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a queue under a fresh id, then dispatch.
    fn register_and_dispatch(
        &self,
        payload: RequestPayload,
        batch: bool,
    ) -> Result<(RequestId, ResponseQueue)> {
        self.ensure_open()?;
        let id = self.next_request_id();
        let queue = self.inner.collector.new_queue(id)?;

        let request = Request::new(id, payload);
        let dispatched = if batch {
            self.inner.dispatcher.dispatch(request)
        } else {
            self.inner.dispatcher.dispatch_now(request)
        };
        if let Err(e) = dispatched {
            self.inner.collector.remove(id);
            return Err(e);
        }
        Ok((id, queue))
    }

    /// Send a request expecting exactly one response.
    ///
    /// `batch = false` bypasses the batching window.
    pub fn single(&self, payload: RequestPayload, batch: bool) -> Result<SingleResponse> {
        let (id, queue) = self.register_and_dispatch(payload, batch)?;
        Ok(SingleResponse { id, queue })
    }

    /// Send a request answered by a sequence of response parts.
    pub fn stream(&self, payload: RequestPayload) -> Result<ResponsePartIterator> {
        let (id, queue) = self.register_and_dispatch(payload, true)?;
        Ok(ResponsePartIterator::new(id, queue, self.clone()))
    }

    /// Ask for the next page of the streamed reply `id`.
    pub(crate) fn dispatch_continue(&self, id: RequestId) -> Result<()> {
        self.ensure_open()?;
        self.inner
            .dispatcher
            .dispatch(Request::new(id, RequestPayload::StreamContinue))
    }

    /// Tear the stream down. Returns `true` for the call that did the work.
    pub fn close(&self, error: Option<TypeDBError>) -> bool {
        self.inner.close(error)
    }

    /// Number of calls currently registered on this stream.
    pub fn pending_calls(&self) -> usize {
        self.inner.collector.len()
    }

    /// Deregister a streamed call whose reader went away.
    pub(crate) fn forget(&self, id: RequestId) {
        self.inner.collector.remove(id);
    }
}

impl std::fmt::Debug for BidiStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BidiStream")
            .field("address", &self.inner.address)
            .field("is_open", &self.is_open())
            .finish()
    }
}

enum Event {
    Inbound(Option<Result<ServerMessage>>),
    OutboundFailed(TypeDBError),
}

async fn read_loop(
    stream: Weak<StreamInner>,
    mut inbound: InboundStream,
    outbound_failure: Option<OutboundFailure>,
) {
    let outbound_failed = async move {
        match outbound_failure {
            Some(failure) => failure.wait().await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(outbound_failed);

    loop {
        let event = tokio::select! {
            next = inbound.next() => Event::Inbound(next),
            error = &mut outbound_failed => Event::OutboundFailed(error),
        };
        let Some(inner) = stream.upgrade() else {
            return;
        };

        let next = match event {
            Event::Inbound(next) => next,
            Event::OutboundFailed(e) => {
                tracing::warn!("Transaction writer to {} failed: {}", inner.address, e);
                inner.close(Some(e));
                return;
            }
        };

        match next {
            Some(Ok(message)) => {
                if let Err(e) = inner.collector.route(message) {
                    tracing::error!("Protocol violation on stream to {}: {}", inner.address, e);
                    inner.close(Some(e));
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Transaction stream to {} failed: {}", inner.address, e);
                inner.close(Some(e));
                return;
            }
            None => {
                tracing::debug!("Transaction stream to {} ended by server", inner.address);
                inner.close(None);
                return;
            }
        }
    }
}

/// Pending single response.
#[derive(Debug)]
pub struct SingleResponse {
    id: RequestId,
    queue: ResponseQueue,
}

impl SingleResponse {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the response.
    ///
    /// A server-side error for this request comes back as `Err`.
    pub async fn get(mut self) -> Result<ResponsePayload> {
        match self.queue.get().await? {
            ServerMessage::Response(response) => response.result.map_err(Into::into),
            ServerMessage::ResponsePart(_) => Err(TypeDBError::Protocol(format!(
                "Received a response part for single request {}",
                self.id
            ))),
        }
    }
}
