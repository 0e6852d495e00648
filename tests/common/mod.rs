//! Scripted in-memory transport shared by the integration tests.
//!
//! Each `transaction()` call hands a [`MockConnection`] to the test, which
//! then plays the server: it reads the requests the client sent and pushes
//! server messages, errors or the end of stream back.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use typedb_client::protocol::{
    ClientMessage, PartPayload, Request, RequestId, RequestPayload, Response, ResponsePart,
    ResponsePayload, ServerError, ServerMessage, SessionId, StreamState, UnaryRequest,
    UnaryResponse,
};
use typedb_client::stream::{request_queue, RequestReceiver};
use typedb_client::transport::{BoxFuture, InboundStream, Transport};
use typedb_client::{Result, TypeDBError};

/// How long a test waits for something that should happen promptly.
pub const PROMPT: Duration = Duration::from_secs(5);

pub type UnaryHandler = Box<dyn Fn(UnaryRequest) -> Result<UnaryResponse> + Send + Sync>;

pub struct MockTransport {
    address: String,
    unary: UnaryHandler,
    unary_calls: Mutex<Vec<UnaryRequest>>,
    transaction_error: Mutex<Option<TypeDBError>>,
    transactions_opened: AtomicUsize,
    connections_tx: mpsc::UnboundedSender<MockConnection>,
    connections_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockConnection>>,
}

impl MockTransport {
    pub fn new(address: &str) -> Arc<Self> {
        Self::with_unary(address, default_unary)
    }

    pub fn with_unary<F>(address: &str, unary: F) -> Arc<Self>
    where
        F: Fn(UnaryRequest) -> Result<UnaryResponse> + Send + Sync + 'static,
    {
        let (connections_tx, connections_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            address: address.to_string(),
            unary: Box::new(unary),
            unary_calls: Mutex::new(Vec::new()),
            transaction_error: Mutex::new(None),
            transactions_opened: AtomicUsize::new(0),
            connections_tx,
            connections_rx: tokio::sync::Mutex::new(connections_rx),
        })
    }

    /// Make every later `transaction()` call fail with `error`.
    pub fn refuse_transactions(&self, error: TypeDBError) {
        *self.transaction_error.lock() = Some(error);
    }

    /// The connection of the next transaction the client opens.
    pub async fn accept(&self) -> MockConnection {
        let mut connections = self.connections_rx.lock().await;
        tokio::time::timeout(PROMPT, connections.recv())
            .await
            .expect("client did not open a transaction")
            .expect("transport dropped")
    }

    pub fn transactions_opened(&self) -> usize {
        self.transactions_opened.load(Ordering::SeqCst)
    }

    pub fn unary_calls(&self) -> Vec<UnaryRequest> {
        self.unary_calls.lock().clone()
    }
}

impl Transport for MockTransport {
    fn call(&self, request: UnaryRequest) -> BoxFuture<'static, Result<UnaryResponse>> {
        self.unary_calls.lock().push(request.clone());
        let response = (self.unary)(request);
        Box::pin(async move { response })
    }

    fn transaction(&self, requests: RequestReceiver) -> BoxFuture<'static, Result<InboundStream>> {
        if let Some(error) = self.transaction_error.lock().clone() {
            return Box::pin(async move { Err(error) });
        }
        self.transactions_opened.fetch_add(1, Ordering::SeqCst);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let connection = MockConnection {
            requests,
            inbound: Some(inbound_tx),
            pending: VecDeque::new(),
            batches: Vec::new(),
        };
        let _ = self.connections_tx.send(connection);

        let inbound = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();
        Box::pin(async move { Ok(inbound) })
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// Unary behaviour of a healthy single server.
pub fn default_unary(request: UnaryRequest) -> Result<UnaryResponse> {
    Ok(match request {
        UnaryRequest::ServersAll => UnaryResponse::Servers(vec!["mock:1729".to_string()]),
        UnaryRequest::DatabaseCreate { .. } => UnaryResponse::DatabaseCreated,
        UnaryRequest::DatabaseContains { name } => UnaryResponse::DatabaseContains(name == "social"),
        UnaryRequest::DatabaseDelete { .. } => UnaryResponse::DatabaseDeleted,
        UnaryRequest::DatabasesAll => UnaryResponse::Databases(vec!["social".to_string()]),
        UnaryRequest::DatabaseReplicas { .. } => UnaryResponse::Replicas(Vec::new()),
        UnaryRequest::SessionOpen { .. } => UnaryResponse::SessionOpened {
            session_id: SessionId(vec![7, 7]),
            server_duration_millis: 0,
        },
        UnaryRequest::SessionClose { .. } => UnaryResponse::SessionClosed,
        UnaryRequest::SessionPulse { .. } => UnaryResponse::SessionPulse { alive: true },
    })
}

/// Server side of one transaction call.
pub struct MockConnection {
    requests: RequestReceiver,
    inbound: Option<mpsc::UnboundedSender<Result<ServerMessage>>>,
    pending: VecDeque<Request>,
    /// Every batch received so far, in order.
    pub batches: Vec<ClientMessage>,
}

impl MockConnection {
    /// Next batch as sent by the client; `None` once the client ended the call.
    pub async fn next_batch(&mut self) -> Option<ClientMessage> {
        let batch = tokio::time::timeout(PROMPT, self.requests.recv())
            .await
            .expect("client sent nothing")?;
        self.batches.push(batch.clone());
        Some(batch)
    }

    /// Next individual request, unpacking batches.
    pub async fn next_request(&mut self) -> Option<Request> {
        if let Some(request) = self.pending.pop_front() {
            return Some(request);
        }
        let batch = self.next_batch().await?;
        self.pending.extend(batch.requests);
        self.pending.pop_front()
    }

    /// Whether the client has ended its outbound half (without waiting).
    pub async fn is_outbound_finished(&mut self) -> bool {
        self.pending.is_empty()
            && tokio::time::timeout(Duration::from_millis(50), self.requests.recv())
                .await
                .map_or(false, |next| next.is_none())
    }

    pub fn send(&self, message: ServerMessage) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Ok(message));
        }
    }

    pub fn respond(&self, id: RequestId, payload: ResponsePayload) {
        self.send(ServerMessage::Response(Response::ok(id, payload)));
    }

    pub fn respond_error(&self, id: RequestId, error: ServerError) {
        self.send(ServerMessage::Response(Response::error(id, error)));
    }

    pub fn part(&self, id: RequestId, payload: PartPayload) {
        self.send(ServerMessage::ResponsePart(ResponsePart::new(id, payload)));
    }

    pub fn state(&self, id: RequestId, state: StreamState) {
        self.part(id, PartPayload::StreamState(state));
    }

    /// Break the call with a transport-level error.
    pub fn fail(&self, error: TypeDBError) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Err(error));
        }
    }

    /// Break the outbound half: the writer stops pulling and reports `error`.
    /// The inbound half stays open.
    pub fn fail_outbound(&mut self, error: TypeDBError) {
        let (_, detached) = request_queue();
        std::mem::replace(&mut self.requests, detached).fail(error);
    }

    /// End the inbound half cleanly.
    pub fn end(&mut self) {
        self.inbound.take();
    }

    /// Expect the transaction open request and accept it.
    pub async fn accept_open(&mut self) -> Request {
        let request = self.next_request().await.expect("no open request");
        assert!(
            matches!(request.payload, RequestPayload::Open { .. }),
            "expected open, got {:?}",
            request.payload
        );
        self.respond(request.id, ResponsePayload::Opened);
        request
    }

    /// Answer every request with `handler` until the client ends the call.
    pub fn serve<F>(mut self, mut handler: F) -> JoinHandle<MockConnection>
    where
        F: FnMut(&MockConnection, Request) + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(request) = self.next_request_unbounded().await {
                handler(&self, request);
            }
            self
        })
    }

    async fn next_request_unbounded(&mut self) -> Option<Request> {
        if let Some(request) = self.pending.pop_front() {
            return Some(request);
        }
        let batch = self.requests.recv().await?;
        self.batches.push(batch.clone());
        self.pending.extend(batch.requests);
        self.pending.pop_front()
    }
}

/// Run `future` with the test timeout.
pub async fn prompt<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(PROMPT, future)
        .await
        .expect("operation hung")
}
