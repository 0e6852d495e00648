//! Typed protocol messages carried in frame payloads.
//!
//! Transaction call:
//! ```text
//! client ── ClientMessage { requests: [Request, ...] } ──► server
//! client ◄── ServerMessage::Response | ServerMessage::ResponsePart ── server
//! ```
//! Unary call: one [`UnaryRequest`] answered by one [`UnaryResponse`] or a
//! [`ServerError`].
//!
//! Every response shape is a closed enum, so handling code matches
//! exhaustively and a new variant is a compile error rather than a silent
//! fall-through.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::answer::{ConceptMap, ConceptMapGroup, Numeric, NumericGroup, Rule};
use crate::concept::{Concept, Iid, ValueType};
use crate::connection::Options;

/// Client-assigned id correlating a request with its response(s).
///
/// Unique among in-flight requests of one transaction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u32);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Server-assigned session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(#[serde(with = "serde_bytes")] pub Vec<u8>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    Data,
    Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Read,
    Write,
}

// ============================================================================
// Transaction call: client to server
// ============================================================================

/// One unit of work inside a transaction. Immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub payload: RequestPayload,
}

impl Request {
    pub fn new(id: RequestId, payload: RequestPayload) -> Self {
        Self { id, payload }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestPayload {
    Open {
        session_id: SessionId,
        transaction_type: TransactionType,
        options: Options,
        network_latency_millis: u32,
    },
    Commit,
    Rollback,
    /// "Give me more" for a streamed reply; reuses the stream's request id.
    StreamContinue,
    Query {
        query: QueryRequest,
        options: Options,
    },
    ConceptManager(ConceptManagerRequest),
    Logic(LogicRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryRequest {
    Define(String),
    Undefine(String),
    Match(String),
    MatchAggregate(String),
    MatchGroup(String),
    MatchGroupAggregate(String),
    Insert(String),
    Delete(String),
    Update(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptManagerRequest {
    GetThingType { label: String },
    GetThing { iid: Iid },
    PutEntityType { label: String },
    PutRelationType { label: String },
    PutAttributeType { label: String, value_type: ValueType },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicRequest {
    GetRule { label: String },
    PutRule { label: String, when: String, then: String },
    GetRules,
}

/// One physical outbound message: a batch of requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub requests: Vec<Request>,
}

impl ClientMessage {
    pub fn batch(requests: Vec<Request>) -> Self {
        Self { requests }
    }

    pub fn single(request: Request) -> Self {
        Self {
            requests: vec![request],
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

// ============================================================================
// Transaction call: server to client
// ============================================================================

/// One inbound message, tagged with the id of the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    Response(Response),
    ResponsePart(ResponsePart),
}

impl ServerMessage {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Response(response) => response.id,
            Self::ResponsePart(part) => part.id,
        }
    }
}

/// Terminal 1:1 reply to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    pub result: std::result::Result<ResponsePayload, ServerError>,
}

impl Response {
    pub fn ok(id: RequestId, payload: ResponsePayload) -> Self {
        Self {
            id,
            result: Ok(payload),
        }
    }

    pub fn error(id: RequestId, error: ServerError) -> Self {
        Self {
            id,
            result: Err(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    Opened,
    Committed,
    RolledBack,
    Query(QueryResponse),
    ConceptManager(ConceptManagerResponse),
    Logic(LogicResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryResponse {
    Defined,
    Undefined,
    Deleted,
    MatchAggregate(Numeric),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConceptManagerResponse {
    ThingType(Option<Concept>),
    Thing(Option<Concept>),
    PutType(Concept),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicResponse {
    Rule(Option<Rule>),
    PutRule(Rule),
}

/// One chunk of a streamed reply. Parts sharing an id arrive in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePart {
    pub id: RequestId,
    pub payload: PartPayload,
}

impl ResponsePart {
    pub fn new(id: RequestId, payload: PartPayload) -> Self {
        Self { id, payload }
    }

    pub fn state(id: RequestId, state: StreamState) -> Self {
        Self::new(id, PartPayload::StreamState(state))
    }
}

/// Continuation marker of a streamed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    /// More is available once the client asks again.
    Continue,
    /// The reply is complete.
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartPayload {
    StreamState(StreamState),
    Query(QueryPart),
    Logic(LogicPart),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryPart {
    Match(Vec<ConceptMap>),
    MatchGroup(Vec<ConceptMapGroup>),
    MatchGroupAggregate(Vec<NumericGroup>),
    Insert(Vec<ConceptMap>),
    Update(Vec<ConceptMap>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicPart {
    Rules(Vec<Rule>),
}

// ============================================================================
// Unary calls
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnaryRequest {
    ServersAll,
    DatabaseCreate { name: String },
    DatabaseContains { name: String },
    DatabaseDelete { name: String },
    DatabasesAll,
    DatabaseReplicas { name: String },
    SessionOpen {
        database: String,
        session_type: SessionType,
        options: Options,
    },
    SessionClose { session_id: SessionId },
    SessionPulse { session_id: SessionId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnaryResponse {
    Servers(Vec<String>),
    DatabaseCreated,
    DatabaseContains(bool),
    DatabaseDeleted,
    Databases(Vec<String>),
    Replicas(Vec<ReplicaInfo>),
    SessionOpened {
        session_id: SessionId,
        server_duration_millis: u32,
    },
    SessionClosed,
    SessionPulse { alive: bool },
}

/// What one server reports about its replica of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub address: String,
    pub database: String,
    pub term: i64,
    pub is_primary: bool,
    pub is_preferred: bool,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerErrorCode {
    Internal,
    NotPrimary,
    DatabaseNotFound,
    SessionNotFound,
}

/// Error reported by the server, either for one request or for a whole call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub code: ServerErrorCode,
    pub message: String,
}

impl ServerError {
    pub fn new(code: ServerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_display() {
        assert_eq!(RequestId(12).to_string(), "#12");
    }

    #[test]
    fn test_server_message_request_id() {
        let single = ServerMessage::Response(Response::ok(RequestId(1), ResponsePayload::Opened));
        let part = ServerMessage::ResponsePart(ResponsePart::state(RequestId(2), StreamState::Done));
        assert_eq!(single.request_id(), RequestId(1));
        assert_eq!(part.request_id(), RequestId(2));
    }

    #[test]
    fn test_client_message_constructors() {
        let request = Request::new(RequestId(3), RequestPayload::Commit);
        assert_eq!(ClientMessage::single(request.clone()).len(), 1);
        assert!(ClientMessage::batch(Vec::new()).is_empty());
        assert_eq!(ClientMessage::batch(vec![request.clone(), request]).len(), 2);
    }
}
