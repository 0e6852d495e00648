//! Error types for typedb-client.
//!
//! [`TypeDBError`] is `Clone`: one transport failure is delivered to every
//! caller blocked on the same transaction stream, so the error has to be
//! copied into each of their queues.

use std::sync::Arc;

use thiserror::Error;

use crate::protocol::{RequestId, ServerError, ServerErrorCode};

/// Main error type for all client operations.
#[derive(Debug, Clone, Error)]
pub enum TypeDBError {
    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    Encode(String),

    /// MsgPack deserialization error (malformed or unrecognised message).
    #[error("MsgPack decode error: {0}")]
    Decode(String),

    /// Protocol error (invalid frame, unexpected message shape, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A response arrived for a request id with no pending caller.
    #[error("Protocol error: received a response for unknown request {0}")]
    UnknownRequestId(RequestId),

    /// The client has been closed.
    #[error("The client has been closed and no further operation is allowed")]
    ClientClosed,

    /// The session has been closed.
    #[error("The session has been closed and no further operation is allowed")]
    SessionClosed,

    /// The transaction stream has been closed.
    #[error("The transaction has been closed and no further operation is allowed")]
    TransactionClosed,

    /// The server could not be reached.
    #[error("Unable to connect to TypeDB server at {address}")]
    Unreachable {
        /// Address that refused or dropped the connection.
        address: String,
    },

    /// The server rejected the request.
    #[error("Server error: {message}")]
    Server {
        /// Message reported by the server.
        message: String,
    },

    /// The contacted replica is not the primary replica for the database.
    #[error("The replica is not the primary replica")]
    NotPrimary,

    /// Retries against the cluster were exhausted.
    #[error("Unable to connect to TypeDB Cluster: no replica could serve the request")]
    ClusterUnavailable,

    /// The database does not exist.
    #[error("The database '{0}' does not exist")]
    DatabaseNotFound(String),

    /// A concept was accessed as a kind it is not.
    #[error("Invalid concept conversion from {from} to {to}")]
    InvalidConceptCast {
        /// Kind of the concept.
        from: &'static str,
        /// Requested kind.
        to: &'static str,
    },
}

impl TypeDBError {
    /// Whether this error is a cluster redirection signal that a failover
    /// wrapper should retry on another replica.
    pub fn is_replica_failure(&self) -> bool {
        matches!(self, Self::NotPrimary | Self::Unreachable { .. })
    }

    /// A reply of the wrong shape for the request that was sent.
    pub(crate) fn unexpected_response(expected: &str, received: impl std::fmt::Debug) -> Self {
        Self::Protocol(format!(
            "Expected {} response, received {:?}",
            expected, received
        ))
    }
}

impl From<std::io::Error> for TypeDBError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

impl From<rmp_serde::encode::Error> for TypeDBError {
    fn from(error: rmp_serde::encode::Error) -> Self {
        Self::Encode(error.to_string())
    }
}

impl From<rmp_serde::decode::Error> for TypeDBError {
    fn from(error: rmp_serde::decode::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<ServerError> for TypeDBError {
    fn from(error: ServerError) -> Self {
        match error.code {
            ServerErrorCode::NotPrimary => Self::NotPrimary,
            ServerErrorCode::DatabaseNotFound => Self::DatabaseNotFound(error.message),
            ServerErrorCode::SessionNotFound => Self::SessionClosed,
            ServerErrorCode::Internal => Self::Server {
                message: error.message,
            },
        }
    }
}

/// Result type alias using TypeDBError.
pub type Result<T> = std::result::Result<T, TypeDBError>;
