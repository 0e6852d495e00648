//! Transport module - the physical channel to one server.
//!
//! A [`Transport`] offers the two call shapes the client needs:
//! - unary: one [`UnaryRequest`] answered by one [`UnaryResponse`]
//! - transaction: a duplex call that pulls client batches from a
//!   [`RequestReceiver`] and yields server messages until either side ends
//!
//! [`TcpTransport`] speaks the framed protocol over TCP. Tests substitute
//! in-memory implementations.

mod framed;
mod tcp;

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::protocol::{ServerMessage, UnaryRequest, UnaryResponse};
use crate::stream::RequestReceiver;

pub use framed::{read_server_messages, write_client_messages, OutboundFrame};
pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};

/// Boxed future type for object-safe transports.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Inbound half of a transaction call.
///
/// An `Err` item or the end of the stream terminates the call.
pub type InboundStream = BoxStream<'static, Result<ServerMessage>>;

/// Physical channel to one server process.
pub trait Transport: Send + Sync + 'static {
    /// Single non-streamed call.
    fn call(&self, request: UnaryRequest) -> BoxFuture<'static, Result<UnaryResponse>>;

    /// Start a duplex transaction call fed by `requests`.
    ///
    /// The transport pulls `requests` until it yields `None`, then finishes
    /// the outbound half. If it can no longer write, it must hand the error to
    /// [`RequestReceiver::fail`] rather than just drop the receiver.
    fn transaction(&self, requests: RequestReceiver) -> BoxFuture<'static, Result<InboundStream>>;

    /// Address of the server this transport talks to.
    fn address(&self) -> &str;
}
