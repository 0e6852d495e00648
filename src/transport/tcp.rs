//! Framed protocol over TCP.
//!
//! Every call uses its own connection: a unary call writes one `UNARY` frame
//! and reads one reply frame; a transaction call keeps the connection for its
//! whole life, with a writer task on the write half and the read half turned
//! into the inbound stream.
//!
//! # Example
//!
//! ```ignore
//! use typedb_client::transport::{TcpTransport, Transport};
//! use typedb_client::protocol::{UnaryRequest, UnaryResponse};
//!
//! let transport = TcpTransport::new("127.0.0.1:1729");
//! let reply = transport.call(UnaryRequest::DatabasesAll).await?;
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tokio::net::TcpStream;

use super::framed::{read_frame, read_server_messages, write_batch, write_client_messages};
use super::{BoxFuture, InboundStream, OutboundFrame, Transport};
use crate::codec::MsgPackCodec;
use crate::error::{Result, TypeDBError};
use crate::protocol::{
    flags, kind, FrameBuffer, ServerError, UnaryRequest, UnaryResponse,
};
use crate::stream::RequestReceiver;

/// Default limit for establishing a TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`Transport`] speaking the framed protocol over TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    address: String,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect timeout.
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Connect, mapping refusal and timeout to [`TypeDBError::Unreachable`].
async fn connect(address: String, timeout: Duration) -> Result<TcpStream> {
    let unreachable = || TypeDBError::Unreachable {
        address: address.clone(),
    };

    match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => {
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Ok(Err(e)) => {
            tracing::debug!("Connect to {} failed: {}", address, e);
            Err(unreachable())
        }
        Err(_) => {
            tracing::debug!("Connect to {} timed out after {:?}", address, timeout);
            Err(unreachable())
        }
    }
}

async fn unary_call(
    address: String,
    timeout: Duration,
    request: UnaryRequest,
) -> Result<UnaryResponse> {
    let stream = connect(address.clone(), timeout).await?;
    let (mut reader, mut writer) = stream.into_split();

    let frame = OutboundFrame::encode(kind::UNARY, 0, 0, &request)?;
    write_batch(&mut writer, &[frame]).await?;

    let mut frames = FrameBuffer::new();
    let mut ready = VecDeque::new();
    let mut buf = vec![0u8; 16 * 1024];
    let reply = read_frame(&mut reader, &mut frames, &mut ready, &mut buf)
        .await?
        .ok_or(TypeDBError::Unreachable { address })?;

    if reply.kind() != kind::UNARY || !reply.header.is_response() {
        return Err(TypeDBError::Protocol(format!(
            "Expected a unary reply, got kind {} flags {:#04x}",
            reply.kind(),
            reply.header.flags
        )));
    }
    if reply.is_error() {
        let error: ServerError = MsgPackCodec::decode(reply.payload())?;
        return Err(error.into());
    }
    MsgPackCodec::decode(reply.payload())
}

impl Transport for TcpTransport {
    fn call(&self, request: UnaryRequest) -> BoxFuture<'static, Result<UnaryResponse>> {
        Box::pin(unary_call(
            self.address.clone(),
            self.connect_timeout,
            request,
        ))
    }

    fn transaction(&self, requests: RequestReceiver) -> BoxFuture<'static, Result<InboundStream>> {
        let address = self.address.clone();
        let timeout = self.connect_timeout;

        Box::pin(async move {
            let stream = connect(address.clone(), timeout).await?;
            let (reader, writer) = stream.into_split();

            // A write failure is reported to the stream by the writer itself.
            tokio::spawn(async move {
                if let Err(e) = write_client_messages(requests, writer).await {
                    tracing::warn!("Transaction writer to {} stopped: {}", address, e);
                }
            });

            Ok(read_server_messages(reader))
        })
    }

    fn address(&self) -> &str {
        &self.address
    }
}
