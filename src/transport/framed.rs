//! Framed duplex I/O shared by the TCP transport and tests.
//!
//! # Architecture
//!
//! ```text
//! RequestReceiver ─► writer task ─► batch of OutboundFrame ─► write_vectored ─► socket
//! socket ─► FrameBuffer ─► decode ─► InboundStream (Result<ServerMessage>)
//! ```
//!
//! The writer waits for the first client message, then drains whatever else
//! is already queued (non-blocking) and writes all of it with scatter/gather
//! I/O, so a burst of dispatcher flushes costs one syscall.

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::InboundStream;
use crate::codec::MsgPackCodec;
use crate::error::{Result, TypeDBError};
use crate::protocol::{
    flags, kind, ClientMessage, Frame, FrameBuffer, Header, ServerError, ServerMessage,
    DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
use crate::stream::RequestReceiver;

/// Maximum frames written in a single vectored write.
const MAX_BATCH_SIZE: usize = 64;

/// Size of the socket read buffer.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header (11 bytes).
    pub header: [u8; HEADER_SIZE],
    /// MsgPack payload.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Encode `value` as the payload of a frame with the given header fields.
    pub fn encode<T: Serialize>(kind: u16, flags: u8, request_id: u32, value: &T) -> Result<Self> {
        let payload = MsgPackCodec::encode_bytes(value)?;
        let length = payload_length(payload.len(), DEFAULT_MAX_PAYLOAD_SIZE)?;
        let header = Header::new(kind, flags, request_id, length);
        Ok(Self {
            header: header.encode(),
            payload,
        })
    }

    /// Batch frame of a transaction call; tagged with its first request id.
    pub fn client_batch(message: &ClientMessage) -> Result<Self> {
        let request_id = message.requests.first().map_or(0, |r| r.id.0);
        Self::encode(kind::TRANSACTION, flags::BATCH, request_id, message)
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Header length field for a payload of `len` bytes, if the peer accepts it.
fn payload_length(len: usize, max_payload_size: u32) -> Result<u32> {
    match u32::try_from(len) {
        Ok(length) if length <= max_payload_size => Ok(length),
        _ => Err(TypeDBError::Protocol(format!(
            "Payload of {} bytes exceeds maximum {}",
            len, max_payload_size
        ))),
    }
}

/// Pull client messages until the queue ends, writing them as batch frames.
///
/// Shuts the write half down when the queue ends so the server sees the end
/// of the outbound stream. On failure the error is also reported through
/// [`RequestReceiver::fail`], so the owning stream closes instead of waiting
/// on requests that never left.
pub async fn write_client_messages<W>(mut requests: RequestReceiver, writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = write_until_end(&mut requests, writer).await;
    if let Err(e) = &written {
        requests.fail(e.clone());
    }
    written
}

async fn write_until_end<W>(requests: &mut RequestReceiver, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = requests.recv().await {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(OutboundFrame::client_batch(&first)?);

        while batch.len() < MAX_BATCH_SIZE {
            match requests.try_recv() {
                Some(message) => batch.push(OutboundFrame::client_batch(&message)?),
                None => break,
            }
        }

        write_batch(&mut writer, &batch).await?;
    }

    writer.shutdown().await?;
    Ok(())
}

/// Write a batch of frames using scatter/gather I/O (`write_vectored`).
pub(crate) async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )
            .into());
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices for the part of `batch` after the first `skip_bytes` bytes.
fn remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.header[..], &frame.payload[..]] {
            let end = offset + part.len();
            if skip_bytes < end && !part.is_empty() {
                slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(offset)..]));
            }
            offset = end;
        }
    }

    slices
}

/// Read frames until one complete frame is available.
///
/// Returns `None` on a clean end of stream between frames.
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    frames: &mut FrameBuffer,
    ready: &mut VecDeque<Frame>,
    buf: &mut [u8],
) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(frame) = ready.pop_front() {
            return Ok(Some(frame));
        }

        let n = reader.read(buf).await?;
        if n == 0 {
            if !frames.is_empty() {
                return Err(TypeDBError::Protocol(
                    "Connection closed in the middle of a frame".to_string(),
                ));
            }
            return Ok(None);
        }
        ready.extend(frames.push(&buf[..n])?);
    }
}

/// Decode a server-to-client frame of a transaction call.
fn decode_server_frame(frame: &Frame) -> Result<ServerMessage> {
    if !frame.header.is_response() {
        return Err(TypeDBError::Protocol(format!(
            "Expected a server frame, got flags {:#04x}",
            frame.header.flags
        )));
    }
    if frame.is_error() {
        let error: ServerError = MsgPackCodec::decode(frame.payload())?;
        return Err(error.into());
    }
    MsgPackCodec::decode(frame.payload())
}

struct InboundState<R> {
    reader: R,
    frames: FrameBuffer,
    ready: VecDeque<Frame>,
    buf: Vec<u8>,
    is_done: bool,
}

/// Turn the read half of a transaction call into an [`InboundStream`].
///
/// The stream ends after the first error item.
pub fn read_server_messages<R>(reader: R) -> InboundStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let state = InboundState {
        reader,
        frames: FrameBuffer::new(),
        ready: VecDeque::new(),
        buf: vec![0u8; READ_BUFFER_SIZE],
        is_done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.is_done {
            return None;
        }
        let next = read_frame(
            &mut state.reader,
            &mut state.frames,
            &mut state.ready,
            &mut state.buf,
        )
        .await;

        let item = match next {
            Ok(Some(frame)) => decode_server_frame(&frame),
            Ok(None) => return None,
            Err(e) => Err(e),
        };
        if item.is_err() {
            state.is_done = true;
        }
        Some((item, state))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        build_frame, Request, RequestId, RequestPayload, Response, ResponsePart, ResponsePayload,
        ServerErrorCode, StreamState,
    };
    use crate::stream::request_queue;
    use tokio::io::duplex;

    fn server_frame<T: Serialize>(flags: u8, value: &T) -> Vec<u8> {
        let payload = MsgPackCodec::encode(value).unwrap();
        build_frame(
            &Header::new(kind::TRANSACTION, flags, 0, payload.len() as u32),
            &payload,
        )
    }

    fn frame_of(size: usize) -> OutboundFrame {
        OutboundFrame {
            header: [0xAA; HEADER_SIZE],
            payload: Bytes::from(vec![0xBB; size]),
        }
    }

    #[test]
    fn test_client_batch_header() {
        let message = ClientMessage::batch(vec![
            Request::new(RequestId(4), RequestPayload::Commit),
            Request::new(RequestId(5), RequestPayload::Rollback),
        ]);
        let frame = OutboundFrame::client_batch(&message).unwrap();
        let header = Header::decode(&frame.header).unwrap();

        assert_eq!(header.kind, kind::TRANSACTION);
        assert!(header.is_batch());
        assert_eq!(header.request_id, 4);
        assert_eq!(header.payload_length as usize, frame.payload.len());
    }

    #[test]
    fn test_remaining_slices_no_skip() {
        let batch = [frame_of(5), frame_of(0)];
        let slices = remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[1].len(), 5);
    }

    #[test]
    fn test_remaining_slices_partial_header() {
        let batch = [frame_of(5)];
        let slices = remaining_slices(&batch, 4);
        assert_eq!(slices[0].len(), HEADER_SIZE - 4);
        assert_eq!(slices[1].len(), 5);
    }

    #[test]
    fn test_remaining_slices_into_second_frame() {
        let batch = [frame_of(5), frame_of(3)];
        let slices = remaining_slices(&batch, HEADER_SIZE + 5 + HEADER_SIZE + 1);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), 2);
    }

    #[tokio::test]
    async fn test_writer_drains_queue_then_shuts_down() {
        let (client, mut server) = duplex(64 * 1024);
        let (queue, receiver) = request_queue();

        queue
            .put(ClientMessage::single(Request::new(RequestId(1), RequestPayload::Commit)))
            .unwrap();
        queue
            .put(ClientMessage::single(Request::new(RequestId(2), RequestPayload::Rollback)))
            .unwrap();
        queue.close();

        write_client_messages(receiver, client).await.unwrap();

        let mut bytes = Vec::new();
        server.read_to_end(&mut bytes).await.unwrap();
        let frames = FrameBuffer::new().push(&bytes).unwrap();

        assert_eq!(frames.len(), 2);
        let second: ClientMessage = MsgPackCodec::decode(frames[1].payload()).unwrap();
        assert_eq!(second.requests[0].id, RequestId(2));
    }

    #[test]
    fn test_payload_length_limits() {
        assert_eq!(payload_length(10, 10).unwrap(), 10);
        assert!(matches!(
            payload_length(11, 10),
            Err(TypeDBError::Protocol(_))
        ));
        assert!(payload_length(u32::MAX as usize + 1, u32::MAX).is_err());
    }

    #[tokio::test]
    async fn test_writer_failure_is_reported() {
        let (client, server) = duplex(64);
        drop(server);
        let (queue, receiver) = request_queue();
        let failure = queue.outbound_failure().unwrap();

        queue
            .put(ClientMessage::single(Request::new(RequestId(1), RequestPayload::Commit)))
            .unwrap();

        assert!(write_client_messages(receiver, client).await.is_err());
        assert!(matches!(failure.wait().await, TypeDBError::Io(_)));
        assert!(queue.put(ClientMessage::single(Request::new(
            RequestId(2),
            RequestPayload::Rollback
        )))
        .is_err());
    }

    #[tokio::test]
    async fn test_reader_decodes_messages_then_ends() {
        let (mut server, client) = duplex(64 * 1024);
        let mut inbound = read_server_messages(client);

        let opened = ServerMessage::Response(Response::ok(RequestId(1), ResponsePayload::Opened));
        let done = ServerMessage::ResponsePart(ResponsePart::state(RequestId(2), StreamState::Done));
        server.write_all(&server_frame(flags::RESPONSE, &opened)).await.unwrap();
        server.write_all(&server_frame(flags::STREAM_PART, &done)).await.unwrap();
        drop(server);

        assert_eq!(inbound.next().await.unwrap().unwrap(), opened);
        assert_eq!(inbound.next().await.unwrap().unwrap(), done);
        assert!(inbound.next().await.is_none());
    }

    #[tokio::test]
    async fn test_reader_error_frame_terminates() {
        let (mut server, client) = duplex(64 * 1024);
        let mut inbound = read_server_messages(client);

        let error = ServerError::new(ServerErrorCode::NotPrimary, "go elsewhere");
        server.write_all(&server_frame(flags::ERROR_RESPONSE, &error)).await.unwrap();

        assert!(matches!(
            inbound.next().await,
            Some(Err(TypeDBError::NotPrimary))
        ));
        assert!(inbound.next().await.is_none());
    }

    #[tokio::test]
    async fn test_reader_truncated_frame_is_error() {
        let (mut server, client) = duplex(64 * 1024);
        let mut inbound = read_server_messages(client);

        let bytes = server_frame(flags::RESPONSE, &"partial");
        server.write_all(&bytes[..bytes.len() - 2]).await.unwrap();
        drop(server);

        assert!(matches!(
            inbound.next().await,
            Some(Err(TypeDBError::Protocol(_)))
        ));
    }
}
