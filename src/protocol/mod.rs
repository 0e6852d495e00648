//! Protocol module - wire format, framing, and message types.
//!
//! - 11-byte header encoding/decoding ([`Header`], [`kind`], [`flags`])
//! - [`FrameBuffer`] for reassembling frames from partial reads
//! - typed messages carried in frame payloads ([`Request`], [`ServerMessage`], ...)

mod frame;
mod frame_buffer;
mod message;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use message::{
    ClientMessage, ConceptManagerRequest, ConceptManagerResponse, LogicPart, LogicRequest,
    LogicResponse, PartPayload, QueryPart, QueryRequest, QueryResponse, ReplicaInfo, Request,
    RequestId, RequestPayload, Response, ResponsePart, ResponsePayload, ServerError,
    ServerErrorCode, ServerMessage, SessionId, SessionType, StreamState, TransactionType,
    UnaryRequest, UnaryResponse,
};
pub use wire_format::{flags, kind, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
