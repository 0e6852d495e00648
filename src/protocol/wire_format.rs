//! Wire format encoding and decoding.
//!
//! Every frame starts with an 11-byte header:
//! ```text
//! ┌──────────┬───────┬──────────┬──────────┐
//! │ Kind     │ Flags │ Req ID   │ Length   │
//! │ 2 bytes  │ 1 byte│ 4 bytes  │ 4 bytes  │
//! │ uint16 BE│       │ uint32 BE│ uint32 BE│
//! └──────────┴───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The request id in the header is
//! informational (it lets a reader log a frame without decoding it); the
//! authoritative id lives in the MsgPack payload. Client batch frames carry
//! the id of their first request.

use crate::error::{Result, TypeDBError};

/// Header size in bytes (fixed, exactly 11).
pub const HEADER_SIZE: usize = 11;

/// Default maximum payload size (64 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Frame kinds: which call a frame belongs to.
pub mod kind {
    /// Reserved, never sent.
    pub const RESERVED: u16 = 0;
    /// One request frame answered by one reply frame.
    pub const UNARY: u16 = 1;
    /// Duplex transaction call: client batches out, server messages in.
    pub const TRANSACTION: u16 = 2;
}

/// Flag constants for the protocol.
pub mod flags {
    /// Frame travels server to client.
    pub const IS_RESPONSE: u8 = 0b0000_0001;
    /// Payload is a `ServerError`.
    pub const IS_ERROR: u8 = 0b0000_0010;
    /// Payload is one part of a streamed reply.
    pub const IS_STREAM: u8 = 0b0000_0100;
    /// Payload is a batch of client requests.
    pub const IS_BATCH: u8 = 0b0000_1000;

    /// Reserved bits mask (bits 4-7).
    pub const RESERVED_MASK: u8 = 0b1111_0000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    /// Single response frame.
    pub const RESPONSE: u8 = IS_RESPONSE;
    /// Error frame.
    pub const ERROR_RESPONSE: u8 = IS_RESPONSE | IS_ERROR;
    /// Response part frame.
    pub const STREAM_PART: u8 = IS_RESPONSE | IS_STREAM;
    /// Client batch frame.
    pub const BATCH: u8 = IS_BATCH;
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame kind (see [`kind`]).
    pub kind: u16,
    /// Flags byte (see [`flags`]).
    pub flags: u8,
    /// Request identifier, 0 when not tied to a request.
    pub request_id: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: u16, flags: u8, request_id: u32, payload_length: u32) -> Self {
        Self {
            kind,
            flags,
            request_id,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use typedb_client::protocol::{flags, kind, Header};
    ///
    /// let header = Header::new(kind::TRANSACTION, flags::RESPONSE, 42, 100);
    /// assert_eq!(header.encode().len(), 11);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.kind.to_be_bytes());
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.request_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            kind: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2],
            request_id: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            payload_length: u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]),
        })
    }

    /// Validate the header for protocol compliance.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.kind != kind::UNARY && self.kind != kind::TRANSACTION {
            return Err(TypeDBError::Protocol(format!(
                "Unknown frame kind {}",
                self.kind
            )));
        }

        if self.payload_length > max_payload_size {
            return Err(TypeDBError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(TypeDBError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_RESPONSE)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_ERROR)
    }

    #[inline]
    pub fn is_stream(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_STREAM)
    }

    #[inline]
    pub fn is_batch(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_BATCH)
    }
}
