//! Frame buffer for accumulating partial reads.
//!
//! Socket reads do not respect frame boundaries: one read may hold several
//! frames, or a fraction of one. The buffer keeps the leftover bytes in a
//! `BytesMut` and walks a two-state machine:
//! - `Header`: need at least [`HEADER_SIZE`] bytes
//! - `Payload`: header parsed, need `remaining` more bytes

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
enum State {
    Header,
    Payload { header: Header, remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with a custom payload limit.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::Header,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial trailing data stays buffered for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a header fails validation (unknown kind,
    /// reserved flags, oversize payload). The buffer is unusable afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::Header => {
                    let Some(header) = Header::decode(&self.buffer) else {
                        return Ok(None);
                    };
                    header.validate(self.max_payload_size)?;
                    let _ = self.buffer.split_to(HEADER_SIZE);

                    if header.payload_length == 0 {
                        return Ok(Some(Frame::new(header, Bytes::new())));
                    }
                    self.state = State::Payload {
                        header,
                        remaining: header.payload_length as usize,
                    };
                }
                State::Payload { header, remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }
                    let payload = self.buffer.split_to(remaining).freeze();
                    self.state = State::Header;
                    return Ok(Some(Frame::new(header, payload)));
                }
            }
        }
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no partial frame is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && matches!(self.state, State::Header)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, flags, kind};

    fn frame_bytes(flags: u8, request_id: u32, payload: &[u8]) -> Vec<u8> {
        build_frame(
            &Header::new(kind::TRANSACTION, flags, request_id, payload.len() as u32),
            payload,
        )
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let mut data = frame_bytes(flags::RESPONSE, 1, b"first");
        data.extend(frame_bytes(flags::STREAM_PART, 2, b"second"));
        data.extend(frame_bytes(flags::STREAM_PART, 2, b""));

        let frames = buffer.push(&data).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].request_id(), 1);
        assert_eq!(frames[1].payload(), b"second");
        assert!(frames[2].payload().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = FrameBuffer::new();
        let payload = b"a payload long enough to be split across reads";
        let data = frame_bytes(flags::RESPONSE, 42, payload);

        let split = HEADER_SIZE + 10;
        assert!(buffer.push(&data[..split]).unwrap().is_empty());
        assert!(!buffer.is_empty());

        let frames = buffer.push(&data[split..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), payload);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let data = frame_bytes(flags::RESPONSE, 7, b"hi");

        let frames: Vec<Frame> = data
            .iter()
            .flat_map(|byte| buffer.push(&[*byte]).unwrap())
            .collect();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].request_id(), 7);
        assert_eq!(frames[0].payload(), b"hi");
    }

    #[test]
    fn test_oversize_payload_rejected() {
        let mut buffer = FrameBuffer::with_max_payload(100);
        let header = Header::new(kind::TRANSACTION, flags::RESPONSE, 1, 1000);

        let error = buffer.push(&header.encode()).unwrap_err();
        assert!(error.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut buffer = FrameBuffer::new();
        let header = Header::new(0x7777, flags::RESPONSE, 1, 0);
        assert!(buffer.push(&header.encode()).is_err());
    }
}
