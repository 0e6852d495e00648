//! Codec module - payload serialization for wire frames.
//!
//! Every frame payload on the wire is MessagePack produced by
//! [`MsgPackCodec`]. The codec is a marker struct with static methods so the
//! encoding is fixed at compile time.
//!
//! # Example
//!
//! ```
//! use typedb_client::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
