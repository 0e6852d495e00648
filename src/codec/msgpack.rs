//! MsgPack codec using `rmp-serde`.
//!
//! Structs are always written with `to_vec_named` (struct-as-map) so that a
//! message decodes by field name. A server that adds a field, or reorders
//! them, does not break older clients.

use bytes::Bytes;

use crate::error::Result;

/// MessagePack codec for wire payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TypeDBError::Encode`](crate::TypeDBError::Encode) if the value
    /// cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Encode a value straight into a frame payload.
    #[inline]
    pub fn encode_bytes<T: serde::Serialize>(value: &T) -> Result<Bytes> {
        Self::encode(value).map(Bytes::from)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// A payload naming an enum variant this client does not know fails here,
    /// so unrecognised message shapes surface as
    /// [`TypeDBError::Decode`](crate::TypeDBError::Decode).
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
