//! # Envelope Codec
//!
//! Every envelope on the bus is JSON.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::BusError;

/// Serialize an envelope to a payload.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, BusError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(BusError::Encode)
}

/// Deserialize a payload into an envelope.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, BusError> {
    serde_json::from_slice(payload).map_err(BusError::Decode)
}
