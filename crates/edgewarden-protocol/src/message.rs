// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message body codec.
//!
//! The body of a `MSG` frame is a JSON document. Inbound publishes carry a
//! [`RawMessage`] (no identity yet); outbound deliveries carry a stamped
//! [`Message`] whose identifier and timestamp were assigned by the bus at
//! publish time, never by the publisher.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::frame::FrameError;

/// A message as submitted by a publisher, before the bus stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Identifier of the publishing workload.
    pub publisher: String,
    /// Identifier of the receiving workload (or broadcast identifier).
    pub receiver: String,
    /// Opaque payload bytes.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl RawMessage {
    /// Decode a raw message from a `MSG` frame body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode the raw message as a `MSG` frame body.
    pub fn to_bytes(&self) -> Result<Bytes, FrameError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// A message after the bus assigned its identity.
///
/// Immutable once published: identifier and timestamp are set exactly once,
/// at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Bus-assigned unique identifier.
    pub id: String,
    /// Bus-assigned publish timestamp (epoch milliseconds).
    pub timestamp: i64,
    /// Identifier of the publishing workload.
    pub publisher: String,
    /// Identifier of the receiving workload.
    pub receiver: String,
    /// Opaque payload bytes.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl Message {
    /// Stamp a raw message with its bus-assigned identity.
    pub fn stamp(raw: RawMessage, id: String, timestamp: i64) -> Self {
        Self {
            id,
            timestamp,
            publisher: raw.publisher,
            receiver: raw.receiver,
            payload: raw.payload,
        }
    }

    /// Decode a stamped message from a `MSG` frame body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode the stamped message as a `MSG` frame body.
    pub fn to_bytes(&self) -> Result<Bytes, FrameError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
