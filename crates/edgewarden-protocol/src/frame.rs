// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Frame encoding and decoding for the real-time delivery protocol.
//!
//! Wire layout per frame:
//! - 1 byte: opcode
//! - N bytes: opcode-specific body
//!
//! `MSG` carries a 4-byte big-endian length prefix followed by the message
//! body. `RECEIPT` carries the assigned message identifier as raw UTF-8
//! bytes followed by an 8-byte big-endian timestamp. The control frames
//! (`PING`, `PONG`, `ACK`) have no body.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum accepted `MSG` body size (4 MB).
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Size of the `RECEIPT` timestamp trailer.
pub const RECEIPT_TIMESTAMP_SIZE: usize = 8;

/// Opcodes of the delivery protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Liveness probe from a subscriber.
    Ping = 0x9,
    /// Liveness reply to a recognized subscriber.
    Pong = 0xA,
    /// Receiver-to-sender acknowledgment of a delivered message.
    Ack = 0xB,
    /// A message publish or delivery.
    Msg = 0xD,
    /// Sender-to-publisher confirmation carrying identifier and timestamp.
    Receipt = 0xE,
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            0xB => Ok(Opcode::Ack),
            0xD => Ok(Opcode::Msg),
            0xE => Ok(Opcode::Receipt),
            _ => Err(FrameError::UnknownOpcode(value)),
        }
    }
}

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    /// Frame buffer was empty.
    #[error("empty frame")]
    Empty,

    /// Opcode byte is not part of the protocol.
    #[error("unknown opcode: {0:#x}")]
    UnknownOpcode(u8),

    /// Frame body was shorter than its header announced.
    #[error("truncated frame: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes required by the frame header.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// `MSG` body exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    /// `RECEIPT` identifier bytes were not valid UTF-8.
    #[error("receipt identifier is not valid UTF-8")]
    InvalidIdentifier,

    /// Transport-level I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Message body serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,
}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Liveness probe.
    Ping,
    /// Liveness reply.
    Pong,
    /// Delivery acknowledgment.
    Ack,
    /// Message publish/delivery with opaque body bytes.
    Msg(Bytes),
    /// Publish confirmation with the bus-assigned identifier and timestamp.
    Receipt {
        /// Bus-assigned message identifier.
        message_id: String,
        /// Bus-assigned publish timestamp (epoch milliseconds).
        timestamp: i64,
    },
}

impl Frame {
    /// Opcode of this frame.
    pub fn opcode(&self) -> Opcode {
        match self {
            Frame::Ping => Opcode::Ping,
            Frame::Pong => Opcode::Pong,
            Frame::Ack => Opcode::Ack,
            Frame::Msg(_) => Opcode::Msg,
            Frame::Receipt { .. } => Opcode::Receipt,
        }
    }

    /// Encode the frame to its wire representation.
    pub fn encode(&self) -> Bytes {
        match self {
            Frame::Ping | Frame::Pong | Frame::Ack => {
                Bytes::copy_from_slice(&[self.opcode() as u8])
            }
            Frame::Msg(body) => {
                let mut buf = BytesMut::with_capacity(1 + 4 + body.len());
                buf.put_u8(Opcode::Msg as u8);
                buf.put_u32(body.len() as u32);
                buf.put(body.clone());
                buf.freeze()
            }
            Frame::Receipt {
                message_id,
                timestamp,
            } => {
                let id_bytes = message_id.as_bytes();
                let mut buf =
                    BytesMut::with_capacity(1 + id_bytes.len() + RECEIPT_TIMESTAMP_SIZE);
                buf.put_u8(Opcode::Receipt as u8);
                buf.put_slice(id_bytes);
                buf.put_i64(*timestamp);
                buf.freeze()
            }
        }
    }

    /// Decode a frame from one complete transport message.
    ///
    /// The outer transport delimits frames, so the buffer holds exactly one
    /// frame. Control frames tolerate trailing padding bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        let opcode = *buf.first().ok_or(FrameError::Empty)?;
        match Opcode::try_from(opcode)? {
            Opcode::Ping => Ok(Frame::Ping),
            Opcode::Pong => Ok(Frame::Pong),
            Opcode::Ack => Ok(Frame::Ack),
            Opcode::Msg => {
                if buf.len() < 5 {
                    return Err(FrameError::Truncated {
                        expected: 5,
                        actual: buf.len(),
                    });
                }
                let length =
                    u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
                if length > MAX_FRAME_SIZE {
                    return Err(FrameError::FrameTooLarge(length));
                }
                if buf.len() < 5 + length {
                    return Err(FrameError::Truncated {
                        expected: 5 + length,
                        actual: buf.len(),
                    });
                }
                Ok(Frame::Msg(Bytes::copy_from_slice(&buf[5..5 + length])))
            }
            Opcode::Receipt => {
                if buf.len() < 1 + RECEIPT_TIMESTAMP_SIZE {
                    return Err(FrameError::Truncated {
                        expected: 1 + RECEIPT_TIMESTAMP_SIZE,
                        actual: buf.len(),
                    });
                }
                let ts_start = buf.len() - RECEIPT_TIMESTAMP_SIZE;
                let message_id = std::str::from_utf8(&buf[1..ts_start])
                    .map_err(|_| FrameError::InvalidIdentifier)?
                    .to_string();
                let mut ts_bytes = [0u8; RECEIPT_TIMESTAMP_SIZE];
                ts_bytes.copy_from_slice(&buf[ts_start..]);
                Ok(Frame::Receipt {
                    message_id,
                    timestamp: i64::from_be_bytes(ts_bytes),
                })
            }
        }
    }
}
