// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire protocol for edgewarden's real-time message delivery.
//!
//! The delivery protocol is a small framed application protocol carried
//! over a persistent duplex connection, one connection per subscriber.
//! Each frame is a 1-byte opcode followed by an opcode-specific body:
//!
//! | Opcode | Value | Body |
//! |--------|-------|------|
//! | `PING` | `0x9` | empty |
//! | `PONG` | `0xA` | empty |
//! | `ACK`  | `0xB` | empty |
//! | `MSG`  | `0xD` | 4-byte big-endian length + message body |
//! | `RECEIPT` | `0xE` | message identifier bytes + 8-byte big-endian timestamp |
//!
//! The outer transport (which delimits protocol frames on the stream) is
//! interchangeable; [`transport::FramedConnection`] provides the default
//! length-delimited adapter used by the TCP server and by tests.
//!
//! # Modules
//!
//! - [`frame`]: frame encoding/decoding (bit-exact wire layout)
//! - [`message`]: message body codec (raw and stamped messages)
//! - [`transport`]: framed duplex connection over any async byte stream

pub mod frame;
pub mod message;
pub mod transport;

pub use frame::{Frame, FrameError, Opcode};
pub use message::{Message, RawMessage};
pub use transport::FramedConnection;
