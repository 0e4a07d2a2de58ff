// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Edgewarden Core - Message Bus and Real-time Delivery
//!
//! This crate is the authoritative log for inter-workload messages on an
//! edge node. It stamps identity and ordering metadata at publish time,
//! answers historical range queries, and fans published messages out to
//! live subscribers over the real-time delivery protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Local workloads / clients                   │
//! └──────────────────────────────────────────────────────────────────┘
//!          │ MSG frames                        │ POST /v2/messages/query
//!          ▼                                   ▼
//! ┌──────────────────┐                ┌──────────────────┐
//! │ Real-time server │                │  Query endpoint  │
//! │  (per-subscriber │                │      (axum)      │
//! │   connections)   │                └────────┬─────────┘
//! └────────┬─────────┘                         │
//!          │ publish                           │ query
//!          ▼                                   ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          MessageBus                              │
//! │        stamp (id + timestamp) → append → fan out                 │
//! └────────────────────────────┬─────────────────────────────────────┘
//!                              │ deliver
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │   SubscriberTable: receiver → connection + pending delivery      │
//! │          (single-slot pending, bounded retry, ACK)               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Delivery guarantees
//!
//! At-least-once to live subscribers, with a single in-flight message per
//! connection and a bounded number of redelivery attempts. Receivers that
//! have never connected get nothing (no store-and-forward); the historical
//! query path reads the same log independently of delivery state.
//!
//! # Modules
//!
//! - [`bus`]: the message log (publish stamping, range queries, fan-out)
//! - [`delivery`]: subscriber bindings and pending-delivery bookkeeping
//! - [`realtime`]: the per-connection protocol handler and TCP server
//! - [`query_api`]: the historical query HTTP endpoint
//! - [`error`]: error types for core operations

#![deny(missing_docs)]

/// The message log: publish stamping, range queries, fan-out.
pub mod bus;

/// Subscriber bindings and pending-delivery bookkeeping.
pub mod delivery;

/// Error types for core operations.
pub mod error;

/// Historical query HTTP endpoint.
pub mod query_api;

/// Real-time protocol handler and TCP server.
pub mod realtime;

pub use bus::MessageBus;
pub use delivery::SubscriberTable;
pub use error::{CoreError, Result};
