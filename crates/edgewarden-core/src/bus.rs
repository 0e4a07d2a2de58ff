// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The message bus: authoritative log, publish stamping, range queries.
//!
//! Exactly one logical bus per process, constructed by the composition
//! root and passed by handle to every component that needs it. Identifier
//! and timestamp are assigned here, at publish time, under a single write
//! lock: concurrent publishers observe a total order of stamping and no
//! two messages ever share an identifier.
//!
//! The log is in-memory and bounded; once the retention cap is reached
//! the oldest entries are evicted on append. Eviction policy beyond the
//! cap is the retention collaborator's concern, not the bus's.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use edgewarden_protocol::message::{Message, RawMessage};
use tracing::debug;
use uuid::Uuid;

use crate::delivery::SubscriberTable;

/// Default retention cap for the in-memory log.
pub const DEFAULT_RETENTION: usize = 8192;

/// The process-wide message bus.
pub struct MessageBus {
    log: RwLock<VecDeque<Message>>,
    retention: usize,
    subscribers: Arc<SubscriberTable>,
}

impl MessageBus {
    /// Create a bus fanning out to `subscribers`, retaining at most
    /// `retention` messages.
    pub fn new(subscribers: Arc<SubscriberTable>, retention: usize) -> Self {
        Self {
            log: RwLock::new(VecDeque::new()),
            retention,
            subscribers,
        }
    }

    /// Publish a message: stamp identity and timestamp, append to the
    /// log, fan out to the receiver's live binding.
    ///
    /// Never fails on a missing receiver; fan-out to an unbound receiver
    /// is a silent no-op. Returns the stamped message.
    pub fn publish(&self, raw: RawMessage) -> Message {
        let stamped = {
            let mut log = self.log.write().unwrap();
            let message = Message::stamp(
                raw,
                Uuid::new_v4().to_string(),
                Utc::now().timestamp_millis(),
            );
            log.push_back(message.clone());
            while log.len() > self.retention {
                log.pop_front();
            }
            message
        };
        debug!(
            message_id = %stamped.id,
            publisher = %stamped.publisher,
            receiver = %stamped.receiver,
            "Message published"
        );
        self.subscribers.deliver(&stamped);
        stamped
    }

    /// Messages from `publisher` to `receiver` with timestamp in
    /// `[start, end]` inclusive, in publish order.
    ///
    /// An empty or reversed range yields an empty result, never an error.
    /// Safe to call concurrently with ongoing publishes.
    pub fn query(&self, publisher: &str, receiver: &str, start: i64, end: i64) -> Vec<Message> {
        let log = self.log.read().unwrap();
        log.iter()
            .filter(|m| {
                m.publisher == publisher
                    && m.receiver == receiver
                    && m.timestamp >= start
                    && m.timestamp <= end
            })
            .cloned()
            .collect()
    }

    /// Number of messages currently retained.
    pub fn len(&self) -> usize {
        self.log.read().unwrap().len()
    }

    /// Whether the log holds no messages.
    pub fn is_empty(&self) -> bool {
        self.log.read().unwrap().is_empty()
    }
}
