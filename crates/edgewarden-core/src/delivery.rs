// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscriber bindings and pending-delivery bookkeeping.
//!
//! One table owns both directions of the mapping: receiver identifier →
//! live connection, and connection → its single in-flight unacknowledged
//! message. Every read-modify-write happens under one lock so the two
//! views can never drift apart.
//!
//! Each connection has a single-slot pending queue: at most one message in
//! flight per subscriber. A redelivery is triggered by inbound traffic
//! (any frame that is not an ACK), not by a timer; after the retry bound
//! is exhausted the pending entry and the binding are both discarded.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use edgewarden_protocol::frame::Frame;
use edgewarden_protocol::message::Message;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default bound on unacknowledged redelivery attempts per connection.
pub const DEFAULT_RETRY_LIMIT: u32 = 10;

/// Identifier of one live connection, unique for the process lifetime.
pub type ConnId = u64;

/// The message awaiting acknowledgment on one connection.
#[derive(Debug, Clone)]
struct Pending {
    message: Message,
    retries: u32,
}

/// A live subscriber connection.
struct Binding {
    conn_id: ConnId,
    outbound: mpsc::UnboundedSender<Bytes>,
    pending: Option<Pending>,
}

/// Table of live subscriber bindings, keyed by receiver identifier.
///
/// At most one binding per receiver at any instant; a new handshake for
/// the same receiver replaces the prior binding.
pub struct SubscriberTable {
    inner: Mutex<HashMap<String, Binding>>,
    next_conn_id: AtomicU64,
    retry_limit: u32,
}

impl Default for SubscriberTable {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_LIMIT)
    }
}

impl SubscriberTable {
    /// Create a table with the given redelivery bound.
    pub fn new(retry_limit: u32) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            retry_limit,
        }
    }

    /// Install a binding for `receiver_id`, replacing any prior binding.
    ///
    /// Returns the connection identifier of the new binding. The
    /// superseded binding (if any) is dropped here, which closes its
    /// outbound channel and ends its connection task.
    pub fn bind(&self, receiver_id: &str, outbound: mpsc::UnboundedSender<Bytes>) -> ConnId {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.insert(
            receiver_id.to_string(),
            Binding {
                conn_id,
                outbound,
                pending: None,
            },
        ) {
            debug!(
                receiver_id = %receiver_id,
                old_conn = old.conn_id,
                new_conn = conn_id,
                "Subscriber binding replaced"
            );
        }
        conn_id
    }

    /// Tear down the binding owned by `conn_id`.
    ///
    /// A no-op when the receiver has already been rebound to a newer
    /// connection: a stale close must not evict its replacement.
    pub fn unbind(&self, conn_id: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        inner.retain(|_, binding| binding.conn_id != conn_id);
    }

    /// Whether `conn_id` still owns a live binding.
    pub fn is_bound(&self, conn_id: ConnId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.values().any(|b| b.conn_id == conn_id)
    }

    /// Connection currently bound for `receiver_id`, if any.
    pub fn binding_of(&self, receiver_id: &str) -> Option<ConnId> {
        let inner = self.inner.lock().unwrap();
        inner.get(receiver_id).map(|b| b.conn_id)
    }

    /// Whether `conn_id` has an unacknowledged message in flight.
    pub fn has_pending(&self, conn_id: ConnId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .values()
            .any(|b| b.conn_id == conn_id && b.pending.is_some())
    }

    /// Hand a published message to the receiver's live binding.
    ///
    /// Silent no-op when the receiver has no binding. The message becomes
    /// the connection's pending delivery, replacing any previous entry.
    /// The send never blocks: frames go through the connection's
    /// unbounded outbound channel, so a slow subscriber cannot stall the
    /// publisher or other subscribers.
    pub fn deliver(&self, message: &Message) {
        let frame = match message.to_bytes() {
            Ok(body) => Frame::Msg(body),
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to encode message for delivery");
                return;
            }
        };
        let mut inner = self.inner.lock().unwrap();
        let Some(binding) = inner.get_mut(&message.receiver) else {
            return;
        };
        binding.pending = Some(Pending {
            message: message.clone(),
            retries: 0,
        });
        // A failed send means the connection task is gone; the close path
        // tears the binding down.
        let _ = binding.outbound.send(frame.encode());
    }

    /// Clear the pending delivery for `conn_id` after an ACK.
    pub fn ack(&self, conn_id: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        for binding in inner.values_mut() {
            if binding.conn_id == conn_id {
                if binding.pending.take().is_some() {
                    debug!(conn_id, "Pending delivery acknowledged");
                }
                return;
            }
        }
    }

    /// Drive the retry protocol for `conn_id`.
    ///
    /// Called when a connection sends anything other than an ACK while a
    /// delivery is pending: below the bound, the original pending message
    /// is resent and the counter incremented; at or beyond the bound, the
    /// pending entry and the binding are both discarded.
    pub fn nudge(&self, conn_id: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        let Some(receiver_id) = inner
            .iter()
            .find(|(_, b)| b.conn_id == conn_id)
            .map(|(k, _)| k.clone())
        else {
            return;
        };

        let exhausted = {
            let Some(binding) = inner.get_mut(&receiver_id) else {
                return;
            };
            let Some(pending) = binding.pending.as_mut() else {
                return;
            };
            if pending.retries < self.retry_limit {
                pending.retries += 1;
                match pending.message.to_bytes() {
                    Ok(body) => {
                        debug!(conn_id, retries = pending.retries, "Resending pending message");
                        let _ = binding.outbound.send(Frame::Msg(body).encode());
                    }
                    Err(e) => {
                        warn!(conn_id, error = %e, "Failed to re-encode pending message");
                    }
                }
                false
            } else {
                true
            }
        };

        if exhausted {
            warn!(
                receiver_id = %receiver_id,
                conn_id,
                "Redelivery bound exhausted, dropping subscriber"
            );
            inner.remove(&receiver_id);
        }
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Whether no subscriber is bound.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(receiver: &str) -> Message {
        Message {
            id: "m-1".to_string(),
            timestamp: 1,
            publisher: "p".to_string(),
            receiver: receiver.to_string(),
            payload: b"x".to_vec(),
        }
    }

    #[test]
    fn test_bind_and_lookup() {
        let table = SubscriberTable::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = table.bind("recv-a", tx);

        assert!(table.is_bound(conn));
        assert_eq!(table.binding_of("recv-a"), Some(conn));
        assert_eq!(table.binding_of("recv-b"), None);
    }

    #[test]
    fn test_rebind_replaces_prior_binding() {
        let table = SubscriberTable::default();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let first = table.bind("recv-a", tx1);
        let second = table.bind("recv-a", tx2);

        assert!(!table.is_bound(first));
        assert_eq!(table.binding_of("recv-a"), Some(second));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_stale_unbind_does_not_evict_replacement() {
        let table = SubscriberTable::default();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let stale = table.bind("recv-a", tx1);
        let live = table.bind("recv-a", tx2);

        table.unbind(stale);
        assert_eq!(table.binding_of("recv-a"), Some(live));
    }

    #[test]
    fn test_deliver_without_binding_is_noop() {
        let table = SubscriberTable::default();
        table.deliver(&message("nobody"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_deliver_sets_pending_and_sends_frame() {
        let table = SubscriberTable::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = table.bind("recv-a", tx);

        table.deliver(&message("recv-a"));

        assert!(table.has_pending(conn));
        let encoded = rx.try_recv().unwrap();
        let frame = Frame::decode(&encoded).unwrap();
        assert!(matches!(frame, Frame::Msg(_)));
    }

    #[test]
    fn test_redelivery_replaces_pending_slot() {
        let table = SubscriberTable::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = table.bind("recv-a", tx);

        table.deliver(&message("recv-a"));
        let mut second = message("recv-a");
        second.id = "m-2".to_string();
        table.deliver(&second);

        // Two frames sent, but only one pending slot.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert!(table.has_pending(conn));
    }

    #[test]
    fn test_ack_clears_pending() {
        let table = SubscriberTable::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = table.bind("recv-a", tx);

        table.deliver(&message("recv-a"));
        table.ack(conn);

        assert!(!table.has_pending(conn));
        assert!(table.is_bound(conn));
    }

    #[test]
    fn test_nudge_resends_original_message() {
        let table = SubscriberTable::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = table.bind("recv-a", tx);

        table.deliver(&message("recv-a"));
        let first = rx.try_recv().unwrap();
        table.nudge(conn);
        let resent = rx.try_recv().unwrap();

        // The resend carries the original pending message, byte for byte.
        assert_eq!(first, resent);
    }

    #[test]
    fn test_nudge_without_pending_is_noop() {
        let table = SubscriberTable::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = table.bind("recv-a", tx);

        table.nudge(conn);

        assert!(rx.try_recv().is_err());
        assert!(table.is_bound(conn));
    }

    #[test]
    fn test_retry_bound_tears_down_binding() {
        let table = SubscriberTable::new(10);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = table.bind("recv-a", tx);

        table.deliver(&message("recv-a"));
        assert!(rx.try_recv().is_ok());

        // Exactly 10 redelivery attempts go out.
        for _ in 0..10 {
            table.nudge(conn);
            assert!(rx.try_recv().is_ok());
        }

        // The next nudge finds the bound exhausted: pending and binding
        // are both cleared, nothing more is sent.
        table.nudge(conn);
        assert!(rx.try_recv().is_err());
        assert!(!table.is_bound(conn));
        assert!(!table.has_pending(conn));
        assert_eq!(table.binding_of("recv-a"), None);
    }
}
