// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Real-time delivery server.
//!
//! Accepts one persistent connection per subscriber. The handshake (first
//! transport message) announces the receiver identifier and installs a
//! subscriber binding, replacing any prior binding for that receiver.
//! After the handshake, inbound frames are processed one at a time in
//! arrival order; there is no ordering guarantee across connections.
//!
//! Frame handling:
//! - `PING` → `PONG`, but only for a recognized binding
//! - `MSG`  → decode, publish to the bus, reply `RECEIPT`
//! - `ACK`  → clear this connection's pending delivery
//! - anything else → drive the redelivery protocol (resend the pending
//!   message up to the retry bound, then tear the binding down)

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use edgewarden_protocol::frame::{Frame, FrameError};
use edgewarden_protocol::message::RawMessage;
use edgewarden_protocol::transport::{FramedConnection, FramedSender};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, warn};

use crate::bus::MessageBus;
use crate::delivery::{ConnId, SubscriberTable};
use crate::error::Result;

/// Run the real-time delivery TCP server until shutdown is signalled.
pub async fn run_realtime_server(
    bind_addr: SocketAddr,
    bus: Arc<MessageBus>,
    table: Arc<SubscriberTable>,
    shutdown: Arc<Notify>,
) -> Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "Real-time delivery server starting");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.notified() => {
                info!("Real-time delivery server received shutdown signal");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    debug!(remote = %remote, "New subscriber connection accepted");
                    let bus = bus.clone();
                    let table = table.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, bus, table).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept subscriber connection");
                }
            }
        }
    }

    Ok(())
}

/// Handle a single subscriber connection.
///
/// Generic over the byte stream so tests can drive it with an in-memory
/// duplex instead of a TCP socket.
pub async fn handle_connection<S>(stream: S, bus: Arc<MessageBus>, table: Arc<SubscriberTable>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = FramedConnection::new(stream);

    let receiver_id = match conn.recv_handshake().await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Subscriber handshake failed");
            return;
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Bytes>();
    let conn_id = table.bind(&receiver_id, outbound_tx);
    info!(receiver_id = %receiver_id, conn_id, "Subscriber bound");

    let (mut sender, mut receiver) = conn.split();
    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Some(bytes) => {
                    if let Err(e) = sender.send_raw(bytes).await {
                        warn!(conn_id, error = %e, "Outbound write failed");
                        break;
                    }
                }
                // Sender dropped: the binding was replaced by a newer
                // handshake or torn down by the retry bound.
                None => {
                    debug!(conn_id, "Binding gone, closing connection");
                    break;
                }
            },

            inbound = receiver.recv_frame() => match inbound {
                Ok(Some(frame)) => {
                    if let Err(e) = handle_frame(&mut sender, conn_id, frame, &bus, &table).await {
                        warn!(conn_id, error = %e, "Frame handling failed");
                        break;
                    }
                }
                Ok(None) => {
                    debug!(conn_id, "Connection closed by peer");
                    break;
                }
                Err(FrameError::Io(e)) => {
                    warn!(conn_id, error = %e, "Frame read failed");
                    break;
                }
                // Malformed or unknown frames drive the redelivery
                // protocol, exactly like recognizable non-ACK traffic.
                Err(e) => {
                    debug!(conn_id, error = %e, "Unrecognized frame");
                    table.nudge(conn_id);
                }
            },
        }
    }

    table.unbind(conn_id);
    debug!(receiver_id = %receiver_id, conn_id, "Subscriber connection closed");
}

async fn handle_frame<S>(
    sender: &mut FramedSender<S>,
    conn_id: ConnId,
    frame: Frame,
    bus: &MessageBus,
    table: &SubscriberTable,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match frame {
        Frame::Ping => {
            // Only a recognized binding earns a PONG.
            if table.is_bound(conn_id) {
                sender.send_frame(&Frame::Pong).await?;
            } else {
                debug!(conn_id, "PING from unrecognized connection ignored");
            }
        }

        Frame::Msg(body) => {
            if !table.is_bound(conn_id) {
                debug!(conn_id, "MSG from unrecognized connection ignored");
                return Ok(());
            }
            match RawMessage::from_bytes(&body) {
                Ok(raw) => {
                    let stamped = bus.publish(raw);
                    sender
                        .send_frame(&Frame::Receipt {
                            message_id: stamped.id,
                            timestamp: stamped.timestamp,
                        })
                        .await?;
                }
                Err(e) => {
                    warn!(conn_id, error = %e, "Malformed MSG body rejected");
                }
            }
        }

        Frame::Ack => {
            table.ack(conn_id);
        }

        // Anything else while a delivery is pending triggers a resend (or
        // the teardown once the bound is exhausted).
        Frame::Pong | Frame::Receipt { .. } => {
            table.nudge(conn_id);
        }
    }
    Ok(())
}
