// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Framed duplex connection for the delivery protocol.
//!
//! Protocol frames are variable-length and not all of them are
//! self-delimiting on a byte stream, so the transport delimits them with a
//! length prefix (the role a WebSocket layer plays in other deployments).
//! The first transport message of a connection is the handshake: the
//! receiver identifier as UTF-8 bytes.

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::trace;

use crate::frame::{Frame, FrameError, MAX_FRAME_SIZE};

/// A framed duplex connection carrying protocol frames.
pub struct FramedConnection<S> {
    inner: Framed<S, LengthDelimitedCodec>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedConnection<S> {
    /// Wrap a duplex byte stream.
    pub fn new(stream: S) -> Self {
        let codec = LengthDelimitedCodec::builder()
            // Frame header + body; MSG bodies are bounded by the frame codec.
            .max_frame_length(MAX_FRAME_SIZE + 16)
            .new_codec();
        Self {
            inner: Framed::new(stream, codec),
        }
    }

    /// Send the handshake announcing this connection's receiver identifier.
    pub async fn send_handshake(&mut self, receiver_id: &str) -> Result<(), FrameError> {
        Ok(self
            .inner
            .send(Bytes::copy_from_slice(receiver_id.as_bytes()))
            .await?)
    }

    /// Receive the handshake from a newly opened connection.
    pub async fn recv_handshake(&mut self) -> Result<String, FrameError> {
        let bytes = self
            .next_message()
            .await?
            .ok_or(FrameError::ConnectionClosed)?;
        let receiver_id =
            String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::InvalidIdentifier)?;
        trace!(receiver_id = %receiver_id, "Handshake received");
        Ok(receiver_id)
    }

    /// Send a protocol frame.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), FrameError> {
        self.send_raw(frame.encode()).await
    }

    /// Send a pre-encoded frame.
    pub async fn send_raw(&mut self, bytes: Bytes) -> Result<(), FrameError> {
        Ok(self.inner.send(bytes).await?)
    }

    /// Receive the next protocol frame; `None` on orderly close.
    pub async fn recv_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        match self.next_message().await? {
            Some(bytes) => Frame::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn next_message(&mut self) -> Result<Option<Bytes>, FrameError> {
        match self.inner.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes.freeze())),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }

    /// Split into independent send and receive halves, so writes can
    /// proceed while a read is pending.
    pub fn split(self) -> (FramedSender<S>, FramedReceiver<S>) {
        let (sink, stream) = self.inner.split();
        (FramedSender { inner: sink }, FramedReceiver { inner: stream })
    }
}

/// Send half of a split [`FramedConnection`].
pub struct FramedSender<S> {
    inner: SplitSink<Framed<S, LengthDelimitedCodec>, Bytes>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedSender<S> {
    /// Send a protocol frame.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), FrameError> {
        self.send_raw(frame.encode()).await
    }

    /// Send a pre-encoded frame.
    pub async fn send_raw(&mut self, bytes: Bytes) -> Result<(), FrameError> {
        Ok(self.inner.send(bytes).await?)
    }
}

/// Receive half of a split [`FramedConnection`].
pub struct FramedReceiver<S> {
    inner: SplitStream<Framed<S, LengthDelimitedCodec>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedReceiver<S> {
    /// Receive the next protocol frame; `None` on orderly close.
    pub async fn recv_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        match self.inner.next().await {
            Some(Ok(bytes)) => Frame::decode(&bytes).map(Some),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handshake_round_trip() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = FramedConnection::new(client);
        let mut server = FramedConnection::new(server);

        client.send_handshake("receiver-7").await.unwrap();
        let id = server.recv_handshake().await.unwrap();
        assert_eq!(id, "receiver-7");
    }

    #[tokio::test]
    async fn test_frame_round_trip_over_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client = FramedConnection::new(client);
        let mut server = FramedConnection::new(server);

        client.send_frame(&Frame::Ping).await.unwrap();
        client
            .send_frame(&Frame::Msg(Bytes::from_static(b"body")))
            .await
            .unwrap();

        assert_eq!(server.recv_frame().await.unwrap(), Some(Frame::Ping));
        assert_eq!(
            server.recv_frame().await.unwrap(),
            Some(Frame::Msg(Bytes::from_static(b"body")))
        );
    }

    #[tokio::test]
    async fn test_recv_frame_none_on_close() {
        let (client, server) = tokio::io::duplex(1024);
        let mut server = FramedConnection::new(server);
        drop(client);

        assert_eq!(server.recv_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_halves_work_independently() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client = FramedConnection::new(client);
        let (mut server_tx, mut server_rx) = FramedConnection::new(server).split();

        client.send_frame(&Frame::Ack).await.unwrap();
        assert_eq!(server_rx.recv_frame().await.unwrap(), Some(Frame::Ack));

        server_tx.send_frame(&Frame::Pong).await.unwrap();
        assert_eq!(client.recv_frame().await.unwrap(), Some(Frame::Pong));
    }

    #[tokio::test]
    async fn test_recv_handshake_closed() {
        let (client, server) = tokio::io::duplex(1024);
        let mut server = FramedConnection::new(server);
        drop(client);

        assert!(matches!(
            server.recv_handshake().await,
            Err(FrameError::ConnectionClosed)
        ));
    }
}
