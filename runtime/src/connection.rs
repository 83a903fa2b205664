//! Per-connection request loop.
//!
//! Each accepted socket is driven by one [`ConnectionHandler`] on its own task:
//!
//! ```text
//! Reading ──► Processing ──► Writing ──► Reading ...
//!    │                          │
//!    └──────────► Closed ◄──────┘
//! ```
//!
//! `Closed` is reached on peer disconnect, a protocol error, a write failure,
//! an idle timeout, or shutdown. Shutdown is only observed while `Reading`, so
//! a frame that has been read is always answered.

use crate::engine::PurchaseEngine;
use crate::metrics::ConnectionMetrics;
use crate::shutdown::Shutdown;
use flashsale_core::codec::{self, FrameError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufStream};
use tokio::time::timeout;

/// Default rolling inactivity timeout per read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Reasons a connection was closed abnormally.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Malformed or oversized frame, or a transport error while reading
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// No complete frame arrived within the read timeout
    #[error("idle for {0:?}")]
    IdleTimeout(Duration),

    /// The response could not be written
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
}

impl ConnectionError {
    /// Stable label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Frame(FrameError::TooLarge { .. }) => "frame_too_large",
            Self::Frame(_) => "read",
            Self::IdleTimeout(_) => "idle_timeout",
            Self::Write(_) => "write",
        }
    }
}

/// Drives the request loop of one connection.
pub struct ConnectionHandler<S> {
    stream: BufStream<S>,
    peer: SocketAddr,
    engine: Arc<PurchaseEngine>,
    shutdown: Shutdown,
    read_timeout: Duration,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an accepted stream.
    pub fn new(
        stream: S,
        peer: SocketAddr,
        engine: Arc<PurchaseEngine>,
        shutdown: Shutdown,
        read_timeout: Duration,
    ) -> Self {
        Self {
            stream: BufStream::new(stream),
            peer,
            engine,
            shutdown,
            read_timeout,
        }
    }

    /// Serve frames until the peer leaves, an error occurs, or shutdown.
    ///
    /// A clean disconnect (including one in the middle of a frame) and an
    /// observed shutdown both return `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] for oversized frames, read failures, idle
    /// timeouts and write failures. No response is sent for any of them.
    pub async fn run(&mut self) -> Result<(), ConnectionError> {
        let read_timeout = self.read_timeout;

        while !self.shutdown.is_shutdown() {
            // Wait for the first byte of the next frame, or shutdown
            let readable = tokio::select! {
                biased;
                () = self.shutdown.recv() => return Ok(()),
                ready = timeout(read_timeout, self.stream.fill_buf()) => match ready {
                    Err(_) => return Err(ConnectionError::IdleTimeout(read_timeout)),
                    Ok(Err(e)) => return Err(FrameError::Io(e).into()),
                    Ok(Ok(buf)) => !buf.is_empty(),
                },
            };
            if !readable {
                tracing::debug!(peer = %self.peer, "Peer closed connection");
                return Ok(());
            }

            let frame = match timeout(read_timeout, codec::read_frame(&mut self.stream)).await {
                Err(_) => return Err(ConnectionError::IdleTimeout(read_timeout)),
                Ok(Err(FrameError::Disconnected)) => {
                    tracing::debug!(peer = %self.peer, "Peer disconnected mid-frame");
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(frame)) => frame,
            };

            let reply = self.engine.handle_frame(&frame).await;

            codec::write_frame(&mut self.stream, &reply)
                .await
                .map_err(|e| match e {
                    FrameError::Io(io) => ConnectionError::Write(io),
                    other => ConnectionError::Frame(other),
                })?;
        }

        Ok(())
    }

    /// Run to completion, logging and recording how the connection ended.
    pub async fn serve(mut self) {
        ConnectionMetrics::record_open();
        tracing::debug!(peer = %self.peer, "Connection opened");

        match self.run().await {
            Ok(()) => {}
            Err(e) => {
                ConnectionMetrics::record_error(e.kind());
                match &e {
                    ConnectionError::Frame(FrameError::Io(_)) | ConnectionError::Write(_) => {
                        tracing::debug!(peer = %self.peer, error = %e, "Connection I/O failed");
                    }
                    _ => tracing::warn!(peer = %self.peer, error = %e, "Closing connection"),
                }
            }
        }

        ConnectionMetrics::record_close();
        tracing::debug!(peer = %self.peer, "Connection closed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownCoordinator;
    use flashsale_core::codec::{ATTEMPT_PURCHASE, Frame, MAX_PAYLOAD_LEN};
    use flashsale_core::purchase::PurchaseResponse;
    use flashsale_testing::{InMemoryInventoryStore, RecordingEventPublisher, test_clock};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    fn engine(stock: i64) -> Arc<PurchaseEngine> {
        let store = InMemoryInventoryStore::new().with_product("p1", stock);
        Arc::new(PurchaseEngine::new(
            Arc::new(store),
            Arc::new(RecordingEventPublisher::new()),
            Arc::new(test_clock()),
        ))
    }

    fn handler(
        server: DuplexStream,
        coordinator: &ShutdownCoordinator,
        read_timeout: Duration,
    ) -> ConnectionHandler<DuplexStream> {
        ConnectionHandler::new(
            server,
            "127.0.0.1:9".parse().unwrap(),
            engine(2),
            coordinator.subscribe(),
            read_timeout,
        )
    }

    #[tokio::test]
    async fn test_serves_frames_in_order_then_closes_on_eof() {
        let coordinator = ShutdownCoordinator::new();
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn({
            let mut handler = handler(server, &coordinator, DEFAULT_READ_TIMEOUT);
            async move { handler.run().await }
        });

        let request = br#"{"product_id":"p1","user_id":"u1"}"#;
        for expected in [1, 0] {
            let bytes = codec::encode(ATTEMPT_PURCHASE, request).unwrap();
            client.write_all(&bytes).await.unwrap();
            let reply = codec::read_frame(&mut client).await.unwrap();
            assert_eq!(
                PurchaseResponse::from_payload(&reply.payload).unwrap(),
                PurchaseResponse::Success {
                    remaining_stock: expected
                }
            );
        }

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_without_reply() {
        let coordinator = ShutdownCoordinator::new();
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn({
            let mut handler = handler(server, &coordinator, DEFAULT_READ_TIMEOUT);
            async move { handler.run().await }
        });

        let declared = u32::try_from(MAX_PAYLOAD_LEN + 1).unwrap();
        client.write_u8(ATTEMPT_PURCHASE).await.unwrap();
        client.write_u32(declared).await.unwrap();

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ConnectionError::Frame(FrameError::TooLarge { .. }))
        ));

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_idle_connection_times_out() {
        let coordinator = ShutdownCoordinator::new();
        let (_client, server) = duplex(4096);
        let mut handler = handler(server, &coordinator, Duration::from_millis(30));

        let result = handler.run().await;
        assert!(matches!(result, Err(ConnectionError::IdleTimeout(_))));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_clean_disconnect() {
        let coordinator = ShutdownCoordinator::new();
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn({
            let mut handler = handler(server, &coordinator, DEFAULT_READ_TIMEOUT);
            async move { handler.run().await }
        });

        client.write_all(&[ATTEMPT_PURCHASE, 0, 0, 0, 10, b'{']).await.unwrap();
        drop(client);

        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_idle_connection_exits_on_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let (_client, server) = duplex(4096);
        let task = tokio::spawn({
            let mut handler = handler(server, &coordinator, DEFAULT_READ_TIMEOUT);
            async move { handler.run().await }
        });

        coordinator.trigger_handle().trigger();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("handler should observe shutdown")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_type_keeps_connection_open() {
        let coordinator = ShutdownCoordinator::new();
        let (mut client, server) = duplex(4096);
        tokio::spawn({
            let mut handler = handler(server, &coordinator, DEFAULT_READ_TIMEOUT);
            async move { handler.run().await }
        });

        codec::write_frame(&mut client, &Frame::new(0x7f, Vec::new()))
            .await
            .unwrap();
        let reply = codec::read_frame(&mut client).await.unwrap();
        assert_eq!(reply.kind, 0x7f);

        let bytes =
            codec::encode(ATTEMPT_PURCHASE, br#"{"product_id":"p1","user_id":"u1"}"#).unwrap();
        client.write_all(&bytes).await.unwrap();
        let reply = codec::read_frame(&mut client).await.unwrap();
        assert_eq!(reply.kind, ATTEMPT_PURCHASE);
    }
}
