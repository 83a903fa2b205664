//! Protocol client for the purchase server.
//!
//! Used by the load generator and the integration tests. One client owns one
//! persistent connection and issues requests sequentially on it.

use flashsale_core::codec::{self, ATTEMPT_PURCHASE, Frame, FrameError};
use flashsale_core::purchase::{PurchaseRequest, PurchaseResponse};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Errors returned by [`PurchaseClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// Frame could not be read or written
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Connection could not be established
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request or response payload was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server answered with a different type byte than was sent
    #[error("unexpected message type: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedType {
        /// Type byte that was sent
        expected: u8,
        /// Type byte that came back
        actual: u8,
    },
}

/// A single persistent connection to a purchase server.
///
/// # Example
///
/// ```ignore
/// let mut client = PurchaseClient::connect("127.0.0.1:8080").await?;
/// match client.attempt_purchase("iphone15", "user_1").await? {
///     PurchaseResponse::Success { remaining_stock } => println!("{remaining_stock} left"),
///     PurchaseResponse::SoldOut => println!("sold out"),
///     PurchaseResponse::Error { error } => eprintln!("{error}"),
/// }
/// ```
pub struct PurchaseClient {
    stream: BufStream<TcpStream>,
}

impl PurchaseClient {
    /// Open a connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the server cannot be reached.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: BufStream::new(stream),
        })
    }

    /// Send one purchase attempt and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport failure or a malformed response.
    pub async fn attempt_purchase(
        &mut self,
        product_id: &str,
        user_id: &str,
    ) -> Result<PurchaseResponse, ClientError> {
        let payload = serde_json::to_vec(&PurchaseRequest::new(product_id, user_id))?;
        let reply = self
            .exchange(&Frame::new(ATTEMPT_PURCHASE, payload))
            .await?;
        Ok(PurchaseResponse::from_payload(&reply.payload)?)
    }

    /// Send any frame and read the reply.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnexpectedType`] if the reply carries a
    /// different type byte, or a transport error.
    pub async fn exchange(&mut self, frame: &Frame) -> Result<Frame, ClientError> {
        codec::write_frame(&mut self.stream, frame).await?;
        let reply = self.read_frame().await?;
        if reply.kind != frame.kind {
            return Err(ClientError::UnexpectedType {
                expected: frame.kind,
                actual: reply.kind,
            });
        }
        Ok(reply)
    }

    /// Write raw bytes, bypassing the frame encoder.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the write fails.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read the next frame from the server.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Disconnected`] (wrapped) once the server closes
    /// the connection.
    pub async fn read_frame(&mut self) -> Result<Frame, ClientError> {
        Ok(codec::read_frame(&mut self.stream).await?)
    }
}
