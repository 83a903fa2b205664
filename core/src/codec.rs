//! Length-prefixed frame codec for the purchase wire protocol.
//!
//! Every message on the wire is a single TLV frame:
//!
//! ```text
//! ┌──────────┬────────────────────┬──────────────────────┐
//! │ type: u8 │ length: u32 (BE)   │ payload: [u8; length] │
//! └──────────┴────────────────────┴──────────────────────┘
//! ```
//!
//! Reads block until the whole frame is available; the caller bounds that wait
//! with its own deadline. A declared length above [`MAX_PAYLOAD_LEN`] is a
//! protocol violation and is reported before any payload byte is read, so the
//! connection can be dropped without buffering attacker-controlled sizes.
//!
//! # Example
//!
//! ```
//! use flashsale_core::codec::{self, ATTEMPT_PURCHASE};
//!
//! let bytes = codec::encode(ATTEMPT_PURCHASE, b"{}").unwrap();
//! assert_eq!(bytes, [0x01, 0, 0, 0, 2, b'{', b'}']);
//! ```

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Message type for a purchase attempt (request and response share it).
pub const ATTEMPT_PURCHASE: u8 = 0x01;

/// Maximum accepted payload length (1 MiB).
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// Size of the fixed frame header: type byte plus big-endian length.
pub const HEADER_LEN: usize = 5;

/// Errors produced while reading or writing frames.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Declared (or supplied) payload length exceeds [`MAX_PAYLOAD_LEN`].
    #[error("payload too large: {len} bytes (max {MAX_PAYLOAD_LEN})")]
    TooLarge {
        /// The offending length
        len: usize,
    },

    /// Peer closed the connection before or in the middle of a frame.
    #[error("peer disconnected")]
    Disconnected,

    /// Any other transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Map a read failure, treating a short read as a disconnect.
    fn from_read(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Disconnected
        } else {
            Self::Io(error)
        }
    }
}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type byte.
    pub kind: u8,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame from a type byte and payload.
    #[must_use]
    pub const fn new(kind: u8, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }
}

/// Encode a frame into a contiguous byte vector.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] if `payload` exceeds [`MAX_PAYLOAD_LEN`];
/// such a frame would be rejected by any conforming peer.
pub fn encode(kind: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::TooLarge { len: payload.len() });
    }

    // Fits: bounded by MAX_PAYLOAD_LEN above
    #[allow(clippy::cast_possible_truncation)]
    let len = payload.len() as u32;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(kind);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Read exactly one frame from `reader`.
///
/// # Errors
///
/// - [`FrameError::Disconnected`] if the stream ends before a full frame
/// - [`FrameError::TooLarge`] if the declared length exceeds [`MAX_PAYLOAD_LEN`]
/// - [`FrameError::Io`] for any other read failure
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let kind = reader.read_u8().await.map_err(FrameError::from_read)?;
    let len = reader.read_u32().await.map_err(FrameError::from_read)? as usize;

    if len > MAX_PAYLOAD_LEN {
        return Err(FrameError::TooLarge { len });
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(FrameError::from_read)?;

    Ok(Frame { kind, payload })
}

/// Write one frame to `writer` and flush it.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] for an oversized payload, or
/// [`FrameError::Io`] if the write fails.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode(frame.kind, &frame.payload)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
