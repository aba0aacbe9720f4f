//! Frame struct with typed accessors.
//!
//! A [`Frame`] is one protocol message: the command byte, the transaction id
//! and the command data. Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use loupedeck_protocol::protocol::{commands, Frame};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(commands::VERSION, 7, Bytes::from_static(&[0, 10, 2]));
//! assert_eq!(frame.command(), commands::VERSION);
//! assert_eq!(frame.payload(), &[0, 10, 2]);
//! ```

use bytes::Bytes;

use super::wire_format::{
    apply_mask, encode_header, xor_checksum, Direction, FrameFormat, TransportHeader,
    MESSAGE_HEADER_SIZE,
};
use crate::error::{LoupedeckError, Result};

/// A complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command byte (see [`commands`](super::commands)).
    pub command: u8,
    /// Transaction id (0 = unsolicited).
    pub transaction_id: u8,
    /// Command data following the message header.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: u8, transaction_id: u8, payload: Bytes) -> Self {
        Self {
            command,
            transaction_id,
            payload,
        }
    }

    /// Create a frame from raw bytes (copies data).
    pub fn from_parts(command: u8, transaction_id: u8, payload: &[u8]) -> Self {
        Self::new(command, transaction_id, Bytes::copy_from_slice(payload))
    }

    /// Get the command byte.
    #[inline]
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Get the transaction id.
    #[inline]
    pub fn transaction_id(&self) -> u8 {
        self.transaction_id
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Check if this frame carries no transaction id.
    #[inline]
    pub fn is_unsolicited(&self) -> bool {
        self.transaction_id == 0
    }

    /// Encode the message (length, command, transaction id, data).
    pub fn encode_message(&self) -> Vec<u8> {
        let total = MESSAGE_HEADER_SIZE + self.payload.len();
        let mut buf = Vec::with_capacity(total);
        buf.push(total.min(0xFF) as u8);
        buf.push(self.command);
        buf.push(self.transaction_id);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a message from a transport payload.
    ///
    /// The length byte must equal the transport payload length. Messages
    /// longer than 255 bytes carry a saturated `0xFF` length byte instead.
    pub fn decode_message(payload: Bytes) -> Result<Self> {
        if payload.len() < MESSAGE_HEADER_SIZE {
            return Err(LoupedeckError::Protocol(format!(
                "Message of {} bytes is shorter than its header",
                payload.len()
            )));
        }

        let declared = usize::from(payload[0]);
        let consistent = declared == payload.len() || (declared == 0xFF && payload.len() > 0xFF);
        if !consistent {
            return Err(LoupedeckError::Protocol(format!(
                "Message length byte {} inconsistent with payload of {} bytes",
                declared,
                payload.len()
            )));
        }

        Ok(Self {
            command: payload[1],
            transaction_id: payload[2],
            payload: payload.slice(MESSAGE_HEADER_SIZE..),
        })
    }
}

/// Build a complete transport frame around a message.
///
/// # Example
///
/// ```
/// use loupedeck_protocol::protocol::{build_frame, commands, Direction, Frame, FrameFormat};
///
/// let frame = Frame::from_parts(commands::SET_BRIGHTNESS, 1, &[5]);
/// let bytes = build_frame(Direction::HostToDevice, FrameFormat::PLAIN, &frame).unwrap();
/// assert_eq!(bytes, vec![0x82, 0x84, 0, 0, 0, 0, 4, 0x09, 1, 5]);
/// ```
pub fn build_frame(direction: Direction, format: FrameFormat, frame: &Frame) -> Result<Vec<u8>> {
    let message = frame.encode_message();
    let mut buf = encode_header(direction, message.len())?;
    buf.reserve(message.len() + format.trailer_len());
    buf.extend_from_slice(&message);
    if format.checksum {
        buf.push(xor_checksum(&message));
    }
    Ok(buf)
}

/// Unmask a transport payload and verify its trailer, if any.
pub(crate) fn open_payload(
    header: &TransportHeader,
    format: FrameFormat,
    mut payload: Vec<u8>,
    trailer: &[u8],
) -> Result<Bytes> {
    if let Some(mask) = header.mask {
        apply_mask(&mut payload, mask);
    }
    if format.checksum {
        let expected = xor_checksum(&payload);
        let actual = trailer.first().copied().unwrap_or(!expected);
        if actual != expected {
            return Err(LoupedeckError::Protocol(format!(
                "Checksum mismatch: expected {:#04x}, got {:#04x}",
                expected, actual
            )));
        }
    }
    Ok(Bytes::from(payload))
}
