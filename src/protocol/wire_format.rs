//! Wire format encoding and decoding.
//!
//! The devices speak WebSocket-style binary frames over a USB serial link.
//! The two directions use different headers:
//!
//! ```text
//! device -> host   ┌──────┬──────────┬─────────┬────────────┐
//!                  │ 0x82 │ len (u8) │ payload │ [checksum] │
//!                  └──────┴──────────┴─────────┴────────────┘
//!
//! host -> device   ┌──────┬──────────────────────┬──────────┬─────────┬────────────┐
//!                  │ 0x82 │ mask bit | len7       │ mask key │ payload │ [checksum] │
//!                  │      │ (+ u16 / u64 BE len)  │ 4 bytes  │         │            │
//!                  └──────┴──────────────────────┴──────────┴─────────┴────────────┘
//! ```
//!
//! Every payload is a protocol message:
//!
//! ```text
//! ┌────────┬─────────┬────────────────┬──────────┐
//! │ length │ command │ transaction id │ data ... │
//! │ 1 byte │ 1 byte  │ 1 byte         │          │
//! └────────┴─────────┴────────────────┴──────────┘
//! ```
//!
//! `length` counts the whole message and saturates at 255; the transport
//! header is authoritative for longer messages. Multi-byte integers are
//! Big Endian.

use crate::error::{LoupedeckError, Result};

/// Start marker of every transport frame (FIN + binary opcode).
pub const FRAME_MAGIC: u8 = 0x82;

/// Size of the message header (length, command, transaction id).
pub const MESSAGE_HEADER_SIZE: usize = 3;

/// Size of the WebSocket mask key sent by the host.
pub const MASK_KEY_SIZE: usize = 4;

/// Largest payload a device -> host frame can declare.
pub const MAX_DEVICE_FRAME_PAYLOAD: usize = 0xFF;

/// Default upper bound on a decoded host -> device payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u64 = 16 * 1024 * 1024;

/// Longest payload that fits the 7-bit length form.
const SHORT_LENGTH_LIMIT: usize = 125;
/// 7-bit length marker for a following u16 length.
const LENGTH_U16_MARKER: u8 = 126;
/// 7-bit length marker for a following u64 length.
const LENGTH_U64_MARKER: u8 = 127;
/// Mask bit in the second header byte.
const MASK_BIT: u8 = 0x80;

/// WebSocket close frame written when detaching from a device.
pub const CLOSE_FRAME: [u8; 6] = [0x88, 0x80, 0x00, 0x00, 0x00, 0x00];

/// Command bytes understood by the firmware.
pub mod commands {
    /// Button or knob press/release (inbound).
    pub const BUTTON_PRESS: u8 = 0x00;
    /// Knob rotation (inbound).
    pub const KNOB_ROTATE: u8 = 0x01;
    /// Set the colour of a button indicator.
    pub const SET_COLOR: u8 = 0x02;
    /// Read the serial number.
    pub const SERIAL: u8 = 0x03;
    /// Reset the device.
    pub const RESET: u8 = 0x06;
    /// Read the firmware version.
    pub const VERSION: u8 = 0x07;
    /// Set display brightness.
    pub const SET_BRIGHTNESS: u8 = 0x09;
    /// MCU information.
    pub const MCU: u8 = 0x0d;
    /// Push the framebuffer of a display to the panel.
    pub const DRAW: u8 = 0x0f;
    /// Write pixels into a display framebuffer.
    pub const FRAMEBUFF: u8 = 0x10;
    /// Trigger a haptic pattern.
    pub const SET_VIBRATION: u8 = 0x1b;
    /// Touch start/move on the main screen (inbound).
    pub const TOUCH: u8 = 0x4d;
    /// Touch start/move on the CT wheel (inbound).
    pub const TOUCH_CT: u8 = 0x52;
    /// Touch release on the main screen (inbound).
    pub const TOUCH_END: u8 = 0x6d;
    /// Touch release on the CT wheel (inbound).
    pub const TOUCH_END_CT: u8 = 0x72;
}

/// Which way a transport frame travels. The header layout depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Frames written by the host (masked WebSocket header).
    HostToDevice,
    /// Frames written by the device (magic byte + 1-byte length).
    DeviceToHost,
}

/// Per-model framing quirks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFormat {
    /// Trailing XOR checksum after the payload (not counted in the length).
    pub checksum: bool,
}

impl FrameFormat {
    /// Framing used by the shipped models.
    pub const PLAIN: FrameFormat = FrameFormat { checksum: false };
    /// Framing with a trailing checksum byte.
    pub const CHECKSUMMED: FrameFormat = FrameFormat { checksum: true };

    /// Number of trailer bytes following the payload.
    #[inline]
    pub fn trailer_len(&self) -> usize {
        usize::from(self.checksum)
    }
}

/// Decoded transport header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    /// Bytes occupied by the header itself.
    pub header_len: usize,
    /// Declared payload length.
    pub payload_length: u64,
    /// Mask key, if the mask bit was set.
    pub mask: Option<[u8; MASK_KEY_SIZE]>,
}

/// Outcome of trying to decode a header from the front of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// More bytes are required.
    Incomplete,
    /// The bytes cannot be a header (wrong marker or impossible length).
    Invalid,
    /// A complete header.
    Complete(TransportHeader),
}

impl TransportHeader {
    /// Decode a header from the start of `buf`.
    ///
    /// # Example
    ///
    /// ```
    /// use loupedeck_protocol::protocol::{Direction, HeaderStatus, TransportHeader};
    ///
    /// let status = TransportHeader::decode(Direction::DeviceToHost, &[0x82, 0x04], u64::MAX);
    /// match status {
    ///     HeaderStatus::Complete(header) => assert_eq!(header.payload_length, 4),
    ///     _ => unreachable!(),
    /// }
    /// ```
    pub fn decode(direction: Direction, buf: &[u8], max_payload: u64) -> HeaderStatus {
        let Some(&first) = buf.first() else {
            return HeaderStatus::Incomplete;
        };
        if first != FRAME_MAGIC {
            return HeaderStatus::Invalid;
        }
        let Some(&second) = buf.get(1) else {
            return HeaderStatus::Incomplete;
        };

        match direction {
            Direction::DeviceToHost => HeaderStatus::Complete(TransportHeader {
                header_len: 2,
                payload_length: u64::from(second),
                mask: None,
            }),
            Direction::HostToDevice => {
                let masked = second & MASK_BIT != 0;
                let (length_len, payload_length) = match second & !MASK_BIT {
                    LENGTH_U16_MARKER => {
                        if buf.len() < 4 {
                            return HeaderStatus::Incomplete;
                        }
                        (2, u64::from(u16::from_be_bytes([buf[2], buf[3]])))
                    }
                    LENGTH_U64_MARKER => {
                        if buf.len() < 10 {
                            return HeaderStatus::Incomplete;
                        }
                        let mut raw = [0u8; 8];
                        raw.copy_from_slice(&buf[2..10]);
                        (8, u64::from_be_bytes(raw))
                    }
                    short => (0, u64::from(short)),
                };

                if payload_length > max_payload {
                    return HeaderStatus::Invalid;
                }

                let mask_start = 2 + length_len;
                let header_len = mask_start + if masked { MASK_KEY_SIZE } else { 0 };
                if buf.len() < header_len {
                    return HeaderStatus::Incomplete;
                }

                let mask = masked.then(|| {
                    let mut key = [0u8; MASK_KEY_SIZE];
                    key.copy_from_slice(&buf[mask_start..header_len]);
                    key
                });

                HeaderStatus::Complete(TransportHeader {
                    header_len,
                    payload_length,
                    mask,
                })
            }
        }
    }
}

/// Encode a transport header for a payload of `payload_len` bytes.
///
/// Host frames always carry an all-zero mask key, which leaves the payload
/// unchanged on the wire.
pub fn encode_header(direction: Direction, payload_len: usize) -> Result<Vec<u8>> {
    match direction {
        Direction::DeviceToHost => {
            let len = u8::try_from(payload_len).map_err(|_| {
                LoupedeckError::Protocol(format!(
                    "Payload size {} exceeds maximum {} for device frames",
                    payload_len, MAX_DEVICE_FRAME_PAYLOAD
                ))
            })?;
            Ok(vec![FRAME_MAGIC, len])
        }
        Direction::HostToDevice => {
            let mut header = Vec::with_capacity(14);
            header.push(FRAME_MAGIC);
            if payload_len <= SHORT_LENGTH_LIMIT {
                // Fits in 7 bits
                header.push(MASK_BIT | payload_len as u8);
            } else if let Ok(len) = u16::try_from(payload_len) {
                header.push(MASK_BIT | LENGTH_U16_MARKER);
                header.extend_from_slice(&len.to_be_bytes());
            } else {
                header.push(MASK_BIT | LENGTH_U64_MARKER);
                header.extend_from_slice(&(payload_len as u64).to_be_bytes());
            }
            header.extend_from_slice(&[0u8; MASK_KEY_SIZE]);
            Ok(header)
        }
    }
}

/// XOR of every payload byte.
#[inline]
pub fn xor_checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, b| acc ^ b)
}

/// Apply (or remove) a WebSocket mask in place.
pub fn apply_mask(payload: &mut [u8], mask: [u8; MASK_KEY_SIZE]) {
    if mask == [0; MASK_KEY_SIZE] {
        return;
    }
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % MASK_KEY_SIZE];
    }
}
