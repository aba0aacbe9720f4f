//! Outgoing commands.
//!
//! A [`Command`] is an immutable description of one request; the dispatcher
//! stamps it with a transaction id when it is sent.

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::commands;
use super::Frame;

/// Two-byte display identifier used by framebuffer and refresh commands.
pub type DisplayWireId = [u8; 2];

/// One button colour entry on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorEntry {
    /// Encoded control id.
    pub control: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// A request the host can send to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write pixels into a rectangle of a display framebuffer.
    WriteFramebuffer {
        display: DisplayWireId,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: Bytes,
    },
    /// Push the framebuffer of a display to the panel.
    RefreshDisplay { display: DisplayWireId },
    /// Set one or more button indicator colours.
    SetColor(Vec<ColorEntry>),
    /// Trigger a haptic pattern.
    Vibrate(u8),
    /// Set display brightness (0-10).
    SetBrightness(u8),
    /// Read the serial number.
    GetSerial,
    /// Read the firmware version.
    GetFirmwareVersion,
}

impl Command {
    /// The command byte on the wire.
    pub fn opcode(&self) -> u8 {
        match self {
            Command::WriteFramebuffer { .. } => commands::FRAMEBUFF,
            Command::RefreshDisplay { .. } => commands::DRAW,
            Command::SetColor(_) => commands::SET_COLOR,
            Command::Vibrate(_) => commands::SET_VIBRATION,
            Command::SetBrightness(_) => commands::SET_BRIGHTNESS,
            Command::GetSerial => commands::SERIAL,
            Command::GetFirmwareVersion => commands::VERSION,
        }
    }

    /// Encode the command data.
    pub fn encode_payload(&self) -> Bytes {
        match self {
            Command::WriteFramebuffer {
                display,
                x,
                y,
                width,
                height,
                pixels,
            } => {
                let mut buf = BytesMut::with_capacity(10 + pixels.len());
                buf.put_slice(display);
                buf.put_u16(*x);
                buf.put_u16(*y);
                buf.put_u16(*width);
                buf.put_u16(*height);
                buf.put_slice(pixels);
                buf.freeze()
            }
            Command::RefreshDisplay { display } => Bytes::copy_from_slice(display),
            Command::SetColor(entries) => {
                let mut buf = BytesMut::with_capacity(entries.len() * 4);
                for entry in entries {
                    buf.put_slice(&[entry.control, entry.red, entry.green, entry.blue]);
                }
                buf.freeze()
            }
            Command::Vibrate(pattern) => Bytes::copy_from_slice(&[*pattern]),
            Command::SetBrightness(value) => Bytes::copy_from_slice(&[*value]),
            Command::GetSerial | Command::GetFirmwareVersion => Bytes::new(),
        }
    }

    /// Build the frame for this command with the given transaction id.
    pub fn to_frame(&self, transaction_id: u8) -> Frame {
        Frame::new(self.opcode(), transaction_id, self.encode_payload())
    }
}
