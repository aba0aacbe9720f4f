//! Protocol module - wire format, framing, and commands.
//!
//! This module implements the Frame Codec:
//! - Transport headers for both directions, with optional checksum trailer
//! - Frame buffer for reassembling partial reads and resynchronizing
//! - Frame struct and the command set sent to the device

mod command;
mod frame;
mod frame_buffer;
mod wire_format;

pub use command::{ColorEntry, Command, DisplayWireId};
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    apply_mask, commands, encode_header, xor_checksum, Direction, FrameFormat, HeaderStatus,
    TransportHeader, CLOSE_FRAME, DEFAULT_MAX_PAYLOAD_SIZE, FRAME_MAGIC, MASK_KEY_SIZE,
    MAX_DEVICE_FRAME_PAYLOAD, MESSAGE_HEADER_SIZE,
};
