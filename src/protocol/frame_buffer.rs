//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need a start marker, a complete transport header and
//!   the message length byte
//! - `WaitingForPayload`: Header accepted, need the rest of the frame
//!
//! Nothing is consumed until a frame verifies. A marker whose header is
//! implausible, or whose frame fails its message or checksum check, costs
//! exactly one byte and scanning resumes right after it, so a stray `0x82`
//! in front of a real frame does not swallow that frame.
//!
//! # Example
//!
//! ```
//! use loupedeck_protocol::protocol::{Direction, FrameBuffer, FrameFormat};
//!
//! let mut buffer = FrameBuffer::new(Direction::DeviceToHost, FrameFormat::PLAIN);
//!
//! // A button press split across two reads
//! assert!(buffer.feed(&[0x82, 5, 5]).is_empty());
//! let frames = buffer.feed(&[0x00, 0, 0x07, 0x00]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].payload(), &[0x07, 0x00]);
//! ```

use bytes::BytesMut;

use super::frame::open_payload;
use super::wire_format::{
    Direction, FrameFormat, HeaderStatus, TransportHeader, DEFAULT_MAX_PAYLOAD_SIZE, FRAME_MAGIC,
    MESSAGE_HEADER_SIZE,
};
use super::Frame;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a start marker and complete header.
    WaitingForHeader,
    /// Header accepted and still buffered, waiting for payload (and trailer) bytes.
    WaitingForPayload { header: TransportHeader },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Which header layout to expect.
    direction: Direction,
    /// Per-model framing quirks.
    format: FrameFormat,
    /// Maximum allowed payload size.
    max_payload_size: u64,
    /// Frames discarded because they failed validation.
    dropped_frames: u64,
    /// Bytes skipped while hunting for a start marker.
    skipped_bytes: u64,
}

impl FrameBuffer {
    /// Create a new frame buffer decoding frames that travel in `direction`.
    pub fn new(direction: Direction, format: FrameFormat) -> Self {
        Self::with_max_payload(direction, format, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max payload size.
    pub fn with_max_payload(
        direction: Direction,
        format: FrameFormat,
        max_payload_size: u64,
    ) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            state: State::WaitingForHeader,
            direction,
            format,
            max_payload_size,
            dropped_frames: 0,
            skipped_bytes: 0,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// `data` may contain any number of frames and may end mid-frame; the
    /// incomplete tail is kept for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns `None` when more data is needed.
    fn try_extract_one(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    if self.buffer.is_empty() {
                        return None;
                    }

                    if self.buffer[0] != FRAME_MAGIC {
                        self.resync();
                        continue;
                    }

                    let status = TransportHeader::decode(
                        self.direction,
                        &self.buffer,
                        self.max_payload_size,
                    );
                    match status {
                        HeaderStatus::Incomplete => return None,
                        HeaderStatus::Invalid => self.reject_marker("implausible header"),
                        HeaderStatus::Complete(header) => match self.length_byte_agrees(&header) {
                            None => return None,
                            Some(true) => self.state = State::WaitingForPayload { header },
                            Some(false) => self.reject_marker("length byte disagrees with header"),
                        },
                    }
                }

                State::WaitingForPayload { header } => {
                    // Bounded by max_payload_size, which fits in memory
                    let payload_len = header.payload_length as usize;
                    let payload_end = header.header_len + payload_len;
                    let total = payload_end + self.format.trailer_len();
                    if self.buffer.len() < total {
                        return None;
                    }
                    self.state = State::WaitingForHeader;

                    let payload = self.buffer[header.header_len..payload_end].to_vec();
                    let trailer = &self.buffer[payload_end..total];
                    match open_payload(&header, self.format, payload, trailer)
                        .and_then(Frame::decode_message)
                    {
                        Ok(frame) => {
                            let _ = self.buffer.split_to(total);
                            return Some(frame);
                        }
                        Err(e) => {
                            tracing::warn!("Dropping frame: {}", e);
                            self.dropped_frames += 1;
                            let _ = self.buffer.split_to(1);
                        }
                    }
                }
            }
        }
    }

    /// Check the message length byte against the transport length.
    ///
    /// Returns `None` until the byte has arrived.
    fn length_byte_agrees(&self, header: &TransportHeader) -> Option<bool> {
        if header.payload_length < MESSAGE_HEADER_SIZE as u64 {
            return Some(false);
        }
        let raw = *self.buffer.get(header.header_len)?;
        let declared = header.mask.map_or(raw, |mask| raw ^ mask[0]);
        // Long messages saturate the length byte
        let expected = u8::try_from(header.payload_length).unwrap_or(0xFF);
        Some(declared == expected)
    }

    /// Give up on the marker at the front and scan on from the next byte.
    fn reject_marker(&mut self, reason: &str) {
        tracing::debug!("Skipping start marker: {}", reason);
        let _ = self.buffer.split_to(1);
        self.skipped_bytes += 1;
    }

    /// Skip forward to the next start marker, or discard everything.
    fn resync(&mut self) {
        let skip = self
            .buffer
            .iter()
            .position(|&b| b == FRAME_MAGIC)
            .unwrap_or(self.buffer.len());
        tracing::debug!("Skipping {} bytes to resynchronize", skip);
        let _ = self.buffer.split_to(skip);
        self.skipped_bytes += skip as u64;
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && matches!(self.state, State::WaitingForHeader)
    }

    /// Number of frames dropped for failing validation.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Number of bytes skipped while resynchronizing.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}
