//! Image module - transcoding pixel buffers into the device format.
//!
//! - [`PixelBuffer`] borrows caller data for one draw call
//! - [`convert`] reformats pixels (channel order, RGB565 packing)
//! - [`chunk`] and [`split_regions`] cut the result into transport-sized pieces
//!
//! # Example
//!
//! ```
//! use loupedeck_protocol::image::{convert, PixelBuffer, PixelFormat};
//!
//! let red = [255u8, 0, 0];
//! let buffer = PixelBuffer::new(&red, 1, 1, PixelFormat::Rgb).unwrap();
//! assert_eq!(convert(&buffer, PixelFormat::Rgb565Le), vec![0x00, 0xF8]);
//! ```

mod chunk;
mod format;

pub use chunk::{chunk, split_regions, ImageChunk, Rect};
pub use format::{convert, fill, PixelBuffer, PixelFormat, RgbColor};
