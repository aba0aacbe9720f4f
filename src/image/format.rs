//! Pixel formats and per-pixel conversion.
//!
//! Conversion to RGB565 truncates each channel (`r >> 3`, `g >> 2`,
//! `b >> 3`), so identical input always produces identical output.
//! Expanding RGB565 back to 8 bits replicates the high bits into the low
//! ones, which keeps every channel within 7 (red, blue) or 3 (green) of the
//! original value.

use serde::{Deserialize, Serialize};

use crate::error::{LoupedeckError, Result};

/// An 8-bit-per-channel colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RgbColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl RgbColor {
    /// Black.
    pub const BLACK: RgbColor = RgbColor::new(0, 0, 0);

    /// Create a colour from its channels.
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Pack into RGB565 with truncation.
    #[inline]
    pub fn to_rgb565(self) -> u16 {
        (u16::from(self.red >> 3) << 11)
            | (u16::from(self.green >> 2) << 5)
            | u16::from(self.blue >> 3)
    }

    /// Expand from RGB565 by bit replication.
    #[inline]
    pub fn from_rgb565(value: u16) -> Self {
        let r5 = ((value >> 11) & 0x1F) as u8;
        let g6 = ((value >> 5) & 0x3F) as u8;
        let b5 = (value & 0x1F) as u8;
        Self {
            red: (r5 << 3) | (r5 >> 2),
            green: (g6 << 2) | (g6 >> 4),
            blue: (b5 << 3) | (b5 >> 2),
        }
    }
}

/// Layout of one pixel in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PixelFormat {
    /// 24-bit, red first.
    Rgb,
    /// 32-bit, red first, alpha ignored.
    Rgba,
    /// 24-bit, blue first.
    Bgr,
    /// 32-bit, blue first, alpha ignored.
    Bgra,
    /// 16-bit RGB565, little endian (native for most panels).
    Rgb565Le,
    /// 16-bit RGB565, big endian (CT wheel).
    Rgb565Be,
}

impl PixelFormat {
    /// Bytes occupied by one pixel.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
            PixelFormat::Rgb565Le | PixelFormat::Rgb565Be => 2,
        }
    }

    /// Read one pixel. `px` must hold exactly `bytes_per_pixel` bytes.
    #[inline]
    fn read(self, px: &[u8]) -> RgbColor {
        match self {
            PixelFormat::Rgb | PixelFormat::Rgba => RgbColor::new(px[0], px[1], px[2]),
            PixelFormat::Bgr | PixelFormat::Bgra => RgbColor::new(px[2], px[1], px[0]),
            PixelFormat::Rgb565Le => RgbColor::from_rgb565(u16::from_le_bytes([px[0], px[1]])),
            PixelFormat::Rgb565Be => RgbColor::from_rgb565(u16::from_be_bytes([px[0], px[1]])),
        }
    }

    /// Append one pixel in this format.
    #[inline]
    pub fn write(self, color: RgbColor, out: &mut Vec<u8>) {
        match self {
            PixelFormat::Rgb => out.extend_from_slice(&[color.red, color.green, color.blue]),
            PixelFormat::Rgba => out.extend_from_slice(&[color.red, color.green, color.blue, 0xFF]),
            PixelFormat::Bgr => out.extend_from_slice(&[color.blue, color.green, color.red]),
            PixelFormat::Bgra => out.extend_from_slice(&[color.blue, color.green, color.red, 0xFF]),
            PixelFormat::Rgb565Le => out.extend_from_slice(&color.to_rgb565().to_le_bytes()),
            PixelFormat::Rgb565Be => out.extend_from_slice(&color.to_rgb565().to_be_bytes()),
        }
    }
}

/// A caller-owned image borrowed for the duration of one draw.
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    data: &'a [u8],
    width: u16,
    height: u16,
    format: PixelFormat,
}

impl<'a> PixelBuffer<'a> {
    /// Wrap `data` as a `width` x `height` image in `format`.
    ///
    /// Fails if the data length does not match the dimensions.
    pub fn new(data: &'a [u8], width: u16, height: u16, format: PixelFormat) -> Result<Self> {
        let expected = usize::from(width) * usize::from(height) * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(LoupedeckError::Validation(format!(
                "Buffer of {} bytes does not match {}x{} {:?} ({} bytes)",
                data.len(),
                width,
                height,
                format,
                expected
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
        })
    }

    /// Raw pixel data.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

/// Convert a buffer into `target`, returning freshly allocated bytes.
///
/// When the source already is in `target` the bytes are copied unchanged.
pub fn convert(buffer: &PixelBuffer<'_>, target: PixelFormat) -> Vec<u8> {
    let source = buffer.format;
    if source == target {
        return buffer.data.to_vec();
    }

    let pixels = usize::from(buffer.width) * usize::from(buffer.height);
    let mut out = Vec::with_capacity(pixels * target.bytes_per_pixel());
    for px in buffer.data.chunks_exact(source.bytes_per_pixel()) {
        target.write(source.read(px), &mut out);
    }
    out
}

/// Encode `count` pixels of one colour without per-pixel conversion.
pub fn fill(color: RgbColor, target: PixelFormat, count: usize) -> Vec<u8> {
    let mut pixel = Vec::with_capacity(target.bytes_per_pixel());
    target.write(color, &mut pixel);
    pixel.repeat(count)
}
