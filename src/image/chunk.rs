//! Splitting encoded images into transport-sized pieces.
//!
//! [`chunk`] cuts a byte run at pixel boundaries. [`split_regions`] does the
//! same for a rectangle and reports which sub-rectangle each piece covers,
//! so every piece can be sent as a self-contained framebuffer write.

use crate::error::{LoupedeckError, Result};

/// A rectangle in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of pixels covered.
    #[inline]
    pub fn area(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }

    /// Check if this rectangle lies within a `width` x `height` surface.
    pub fn fits_within(&self, width: u16, height: u16) -> bool {
        u32::from(self.x) + u32::from(self.width) <= u32::from(width)
            && u32::from(self.y) + u32::from(self.height) <= u32::from(height)
    }
}

/// One piece of an encoded image and the area it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageChunk<'a> {
    pub region: Rect,
    pub bytes: &'a [u8],
}

/// Largest multiple of `bytes_per_pixel` not exceeding `max_payload`.
fn aligned_limit(max_payload: usize, bytes_per_pixel: usize) -> Result<usize> {
    if bytes_per_pixel == 0 || max_payload < bytes_per_pixel {
        return Err(LoupedeckError::Validation(format!(
            "Maximum payload {} cannot hold a {}-byte pixel",
            max_payload, bytes_per_pixel
        )));
    }
    Ok(max_payload - max_payload % bytes_per_pixel)
}

/// Split `native` into pieces of at most `max_payload` bytes.
///
/// Pieces never split a pixel and concatenate back to `native`.
///
/// # Example
///
/// ```
/// use loupedeck_protocol::image::chunk;
///
/// let data = [0u8; 10];
/// let sizes: Vec<usize> = chunk(&data, 5, 2).unwrap().map(|c| c.len()).collect();
/// assert_eq!(sizes, vec![4, 4, 2]);
/// ```
pub fn chunk(
    native: &[u8],
    max_payload: usize,
    bytes_per_pixel: usize,
) -> Result<std::slice::Chunks<'_, u8>> {
    let limit = aligned_limit(max_payload, bytes_per_pixel)?;
    Ok(native.chunks(limit))
}

/// Split an encoded rectangle into sub-rectangles of at most `max_payload`
/// bytes each.
///
/// Whole rows are grouped into bands while a row fits; otherwise each row is
/// cut into segments. Pieces come out in row-major order, so their bytes are
/// consecutive runs of `native`.
pub fn split_regions(
    native: &[u8],
    rect: Rect,
    bytes_per_pixel: usize,
    max_payload: usize,
) -> Result<Vec<ImageChunk<'_>>> {
    let limit = aligned_limit(max_payload, bytes_per_pixel)?;
    if native.len() != rect.area() * bytes_per_pixel {
        return Err(LoupedeckError::Validation(format!(
            "Encoded image of {} bytes does not cover {}x{}",
            native.len(),
            rect.width,
            rect.height
        )));
    }

    let mut chunks = Vec::new();
    if rect.area() == 0 {
        return Ok(chunks);
    }

    let row_bytes = usize::from(rect.width) * bytes_per_pixel;
    let mut offset = 0;

    if row_bytes <= limit {
        let rows_per_band = (limit / row_bytes).min(usize::from(rect.height));
        let mut row = 0;
        while row < usize::from(rect.height) {
            let rows = rows_per_band.min(usize::from(rect.height) - row);
            let len = rows * row_bytes;
            chunks.push(ImageChunk {
                // Bounded by rect.height, which is a u16
                region: Rect::new(rect.x, rect.y + row as u16, rect.width, rows as u16),
                bytes: &native[offset..offset + len],
            });
            offset += len;
            row += rows;
        }
    } else {
        let pixels_per_segment = limit / bytes_per_pixel;
        for row in 0..rect.height {
            let mut col = 0;
            while col < usize::from(rect.width) {
                let pixels = pixels_per_segment.min(usize::from(rect.width) - col);
                let len = pixels * bytes_per_pixel;
                chunks.push(ImageChunk {
                    region: Rect::new(rect.x + col as u16, rect.y + row, pixels as u16, 1),
                    bytes: &native[offset..offset + len],
                });
                offset += len;
                col += pixels;
            }
        }
    }

    Ok(chunks)
}
