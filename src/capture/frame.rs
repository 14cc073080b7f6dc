//! Pure frame decoding logic: functional core.
//!
//! This module has zero infrastructure dependencies.
//! It copies a borrowed buffer view into an owned frame, and crops that
//! frame to the display size once the buffer has been handed back.

use super::platform::RawFrame;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

const RGBA_BYTES: usize = 4;

/// Fully owned RGBA capture result. Has no tie to the buffer it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelImage(RgbaImage);

impl PixelImage {
    pub fn new(image: RgbaImage) -> Self {
        Self(image)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.0
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.0
    }

    /// RGBA pixel at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.0.get_pixel(x, y).0
    }

    /// Encodes the image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let mut png_bytes: Vec<u8> = Vec::new();
        self.0
            .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
            .map_err(|e| FrameError::EncodingFailed(e.to_string()))?;
        Ok(png_bytes)
    }
}

/// Owned copy of one buffer, still as wide as the producer's padded rows.
///
/// Holds no reference into the pool, so the slot can go back to the
/// producer before `crop` runs.
#[derive(Debug, Clone)]
pub struct PaddedFrame {
    image: RgbaImage,
    width: u32,
}

impl PaddedFrame {
    /// Width including row padding.
    pub fn padded_width(&self) -> u32 {
        self.image.width()
    }

    /// Drops the padding columns, leaving exactly `width × height`.
    pub fn crop(self) -> PixelImage {
        let (width, height) = (self.width, self.image.height());
        if self.image.width() == width {
            return PixelImage(self.image);
        }
        let cropped = DynamicImage::ImageRgba8(self.image).crop_imm(0, 0, width, height);
        PixelImage(cropped.into_rgba8())
    }
}

/// Copies a raw buffer out of its slot.
///
/// Producers often pad each row for alignment, so the bytes cannot be read
/// as a tightly packed image. When the padding is a whole number of pixels
/// the buffer is taken as a wider image, to be cropped back later.
/// Otherwise (or when the last row is not padded) rows are packed one by
/// one and the copy is already the true width.
pub fn copy_frame(frame: &RawFrame<'_>) -> Result<PaddedFrame, FrameError> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 {
        return Err(FrameError::ZeroDimension);
    }
    if frame.pixel_stride != RGBA_BYTES {
        return Err(FrameError::UnsupportedPixelStride(frame.pixel_stride));
    }

    let packed_row = frame.pixel_stride * width as usize;
    if frame.row_stride < packed_row {
        return Err(FrameError::RowStrideTooSmall {
            row_stride: frame.row_stride,
            packed_row,
        });
    }

    let rows = height as usize;
    let row_padding = frame.row_stride - packed_row;
    let full_len = frame.row_stride * rows;
    let min_len = frame.row_stride * (rows - 1) + packed_row;
    if frame.data.len() < min_len {
        return Err(FrameError::Truncated {
            expected: min_len,
            actual: frame.data.len(),
        });
    }

    if row_padding % frame.pixel_stride == 0 && frame.data.len() >= full_len {
        let padded_width = width + (row_padding / frame.pixel_stride) as u32;
        let image = RgbaImage::from_raw(padded_width, height, frame.data[..full_len].to_vec())
            .ok_or(FrameError::Truncated {
                expected: full_len,
                actual: frame.data.len(),
            })?;
        return Ok(PaddedFrame { image, width });
    }

    let mut packed = Vec::with_capacity(packed_row * rows);
    for row in frame.data.chunks(frame.row_stride).take(rows) {
        packed.extend_from_slice(&row[..packed_row]);
    }
    RgbaImage::from_raw(width, height, packed)
        .map(|image| PaddedFrame { image, width })
        .ok_or(FrameError::Truncated {
            expected: min_len,
            actual: frame.data.len(),
        })
}

/// Copy and crop in one go, for callers that do not hold a pool slot.
pub fn decode_frame(frame: &RawFrame<'_>) -> Result<PixelImage, FrameError> {
    Ok(copy_frame(frame)?.crop())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Frame has zero width or height")]
    ZeroDimension,

    #[error("Unsupported pixel stride {0} (expected 4 bytes per RGBA pixel)")]
    UnsupportedPixelStride(usize),

    #[error("Row stride {row_stride} is smaller than a packed row ({packed_row} bytes)")]
    RowStrideTooSmall { row_stride: usize, packed_row: usize },

    #[error("Frame buffer truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("PNG encoding failed: {0}")]
    EncodingFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a buffer whose pixel (x, y) is [x, y, 9, 255] and whose row
    /// padding is filled with 0xEE.
    fn buffer(width: u32, height: u32, row_stride: usize, last_row_padded: bool) -> Vec<u8> {
        let mut data = Vec::new();
        for y in 0..height {
            let start = data.len();
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 9, 255]);
            }
            if last_row_padded || y + 1 < height {
                data.resize(start + row_stride, 0xEE);
            }
        }
        data
    }

    fn frame(width: u32, height: u32, row_stride: usize, data: &[u8]) -> RawFrame<'_> {
        RawFrame {
            width,
            height,
            row_stride,
            pixel_stride: 4,
            data,
        }
    }

    fn assert_no_padding_leaked(image: &PixelImage) {
        for y in 0..image.height() {
            for x in 0..image.width() {
                assert_eq!(image.pixel(x, y), [x as u8, y as u8, 9, 255]);
            }
        }
    }

    #[test]
    fn padded_rows_are_cropped_to_true_width() {
        let data = buffer(10, 6, 10 * 4 + 24, true);
        let image = decode_frame(&frame(10, 6, 64, &data)).unwrap();
        assert_eq!((image.width(), image.height()), (10, 6));
        assert_no_padding_leaked(&image);
    }

    #[test]
    fn tightly_packed_rows_pass_through() {
        let data = buffer(8, 5, 32, true);
        let image = decode_frame(&frame(8, 5, 32, &data)).unwrap();
        assert_eq!((image.width(), image.height()), (8, 5));
        assert_no_padding_leaked(&image);
    }

    #[test]
    fn padding_that_is_not_whole_pixels_is_copied_row_by_row() {
        let data = buffer(7, 3, 7 * 4 + 3, true);
        let image = decode_frame(&frame(7, 3, 31, &data)).unwrap();
        assert_eq!((image.width(), image.height()), (7, 3));
        assert_no_padding_leaked(&image);
    }

    #[test]
    fn unpadded_last_row_is_accepted() {
        let data = buffer(4, 4, 32, false);
        let image = decode_frame(&frame(4, 4, 32, &data)).unwrap();
        assert_eq!((image.width(), image.height()), (4, 4));
        assert_no_padding_leaked(&image);
    }

    #[test]
    fn copy_outlives_the_source_buffer() {
        let mut data = buffer(10, 6, 64, true);
        let copy = copy_frame(&frame(10, 6, 64, &data)).unwrap();
        assert_eq!(copy.padded_width(), 16);

        // Producer reuses the slot before the crop runs.
        data.fill(0);
        drop(data);

        let image = copy.crop();
        assert_eq!((image.width(), image.height()), (10, 6));
        assert_no_padding_leaked(&image);
    }

    #[test]
    fn zero_dimension_fails() {
        let result = decode_frame(&frame(0, 4, 0, &[]));
        assert!(matches!(result, Err(FrameError::ZeroDimension)));
    }

    #[test]
    fn stride_smaller_than_row_fails() {
        let data = vec![0u8; 64];
        let result = decode_frame(&frame(8, 2, 16, &data));
        assert!(matches!(result, Err(FrameError::RowStrideTooSmall { .. })));
    }

    #[test]
    fn truncated_buffer_fails() {
        let data = vec![0u8; 20];
        let result = decode_frame(&frame(4, 4, 16, &data));
        assert!(matches!(result, Err(FrameError::Truncated { .. })));
    }

    #[test]
    fn non_rgba_pixel_stride_fails() {
        let data = vec![0u8; 48];
        let raw = RawFrame {
            width: 4,
            height: 4,
            row_stride: 12,
            pixel_stride: 3,
            data: &data,
        };
        assert!(matches!(
            decode_frame(&raw),
            Err(FrameError::UnsupportedPixelStride(3))
        ));
    }

    #[test]
    fn png_encoding_has_magic_bytes() {
        let image = PixelImage::new(RgbaImage::new(16, 16));
        let bytes = image.to_png_bytes().unwrap();
        // PNG magic bytes
        assert_eq!(&bytes[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }
}
