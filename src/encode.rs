//! PNG encoding of decoded patches.
//!
//! Used by the `export` command to write patches and mask windows to disk.
//! PNG keeps samples lossless, so an exported patch decodes back to exactly
//! the array the stream produced.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use ndarray::{Array2, Array3};

use crate::error::EncodeError;

// =============================================================================
// PNG Encoder
// =============================================================================

/// Encodes `(height, width, channels)` patches and `(height, width)` masks.
#[derive(Debug, Clone, Default)]
pub struct PatchEncoder {}

impl PatchEncoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Encode a pixel patch as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnsupportedShape`] unless the patch has 1, 3 or
    /// 4 channels.
    pub fn encode_pixels(&self, patch: &Array3<u8>) -> Result<Bytes, EncodeError> {
        let (height, width, channels) = patch.dim();
        let color = match channels {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            4 => ExtendedColorType::Rgba8,
            other => {
                return Err(EncodeError::UnsupportedShape(format!(
                    "{} channels",
                    other
                )))
            }
        };

        // iter() walks in logical order, which is row-major HWC
        let samples: Vec<u8> = patch.iter().copied().collect();
        write_png(&samples, width, height, color)
    }

    /// Encode a mask window as 8-bit grayscale, mapping `[0, 1]` to `[0, 255]`.
    ///
    /// Values outside `[0, 1]` are clamped.
    pub fn encode_mask(&self, mask: &Array2<f32>) -> Result<Bytes, EncodeError> {
        let (height, width) = mask.dim();
        let samples: Vec<u8> = mask
            .iter()
            .map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        write_png(&samples, width, height, ExtendedColorType::L8)
    }
}

fn write_png(
    samples: &[u8],
    width: usize,
    height: usize,
    color: ExtendedColorType,
) -> Result<Bytes, EncodeError> {
    let width = u32::try_from(width)
        .map_err(|_| EncodeError::UnsupportedShape(format!("width {}", width)))?;
    let height = u32::try_from(height)
        .map_err(|_| EncodeError::UnsupportedShape(format!("height {}", height)))?;
    if width == 0 || height == 0 {
        return Err(EncodeError::UnsupportedShape("empty patch".to_string()));
    }

    let mut output = Cursor::new(Vec::new());
    PngEncoder::new(&mut output).write_image(samples, width, height, color)?;
    Ok(Bytes::from(output.into_inner()))
}
