//! File-backed sources decoded with the `image` crate.
//!
//! These adapters decode the whole file on open and crop windows from memory.
//! They suit downsampled exports and tiled test fixtures (PNG, JPEG, TIFF);
//! full-resolution slides belong behind a native region reader implementing
//! the same traits.

use std::path::{Path, PathBuf};

use image::{GrayImage, ImageError, RgbImage};
use ndarray::{Array2, Array3};
use tracing::debug;

use crate::error::SourceError;

use super::{check_window, LabelSource, PixelSource};

/// Map an `image` error to a source error, keeping "not found" distinct.
fn open_error(path: &Path, err: ImageError) -> SourceError {
    match err {
        ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            SourceError::NotFound(path.display().to_string())
        }
        other => SourceError::Open {
            identifier: path.display().to_string(),
            message: other.to_string(),
        },
    }
}

// =============================================================================
// ImageFileSource
// =============================================================================

/// RGB pixel source backed by an image file.
///
/// The decoded raster is the handle: it is held from [`open`] until
/// [`close`](PixelSource::close) and dropped there.
///
/// [`open`]: ImageFileSource::open
#[derive(Debug)]
pub struct ImageFileSource {
    path: PathBuf,
    identifier: String,
    dimensions: (u32, u32),
    raster: Option<RgbImage>,
}

impl ImageFileSource {
    /// Open and decode an image file.
    ///
    /// # Errors
    ///
    /// - [`SourceError::NotFound`] if the file does not exist
    /// - [`SourceError::Open`] if the file cannot be decoded
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let raster = image::open(path)
            .map_err(|e| open_error(path, e))?
            .into_rgb8();
        let dimensions = raster.dimensions();

        debug!(
            "Opened pixel source {} ({}x{})",
            path.display(),
            dimensions.0,
            dimensions.1
        );

        Ok(Self {
            path: path.to_path_buf(),
            identifier: path.display().to_string(),
            dimensions,
            raster: Some(raster),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PixelSource for ImageFileSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn native_dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn channels(&self) -> usize {
        3
    }

    fn decode(&mut self, top: u32, left: u32, size: u32) -> Result<Array3<u8>, SourceError> {
        let raster = self
            .raster
            .as_ref()
            .ok_or_else(|| SourceError::Closed(self.identifier.clone()))?;
        check_window(top, left, size, self.dimensions)?;

        let window = image::imageops::crop_imm(raster, left, top, size, size).to_image();
        Array3::from_shape_vec((size as usize, size as usize, 3), window.into_raw()).map_err(
            |e| SourceError::Decode {
                identifier: self.identifier.clone(),
                message: e.to_string(),
            },
        )
    }

    fn close(&mut self) -> Result<(), SourceError> {
        if self.raster.take().is_some() {
            debug!("Closed pixel source {}", self.identifier);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.raster.is_some()
    }
}

// =============================================================================
// MaskFileSource
// =============================================================================

/// Label mask stored as a grayscale image; samples map to `value / 255`.
#[derive(Debug)]
pub struct MaskFileSource {
    identifier: String,
    mask: GrayImage,
}

impl MaskFileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let mask = image::open(path)
            .map_err(|e| open_error(path, e))?
            .into_luma8();

        debug!(
            "Opened mask source {} ({}x{})",
            path.display(),
            mask.width(),
            mask.height()
        );

        Ok(Self {
            identifier: path.display().to_string(),
            mask,
        })
    }
}

impl LabelSource for MaskFileSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn native_dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    fn decode_mask(
        &mut self,
        top: u32,
        left: u32,
        size: u32,
    ) -> Result<Array2<f32>, SourceError> {
        check_window(top, left, size, self.native_dimensions())?;

        Ok(Array2::from_shape_fn(
            (size as usize, size as usize),
            |(y, x)| {
                let sample = self.mask.get_pixel(left + x as u32, top + y as u32)[0];
                f32::from(sample) / 255.0
            },
        ))
    }
}
