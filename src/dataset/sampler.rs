use ndarray::Array3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::config::PatchConfig;
use crate::error::{GeometryError, StreamError};
use crate::grid::Origin;
use crate::source::{Label, LabelSource, PixelSource};
use crate::stream::{BatchBuilder, PatchBatch, PatchLocation};

use super::ImageCollection;

/// One randomly placed window and its label.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledPatch {
    pub image: String,
    pub origin: Origin,
    pub pixels: Array3<u8>,
    pub label: Label,
}

/// Draws windows at uniformly random positions in uniformly random images.
///
/// Unlike [`ImageSetIterator`](super::ImageSetIterator) there is no grid and
/// no end: every call opens one image, decodes one window and releases the
/// image again. Seeded, so a run can be replayed.
pub struct RandomPatchSampler<C: ImageCollection> {
    collection: C,
    config: PatchConfig,
    images: Vec<String>,
    rng: StdRng,
}

impl<C: ImageCollection> RandomPatchSampler<C> {
    pub fn new(collection: C, config: PatchConfig, seed: u64) -> Self {
        let images = collection.identifiers();
        Self {
            collection,
            config,
            images,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    /// Draw one window.
    ///
    /// # Errors
    ///
    /// - [`StreamError::EmptyImage`] if the collection lists no image
    /// - [`StreamError::Geometry`] if the chosen image is smaller than one window
    /// - [`StreamError::GeometryMismatch`] if pixels and labels disagree on size
    /// - [`StreamError::Source`] if opening or decoding fails
    pub fn sample(&mut self) -> Result<SampledPatch, StreamError> {
        let image = self
            .images
            .choose(&mut self.rng)
            .cloned()
            .ok_or_else(|| StreamError::EmptyImage {
                image: "<empty collection>".to_string(),
            })?;

        let mut labels = self.collection.open_labels(&image)?;
        let mut pixels = self.collection.open_pixels(&image)?;

        let result = self.sample_from(&image, &mut pixels, &mut labels);

        if let Err(err) = pixels.close() {
            warn!("Failed to release pixels of {}: {}", image, err);
        }
        if let Err(err) = labels.close() {
            warn!("Failed to release labels of {}: {}", image, err);
        }
        result
    }

    fn sample_from(
        &mut self,
        image: &str,
        pixels: &mut C::Pixels,
        labels: &mut C::Labels,
    ) -> Result<SampledPatch, StreamError> {
        let (width, height) = pixels.native_dimensions();
        let label_dims = labels.native_dimensions();
        if (width, height) != label_dims {
            return Err(StreamError::GeometryMismatch {
                pixels: (width, height),
                labels: label_dims,
            });
        }

        let size = self.config.size;
        if size == 0 || size > width || size > height {
            return Err(GeometryError::InvalidGeometry {
                width,
                height,
                size,
                stride: self.config.stride,
                reason: "patch size must be positive and fit inside the image",
            }
            .into());
        }

        let origin = Origin {
            top: self.rng.gen_range(0..=height - size),
            left: self.rng.gen_range(0..=width - size),
        };
        debug!(
            "Sampling {} at (top {}, left {})",
            image, origin.top, origin.left
        );

        let patch = pixels.decode(origin.top, origin.left, size)?;
        let mask = labels.decode_mask(origin.top, origin.left, size)?;

        Ok(SampledPatch {
            image: image.to_string(),
            origin,
            pixels: patch,
            label: self.config.label_kind.reduce(mask),
        })
    }

    /// Draw `batch_size` windows into one batch.
    pub fn sample_batch(&mut self, batch_size: usize) -> Result<PatchBatch, StreamError> {
        if batch_size == 0 {
            return Err(StreamError::InvalidBatchSize);
        }

        let mut builder: Option<BatchBuilder> = None;
        for _ in 0..batch_size {
            let sample = self.sample()?;
            let batch = builder.get_or_insert_with(|| {
                BatchBuilder::new(
                    batch_size,
                    self.config.size,
                    sample.pixels.dim().2,
                    self.config.label_kind,
                )
            });
            let location = PatchLocation {
                image: sample.image,
                cell: None,
                origin: sample.origin,
            };
            batch.push(location, sample.pixels, sample.label)?;
        }

        builder
            .and_then(BatchBuilder::finish)
            .ok_or(StreamError::InvalidBatchSize)
    }
}

impl<C: ImageCollection> Iterator for RandomPatchSampler<C> {
    type Item = Result<SampledPatch, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.images.is_empty() {
            return None;
        }
        Some(self.sample())
    }
}
