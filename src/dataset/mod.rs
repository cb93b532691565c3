//! Datasets of paired images and label masks.
//!
//! - [`ImageCollection`]: the named-collection interface. Lists image names in
//!   a stable order and opens the pixel and label sources of one image.
//! - [`Manifest`] / [`ManifestDataset`]: a JSON manifest on disk listing each
//!   image's pixel file and mask file, plus optional partitions.
//! - [`ImageSetIterator`]: one continuous pair sequence across all images,
//!   holding at most one open pixel handle at a time.
//! - [`RandomPatchSampler`]: random windows from random images.

mod image_set;
mod manifest;
mod sampler;

pub use image_set::{DatasetPosition, ImageSetIterator};
pub use manifest::{
    ImageEntry, Manifest, ManifestDataset, SplitRatios, DEFAULT_TRAIN_RATIO,
    DEFAULT_VALIDATION_RATIO, TEST_PARTITION, TRAIN_PARTITION, VALIDATION_PARTITION,
};
pub use sampler::{RandomPatchSampler, SampledPatch};

use crate::error::SourceError;
use crate::source::{LabelSource, PixelSource};

/// A collection of named images, each with a pixel source and a label source.
///
/// `identifiers()` defines the iteration order: the listing order of the
/// backing collection, with duplicates kept at their first position.
pub trait ImageCollection {
    type Pixels: PixelSource;
    type Labels: LabelSource;

    /// Image names in listing order.
    fn identifiers(&self) -> Vec<String>;

    /// Open the pixel handle of one image.
    fn open_pixels(&self, name: &str) -> Result<Self::Pixels, SourceError>;

    /// Open the label mask of one image.
    fn open_labels(&self, name: &str) -> Result<Self::Labels, SourceError>;
}

impl<C: ImageCollection + ?Sized> ImageCollection for &C {
    type Pixels = C::Pixels;
    type Labels = C::Labels;

    fn identifiers(&self) -> Vec<String> {
        (**self).identifiers()
    }

    fn open_pixels(&self, name: &str) -> Result<Self::Pixels, SourceError> {
        (**self).open_pixels(name)
    }

    fn open_labels(&self, name: &str) -> Result<Self::Labels, SourceError> {
        (**self).open_labels(name)
    }
}
