use ndarray::{s, Array1, Array3, Array4, Axis};

use crate::error::{SourceError, StreamError};
use crate::grid::{GridCell, Origin};
use crate::source::{Label, LabelKind};

/// Where a patch of a batch came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLocation {
    /// Image name in its collection
    pub image: String,

    /// Grid cell, absent for randomly sampled patches
    pub cell: Option<GridCell>,

    /// Pixel-space origin
    pub origin: Origin,
}

/// Labels of a batch, stacked along the first axis.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelBatch {
    /// `(n, size, size)` mask windows
    Masks(Array3<f32>),
    /// `(n,)` scalar classes
    Classes(Array1<f32>),
}

impl LabelBatch {
    pub fn len(&self) -> usize {
        match self {
            LabelBatch::Masks(masks) => masks.len_of(Axis(0)),
            LabelBatch::Classes(classes) => classes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_masks(&self) -> Option<&Array3<f32>> {
        match self {
            LabelBatch::Masks(masks) => Some(masks),
            LabelBatch::Classes(_) => None,
        }
    }

    pub fn as_classes(&self) -> Option<&Array1<f32>> {
        match self {
            LabelBatch::Masks(_) => None,
            LabelBatch::Classes(classes) => Some(classes),
        }
    }
}

/// A batch of aligned pixel patches and labels.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchBatch {
    /// `(n, size, size, channels)` raw samples
    pub pixels: Array4<u8>,

    pub labels: LabelBatch,

    /// One entry per patch, in batch order
    pub locations: Vec<PatchLocation>,
}

impl PatchBatch {
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Pixels as `(n, channels, size, size)` floats in `[0, 1]`, the layout
    /// convolutional models consume.
    pub fn to_nchw_f32(&self) -> Array4<f32> {
        self.pixels
            .view()
            .permuted_axes([0, 3, 1, 2])
            .mapv(|sample| f32::from(sample) / 255.0)
    }

    /// Fraction of scalar labels at or above `0.5`, or of mask pixels at or
    /// above `0.5` for pixel labels.
    pub fn positive_fraction(&self) -> f32 {
        let (positive, total) = match &self.labels {
            LabelBatch::Masks(masks) => (
                masks.iter().filter(|v| **v >= 0.5).count(),
                masks.len(),
            ),
            LabelBatch::Classes(classes) => (
                classes.iter().filter(|v| **v >= 0.5).count(),
                classes.len(),
            ),
        };
        if total == 0 {
            0.0
        } else {
            positive as f32 / total as f32
        }
    }
}

// =============================================================================
// Batch Builder
// =============================================================================

/// Fills preallocated batch arrays one patch pair at a time.
#[derive(Debug)]
pub struct BatchBuilder {
    pixels: Array4<u8>,
    labels: LabelBatch,
    locations: Vec<PatchLocation>,
    size: usize,
    channels: usize,
}

impl BatchBuilder {
    /// Preallocate room for `capacity` patches of `size × size × channels`.
    pub fn new(capacity: usize, size: u32, channels: usize, kind: LabelKind) -> Self {
        let size = size as usize;
        let labels = match kind {
            LabelKind::Pixel => LabelBatch::Masks(Array3::zeros((capacity, size, size))),
            LabelKind::ClassCenter | LabelKind::ClassAverage => {
                LabelBatch::Classes(Array1::zeros(capacity))
            }
        };

        Self {
            pixels: Array4::zeros((capacity, size, size, channels)),
            labels,
            locations: Vec::with_capacity(capacity),
            size,
            channels,
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.locations.len() == self.pixels.len_of(Axis(0))
    }

    /// Append one pair.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the patch or label shape does not match the
    /// batch, or if the batch is already full.
    pub fn push(
        &mut self,
        location: PatchLocation,
        pixels: Array3<u8>,
        label: Label,
    ) -> Result<(), StreamError> {
        let index = self.locations.len();
        if self.is_full() {
            return Err(shape_error(&location, "batch is full".to_string()));
        }

        let expected = (self.size, self.size, self.channels);
        if pixels.dim() != expected {
            return Err(shape_error(
                &location,
                format!(
                    "pixel patch shape {:?} does not match {:?}",
                    pixels.dim(),
                    expected
                ),
            ));
        }

        match (&mut self.labels, label) {
            (LabelBatch::Masks(masks), Label::Mask(mask)) => {
                if mask.dim() != (self.size, self.size) {
                    return Err(shape_error(
                        &location,
                        format!("mask shape {:?} does not match patch size", mask.dim()),
                    ));
                }
                masks.slice_mut(s![index, .., ..]).assign(&mask);
            }
            (LabelBatch::Classes(classes), Label::Class(value)) => {
                classes[index] = value;
            }
            _ => {
                return Err(shape_error(
                    &location,
                    "label kind does not match batch".to_string(),
                ))
            }
        }

        self.pixels.slice_mut(s![index, .., .., ..]).assign(&pixels);
        self.locations.push(location);
        Ok(())
    }

    /// Truncate to the patches pushed so far. `None` when nothing was pushed.
    pub fn finish(self) -> Option<PatchBatch> {
        let n = self.locations.len();
        if n == 0 {
            return None;
        }

        let labels = match self.labels {
            LabelBatch::Masks(masks) => LabelBatch::Masks(masks.slice_move(s![..n, .., ..])),
            LabelBatch::Classes(classes) => LabelBatch::Classes(classes.slice_move(s![..n])),
        };

        Some(PatchBatch {
            pixels: self.pixels.slice_move(s![..n, .., .., ..]),
            labels,
            locations: self.locations,
        })
    }
}

fn shape_error(location: &PatchLocation, message: String) -> StreamError {
    StreamError::Source(SourceError::Decode {
        identifier: location.image.clone(),
        message,
    })
}
