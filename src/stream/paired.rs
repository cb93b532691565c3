use ndarray::Array3;
use tracing::{debug, warn};

use crate::config::PatchConfig;
use crate::error::StreamError;
use crate::grid::{GridCell, PatchGrid};
use crate::source::{Label, LabelReader, LabelSource, PatchSource, PixelReader, PixelSource};

use super::batch::{BatchBuilder, PatchBatch, PatchLocation};
use super::patch_stream::PatchStream;

/// Pixel and label streams walking the same grid in lockstep.
///
/// Owns the image's pixel handle for its whole lifetime. The handle is
/// released exactly once: by [`close`](Self::close), or on drop if `close` was
/// never called. Construction failures release it before returning.
pub struct PairedPatchStream<P: PixelSource, L: LabelSource> {
    name: String,
    pixels: PatchStream<PixelReader<P>>,
    labels: PatchStream<LabelReader<L>>,
    closed: bool,
}

impl<P: PixelSource, L: LabelSource> PairedPatchStream<P, L> {
    /// Bind both sources to one grid built from `config`.
    ///
    /// # Errors
    ///
    /// - [`StreamError::GeometryMismatch`] if the sources report different
    ///   native dimensions
    /// - [`StreamError::Geometry`] if the configuration cannot produce a grid
    pub fn open(
        name: impl Into<String>,
        mut pixels: P,
        mut labels: L,
        config: &PatchConfig,
    ) -> Result<Self, StreamError> {
        let name = name.into();
        let pixel_dims = pixels.native_dimensions();
        let label_dims = labels.native_dimensions();

        let grid = if pixel_dims != label_dims {
            Err(StreamError::GeometryMismatch {
                pixels: pixel_dims,
                labels: label_dims,
            })
        } else {
            PatchGrid::with_policy(
                pixel_dims.0,
                pixel_dims.1,
                config.size,
                config.stride,
                config.edge_policy,
            )
            .map_err(StreamError::from)
        };

        let grid = match grid {
            Ok(grid) => grid,
            Err(err) => {
                release(&name, &mut pixels, &mut labels);
                return Err(err);
            }
        };

        debug!(
            "Opened paired stream {} ({}x{}, {} rows x {} columns)",
            name,
            grid.width(),
            grid.height(),
            grid.rows(),
            grid.columns()
        );

        Ok(Self {
            name,
            pixels: PatchStream::from_grid(PixelReader::new(pixels), grid),
            labels: PatchStream::from_grid(LabelReader::new(labels, config.label_kind), grid),
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &PatchGrid {
        self.pixels.grid()
    }

    /// Decode the next pixel patch and its label.
    ///
    /// Returns `Ok(None)` once both streams are exhausted together.
    ///
    /// # Errors
    ///
    /// - [`StreamError::Desynchronized`] if the cursors disagree after the step
    /// - [`StreamError::Source`] if either decode fails; the pixel cursor is
    ///   rolled back so both streams still point at the failed cell
    pub fn next_pair(&mut self) -> Result<Option<(Array3<u8>, Label)>, StreamError> {
        Ok(self.next_located()?.map(|(_, pixels, label)| (pixels, label)))
    }

    /// Like [`next_pair`](Self::next_pair), also returning the cell decoded.
    pub fn next_located(
        &mut self,
    ) -> Result<Option<(GridCell, Array3<u8>, Label)>, StreamError> {
        let before = self.pixels.current_coordinates();
        let pixels = self.pixels.next_located()?;

        let labels = match self.labels.next_located() {
            Ok(labels) => labels,
            Err(err) => {
                if pixels.is_some() {
                    self.pixels.seek(before.row, before.column)?;
                }
                return Err(err);
            }
        };

        let pixel_cursor = self.pixels.current_coordinates();
        let label_cursor = self.labels.current_coordinates();
        let desynchronized = StreamError::Desynchronized {
            pixels: pixel_cursor,
            labels: label_cursor,
        };
        if pixel_cursor != label_cursor {
            return Err(desynchronized);
        }

        match (pixels, labels) {
            (Some((cell, pixels)), Some((label_cell, label))) if cell == label_cell => {
                Ok(Some((cell, pixels, label)))
            }
            (None, None) => Ok(None),
            _ => Err(desynchronized),
        }
    }

    /// Collect up to `batch_size` aligned pairs into preallocated arrays.
    ///
    /// A short batch marks the end of the image; the following call returns
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Any failure discards the partial batch and seeks both cursors back to
    /// the batch's first cell, so a retry yields the whole batch again.
    pub fn next_batch(&mut self, batch_size: usize) -> Result<Option<PatchBatch>, StreamError> {
        if batch_size == 0 {
            return Err(StreamError::InvalidBatchSize);
        }

        let start = self.current_coordinates()?;
        let mut builder = BatchBuilder::new(
            batch_size,
            self.grid().size(),
            self.pixels.source().inner().channels(),
            self.labels.source().kind(),
        );

        if let Err(err) = self.fill_batch(&mut builder) {
            if self.pixels.current_coordinates() != start
                || self.labels.current_coordinates() != start
            {
                self.seek(start.row, start.column)?;
            }
            return Err(err);
        }

        Ok(builder.finish())
    }

    fn fill_batch(&mut self, builder: &mut BatchBuilder) -> Result<(), StreamError> {
        let grid = *self.grid();
        while !builder.is_full() {
            let Some((cell, pixels, label)) = self.next_located()? else {
                break;
            };
            let location = PatchLocation {
                image: self.name.clone(),
                cell: Some(cell),
                origin: grid.origin_at(cell.row, cell.column)?,
            };
            builder.push(location, pixels, label)?;
        }
        Ok(())
    }

    /// Reposition both cursors.
    ///
    /// An out-of-range cell fails with a bounds error and moves neither
    /// cursor. If only one cursor moves the streams are unusable and
    /// [`StreamError::Desynchronized`] is returned.
    pub fn seek(&mut self, row: u32, column: u32) -> Result<(), StreamError> {
        self.pixels.seek(row, column)?;
        if self.labels.seek(row, column).is_err() {
            return Err(StreamError::Desynchronized {
                pixels: self.pixels.current_coordinates(),
                labels: self.labels.current_coordinates(),
            });
        }
        debug!("Seeked {} to ({}, {})", self.name, row, column);
        Ok(())
    }

    /// Shared cursor position.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Desynchronized`] if the two cursors disagree.
    pub fn current_coordinates(&self) -> Result<GridCell, StreamError> {
        let pixels = self.pixels.current_coordinates();
        let labels = self.labels.current_coordinates();
        if pixels != labels {
            return Err(StreamError::Desynchronized { pixels, labels });
        }
        Ok(pixels)
    }

    /// Restart both streams from `(0, 0)`.
    pub fn reset(&mut self) {
        self.pixels.reset();
        self.labels.reset();
    }

    /// Pairs still to be produced.
    pub fn remaining(&self) -> u64 {
        self.pixels.remaining()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pixels.is_exhausted() && self.labels.is_exhausted()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn pixel_source(&self) -> &P {
        self.pixels.source().inner()
    }

    pub fn label_source(&self) -> &L {
        self.labels.source().inner()
    }

    /// Release the pixel handle (and the label source).
    ///
    /// Idempotent: only the first call reaches the sources. Reports the first
    /// failure but always attempts both releases.
    pub fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let pixels = self.pixels.source_mut().inner_mut().close();
        let labels = self.labels.source_mut().inner_mut().close();
        debug!("Closed paired stream {}", self.name);

        pixels?;
        labels?;
        Ok(())
    }
}

impl<P: PixelSource, L: LabelSource> Drop for PairedPatchStream<P, L> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("Failed to release {}: {}", self.name, err);
        }
    }
}

impl<P: PixelSource, L: LabelSource> Iterator for PairedPatchStream<P, L> {
    type Item = Result<(Array3<u8>, Label), StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair().transpose()
    }
}

/// Release both sources after a failed construction.
fn release<P: PixelSource, L: LabelSource>(name: &str, pixels: &mut P, labels: &mut L) {
    if let Err(err) = pixels.close() {
        warn!("Failed to release pixels of {}: {}", name, err);
    }
    if let Err(err) = labels.close() {
        warn!("Failed to release labels of {}: {}", name, err);
    }
}

impl<P: PixelSource, L: LabelSource> std::fmt::Debug for PairedPatchStream<P, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairedPatchStream")
            .field("name", &self.name)
            .field("grid", self.pixels.grid())
            .field("pixel_cursor", &self.pixels.current_coordinates())
            .field("label_cursor", &self.labels.current_coordinates())
            .field("identifier", &self.pixels.source().identifier())
            .field("closed", &self.closed)
            .finish()
    }
}
