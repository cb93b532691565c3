use tracing::trace;

use crate::error::StreamError;
use crate::grid::{EdgePolicy, GridCell, GridCursor, PatchGrid};
use crate::source::PatchSource;

/// Lazy, finite, restartable sequence of decoded patches.
///
/// Pairs a [`PatchGrid`] walk with one decode call per patch on the bound
/// source. Nothing is cached: a `reset()` followed by a replay decodes again.
///
/// The cursor points at the next cell to produce. A failed decode leaves it
/// there, so the same patch is attempted again on the next call.
#[derive(Debug)]
pub struct PatchStream<S> {
    grid: PatchGrid,
    cursor: GridCursor,
    source: S,
}

impl<S: PatchSource> PatchStream<S> {
    /// Build a stream over the source's native dimensions, dropping trailing
    /// pixels.
    pub fn new(source: S, size: u32, stride: u32) -> Result<Self, StreamError> {
        Self::with_policy(source, size, stride, EdgePolicy::Drop)
    }

    pub fn with_policy(
        source: S,
        size: u32,
        stride: u32,
        edge_policy: EdgePolicy,
    ) -> Result<Self, StreamError> {
        let (width, height) = source.dimensions();
        let grid = PatchGrid::with_policy(width, height, size, stride, edge_policy)?;
        Ok(Self::from_grid(source, grid))
    }

    /// Build a stream over an existing grid.
    ///
    /// The grid must describe the source; windows outside the source fail at
    /// decode time with `OutOfBounds`.
    pub fn from_grid(source: S, grid: PatchGrid) -> Self {
        Self {
            cursor: GridCursor::new(&grid),
            grid,
            source,
        }
    }

    pub fn grid(&self) -> &PatchGrid {
        &self.grid
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Decode the patch at the cursor and advance.
    ///
    /// Returns `Ok(None)` once the grid is exhausted.
    pub fn next_patch(&mut self) -> Result<Option<S::Patch>, StreamError> {
        Ok(self.next_located()?.map(|(_, patch)| patch))
    }

    /// Like [`next_patch`](Self::next_patch), also returning the cell decoded.
    pub fn next_located(&mut self) -> Result<Option<(GridCell, S::Patch)>, StreamError> {
        if self.cursor.is_exhausted() {
            return Ok(None);
        }

        let cell = self.cursor.position();
        let origin = self.grid.origin_at(cell.row, cell.column)?;
        let patch = self.source.read_patch(origin, self.grid.size())?;
        self.cursor.advance();

        trace!(
            "Decoded {} cell {} at (top {}, left {})",
            self.source.identifier(),
            cell,
            origin.top,
            origin.left
        );
        Ok(Some((cell, patch)))
    }

    /// Collect up to `batch_size` patches.
    ///
    /// A batch shorter than `batch_size` means the grid ran out; the call after
    /// it returns `Ok(None)`. Batches are never padded.
    ///
    /// # Errors
    ///
    /// A failed decode discards the partial batch and rewinds the cursor to
    /// the batch's first cell, so a retry yields the whole batch again.
    pub fn next_batch(&mut self, batch_size: usize) -> Result<Option<Vec<S::Patch>>, StreamError> {
        if batch_size == 0 {
            return Err(StreamError::InvalidBatchSize);
        }

        let start = self.cursor.position();
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            match self.next_patch() {
                Ok(Some(patch)) => batch.push(patch),
                Ok(None) => break,
                Err(err) => {
                    if !batch.is_empty() {
                        self.cursor.seek(start)?;
                    }
                    return Err(err);
                }
            }
        }

        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    /// Reposition the cursor without decoding.
    ///
    /// Fails with a bounds error and leaves the cursor unchanged when the cell
    /// is outside the grid.
    pub fn seek(&mut self, row: u32, column: u32) -> Result<(), StreamError> {
        self.cursor.seek(GridCell::new(row, column))?;
        Ok(())
    }

    /// Cursor position; `row == rows` once exhausted.
    pub fn current_coordinates(&self) -> GridCell {
        self.cursor.position()
    }

    /// Restart from `(0, 0)`.
    pub fn reset(&mut self) {
        self.cursor.reset();
    }

    pub fn cursor(&self) -> &GridCursor {
        &self.cursor
    }

    /// Patches still to be produced.
    pub fn remaining(&self) -> u64 {
        self.cursor.remaining()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_exhausted()
    }
}

impl<S: PatchSource> Iterator for PatchStream<S> {
    type Item = Result<S::Patch, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_patch().transpose()
    }
}
