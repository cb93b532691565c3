//! Row-major cursor over a [`PatchGrid`].
//!
//! The cursor always points at the *next* cell to be produced. `advance()`
//! returns that cell and moves on; once `row == rows` the cursor is exhausted.

use crate::error::GeometryError;

use super::{GridCell, PatchGrid};

/// Lifecycle of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Nothing produced since construction or the last reset
    NotStarted,
    /// At least one cell produced, or positioned by a seek
    Iterating,
    /// `row == rows`; every further advance yields `None`
    Exhausted,
}

/// Mutable `(row, column)` position within a grid, column fastest.
#[derive(Debug, Clone)]
pub struct GridCursor {
    row: u32,
    column: u32,
    rows: u32,
    columns: u32,
    started: bool,
}

impl GridCursor {
    /// Create a cursor at `(0, 0)` for the given grid.
    pub fn new(grid: &PatchGrid) -> Self {
        Self {
            row: 0,
            column: 0,
            rows: grid.rows(),
            columns: grid.columns(),
            started: false,
        }
    }

    pub fn state(&self) -> CursorState {
        if self.row >= self.rows {
            CursorState::Exhausted
        } else if self.started {
            CursorState::Iterating
        } else {
            CursorState::NotStarted
        }
    }

    /// Raw cursor position. `row == rows` once exhausted.
    pub fn position(&self) -> GridCell {
        GridCell::new(self.row, self.column)
    }

    pub fn is_exhausted(&self) -> bool {
        self.state() == CursorState::Exhausted
    }

    /// Yield the current cell and step to the next one.
    ///
    /// Returns `None` once every cell has been produced. This is the normal
    /// end of the sequence, not an error.
    pub fn advance(&mut self) -> Option<GridCell> {
        if self.row >= self.rows {
            return None;
        }

        let cell = self.position();
        self.started = true;
        self.column += 1;
        if self.column == self.columns {
            self.column = 0;
            self.row += 1;
        }
        Some(cell)
    }

    /// Position the cursor so the next `advance()` yields `cell`.
    ///
    /// Leaves the cursor untouched when `cell` is outside the grid.
    pub fn seek(&mut self, cell: GridCell) -> Result<(), GeometryError> {
        if cell.row >= self.rows || cell.column >= self.columns {
            return Err(GeometryError::CellOutOfBounds {
                row: cell.row,
                column: cell.column,
                rows: self.rows,
                columns: self.columns,
            });
        }

        self.row = cell.row;
        self.column = cell.column;
        self.started = true;
        Ok(())
    }

    /// Return to `(0, 0)` in the `NotStarted` state.
    pub fn reset(&mut self) {
        self.row = 0;
        self.column = 0;
        self.started = false;
    }

    /// Number of cells still to be produced.
    pub fn remaining(&self) -> u64 {
        if self.row >= self.rows {
            return 0;
        }
        let total = u64::from(self.rows) * u64::from(self.columns);
        let consumed = u64::from(self.row) * u64::from(self.columns) + u64::from(self.column);
        total - consumed
    }
}
