//! Sliding-window patch geometry.
//!
//! This module holds the pure coordinate math behind patch extraction. It does
//! no I/O: given image dimensions, a patch size and a stride, it computes how
//! many patch origins fit along each axis and enumerates them row-major.
//!
//! # Layout
//!
//! ```text
//!   left →   0      stride   2·stride
//! top ┌──────┬──┬───┬──┬────┬──┬───────┐
//!  ↓  │ (0,0)│  │(0,1)│ │(0,2)│  │ ░░░░ │  ← trailing pixels
//!     ├──────┼──┼─────┼─┼─────┼──┤ ░░░░ │    (dropped or covered by
//!     │ (1,0)│  │(1,1)│ │(1,2)│  │ ░░░░ │     a shifted final window)
//!     └──────┴──┴─────┴─┴─────┴──┴───────┘
//! ```
//!
//! - [`PatchGrid`]: immutable geometry, `origin_at(row, column)`
//! - [`GridCursor`]: mutable row-major position with an explicit state machine
//! - [`EdgePolicy`]: what to do with pixels past the last full stride

mod cursor;
mod patch_grid;

pub use cursor::{CursorState, GridCursor};
pub use patch_grid::{Cells, EdgePolicy, GridCell, Origin, PatchGrid};
