use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

// =============================================================================
// Edge Policy
// =============================================================================

/// How the grid treats pixels that remain after the last full stride.
///
/// Neither policy ever emits a window that extends past the image; there is no
/// padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgePolicy {
    /// Ignore the trailing pixels: `count = floor((extent - size) / stride) + 1`.
    #[default]
    Drop,

    /// Add one final window per axis, shifted back so it ends exactly at the
    /// image edge. Overlaps its predecessor by more than `size - stride`.
    ShiftToFit,
}

impl FromStr for EdgePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(EdgePolicy::Drop),
            "shift-to-fit" | "shift" => Ok(EdgePolicy::ShiftToFit),
            other => Err(format!(
                "unknown edge policy '{}', expected 'drop' or 'shift-to-fit'",
                other
            )),
        }
    }
}

impl fmt::Display for EdgePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgePolicy::Drop => write!(f, "drop"),
            EdgePolicy::ShiftToFit => write!(f, "shift-to-fit"),
        }
    }
}

// =============================================================================
// Cells and Origins
// =============================================================================

/// Index of a patch within the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub row: u32,
    pub column: u32,
}

impl GridCell {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// Pixel-space position of a patch's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub top: u32,
    pub left: u32,
}

// =============================================================================
// PatchGrid
// =============================================================================

/// Grid of square patch origins over a `width × height` image.
///
/// Computed once from static image dimensions and immutable afterwards. Every
/// origin satisfies `top + size <= height` and `left + size <= width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchGrid {
    width: u32,
    height: u32,
    size: u32,
    stride: u32,
    rows: u32,
    columns: u32,
    edge_policy: EdgePolicy,
}

impl PatchGrid {
    /// Create a grid that drops trailing partial rows and columns.
    pub fn new(width: u32, height: u32, size: u32, stride: u32) -> Result<Self, GeometryError> {
        Self::with_policy(width, height, size, stride, EdgePolicy::Drop)
    }

    /// Create a grid with an explicit edge policy.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::InvalidGeometry`] if `size` or `stride` is zero,
    /// or if either dimension is smaller than `size`.
    pub fn with_policy(
        width: u32,
        height: u32,
        size: u32,
        stride: u32,
        edge_policy: EdgePolicy,
    ) -> Result<Self, GeometryError> {
        let invalid = |reason| GeometryError::InvalidGeometry {
            width,
            height,
            size,
            stride,
            reason,
        };

        if size == 0 {
            return Err(invalid("patch size must be greater than 0"));
        }
        if stride == 0 {
            return Err(invalid("stride must be greater than 0"));
        }
        if width < size || height < size {
            return Err(invalid("image is smaller than one patch"));
        }

        Ok(Self {
            width,
            height,
            size,
            stride,
            rows: axis_count(height, size, stride, edge_policy),
            columns: axis_count(width, size, stride, edge_policy),
            edge_policy,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Side length of each square patch.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Number of patch origins along the vertical axis.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of patch origins along the horizontal axis.
    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge_policy
    }

    /// Total number of patches, `rows * columns`.
    pub fn len(&self) -> u64 {
        u64::from(self.rows) * u64::from(self.columns)
    }

    /// A valid grid always holds at least one patch.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `cell` addresses a patch of this grid.
    pub fn contains(&self, cell: GridCell) -> bool {
        cell.row < self.rows && cell.column < self.columns
    }

    /// Get the `(top, left)` origin of the patch at `(row, column)`.
    pub fn origin_at(&self, row: u32, column: u32) -> Result<Origin, GeometryError> {
        if !self.contains(GridCell::new(row, column)) {
            return Err(GeometryError::CellOutOfBounds {
                row,
                column,
                rows: self.rows,
                columns: self.columns,
            });
        }

        Ok(Origin {
            top: self.axis_origin(row, self.height),
            left: self.axis_origin(column, self.width),
        })
    }

    /// Row-major iterator over every cell of the grid.
    pub fn cells(&self) -> Cells {
        Cells {
            rows: self.rows,
            columns: self.columns,
            next: 0,
        }
    }

    /// Row-major iterator over every patch origin of the grid.
    pub fn origins(&self) -> impl Iterator<Item = Origin> + '_ {
        self.cells().map(move |cell| Origin {
            top: self.axis_origin(cell.row, self.height),
            left: self.axis_origin(cell.column, self.width),
        })
    }

    /// Origin along one axis; only the shifted final window can hit the clamp.
    #[inline]
    fn axis_origin(&self, index: u32, extent: u32) -> u32 {
        // widened: the shifted index times a large stride can pass u32::MAX
        let origin = u64::from(index) * u64::from(self.stride);
        if origin + u64::from(self.size) > u64::from(extent) {
            extent - self.size
        } else {
            origin as u32
        }
    }
}

/// Number of windows along one axis. Caller guarantees `extent >= size`.
fn axis_count(extent: u32, size: u32, stride: u32, edge_policy: EdgePolicy) -> u32 {
    let slack = extent - size;
    let full = slack / stride + 1;
    match edge_policy {
        EdgePolicy::Drop => full,
        EdgePolicy::ShiftToFit if slack % stride != 0 => full + 1,
        EdgePolicy::ShiftToFit => full,
    }
}

// =============================================================================
// Cell Iterator
// =============================================================================

/// Row-major iterator over grid cells, column index fastest.
#[derive(Debug, Clone)]
pub struct Cells {
    rows: u32,
    columns: u32,
    next: u64,
}

impl Iterator for Cells {
    type Item = GridCell;

    fn next(&mut self) -> Option<Self::Item> {
        let total = u64::from(self.rows) * u64::from(self.columns);
        if self.next >= total {
            return None;
        }
        let columns = u64::from(self.columns);
        let cell = GridCell::new((self.next / columns) as u32, (self.next % columns) as u32);
        self.next += 1;
        Some(cell)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total = u64::from(self.rows) * u64::from(self.columns);
        let remaining = total.saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Cells {}

// =============================================================================
// Tests
// =============================================================================
