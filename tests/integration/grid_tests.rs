//! Grid geometry integration tests.
//!
//! Tests verify:
//! - Row-major enumeration and counts for exact and trailing-pixel grids
//! - Both edge policies keep every window inside the image
//! - Invalid geometry is rejected up front

use wsi_patches::{EdgePolicy, GeometryError, GridCell, Origin, PatchGrid};

// =============================================================================
// Enumeration
// =============================================================================

#[test]
fn test_unit_grid_is_row_major() {
    let grid = PatchGrid::new(3, 3, 1, 1).unwrap();
    let cells: Vec<_> = grid.cells().collect();

    assert_eq!(cells.len(), 9);
    assert_eq!(cells.first(), Some(&GridCell::new(0, 0)));
    assert_eq!(cells[1], GridCell::new(0, 1));
    assert_eq!(cells[3], GridCell::new(1, 0));
    assert_eq!(cells.last(), Some(&GridCell::new(2, 2)));
}

#[test]
fn test_trailing_pixels_dropped() {
    let grid = PatchGrid::new(11, 11, 3, 3).unwrap();
    assert_eq!(grid.rows(), 3);
    assert_eq!(grid.columns(), 3);
    assert_eq!(grid.len(), 9);

    for origin in grid.origins() {
        assert!(origin.top + 3 <= 11);
        assert!(origin.left + 3 <= 11);
    }
    assert_eq!(grid.origin_at(2, 2).unwrap(), Origin { top: 6, left: 6 });
}

#[test]
fn test_overlapping_grid_counts() {
    // (1000 - 256) / 128 + 1 = 6, (600 - 256) / 128 + 1 = 3
    let grid = PatchGrid::new(1000, 600, 256, 128).unwrap();
    assert_eq!(grid.columns(), 6);
    assert_eq!(grid.rows(), 3);
    assert_eq!(grid.len(), 18);
}

#[test]
fn test_shift_to_fit_covers_right_and_bottom_edges() {
    let grid = PatchGrid::with_policy(11, 10, 3, 3, EdgePolicy::ShiftToFit).unwrap();
    assert_eq!(grid.columns(), 4);
    assert_eq!(grid.rows(), 4);

    let last = grid.origin_at(grid.rows() - 1, grid.columns() - 1).unwrap();
    assert_eq!(last, Origin { top: 7, left: 8 });
    for origin in grid.origins() {
        assert!(origin.top + 3 <= 10);
        assert!(origin.left + 3 <= 11);
    }
}

#[test]
fn test_shift_to_fit_matches_drop_when_exact() {
    let drop = PatchGrid::new(9, 9, 3, 3).unwrap();
    let shift = PatchGrid::with_policy(9, 9, 3, 3, EdgePolicy::ShiftToFit).unwrap();
    assert_eq!(
        drop.origins().collect::<Vec<_>>(),
        shift.origins().collect::<Vec<_>>()
    );
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_invalid_geometry() {
    for (width, height, size, stride) in [(10, 10, 0, 1), (10, 10, 2, 0), (1, 10, 2, 1), (10, 1, 2, 1)] {
        assert!(
            matches!(
                PatchGrid::new(width, height, size, stride),
                Err(GeometryError::InvalidGeometry { .. })
            ),
            "expected InvalidGeometry for {}x{} size {} stride {}",
            width,
            height,
            size,
            stride
        );
    }
}

#[test]
fn test_origin_out_of_bounds() {
    let grid = PatchGrid::new(4, 4, 2, 2).unwrap();
    assert!(matches!(
        grid.origin_at(2, 0),
        Err(GeometryError::CellOutOfBounds { row: 2, column: 0, rows: 2, columns: 2 })
    ));
    assert!(!grid.contains(GridCell::new(0, 2)));
}
