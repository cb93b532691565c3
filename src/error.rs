use thiserror::Error;

use crate::grid::GridCell;

/// Errors raised while building or addressing a patch grid
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// Size, stride or image dimensions cannot produce a grid
    #[error(
        "Invalid geometry: {reason} (width {width}, height {height}, size {size}, stride {stride})"
    )]
    InvalidGeometry {
        width: u32,
        height: u32,
        size: u32,
        stride: u32,
        reason: &'static str,
    },

    /// Requested grid cell lies outside the grid
    #[error("Cell ({row}, {column}) out of bounds for a {rows}x{columns} grid")]
    CellOutOfBounds {
        row: u32,
        column: u32,
        rows: u32,
        columns: u32,
    },
}

/// Errors reported by pixel and label sources
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Image or mask does not exist
    #[error("Source not found: {0}")]
    NotFound(String),

    /// Image exists but could not be opened
    #[error("Failed to open {identifier}: {message}")]
    Open { identifier: String, message: String },

    /// Decoding a window failed
    #[error("Failed to decode {identifier}: {message}")]
    Decode { identifier: String, message: String },

    /// Requested window exceeds the native dimensions
    #[error(
        "Window out of bounds: {size}x{size} at (top {top}, left {left}) exceeds {width}x{height}"
    )]
    OutOfBounds {
        top: u32,
        left: u32,
        size: u32,
        width: u32,
        height: u32,
    },

    /// Source was used after being closed
    #[error("Source already closed: {0}")]
    Closed(String),

    /// Underlying file system error
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}

/// Errors raised by patch streams and the image set iterator
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// Grid could not be built or a seek was out of range
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Pixel or label source failed
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Pixel and label sources disagree on native dimensions
    #[error(
        "Geometry mismatch: pixels are {}x{}, labels are {}x{}",
        pixels.0, pixels.1, labels.0, labels.1
    )]
    GeometryMismatch {
        pixels: (u32, u32),
        labels: (u32, u32),
    },

    /// Pixel and label cursors no longer point at the same cell
    #[error("Patch streams out of sync: pixels at {pixels}, labels at {labels}")]
    Desynchronized { pixels: GridCell, labels: GridCell },

    /// A freshly opened image produced no patch at all
    #[error("Image '{image}' produced no patches")]
    EmptyImage { image: String },

    /// Batch size of zero was requested
    #[error("Batch size must be greater than 0")]
    InvalidBatchSize,

    /// A saved position does not match the image list
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
}

/// Errors raised while encoding patches to image files
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Patch layout cannot be written as an image
    #[error("Unsupported patch shape: {0}")]
    UnsupportedShape(String),

    /// Encoder backend failed
    #[error("Encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors related to dataset manifests and collections
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Manifest file could not be read or written
    #[error("Manifest I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Manifest is not valid JSON or misses required fields
    #[error("Invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),

    /// Image name not listed in the manifest
    #[error("Unknown image: {0}")]
    UnknownImage(String),

    /// Partition name not listed in the manifest
    #[error("Unknown partition: {0}")]
    UnknownPartition(String),

    /// Two images share the same name
    #[error("Duplicate image name: {0}")]
    DuplicateImage(String),

    /// Split ratios are negative or sum above one
    #[error("Invalid split ratios: train {train}, validation {validation}")]
    InvalidSplit { train: f64, validation: f64 },
}
