//! Pixel and label sources.
//!
//! Sources are the external decoders the patch streams pull from. A source
//! knows its native dimensions and, given a pixel-space window, returns the
//! decoded samples for that window.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │ PatchStream<Pixels>  │        │ PatchStream<Labels>  │
//! └──────────┬───────────┘        └──────────┬───────────┘
//!            │ PatchSource                   │ PatchSource
//!            ▼                               ▼
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │   PixelReader<P>     │        │   LabelReader<L>     │
//! │                      │        │  (LabelKind reduce)  │
//! └──────────┬───────────┘        └──────────┬───────────┘
//!            ▼                               ▼
//!   PixelSource trait                LabelSource trait
//!   ├─ ArrayPixelSource              ├─ ArrayMaskSource
//!   ├─ ImageFileSource               └─ MaskFileSource
//!   └─ CachedPixelSource<P>
//! ```

mod cache;
mod image_file;
mod label;
mod pixel;

pub use cache::{CachedPixelSource, DEFAULT_PATCH_CACHE_CAPACITY};
pub use image_file::{ImageFileSource, MaskFileSource};
pub use label::{ArrayMaskSource, Label, LabelKind, LabelReader, LabelSource};
pub use pixel::{ArrayPixelSource, PixelReader, PixelSource};

use crate::error::SourceError;
use crate::grid::Origin;

/// Anything a [`crate::stream::PatchStream`] can pull decoded patches from.
pub trait PatchSource {
    /// Decoded patch type.
    type Patch;

    /// Identifier used in logs and errors.
    fn identifier(&self) -> &str;

    /// Native `(width, height)` in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Decode the `size × size` window whose top-left corner is `origin`.
    fn read_patch(&mut self, origin: Origin, size: u32) -> Result<Self::Patch, SourceError>;
}

/// Reject windows that do not fit inside `(width, height)`.
pub fn check_window(
    top: u32,
    left: u32,
    size: u32,
    (width, height): (u32, u32),
) -> Result<(), SourceError> {
    let fits = u64::from(top) + u64::from(size) <= u64::from(height)
        && u64::from(left) + u64::from(size) <= u64::from(width);
    if fits {
        Ok(())
    } else {
        Err(SourceError::OutOfBounds {
            top,
            left,
            size,
            width,
            height,
        })
    }
}
