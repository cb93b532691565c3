//! # WSI Patches
//!
//! Synchronized sliding-window patch extraction from Whole Slide Images (WSI)
//! and their label masks, for feeding training and inference pipelines.
//!
//! Images are far too large to decode whole, so each image is walked as a
//! regular grid of square patches. Every patch is decoded on demand from the
//! image's native reader, and the matching window of the label mask is decoded
//! alongside it so the pair stays aligned.
//!
//! ## Features
//!
//! - **Lazy decoding**: one decode call per patch, nothing held in memory
//!   beyond the current batch
//! - **Lockstep pairs**: pixel and label streams share one grid and one
//!   cursor position, checked after every step
//! - **Label kinds**: full mask windows, centre-pixel class, or window mean
//! - **Dataset iteration**: one continuous sequence across many images with at
//!   most one pixel handle open at a time, resumable from a saved position
//!
//! ## Architecture
//!
//! - [`grid`] - Patch grid geometry and the row-major cursor
//! - [`source`] - Pixel and label source traits plus in-memory and file readers
//! - [`stream`] - Single patch streams, paired streams and batches
//! - [`dataset`] - Image collections, manifests, the image set iterator and
//!   random sampling
//! - [`encode`] - PNG encoding of patches for export
//! - [`config`] - Patch configuration and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_patches::{ImageSetIterator, ManifestDataset, PatchConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dataset = ManifestDataset::open("data/manifest.json")?.with_partition("train")?;
//!     let config = PatchConfig::new(256, 128).with_batch_size(16);
//!
//!     let mut images = ImageSetIterator::new(&dataset, config);
//!     while let Some(batch) = images.next_configured_batch()? {
//!         let inputs = batch.to_nchw_f32();
//!         println!("{:?} from {}", inputs.dim(), batch.locations[0].image);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod encode;
pub mod error;
pub mod grid;
pub mod source;
pub mod stream;

// Re-export commonly used types
pub use config::{Cli, Command, PatchConfig};
pub use dataset::{
    DatasetPosition, ImageCollection, ImageEntry, ImageSetIterator, Manifest, ManifestDataset,
    RandomPatchSampler, SampledPatch, SplitRatios,
};
pub use encode::PatchEncoder;
pub use error::{DatasetError, EncodeError, GeometryError, SourceError, StreamError};
pub use grid::{CursorState, EdgePolicy, GridCell, GridCursor, Origin, PatchGrid};
pub use source::{
    ArrayMaskSource, ArrayPixelSource, CachedPixelSource, ImageFileSource, Label, LabelKind,
    LabelSource, MaskFileSource, PatchSource, PixelSource,
};
pub use stream::{LabelBatch, PairedPatchStream, PatchBatch, PatchLocation, PatchStream};
