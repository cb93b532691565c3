//! Patch streams.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │               PairedPatchStream                 │
//! │     (lockstep check, scoped pixel handle)       │
//! └───────────────┬─────────────────┬───────────────┘
//!                 │                 │
//!                 ▼                 ▼
//! ┌───────────────────────┐ ┌───────────────────────┐
//! │ PatchStream<Pixels>   │ │ PatchStream<Labels>   │
//! │  grid + cursor        │ │  grid + cursor        │
//! └───────────┬───────────┘ └───────────┬───────────┘
//!             ▼                         ▼
//!        PixelSource               LabelSource
//! ```
//!
//! Both inner streams walk identical grids, so after every step their cursors
//! must agree. Disagreement is a fatal [`StreamError::Desynchronized`].
//!
//! End of data is `Ok(None)`, never an error.
//!
//! [`StreamError::Desynchronized`]: crate::error::StreamError::Desynchronized

mod batch;
mod paired;
mod patch_stream;

pub use batch::{BatchBuilder, LabelBatch, PatchBatch, PatchLocation};
pub use paired::PairedPatchStream;
pub use patch_stream::PatchStream;
