//! Configuration management for WSI Patches.
//!
//! Two layers live here:
//! - [`PatchConfig`], the explicit configuration object threaded by reference
//!   into every stream and iterator (patch size, stride, batch size, edge
//!   policy, label kind). There is no process-wide state.
//! - [`Cli`], the clap command line of the `wsi-patches` binary.
//!
//! # Environment Variables
//!
//! Patch options can be set via environment variables with the `WSI_PATCH_` prefix:
//!
//! - `WSI_PATCH_SIZE` - Patch side length in pixels (default: 256)
//! - `WSI_PATCH_STRIDE` - Sliding-window stride in pixels (default: 128)
//! - `WSI_PATCH_BATCH_SIZE` - Patches per batch (default: 8)
//! - `WSI_PATCH_EDGE_POLICY` - `drop` or `shift-to-fit` (default: drop)
//! - `WSI_PATCH_LABEL_KIND` - `pixel`, `class-center` or `class-average` (default: class-center)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::dataset::{DEFAULT_TRAIN_RATIO, DEFAULT_VALIDATION_RATIO};
use crate::grid::EdgePolicy;
use crate::source::LabelKind;

// =============================================================================
// Default Values
// =============================================================================

/// Default patch side length in pixels.
pub const DEFAULT_PATCH_SIZE: u32 = 256;

/// Default sliding-window stride in pixels.
pub const DEFAULT_STRIDE: u32 = 128;

/// Default number of patches per batch.
pub const DEFAULT_BATCH_SIZE: usize = 8;

// =============================================================================
// Patch Configuration
// =============================================================================

/// Geometry and labelling options shared by every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Side length of each square patch
    pub size: u32,

    /// Distance between neighbouring patch origins
    pub stride: u32,

    /// Patches per batch
    pub batch_size: usize,

    /// Treatment of pixels past the last full stride
    pub edge_policy: EdgePolicy,

    /// Label shape paired with each patch
    pub label_kind: LabelKind,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_PATCH_SIZE,
            stride: DEFAULT_STRIDE,
            batch_size: DEFAULT_BATCH_SIZE,
            edge_policy: EdgePolicy::default(),
            label_kind: LabelKind::default(),
        }
    }
}

impl PatchConfig {
    pub fn new(size: u32, stride: u32) -> Self {
        Self {
            size,
            stride,
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_edge_policy(mut self, edge_policy: EdgePolicy) -> Self {
        self.edge_policy = edge_policy;
        self
    }

    pub fn with_label_kind(mut self, label_kind: LabelKind) -> Self {
        self.label_kind = label_kind;
        self
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.size == 0 {
            return Err("patch size must be greater than 0".to_string());
        }
        if self.stride == 0 {
            return Err("stride must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Whether neighbouring patches share pixels.
    pub fn is_overlapping(&self) -> bool {
        self.stride < self.size
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Patches - synchronized patch and label extraction for Whole Slide Images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-patches")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of the `wsi-patches` binary.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print grid geometry and patch counts for every image of a dataset.
    Inspect(DatasetArgs),

    /// Walk a dataset batch by batch without a consumer, as a dry run.
    Iterate(IterateConfig),

    /// Write patch pairs of a dataset to PNG files.
    Export(ExportConfig),

    /// Assign images to train/validation/test partitions.
    Split(SplitConfig),
}

/// Dataset selection and patch options shared by dataset commands.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Path to the dataset manifest (JSON).
    pub manifest: PathBuf,

    /// Restrict to one partition of the manifest.
    #[arg(long)]
    pub partition: Option<String>,

    #[command(flatten)]
    pub patch: PatchArgs,
}

/// Patch geometry options.
#[derive(Args, Debug, Clone)]
pub struct PatchArgs {
    /// Patch side length in pixels.
    #[arg(long = "size", default_value_t = DEFAULT_PATCH_SIZE, env = "WSI_PATCH_SIZE")]
    pub size: u32,

    /// Sliding-window stride in pixels.
    #[arg(long, default_value_t = DEFAULT_STRIDE, env = "WSI_PATCH_STRIDE")]
    pub stride: u32,

    /// Patches per batch.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, env = "WSI_PATCH_BATCH_SIZE")]
    pub batch_size: usize,

    /// Treatment of trailing pixels: drop or shift-to-fit.
    #[arg(long, default_value_t = EdgePolicy::Drop, env = "WSI_PATCH_EDGE_POLICY")]
    pub edge_policy: EdgePolicy,

    /// Label kind: pixel, class-center or class-average.
    #[arg(long, default_value_t = LabelKind::ClassCenter, env = "WSI_PATCH_LABEL_KIND")]
    pub label_kind: LabelKind,
}

impl PatchArgs {
    pub fn to_patch_config(&self) -> PatchConfig {
        PatchConfig {
            size: self.size,
            stride: self.stride,
            batch_size: self.batch_size,
            edge_policy: self.edge_policy,
            label_kind: self.label_kind,
        }
    }
}

/// Options of the `iterate` command.
#[derive(Args, Debug, Clone)]
pub struct IterateConfig {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Stop after this many batches.
    #[arg(long)]
    pub max_batches: Option<usize>,
}

/// Options of the `export` command.
#[derive(Args, Debug, Clone)]
pub struct ExportConfig {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Output directory for PNG files.
    pub output: PathBuf,

    /// Stop after this many patch pairs.
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Options of the `split` command.
#[derive(Args, Debug, Clone)]
pub struct SplitConfig {
    /// Path to the dataset manifest (JSON).
    pub manifest: PathBuf,

    /// Fraction of images assigned to the train partition.
    #[arg(long, default_value_t = DEFAULT_TRAIN_RATIO)]
    pub train: f64,

    /// Fraction of images assigned to the validation partition.
    #[arg(long, default_value_t = DEFAULT_VALIDATION_RATIO)]
    pub validation: f64,

    /// Seed of the shuffle.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Where to write the updated manifest (defaults to overwriting the input).
    #[arg(long)]
    pub output: Option<PathBuf>,
}

// =============================================================================
// Tests
// =============================================================================
