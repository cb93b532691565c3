//! JSON dataset manifest.
//!
//! ```json
//! {
//!   "images": [
//!     { "name": "slide-001", "pixels": "slides/slide-001.tif", "labels": "masks/slide-001.png" }
//!   ],
//!   "partitions": { "train": ["slide-001"] }
//! }
//! ```
//!
//! Relative paths resolve against the manifest's directory.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DatasetError, SourceError};
use crate::source::{ImageFileSource, MaskFileSource};

use super::ImageCollection;

/// Name of the training partition.
pub const TRAIN_PARTITION: &str = "train";

/// Name of the validation partition.
pub const VALIDATION_PARTITION: &str = "validation";

/// Name of the test partition.
pub const TEST_PARTITION: &str = "test";

/// Default share of images assigned to training.
pub const DEFAULT_TRAIN_RATIO: f64 = 0.7;

/// Default share of images assigned to validation. The rest goes to test.
pub const DEFAULT_VALIDATION_RATIO: f64 = 0.1;

// =============================================================================
// Manifest
// =============================================================================

/// One image of the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Unique image name
    pub name: String,

    /// Pixel file (PNG, JPEG or TIFF)
    pub pixels: PathBuf,

    /// Grayscale label mask of the same dimensions
    pub labels: PathBuf,
}

/// Ordered list of images plus named partitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub images: Vec<ImageEntry>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub partitions: BTreeMap<String, Vec<String>>,
}

/// Shares of the train and validation partitions; test takes the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: DEFAULT_TRAIN_RATIO,
            validation: DEFAULT_VALIDATION_RATIO,
        }
    }
}

impl Manifest {
    /// Read and validate a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let manifest: Manifest = serde_json::from_str(&text)?;
        manifest.validate()?;
        debug!(
            "Loaded manifest {} ({} images, {} partitions)",
            path.display(),
            manifest.images.len(),
            manifest.partitions.len()
        );
        Ok(manifest)
    }

    /// Write the manifest as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Check that names are unique and partitions only reference known images.
    pub fn validate(&self) -> Result<(), DatasetError> {
        let mut names = HashSet::with_capacity(self.images.len());
        for entry in &self.images {
            if !names.insert(entry.name.as_str()) {
                return Err(DatasetError::DuplicateImage(entry.name.clone()));
            }
        }

        for members in self.partitions.values() {
            if let Some(unknown) = members.iter().find(|m| !names.contains(m.as_str())) {
                return Err(DatasetError::UnknownImage(unknown.clone()));
            }
        }
        Ok(())
    }

    pub fn entry(&self, name: &str) -> Option<&ImageEntry> {
        self.images.iter().find(|entry| entry.name == name)
    }

    /// Image names in listing order.
    pub fn names(&self) -> Vec<String> {
        self.images.iter().map(|entry| entry.name.clone()).collect()
    }

    pub fn partition(&self, name: &str) -> Result<&[String], DatasetError> {
        self.partitions
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| DatasetError::UnknownPartition(name.to_string()))
    }

    /// Shuffle images with a seeded RNG and cut into train, validation and
    /// test partitions.
    ///
    /// The image at shuffled position `i` of `n` goes to train if
    /// `i < train * n`, to validation if `i < (train + validation) * n`, and to
    /// test otherwise. Members keep manifest order within each partition.
    /// Existing partitions with these names are replaced.
    pub fn split(&mut self, ratios: SplitRatios, seed: u64) -> Result<(), DatasetError> {
        let SplitRatios { train, validation } = ratios;
        let valid = (0.0..=1.0).contains(&train)
            && (0.0..=1.0).contains(&validation)
            && train + validation <= 1.0;
        if !valid {
            return Err(DatasetError::InvalidSplit { train, validation });
        }

        let n = self.images.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut assignment = vec![TEST_PARTITION; n];
        for (position, &index) in order.iter().enumerate() {
            let position = position as f64;
            assignment[index] = if position < train * n as f64 {
                TRAIN_PARTITION
            } else if position < (train + validation) * n as f64 {
                VALIDATION_PARTITION
            } else {
                TEST_PARTITION
            };
        }

        for partition in [TRAIN_PARTITION, VALIDATION_PARTITION, TEST_PARTITION] {
            let members = self
                .images
                .iter()
                .zip(&assignment)
                .filter(|(_, assigned)| **assigned == partition)
                .map(|(entry, _)| entry.name.clone())
                .collect();
            self.partitions.insert(partition.to_string(), members);
        }

        info!(
            "Split {} images: {} train, {} validation, {} test",
            n,
            self.partitions[TRAIN_PARTITION].len(),
            self.partitions[VALIDATION_PARTITION].len(),
            self.partitions[TEST_PARTITION].len()
        );
        Ok(())
    }
}

// =============================================================================
// ManifestDataset
// =============================================================================

/// File-system [`ImageCollection`] described by a [`Manifest`].
#[derive(Debug, Clone)]
pub struct ManifestDataset {
    root: PathBuf,
    manifest: Manifest,
    selection: Option<Vec<String>>,
}

impl ManifestDataset {
    /// Load a manifest; relative paths resolve against its directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let manifest = Manifest::load(path)?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::from_manifest(manifest, root))
    }

    pub fn from_manifest(manifest: Manifest, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest,
            selection: None,
        }
    }

    /// Restrict iteration to one partition.
    pub fn with_partition(mut self, partition: &str) -> Result<Self, DatasetError> {
        self.selection = Some(self.manifest.partition(partition)?.to_vec());
        Ok(self)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn entry(&self, name: &str) -> Result<&ImageEntry, SourceError> {
        self.manifest
            .entry(name)
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }
}

impl ImageCollection for ManifestDataset {
    type Pixels = ImageFileSource;
    type Labels = MaskFileSource;

    fn identifiers(&self) -> Vec<String> {
        match &self.selection {
            Some(selection) => selection.clone(),
            None => self.manifest.names(),
        }
    }

    fn open_pixels(&self, name: &str) -> Result<Self::Pixels, SourceError> {
        ImageFileSource::open(self.resolve(&self.entry(name)?.pixels))
    }

    fn open_labels(&self, name: &str) -> Result<Self::Labels, SourceError> {
        MaskFileSource::open(self.resolve(&self.entry(name)?.labels))
    }
}
