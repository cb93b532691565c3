use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::grid::Origin;

use super::{check_window, PatchSource};

// =============================================================================
// Label Kind
// =============================================================================

/// Shape of the label paired with each pixel patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelKind {
    /// Full `size × size` mask window
    Pixel,
    /// Mask value at the patch centre, `(size / 2, size / 2)`
    #[default]
    ClassCenter,
    /// Mean of the mask window
    ClassAverage,
}

impl LabelKind {
    /// Reduce a decoded mask window to the requested label shape.
    pub fn reduce(self, mask: Array2<f32>) -> Label {
        match self {
            LabelKind::Pixel => Label::Mask(mask),
            LabelKind::ClassCenter => {
                let (rows, columns) = mask.dim();
                Label::Class(mask[[rows / 2, columns / 2]])
            }
            LabelKind::ClassAverage => Label::Class(mask.mean().unwrap_or(0.0)),
        }
    }

    /// Whether labels of this kind are scalars.
    pub fn is_scalar(self) -> bool {
        !matches!(self, LabelKind::Pixel)
    }
}

impl FromStr for LabelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pixel" => Ok(LabelKind::Pixel),
            "class-center" | "center" => Ok(LabelKind::ClassCenter),
            "class-average" | "average" => Ok(LabelKind::ClassAverage),
            other => Err(format!(
                "unknown label kind '{}', expected 'pixel', 'class-center' or 'class-average'",
                other
            )),
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKind::Pixel => write!(f, "pixel"),
            LabelKind::ClassCenter => write!(f, "class-center"),
            LabelKind::ClassAverage => write!(f, "class-average"),
        }
    }
}

/// A label for one patch.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    Mask(Array2<f32>),
    Class(f32),
}

impl Label {
    pub fn as_mask(&self) -> Option<&Array2<f32>> {
        match self {
            Label::Mask(mask) => Some(mask),
            Label::Class(_) => None,
        }
    }

    pub fn as_class(&self) -> Option<f32> {
        match self {
            Label::Mask(_) => None,
            Label::Class(value) => Some(*value),
        }
    }
}

// =============================================================================
// LabelSource Trait
// =============================================================================

/// Stored label mask for one image.
///
/// Masks are stored as `f32` in `[0, 1]`; boolean masks map to `0.0` / `1.0`.
pub trait LabelSource {
    fn identifier(&self) -> &str;

    /// Native `(width, height)` of the mask.
    fn native_dimensions(&self) -> (u32, u32);

    /// Decode a `size × size` mask window.
    fn decode_mask(&mut self, top: u32, left: u32, size: u32)
        -> Result<Array2<f32>, SourceError>;

    /// Release any held resource. Masks rarely hold one.
    fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

impl<L: LabelSource + ?Sized> LabelSource for Box<L> {
    fn identifier(&self) -> &str {
        (**self).identifier()
    }

    fn native_dimensions(&self) -> (u32, u32) {
        (**self).native_dimensions()
    }

    fn decode_mask(
        &mut self,
        top: u32,
        left: u32,
        size: u32,
    ) -> Result<Array2<f32>, SourceError> {
        (**self).decode_mask(top, left, size)
    }

    fn close(&mut self) -> Result<(), SourceError> {
        (**self).close()
    }
}

// =============================================================================
// LabelReader
// =============================================================================

/// Binds a [`LabelSource`] to a [`LabelKind`] for use in a patch stream.
#[derive(Debug)]
pub struct LabelReader<L> {
    inner: L,
    kind: LabelKind,
}

impl<L: LabelSource> LabelReader<L> {
    pub fn new(inner: L, kind: LabelKind) -> Self {
        Self { inner, kind }
    }

    pub fn kind(&self) -> LabelKind {
        self.kind
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut L {
        &mut self.inner
    }
}

impl<L: LabelSource> PatchSource for LabelReader<L> {
    type Patch = Label;

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.inner.native_dimensions()
    }

    fn read_patch(&mut self, origin: Origin, size: u32) -> Result<Self::Patch, SourceError> {
        let mask = self.inner.decode_mask(origin.top, origin.left, size)?;
        Ok(self.kind.reduce(mask))
    }
}

// =============================================================================
// ArrayMaskSource
// =============================================================================

/// In-memory mask over a `(height, width)` array.
#[derive(Debug, Clone)]
pub struct ArrayMaskSource {
    identifier: String,
    mask: Array2<f32>,
    decode_count: usize,
}

impl ArrayMaskSource {
    pub fn new(identifier: impl Into<String>, mask: Array2<f32>) -> Self {
        Self {
            identifier: identifier.into(),
            mask,
            decode_count: 0,
        }
    }

    /// Build a mask whose value at `(y, x)` is `f(y, x)`.
    pub fn from_fn(
        identifier: impl Into<String>,
        width: u32,
        height: u32,
        f: impl Fn(u32, u32) -> f32,
    ) -> Self {
        let mask = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            f(y as u32, x as u32)
        });
        Self::new(identifier, mask)
    }

    pub fn decode_count(&self) -> usize {
        self.decode_count
    }
}

impl LabelSource for ArrayMaskSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn native_dimensions(&self) -> (u32, u32) {
        let (height, width) = self.mask.dim();
        (width as u32, height as u32)
    }

    fn decode_mask(
        &mut self,
        top: u32,
        left: u32,
        size: u32,
    ) -> Result<Array2<f32>, SourceError> {
        check_window(top, left, size, self.native_dimensions())?;

        let (top, left, size) = (top as usize, left as usize, size as usize);
        self.decode_count += 1;
        Ok(self
            .mask
            .slice(s![top..top + size, left..left + size])
            .to_owned())
    }
}
