use ndarray::{s, Array3};
use tracing::debug;

use crate::error::SourceError;
use crate::grid::Origin;

use super::{check_window, PatchSource};

// =============================================================================
// PixelSource Trait
// =============================================================================

/// An open handle on one image's raw pixels.
///
/// Implementations usually wrap an expensive native reader. The handle is
/// owned by exactly one paired stream and released through [`close`], which
/// the stream calls exactly once on every exit path.
///
/// [`close`]: PixelSource::close
pub trait PixelSource {
    /// Identifier used in logs and errors (file path, image name, ...).
    fn identifier(&self) -> &str;

    /// Native `(width, height)` of the full-resolution image.
    fn native_dimensions(&self) -> (u32, u32);

    /// Number of samples per pixel.
    fn channels(&self) -> usize;

    /// Decode a `size × size` window as `(size, size, channels)`.
    ///
    /// # Errors
    ///
    /// - [`SourceError::OutOfBounds`] if the window exceeds the native dimensions
    /// - [`SourceError::Closed`] if the handle has been released
    fn decode(&mut self, top: u32, left: u32, size: u32) -> Result<Array3<u8>, SourceError>;

    /// Release the underlying handle. Later decodes fail with `Closed`.
    fn close(&mut self) -> Result<(), SourceError>;

    fn is_open(&self) -> bool;
}

impl<P: PixelSource + ?Sized> PixelSource for Box<P> {
    fn identifier(&self) -> &str {
        (**self).identifier()
    }

    fn native_dimensions(&self) -> (u32, u32) {
        (**self).native_dimensions()
    }

    fn channels(&self) -> usize {
        (**self).channels()
    }

    fn decode(&mut self, top: u32, left: u32, size: u32) -> Result<Array3<u8>, SourceError> {
        (**self).decode(top, left, size)
    }

    fn close(&mut self) -> Result<(), SourceError> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

// =============================================================================
// PixelReader
// =============================================================================

/// Adapts a [`PixelSource`] to the [`PatchSource`] interface of a stream.
#[derive(Debug)]
pub struct PixelReader<P> {
    inner: P,
}

impl<P: PixelSource> PixelReader<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: PixelSource> PatchSource for PixelReader<P> {
    type Patch = Array3<u8>;

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.inner.native_dimensions()
    }

    fn read_patch(&mut self, origin: Origin, size: u32) -> Result<Self::Patch, SourceError> {
        self.inner.decode(origin.top, origin.left, size)
    }
}

// =============================================================================
// ArrayPixelSource
// =============================================================================

/// In-memory pixel source over a `(height, width, channels)` array.
///
/// Used for synthetic data and tests; behaves like a native reader with
/// respect to bounds checks and the closed state.
#[derive(Debug, Clone)]
pub struct ArrayPixelSource {
    identifier: String,
    pixels: Array3<u8>,
    open: bool,
    decode_count: usize,
}

impl ArrayPixelSource {
    pub fn new(identifier: impl Into<String>, pixels: Array3<u8>) -> Self {
        Self {
            identifier: identifier.into(),
            pixels,
            open: true,
            decode_count: 0,
        }
    }

    /// Build an RGB image whose pixel at `(y, x)` is `f(y, x)`.
    pub fn from_fn(
        identifier: impl Into<String>,
        width: u32,
        height: u32,
        f: impl Fn(u32, u32) -> [u8; 3],
    ) -> Self {
        let pixels = Array3::from_shape_fn(
            (height as usize, width as usize, 3),
            |(y, x, c)| f(y as u32, x as u32)[c],
        );
        Self::new(identifier, pixels)
    }

    /// Number of successful decodes so far.
    pub fn decode_count(&self) -> usize {
        self.decode_count
    }
}

impl PixelSource for ArrayPixelSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn native_dimensions(&self) -> (u32, u32) {
        let (height, width, _) = self.pixels.dim();
        (width as u32, height as u32)
    }

    fn channels(&self) -> usize {
        self.pixels.dim().2
    }

    fn decode(&mut self, top: u32, left: u32, size: u32) -> Result<Array3<u8>, SourceError> {
        if !self.open {
            return Err(SourceError::Closed(self.identifier.clone()));
        }
        check_window(top, left, size, self.native_dimensions())?;

        let (top, left, size) = (top as usize, left as usize, size as usize);
        let patch = self
            .pixels
            .slice(s![top..top + size, left..left + size, ..])
            .to_owned();
        self.decode_count += 1;
        Ok(patch)
    }

    fn close(&mut self) -> Result<(), SourceError> {
        if self.open {
            debug!("Closing in-memory pixel source {}", self.identifier);
            self.open = false;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
