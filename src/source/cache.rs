use std::num::NonZeroUsize;

use lru::LruCache;
use ndarray::Array3;
use tracing::debug;

use crate::error::SourceError;

use super::PixelSource;

/// Default number of decoded patches kept by [`CachedPixelSource`].
pub const DEFAULT_PATCH_CACHE_CAPACITY: usize = 256;

/// Window identity: `(top, left, size)`.
type WindowKey = (u32, u32, u32);

/// LRU cache of decoded windows in front of a [`PixelSource`].
///
/// Streams never cache on their own. Wrap a source in this when the same grid
/// is replayed (several epochs over a small validation image, or a reset after
/// a seek) and decoding dominates.
pub struct CachedPixelSource<P> {
    inner: P,
    cache: LruCache<WindowKey, Array3<u8>>,
    hits: u64,
    misses: u64,
}

impl<P: PixelSource> CachedPixelSource<P> {
    pub fn new(inner: P) -> Self {
        Self::with_capacity(inner, DEFAULT_PATCH_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `capacity` patches (minimum 1).
    pub fn with_capacity(inner: P, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Number of cached patches.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: PixelSource> PixelSource for CachedPixelSource<P> {
    fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    fn native_dimensions(&self) -> (u32, u32) {
        self.inner.native_dimensions()
    }

    fn channels(&self) -> usize {
        self.inner.channels()
    }

    fn decode(&mut self, top: u32, left: u32, size: u32) -> Result<Array3<u8>, SourceError> {
        if !self.inner.is_open() {
            return Err(SourceError::Closed(self.inner.identifier().to_string()));
        }

        let key = (top, left, size);
        if let Some(patch) = self.cache.get(&key) {
            self.hits += 1;
            return Ok(patch.clone());
        }

        let patch = self.inner.decode(top, left, size)?;
        self.misses += 1;
        self.cache.put(key, patch.clone());
        Ok(patch)
    }

    fn close(&mut self) -> Result<(), SourceError> {
        if !self.cache.is_empty() {
            debug!(
                "Dropping {} cached patches of {} ({} hits, {} misses)",
                self.cache.len(),
                self.inner.identifier(),
                self.hits,
                self.misses
            );
        }
        self.cache.clear();
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}
