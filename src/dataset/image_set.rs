use std::collections::HashSet;

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PatchConfig;
use crate::error::StreamError;
use crate::grid::GridCell;
use crate::source::Label;
use crate::stream::{PairedPatchStream, PatchBatch};

use super::ImageCollection;

/// Resumable position within an image set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetPosition {
    /// Index into the iterator's image list
    pub image_index: usize,

    /// Name of that image, checked on resume
    pub image: String,

    /// Next cell to produce
    pub cell: GridCell,
}

type Stream<C> =
    PairedPatchStream<<C as ImageCollection>::Pixels, <C as ImageCollection>::Labels>;

/// One pair sequence spanning every image of a collection.
///
/// Images are visited in the collection's listing order. Each image gets a
/// fresh [`PairedPatchStream`]; when it runs out it is closed before the next
/// one is opened, so at most one pixel handle is open at any time.
pub struct ImageSetIterator<C: ImageCollection> {
    collection: C,
    config: PatchConfig,
    images: Vec<String>,
    index: usize,
    current: Option<Stream<C>>,
    finished: bool,
    opened: usize,
}

impl<C: ImageCollection> ImageSetIterator<C> {
    /// Iterate every image the collection lists.
    pub fn new(collection: C, config: PatchConfig) -> Self {
        let images = collection.identifiers();
        Self::with_images(collection, images, config)
    }

    /// Iterate the given images, in the given order.
    ///
    /// Repeated names are kept at their first position only.
    pub fn with_images(collection: C, images: Vec<String>, config: PatchConfig) -> Self {
        let mut seen = HashSet::with_capacity(images.len());
        let images = images
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect();

        Self {
            collection,
            config,
            images,
            index: 0,
            current: None,
            finished: false,
            opened: 0,
        }
    }

    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    /// Name of the image currently open, if any.
    pub fn current_image(&self) -> Option<&str> {
        self.current.as_ref().map(|stream| stream.name())
    }

    /// Number of images opened so far.
    pub fn images_opened(&self) -> usize {
        self.opened
    }

    /// Next aligned pair, moving across image boundaries transparently.
    ///
    /// Returns `Ok(None)` after the last image is exhausted.
    ///
    /// # Errors
    ///
    /// Stream and source errors propagate unchanged. An image that yields no
    /// pair right after being opened fails with [`StreamError::EmptyImage`];
    /// it is not skipped.
    pub fn next_pair(&mut self) -> Result<Option<(Array3<u8>, Label)>, StreamError> {
        self.step(|stream| stream.next_pair())
    }

    /// Next batch of up to `batch_size` pairs from the current image.
    ///
    /// Batches never span two images: the last batch of each image may be
    /// short.
    pub fn next_batch(&mut self, batch_size: usize) -> Result<Option<PatchBatch>, StreamError> {
        if batch_size == 0 {
            return Err(StreamError::InvalidBatchSize);
        }
        self.step(|stream| stream.next_batch(batch_size))
    }

    /// Next batch using the configured batch size.
    pub fn next_configured_batch(&mut self) -> Result<Option<PatchBatch>, StreamError> {
        self.next_batch(self.config.batch_size)
    }

    fn step<T>(
        &mut self,
        mut pull: impl FnMut(&mut Stream<C>) -> Result<Option<T>, StreamError>,
    ) -> Result<Option<T>, StreamError> {
        if self.finished {
            return Ok(None);
        }

        if self.current.is_none() && self.open_image()?.is_none() {
            return Ok(None);
        }
        let Some(stream) = self.current.as_mut() else {
            return Ok(None);
        };

        if let Some(item) = pull(stream)? {
            return Ok(Some(item));
        }

        // current image exhausted: release it, then retry once on the next one
        self.close_current()?;
        self.index += 1;

        let Some(stream) = self.open_image()? else {
            return Ok(None);
        };
        if let Some(item) = pull(stream)? {
            return Ok(Some(item));
        }

        // an image with no pairs stops the set rather than being skipped
        let image = stream.name().to_string();
        self.finished = true;
        self.close_current()?;
        Err(StreamError::EmptyImage { image })
    }

    /// Open the image at `index`, or mark the set finished past the end.
    fn open_image(&mut self) -> Result<Option<&mut Stream<C>>, StreamError> {
        let Some(name) = self.images.get(self.index).cloned() else {
            info!("Image set exhausted after {} images", self.images.len());
            self.finished = true;
            return Ok(None);
        };

        info!(
            "Opening image {}/{}: {}",
            self.index + 1,
            self.images.len(),
            name
        );

        let labels = self.collection.open_labels(&name)?;
        let pixels = self.collection.open_pixels(&name)?;
        let stream = PairedPatchStream::open(name, pixels, labels, &self.config)?;
        self.opened += 1;

        Ok(Some(self.current.insert(stream)))
    }

    fn close_current(&mut self) -> Result<(), StreamError> {
        match self.current.take() {
            Some(mut stream) => {
                debug!("Releasing image {}", stream.name());
                stream.close()
            }
            None => Ok(()),
        }
    }

    /// Position of the next pair, for checkpointing.
    ///
    /// `None` once the whole set has been consumed.
    pub fn position(&self) -> Result<Option<DatasetPosition>, StreamError> {
        if self.finished {
            return Ok(None);
        }

        let (image_index, cell) = match &self.current {
            Some(stream) if !stream.is_exhausted() => {
                (self.index, stream.current_coordinates()?)
            }
            Some(_) => (self.index + 1, GridCell::new(0, 0)),
            None => (self.index, GridCell::new(0, 0)),
        };

        Ok(self
            .images
            .get(image_index)
            .map(|image| DatasetPosition {
                image_index,
                image: image.clone(),
                cell,
            }))
    }

    /// Continue from a position returned by [`position`](Self::position).
    ///
    /// Closes the open image, reopens the recorded one and seeks both streams.
    /// If the seek fails the reopened image is released again and the
    /// iterator yields nothing until a later `resume` or `reset` succeeds.
    pub fn resume(&mut self, position: &DatasetPosition) -> Result<(), StreamError> {
        let known = self.images.get(position.image_index) == Some(&position.image);
        if !known {
            return Err(StreamError::InvalidPosition(format!(
                "image '{}' is not at index {}",
                position.image, position.image_index
            )));
        }

        self.close_current()?;
        self.finished = false;
        self.index = position.image_index;

        if let Some(stream) = self.open_image()? {
            if let Err(err) = stream.seek(position.cell.row, position.cell.column) {
                self.finished = true;
                self.close_current()?;
                return Err(err);
            }
        }
        info!(
            "Resumed at image {} cell {}",
            position.image, position.cell
        );
        Ok(())
    }

    /// Restart from the first image.
    pub fn reset(&mut self) -> Result<(), StreamError> {
        self.close_current()?;
        self.index = 0;
        self.finished = false;
        Ok(())
    }

    /// Release the open image, if any. Later calls yield `Ok(None)`.
    pub fn close(&mut self) -> Result<(), StreamError> {
        self.finished = true;
        self.close_current()
    }
}

impl<C: ImageCollection> Iterator for ImageSetIterator<C> {
    type Item = Result<(Array3<u8>, Label), StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair().transpose()
    }
}
