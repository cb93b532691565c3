//! Patch stream integration tests.
//!
//! Tests verify:
//! - Batching and end-of-sequence signalling
//! - Seek bounds and cursor preservation
//! - Pixel/label alignment and label kinds
//! - Handle release on close, drop and failed construction
//! - Retry after a failed decode, for single pairs and whole batches
//! - Decode caching on replay

use ndarray::Array3;

use wsi_patches::dataset::ImageCollection;
use wsi_patches::source::{PixelReader, PixelSource};
use wsi_patches::{
    ArrayPixelSource, CachedPixelSource, GeometryError, GridCell, ImageSetIterator, LabelKind,
    PairedPatchStream, PatchConfig, PatchStream, SourceError, StreamError,
};

use super::test_utils::{HalfMask, MockCollection, RecordingPixelSource};

fn counting_stream(width: u32, height: u32) -> PatchStream<PixelReader<ArrayPixelSource>> {
    let source = ArrayPixelSource::from_fn("img", width, height, |y, x| [y as u8, x as u8, 0]);
    PatchStream::new(PixelReader::new(source), 1, 1).unwrap()
}

// =============================================================================
// Single Streams
// =============================================================================

#[test]
fn test_short_final_batch_then_end() {
    let mut stream = counting_stream(3, 2);
    stream.seek(1, 0).unwrap();

    let batch = stream.next_batch(5).unwrap().unwrap();
    assert_eq!(batch.len(), 3);
    assert!(stream.next_batch(5).unwrap().is_none());
    assert!(stream.next_patch().unwrap().is_none());
}

#[test]
fn test_seek_out_of_range_keeps_cursor() {
    let mut stream = counting_stream(3, 3);
    stream.next_patch().unwrap();
    stream.next_patch().unwrap();

    assert!(matches!(
        stream.seek(3, 0),
        Err(StreamError::Geometry(GeometryError::CellOutOfBounds { .. }))
    ));
    assert_eq!(stream.current_coordinates(), GridCell::new(0, 2));

    let patch = stream.next_patch().unwrap().unwrap();
    assert_eq!(patch[[0, 0, 1]], 2);
}

#[test]
fn test_reset_replays_same_patches() {
    let mut stream = counting_stream(2, 2);
    let first: Vec<Array3<u8>> = stream.by_ref().map(Result::unwrap).collect();
    stream.reset();
    let second: Vec<Array3<u8>> = stream.by_ref().map(Result::unwrap).collect();

    assert_eq!(first.len(), 4);
    assert_eq!(first, second);
    // no caching inside the stream
    assert_eq!(stream.source().inner().decode_count(), 8);
}

// =============================================================================
// Paired Streams
// =============================================================================

type MockPair = PairedPatchStream<RecordingPixelSource, HalfMask>;

fn open_pair(
    collection: &MockCollection,
    name: &str,
    config: &PatchConfig,
) -> Result<MockPair, StreamError> {
    let labels = collection.open_labels(name)?;
    let pixels = collection.open_pixels(name)?;
    PairedPatchStream::open(name, pixels, labels, config)
}

#[test]
fn test_pairs_stay_aligned() {
    let collection = MockCollection::new().with_image("a", 4, 2);
    let mut stream = open_pair(&collection, "a", &PatchConfig::new(1, 1)).unwrap();

    let mut cells = Vec::new();
    while let Some((cell, pixels, label)) = stream.next_located().unwrap() {
        assert_eq!(u32::from(pixels[[0, 0, 0]]), cell.row);
        assert_eq!(u32::from(pixels[[0, 0, 1]]), cell.column);
        let expected = if cell.column < 2 { 1.0 } else { 0.0 };
        assert_eq!(label.as_class(), Some(expected));
        cells.push(cell);
    }
    assert_eq!(cells.len(), 8);
    assert_eq!(cells[4], GridCell::new(1, 0));
}

#[test]
fn test_label_kinds() {
    let collection = MockCollection::new().with_image("a", 4, 4);

    let config = PatchConfig::new(4, 4).with_label_kind(LabelKind::ClassAverage);
    let mut stream = open_pair(&collection, "a", &config).unwrap();
    let (_, label) = stream.next_pair().unwrap().unwrap();
    assert_eq!(label.as_class(), Some(0.5));

    let config = PatchConfig::new(4, 4).with_label_kind(LabelKind::Pixel);
    let mut stream = open_pair(&collection, "a", &config).unwrap();
    let (_, label) = stream.next_pair().unwrap().unwrap();
    let mask = label.as_mask().unwrap();
    assert_eq!(mask.dim(), (4, 4));
    assert_eq!(mask[[3, 1]], 1.0);
    assert_eq!(mask[[3, 2]], 0.0);
}

#[test]
fn test_drop_releases_handle_once() {
    let collection = MockCollection::new().with_image("a", 2, 2);
    {
        let mut stream = open_pair(&collection, "a", &PatchConfig::new(1, 1)).unwrap();
        stream.next_pair().unwrap();
        assert_eq!(collection.tracker().open_now(), 1);
    }
    assert_eq!(collection.tracker().open_now(), 0);
    assert_eq!(collection.tracker().closes(), 1);

    let mut stream = open_pair(&collection, "a", &PatchConfig::new(1, 1)).unwrap();
    stream.close().unwrap();
    stream.close().unwrap();
    drop(stream);
    assert_eq!(collection.tracker().closes(), 2);
}

#[test]
fn test_mismatch_releases_handle() {
    let collection = MockCollection::new().with_mismatched_image("a", 4, 4);
    let result = open_pair(&collection, "a", &PatchConfig::new(2, 2));

    assert!(matches!(
        result,
        Err(StreamError::GeometryMismatch {
            pixels: (4, 4),
            labels: (5, 4)
        })
    ));
    assert_eq!(collection.tracker().opens(), 1);
    assert_eq!(collection.tracker().open_now(), 0);
}

#[test]
fn test_invalid_geometry_releases_handle() {
    let collection = MockCollection::new().with_image("a", 4, 4);
    let result = open_pair(&collection, "a", &PatchConfig::new(8, 8));

    assert!(matches!(
        result,
        Err(StreamError::Geometry(GeometryError::InvalidGeometry { .. }))
    ));
    assert_eq!(collection.tracker().open_now(), 0);
}

#[test]
fn test_failed_decode_is_retried_at_same_cell() {
    let collection = MockCollection::new()
        .with_image("a", 2, 2)
        .with_decode_failure("a", 2);
    let mut stream = open_pair(&collection, "a", &PatchConfig::new(1, 1)).unwrap();

    stream.next_pair().unwrap();
    stream.next_pair().unwrap();
    assert!(matches!(
        stream.next_pair(),
        Err(StreamError::Source(SourceError::Decode { .. }))
    ));
    assert_eq!(stream.current_coordinates().unwrap(), GridCell::new(1, 0));

    let (cell, pixels, _) = stream.next_located().unwrap().unwrap();
    assert_eq!(cell, GridCell::new(1, 0));
    assert_eq!(pixels[[0, 0, 0]], 1);
    assert_eq!(stream.remaining(), 1);
}

#[test]
fn test_failed_decode_rewinds_whole_batch() {
    let collection = MockCollection::new()
        .with_image("a", 2, 2)
        .with_decode_failure("a", 2);
    let mut stream = open_pair(&collection, "a", &PatchConfig::new(1, 1)).unwrap();

    assert!(matches!(
        stream.next_batch(4),
        Err(StreamError::Source(SourceError::Decode { .. }))
    ));
    assert_eq!(stream.current_coordinates().unwrap(), GridCell::new(0, 0));

    let batch = stream.next_batch(4).unwrap().unwrap();
    assert_eq!(batch.len(), 4);
    let cells: Vec<_> = batch.locations.iter().map(|location| location.cell).collect();
    assert_eq!(
        cells,
        vec![
            Some(GridCell::new(0, 0)),
            Some(GridCell::new(0, 1)),
            Some(GridCell::new(1, 0)),
            Some(GridCell::new(1, 1)),
        ]
    );
}

#[test]
fn test_failed_batch_keeps_dataset_position() {
    let collection = MockCollection::new()
        .with_image("a", 2, 2)
        .with_decode_failure("a", 2);
    let mut images = ImageSetIterator::new(&collection, PatchConfig::new(1, 1));

    assert!(images.next_batch(4).is_err());
    let position = images.position().unwrap().unwrap();
    assert_eq!(position.image, "a");
    assert_eq!(position.cell, GridCell::new(0, 0));

    assert_eq!(images.next_batch(4).unwrap().unwrap().len(), 4);
}

#[test]
fn test_batch_locations() {
    let collection = MockCollection::new().with_image("a", 6, 4);
    let config = PatchConfig::new(2, 2).with_label_kind(LabelKind::Pixel);
    let mut stream = open_pair(&collection, "a", &config).unwrap();

    let batch = stream.next_batch(4).unwrap().unwrap();
    assert_eq!(batch.len(), 4);
    assert_eq!(batch.pixels.dim(), (4, 2, 2, 3));
    assert_eq!(batch.labels.as_masks().unwrap().dim(), (4, 2, 2));
    assert_eq!(batch.locations[3].cell, Some(GridCell::new(1, 0)));
    assert_eq!(batch.locations[3].origin.top, 2);
    assert_eq!(batch.locations[3].origin.left, 0);

    let rest = stream.next_batch(4).unwrap().unwrap();
    assert_eq!(rest.len(), 2);
    assert!(stream.next_batch(4).unwrap().is_none());
}

#[test]
fn test_cached_source_decodes_once_per_window() {
    let collection = MockCollection::new().with_image("a", 2, 2);
    let pixels = CachedPixelSource::new(collection.open_pixels("a").unwrap());
    let labels = collection.open_labels("a").unwrap();
    let mut stream = PairedPatchStream::open("a", pixels, labels, &PatchConfig::new(1, 1)).unwrap();

    let first: Vec<_> = stream.by_ref().map(Result::unwrap).collect();
    stream.reset();
    let second: Vec<_> = stream.by_ref().map(Result::unwrap).collect();

    assert_eq!(first, second);
    assert_eq!(collection.tracker().decodes(), 4);
    assert_eq!(stream.pixel_source().hits(), 4);
    assert_eq!(stream.pixel_source().misses(), 4);

    stream.close().unwrap();
    assert!(!stream.pixel_source().is_open());
    assert_eq!(collection.tracker().closes(), 1);
}
