//! Dataset iteration integration tests.
//!
//! Tests verify:
//! - Image boundaries are crossed transparently, one open handle at a time
//! - Open failures and decode failures surface to the caller
//! - Positions can be saved and resumed
//! - Manifest datasets on disk stream real PNG files
//! - Partitions and random sampling over a manifest

use wsi_patches::dataset::{TEST_PARTITION, TRAIN_PARTITION, VALIDATION_PARTITION};
use wsi_patches::{
    DatasetPosition, GridCell, ImageSetIterator, LabelKind, Manifest, ManifestDataset,
    PatchConfig, RandomPatchSampler, SourceError, SplitRatios, StreamError,
};

use super::test_utils::{temp_dir, write_fixture_dataset, MockCollection};

// =============================================================================
// Image Set Iteration
// =============================================================================

#[test]
fn test_two_images_yield_all_pairs() {
    // 2x2 and 3x2 images with unit patches: 4 + 6 pairs
    let collection = MockCollection::new()
        .with_image("a", 2, 2)
        .with_image("b", 3, 2);
    let mut images = ImageSetIterator::new(&collection, PatchConfig::new(1, 1));

    let mut sources = Vec::new();
    while let Some((pixels, _)) = images.next_pair().unwrap() {
        sources.push(pixels[[0, 0, 2]]);
    }

    assert_eq!(sources.len(), 10);
    assert_eq!(sources.iter().filter(|index| **index == 0).count(), 4);
    assert_eq!(sources.iter().filter(|index| **index == 1).count(), 6);

    let tracker = collection.tracker();
    assert_eq!(tracker.max_open(), 1);
    assert_eq!(tracker.open_now(), 0);
    assert_eq!(
        tracker.events(),
        vec!["open a", "close a", "open b", "close b"]
    );
}

#[test]
fn test_iterator_adapter() {
    let collection = MockCollection::new()
        .with_image("a", 4, 4)
        .with_image("b", 4, 4);
    let config = PatchConfig::new(2, 2).with_label_kind(LabelKind::ClassAverage);

    let labels: Vec<f32> = ImageSetIterator::new(&collection, config)
        .map(|pair| pair.unwrap().1.as_class().unwrap())
        .collect();
    assert_eq!(labels, vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
}

#[test]
fn test_batches_never_span_images() {
    let collection = MockCollection::new()
        .with_image("a", 3, 1)
        .with_image("b", 4, 1);
    let mut images = ImageSetIterator::new(&collection, PatchConfig::new(1, 1).with_batch_size(2));

    let mut shapes = Vec::new();
    while let Some(batch) = images.next_configured_batch().unwrap() {
        let image = batch.locations[0].image.clone();
        assert!(batch.locations.iter().all(|location| location.image == image));
        shapes.push((image, batch.len()));
    }

    assert_eq!(
        shapes,
        vec![
            ("a".to_string(), 2),
            ("a".to_string(), 1),
            ("b".to_string(), 2),
            ("b".to_string(), 2),
        ]
    );
}

#[test]
fn test_unopenable_image_is_reported() {
    let collection = MockCollection::new()
        .with_image("a", 1, 1)
        .with_image("b", 1, 1)
        .with_unopenable("b");
    let mut images = ImageSetIterator::new(&collection, PatchConfig::new(1, 1));

    assert!(images.next_pair().unwrap().is_some());
    assert!(matches!(
        images.next_pair(),
        Err(StreamError::Source(SourceError::Open { .. }))
    ));
    assert_eq!(collection.tracker().open_now(), 0);
}

#[test]
fn test_decode_failure_then_continue() {
    let collection = MockCollection::new()
        .with_image("a", 2, 1)
        .with_decode_failure("a", 1);
    let mut images = ImageSetIterator::new(&collection, PatchConfig::new(1, 1));

    assert!(images.next_pair().unwrap().is_some());
    assert!(images.next_pair().is_err());

    let (pixels, _) = images.next_pair().unwrap().unwrap();
    assert_eq!(pixels[[0, 0, 1]], 1);
    assert!(images.next_pair().unwrap().is_none());
}

#[test]
fn test_resume_from_saved_position() {
    let collection = MockCollection::new()
        .with_image("a", 3, 3)
        .with_image("b", 3, 3);
    let config = PatchConfig::new(1, 1);

    let mut images = ImageSetIterator::new(&collection, config);
    for _ in 0..11 {
        images.next_pair().unwrap();
    }
    let position = images.position().unwrap().unwrap();
    assert_eq!(
        position,
        DatasetPosition {
            image_index: 1,
            image: "b".to_string(),
            cell: GridCell::new(0, 2),
        }
    );
    let expected: Vec<_> = images.by_ref().map(Result::unwrap).collect();
    drop(images);

    // positions survive a round trip through JSON
    let saved = serde_json::to_string(&position).unwrap();
    let restored: DatasetPosition = serde_json::from_str(&saved).unwrap();

    let mut resumed = ImageSetIterator::new(&collection, config);
    resumed.resume(&restored).unwrap();
    let replayed: Vec<_> = resumed.by_ref().map(Result::unwrap).collect();

    assert_eq!(replayed.len(), 7);
    assert_eq!(replayed, expected);
}

// =============================================================================
// Manifest Datasets
// =============================================================================

#[test]
fn test_manifest_dataset_streams_png_files() {
    let dir = temp_dir("manifest-stream");
    let manifest = write_fixture_dataset(&dir, &[("left", 8, 4), ("right", 4, 4)]);

    let dataset = ManifestDataset::open(&manifest).unwrap();
    let config = PatchConfig::new(4, 4).with_label_kind(LabelKind::Pixel);
    let mut images = ImageSetIterator::new(&dataset, config);

    let batch = images.next_batch(8).unwrap().unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.locations[1].image, "left");
    assert_eq!(batch.locations[1].origin.left, 4);

    // green channel holds the column, blue is constant
    assert_eq!(batch.pixels[[1, 0, 3, 1]], 7);
    assert_eq!(batch.pixels[[1, 0, 3, 2]], 7);

    let masks = batch.labels.as_masks().unwrap();
    assert_eq!(masks[[0, 0, 0]], 1.0);
    assert_eq!(masks[[1, 0, 0]], 0.0);

    let batch = images.next_batch(8).unwrap().unwrap();
    assert_eq!(batch.locations[0].image, "right");
    assert!(images.next_batch(8).unwrap().is_none());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_file_reports_not_found() {
    let dir = temp_dir("manifest-missing");
    let manifest = write_fixture_dataset(&dir, &[("present", 4, 4), ("gone", 4, 4)]);
    std::fs::remove_file(dir.join("gone.png")).unwrap();

    let dataset = ManifestDataset::open(&manifest).unwrap();
    let mut images = ImageSetIterator::new(&dataset, PatchConfig::new(4, 4));
    assert!(images.next_pair().unwrap().is_some());
    assert!(matches!(
        images.next_pair(),
        Err(StreamError::Source(SourceError::NotFound(_)))
    ));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_split_then_iterate_partition() {
    let dir = temp_dir("manifest-split");
    let names: Vec<String> = (0..10).map(|i| format!("img{}", i)).collect();
    let specs: Vec<(&str, u32, u32)> = names.iter().map(|name| (name.as_str(), 2, 2)).collect();
    let path = write_fixture_dataset(&dir, &specs);

    let mut manifest = Manifest::load(&path).unwrap();
    manifest.split(SplitRatios::default(), 42).unwrap();
    manifest.save(&path).unwrap();

    let dataset = ManifestDataset::open(&path).unwrap();
    assert_eq!(dataset.manifest().partition(TRAIN_PARTITION).unwrap().len(), 7);
    assert_eq!(dataset.manifest().partition(VALIDATION_PARTITION).unwrap().len(), 1);
    assert_eq!(dataset.manifest().partition(TEST_PARTITION).unwrap().len(), 2);

    let train = dataset.with_partition(TRAIN_PARTITION).unwrap();
    let pairs = ImageSetIterator::new(&train, PatchConfig::new(2, 2)).count();
    assert_eq!(pairs, 7);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_sampler_over_manifest() {
    let dir = temp_dir("manifest-sampler");
    let path = write_fixture_dataset(&dir, &[("a", 16, 8), ("b", 8, 16)]);
    let dataset = ManifestDataset::open(&path).unwrap();

    let mut sampler = RandomPatchSampler::new(&dataset, PatchConfig::new(4, 4), 11);
    let batch = sampler.sample_batch(6).unwrap();
    assert_eq!(batch.len(), 6);
    for (index, location) in batch.locations.iter().enumerate() {
        assert!(location.cell.is_none());
        assert_eq!(
            u32::from(batch.pixels[[index, 0, 0, 0]]),
            location.origin.top
        );
    }

    let _ = std::fs::remove_dir_all(&dir);
}
