//! WSI Patches - patch extraction for Whole Slide Images.
//!
//! This binary inspects, iterates, exports and splits manifest datasets.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use ndarray::{s, Axis};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_patches::{
    config::{Cli, Command, DatasetArgs, ExportConfig, IterateConfig, SplitConfig},
    dataset::{ImageCollection, ImageSetIterator, Manifest, ManifestDataset, SplitRatios},
    stream::{LabelBatch, PairedPatchStream},
    PatchConfig, PatchEncoder,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Inspect(args) => run_inspect(args),
        Command::Iterate(config) => run_iterate(config),
        Command::Export(config) => run_export(config),
        Command::Split(config) => run_split(config),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_patches=debug"
    } else {
        "wsi_patches=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open the manifest and validate patch options shared by dataset commands.
fn open_dataset(args: &DatasetArgs) -> Result<(ManifestDataset, PatchConfig), String> {
    let config = args.patch.to_patch_config();
    config.validate()?;

    let dataset = ManifestDataset::open(&args.manifest).map_err(|e| e.to_string())?;
    let dataset = match &args.partition {
        Some(partition) => dataset
            .with_partition(partition)
            .map_err(|e| e.to_string())?,
        None => dataset,
    };

    info!("Configuration:");
    info!("  Manifest: {}", args.manifest.display());
    if let Some(ref partition) = args.partition {
        info!("  Partition: {}", partition);
    }
    info!(
        "  Patch: {}px, stride {}px, {} edge, {} labels",
        config.size, config.stride, config.edge_policy, config.label_kind
    );

    Ok((dataset, config))
}

// =============================================================================
// Inspect Command
// =============================================================================

fn run_inspect(args: DatasetArgs) -> ExitCode {
    let (dataset, config) = match open_dataset(&args) {
        Ok(opened) => opened,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut total = 0u64;
    let mut failed = 0usize;

    for name in dataset.identifiers() {
        let opened = dataset
            .open_labels(&name)
            .and_then(|labels| Ok((dataset.open_pixels(&name)?, labels)))
            .map_err(|e| e.to_string())
            .and_then(|(pixels, labels)| {
                PairedPatchStream::open(name.clone(), pixels, labels, &config)
                    .map_err(|e| e.to_string())
            });

        match opened {
            Ok(mut stream) => {
                let grid = *stream.grid();
                println!(
                    "{}: {}x{} -> {} rows x {} columns = {} patches",
                    name,
                    grid.width(),
                    grid.height(),
                    grid.rows(),
                    grid.columns(),
                    grid.len()
                );
                total += grid.len();
                if let Err(e) = stream.close() {
                    warn!("Failed to release {}: {}", name, e);
                }
            }
            Err(e) => {
                error!("{}: {}", name, e);
                failed += 1;
            }
        }
    }

    println!("Total: {} patches", total);

    if failed > 0 {
        error!("{} image(s) could not be opened", failed);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

// =============================================================================
// Iterate Command
// =============================================================================

fn run_iterate(config: IterateConfig) -> ExitCode {
    let (dataset, patch) = match open_dataset(&config.dataset) {
        Ok(opened) => opened,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut images = ImageSetIterator::new(&dataset, patch);
    let mut batches = 0usize;
    let mut patches = 0usize;
    let mut positive = 0.0f64;

    while config.max_batches.map_or(true, |max| batches < max) {
        match images.next_configured_batch() {
            Ok(Some(batch)) => {
                batches += 1;
                patches += batch.len();
                positive += f64::from(batch.positive_fraction()) * batch.len() as f64;
            }
            Ok(None) => break,
            Err(e) => {
                error!("Iteration failed: {}", e);
                if let Ok(Some(position)) = images.position() {
                    error!(
                        "  Stopped at image {} cell {}",
                        position.image, position.cell
                    );
                }
                return ExitCode::FAILURE;
            }
        }
    }

    if let Err(e) = images.close() {
        warn!("Failed to release image: {}", e);
    }

    let positive = if patches == 0 {
        0.0
    } else {
        positive / patches as f64
    };
    println!(
        "{} batches, {} patches from {} image(s), positive fraction {:.3}",
        batches,
        patches,
        images.images_opened(),
        positive
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Export Command
// =============================================================================

fn run_export(config: ExportConfig) -> ExitCode {
    let (dataset, patch) = match open_dataset(&config.dataset) {
        Ok(opened) => opened,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = fs::create_dir_all(&config.output) {
        error!(
            "Failed to create output directory {}: {}",
            config.output.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let mut images = ImageSetIterator::new(&dataset, patch);
    match export_pairs(&mut images, &config.output, config.limit) {
        Ok(written) => {
            info!(
                "Exported {} patch pair(s) to {}",
                written,
                config.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Export failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Write every pair as `<image>_r<row>_c<column>.png`, with either a
/// `_mask.png` next to it or one entry in `labels.json` for scalar labels.
fn export_pairs<C: ImageCollection>(
    images: &mut ImageSetIterator<C>,
    output: &Path,
    limit: Option<usize>,
) -> Result<usize, String> {
    let encoder = PatchEncoder::new();
    let mut classes = serde_json::Map::new();
    let mut written = 0usize;

    loop {
        // never decode past the limit
        let batch_size = match limit {
            Some(limit) if written >= limit => break,
            Some(limit) => images.config().batch_size.min(limit - written),
            None => images.config().batch_size,
        };
        let Some(batch) = images.next_batch(batch_size).map_err(|e| e.to_string())? else {
            break;
        };

        for (index, location) in batch.locations.iter().enumerate() {
            let stem = match location.cell {
                Some(cell) => format!("{}_r{}_c{}", location.image, cell.row, cell.column),
                None => format!(
                    "{}_y{}_x{}",
                    location.image, location.origin.top, location.origin.left
                ),
            };

            let pixels = batch.pixels.index_axis(Axis(0), index).to_owned();
            let png = encoder.encode_pixels(&pixels).map_err(|e| e.to_string())?;
            write_file(&output.join(format!("{}.png", stem)), &png)?;

            match &batch.labels {
                LabelBatch::Masks(masks) => {
                    let mask = masks.slice(s![index, .., ..]).to_owned();
                    let png = encoder.encode_mask(&mask).map_err(|e| e.to_string())?;
                    write_file(&output.join(format!("{}_mask.png", stem)), &png)?;
                }
                LabelBatch::Classes(values) => {
                    classes.insert(stem, serde_json::json!(values[index]));
                }
            }
            written += 1;
        }
    }

    images.close().map_err(|e| e.to_string())?;

    if !classes.is_empty() {
        let json = serde_json::to_string_pretty(&classes).map_err(|e| e.to_string())?;
        write_file(&output.join("labels.json"), json.as_bytes())?;
    }
    Ok(written)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), String> {
    fs::write(path, contents).map_err(|e| format!("{}: {}", path.display(), e))
}

// =============================================================================
// Split Command
// =============================================================================

fn run_split(config: SplitConfig) -> ExitCode {
    let mut manifest = match Manifest::load(&config.manifest) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!("Failed to load manifest: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let ratios = SplitRatios {
        train: config.train,
        validation: config.validation,
    };
    if let Err(e) = manifest.split(ratios, config.seed) {
        error!("Split failed: {}", e);
        return ExitCode::FAILURE;
    }

    let output = config.output.as_ref().unwrap_or(&config.manifest);
    if let Err(e) = manifest.save(output) {
        error!("Failed to write manifest: {}", e);
        return ExitCode::FAILURE;
    }

    for (partition, names) in &manifest.partitions {
        println!("{}: {} image(s)", partition, names.len());
    }
    info!("Wrote {}", output.display());
    ExitCode::SUCCESS
}
