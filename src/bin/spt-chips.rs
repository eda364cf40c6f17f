use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;
use superpixel_chips::arrays::{Frame, Mask, Size};
use superpixel_chips::chipping::Chipping;
use superpixel_chips::common::{RealtimeSettings, SlicConfig};
use superpixel_chips::pipeline::{ChipPipeline, MeanColorFeatures};
use superpixel_chips::realtime::RealtimeSlic;
use superpixel_chips::superpixel::{SlicSuperpixel, Superpixel};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Iterative SLIC, labels and features per superpixel
    Slic,
    /// Fixed-size real-time engine, contours only
    Realtime,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image to process
    image: PathBuf,

    /// Chip width
    #[arg(long, default_value_t = 256)]
    chip_width: usize,

    /// Chip height
    #[arg(long, default_value_t = 256)]
    chip_height: usize,

    /// Fraction of a chip shared with its neighbour
    #[arg(long, default_value_t = 0.5)]
    overlap: f32,

    /// Nominal superpixel edge length in pixels
    #[arg(long, default_value_t = 32)]
    superpixel_size: u16,

    #[arg(long, value_enum, default_value_t = Backend::Slic)]
    backend: Backend,

    /// Write the image with superpixel boundaries drawn over it
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let frame = load_bgr(&args.image)?;
    let chip_size = Size::new(args.chip_width, args.chip_height);
    let chipping = Chipping::new(frame.size(), chip_size, args.overlap)
        .context("Invalid chipping parameters")?;
    tracing::info!(
        "{}: {} in {} chips of {} ({}x{})",
        args.image.display(),
        frame.size(),
        chipping.nchip(),
        chip_size,
        chipping.nx(),
        chipping.ny()
    );

    let overlay = match args.backend {
        Backend::Slic => run_slic(&args, &frame)?,
        Backend::Realtime => run_realtime(&args, &frame, &chipping)?,
    };

    if let Some(path) = &args.overlay {
        save_rgb(&overlay, path)?;
        tracing::info!("Overlay written to {}", path.display());
    }
    Ok(())
}

fn slic_config(args: &Args) -> SlicConfig {
    SlicConfig {
        superpixel_size: args.superpixel_size,
        ..SlicConfig::default()
    }
}

fn run_slic(args: &Args, frame: &Frame) -> Result<Frame> {
    let config = slic_config(args);
    let factory_config = config.clone();
    let mut pipeline = ChipPipeline::new(
        Size::new(args.chip_width, args.chip_height),
        args.overlap,
        move |_| SlicSuperpixel::new(factory_config.clone()),
        MeanColorFeatures::default(),
    )?;

    let start = Instant::now();
    let estimate = pipeline.estimate_superpixels(frame.view())?;
    tracing::info!("Estimated number of superpixels: {estimate}");

    let mut area_sum = 0u64;
    let stats = pipeline.process(frame.view(), |record| {
        area_sum += record.area;
        tracing::debug!(
            chip = record.chip_id,
            superpixel = record.superpixel_id,
            area = record.area,
            "centroid ({:.1}, {:.1}) feature {:?}",
            record.centroid.0,
            record.centroid.1,
            record.feature
        );
    })?;
    tracing::info!(
        "{} superpixels in {} chips ({} skipped), mean area {:.1} px, {:.2?}",
        stats.records,
        stats.chips,
        stats.skipped,
        area_sum as f64 / stats.records.max(1) as f64,
        start.elapsed()
    );

    // boundaries of the whole chips, drawn chip by chip
    let chipping = pipeline.chipping(frame.size())?;
    let mut slic = SlicSuperpixel::new(config)?;
    let mut overlay = frame.view().to_swapped_rb();
    let mut mask = Mask::empty();
    for (_, roi) in chipping.iter() {
        slic.compute(frame.roi(roi)).get_contour(&mut mask);
        for y in 0..roi.height {
            let row = &mut overlay.get_row_mut(roi.y + y)[roi.x * 3..roi.right() * 3];
            for (pixel, m) in row.chunks_exact_mut(3).zip(mask.get_row(y)) {
                if *m != 0 {
                    pixel.copy_from_slice(&[255, 0, 0]);
                }
            }
        }
    }
    Ok(overlay)
}

fn run_realtime(args: &Args, frame: &Frame, chipping: &Chipping) -> Result<Frame> {
    // every chip has the size of the first one
    let image_size = chipping.roi(0).size();
    let mut backend = RealtimeSlic::new(RealtimeSettings {
        image_size,
        superpixel_size: args.superpixel_size,
        ..RealtimeSettings::default()
    })
    .context("Failed to create the real-time backend")?;

    let start = Instant::now();
    let mut overlay = frame.view().to_swapped_rb();
    let mut contour = Frame::empty();
    for (_, roi) in chipping.iter() {
        backend.compute(frame.roi(roi)).get_contour(&mut contour);
        for y in 0..roi.height {
            overlay.get_row_mut(roi.y + y)[roi.x * 3..roi.right() * 3]
                .copy_from_slice(contour.get_row(y));
        }
    }
    tracing::info!(
        "{} chips segmented in {:.2?}, labels are not available from this backend",
        chipping.nchip(),
        start.elapsed()
    );
    Ok(overlay)
}

fn load_bgr(path: &Path) -> Result<Frame> {
    let rgb = image::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let frame = Frame::from_raw(rgb.as_raw(), width, height)?;
    Ok(frame.view().to_swapped_rb())
}

fn save_rgb(frame: &Frame, path: &Path) -> Result<()> {
    let image = image::RgbImage::from_raw(
        frame.width() as u32,
        frame.height() as u32,
        frame.as_raw().to_vec(),
    )
    .ok_or_else(|| anyhow!("Overlay buffer does not match its size"))?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}
