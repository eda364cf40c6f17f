//! Chip-by-chip superpixel processing of large images.
//!
//! [`ChipPipeline`] tiles a frame with [`Chipping`], segments every chip with a backend that
//! exposes labels, runs a [`FeatureExtractor`] over the chip and reports one
//! [`SuperpixelRecord`] per non-empty superpixel.

use crate::arrays::{FrameView, LabelMap, Rect, Size};
use crate::chipping::Chipping;
use crate::common::Error;
use crate::region::RegionMoments;
use crate::superpixel::{Superpixel, SuperpixelLabels};
use std::fmt;
use tracing::{debug, info};

/// Per-superpixel feature vectors of one chip.
pub trait FeatureExtractor {
    /// Length of every feature vector.
    fn feature_dim(&self) -> usize;

    /// Computes the features of every superpixel of `rgb` as given by `labels`.
    fn compute(&mut self, rgb: FrameView<'_>, labels: &LabelMap) -> Result<(), Error>;

    /// Number of superpixels known since the last `compute()`.
    fn num_superpixels(&self) -> u32;

    /// Writes the features of superpixel `id` into `output` (`feature_dim()` long).
    ///
    /// Panics when `id >= num_superpixels()`.
    fn get_feature(&self, id: u32, output: &mut [f32]);
}

/// Mean R, G, B of every superpixel, scaled to `[0, 1]`.
#[derive(Debug, Default)]
pub struct MeanColorFeatures {
    sums: Vec<[u64; 3]>,
    counts: Vec<u64>,
}

impl FeatureExtractor for MeanColorFeatures {
    fn feature_dim(&self) -> usize {
        3
    }

    fn compute(&mut self, rgb: FrameView<'_>, labels: &LabelMap) -> Result<(), Error> {
        if rgb.size() != labels.size() {
            return Err(Error::FeatureExtraction(format!(
                "label map {} does not match the image {}",
                labels.size(),
                rgb.size()
            )));
        }
        let n = labels.data.iter().copied().max().unwrap_or(-1) + 1;
        if labels.data.iter().any(|l| *l < 0) {
            return Err(Error::FeatureExtraction("negative label".into()));
        }
        self.sums.clear();
        self.sums.resize(n as usize, [0; 3]);
        self.counts.clear();
        self.counts.resize(n as usize, 0);
        for y in 0..rgb.height() {
            for (pixel, label) in rgb.get_row(y).chunks_exact(3).zip(labels.get_row(y)) {
                let sum = &mut self.sums[*label as usize];
                for (s, v) in sum.iter_mut().zip(pixel) {
                    *s += *v as u64;
                }
                self.counts[*label as usize] += 1;
            }
        }
        Ok(())
    }

    fn num_superpixels(&self) -> u32 {
        self.counts.len() as u32
    }

    fn get_feature(&self, id: u32, output: &mut [f32]) {
        let id = id as usize;
        assert!(
            id < self.counts.len(),
            "superpixel {id} is out of range, there are {}",
            self.counts.len()
        );
        let count = self.counts[id].max(1) as f32;
        for (out, sum) in output.iter_mut().zip(self.sums[id]) {
            *out = sum as f32 / count / 255.0;
        }
    }
}

/// One superpixel of one chip.
#[derive(Clone, Debug, PartialEq)]
pub struct SuperpixelRecord {
    pub chip_id: usize,
    pub roi: Rect,
    pub superpixel_id: u32,
    /// Pixel count.
    pub area: u64,
    /// Center of mass in the coordinates of the whole frame.
    pub centroid: (f64, f64),
    pub feature: Vec<f32>,
}

/// Totals of one `process()` pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    pub chips: usize,
    pub records: u64,
    /// Ids skipped for zero area or because the extractor did not know them.
    pub skipped: u64,
}

type BackendFactory<S> = Box<dyn FnMut(Size) -> Result<S, Error>>;

/// Chipping, segmentation and feature extraction over whole frames.
///
/// The backend is created on first use for the chip size and re-created whenever the chip
/// size changes (a frame smaller than a chip yields smaller chips).
pub struct ChipPipeline<S, F> {
    chip_size: Size,
    overlap: f32,
    factory: BackendFactory<S>,
    backend: Option<(Size, S)>,
    extractor: F,
    labels: LabelMap,
}

impl<S, F> ChipPipeline<S, F>
where
    S: Superpixel + SuperpixelLabels,
    F: FeatureExtractor,
{
    pub fn new<B>(chip_size: Size, overlap: f32, factory: B, extractor: F) -> Result<Self, Error>
    where
        B: FnMut(Size) -> Result<S, Error> + 'static,
    {
        // same checks as a real tiling, on a frame the size of one chip
        Chipping::new(chip_size, chip_size, overlap)?;
        Ok(Self {
            chip_size,
            overlap,
            factory: Box::new(factory),
            backend: None,
            extractor,
            labels: LabelMap::empty(),
        })
    }

    /// Tiling this pipeline uses for a frame of `size`.
    pub fn chipping(&self, size: Size) -> Result<Chipping, Error> {
        Chipping::new(size, self.chip_size, self.overlap)
    }

    pub fn extractor(&self) -> &F {
        &self.extractor
    }

    /// Sum of the superpixel counts of every chip of `frame`.
    pub fn estimate_superpixels(&mut self, frame: FrameView<'_>) -> Result<u64, Error> {
        let chipping = self.chipping(frame.size())?;
        let mut total = 0u64;
        for (_, roi) in chipping.iter() {
            total += backend_for(&mut self.backend, &mut self.factory, roi.size())?
                .compute(frame.roi(roi))
                .num_superpixels() as u64;
        }
        info!(chips = chipping.nchip(), superpixels = total, "estimated number of superpixels");
        Ok(total)
    }

    /// Processes every chip of `frame` (BGR) and passes each non-empty superpixel to `sink`.
    pub fn process<K>(&mut self, frame: FrameView<'_>, mut sink: K) -> Result<PassStats, Error>
    where
        K: FnMut(&SuperpixelRecord),
    {
        let chipping = self.chipping(frame.size())?;
        let mut stats = PassStats::default();
        let mut record = SuperpixelRecord {
            chip_id: 0,
            roi: Rect::default(),
            superpixel_id: 0,
            area: 0,
            centroid: (0.0, 0.0),
            feature: vec![0.0; self.extractor.feature_dim()],
        };
        for (chip_id, roi) in chipping.iter() {
            let chip = frame.roi(roi);
            let backend = backend_for(&mut self.backend, &mut self.factory, roi.size())?;
            let n = backend.compute(chip).num_superpixels();
            backend.get_labels(&mut self.labels);

            let rgb = chip.to_swapped_rb();
            self.extractor.compute(rgb.view(), &self.labels)?;
            let known = self.extractor.num_superpixels();

            let moments = RegionMoments::all(&self.labels, n);
            for (id, moment) in moments.iter().enumerate() {
                let id = id as u32;
                let centroid = match moment.centroid() {
                    Some(centroid) if id < known => centroid,
                    _ => {
                        stats.skipped += 1;
                        continue;
                    }
                };
                self.extractor.get_feature(id, &mut record.feature);
                record.chip_id = chip_id;
                record.roi = roi;
                record.superpixel_id = id;
                record.area = moment.area();
                record.centroid = (centroid.0 + roi.x as f64, centroid.1 + roi.y as f64);
                sink(&record);
                stats.records += 1;
            }
            stats.chips += 1;
            debug!(chip_id, %roi, superpixels = n, "chip processed");
        }
        info!(
            chips = stats.chips,
            records = stats.records,
            skipped = stats.skipped,
            "pipeline pass done"
        );
        Ok(stats)
    }
}

/// Backend in `slot` when it was made for `size`, a fresh one from `factory` otherwise.
fn backend_for<'a, S>(
    slot: &'a mut Option<(Size, S)>,
    factory: &mut BackendFactory<S>,
    size: Size,
) -> Result<&'a mut S, Error> {
    let current = slot.as_ref().map(|(backend_size, _)| *backend_size);
    if current != Some(size) {
        debug!(%size, previous = ?current, "creating segmentation backend");
        // release the old buffers before allocating new ones
        *slot = None;
        let backend = factory(size)?;
        return Ok(&mut slot.insert((size, backend)).1);
    }
    match slot.as_mut() {
        Some((_, backend)) => Ok(backend),
        None => unreachable!("backend slot was checked above"),
    }
}

impl<S, F: fmt::Debug> fmt::Debug for ChipPipeline<S, F> {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("ChipPipeline")
            .field("chip_size", &self.chip_size)
            .field("overlap", &self.overlap)
            .field("backend_size", &self.backend.as_ref().map(|(size, _)| *size))
            .field("extractor", &self.extractor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::{Frame, Mask};
    use crate::common::SlicConfig;
    use crate::superpixel::SlicSuperpixel;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Labels every chip as two vertical halves.
    struct Halves;

    impl Superpixel for Halves {
        type Contour = Mask;

        fn compute(&mut self, _frame: FrameView<'_>) -> &mut Self {
            self
        }

        fn get_contour(&mut self, _output: &mut Mask) {}
    }

    impl SuperpixelLabels for Halves {
        fn get_labels(&self, output: &mut LabelMap) {
            let (width, height) = (4, 4);
            output.reset(width, height, 0);
            for y in 0..height {
                for x in width / 2..width {
                    output[(x, y)] = 1;
                }
            }
        }

        fn num_superpixels(&self) -> u32 {
            // one id more than the map holds, it has zero area
            3
        }
    }

    #[test]
    fn records_have_absolute_centroids() {
        let frame = Frame::from_fn(8, 4, |x, _| if x % 4 < 2 { [255, 0, 0] } else { [0, 0, 255] })
            .unwrap();
        let mut pipeline =
            ChipPipeline::new(Size::new(4, 4), 0.0, |_| Ok(Halves), MeanColorFeatures::default())
                .unwrap();
        let mut records = vec![];
        let stats = pipeline
            .process(frame.view(), |record| records.push(record.clone()))
            .unwrap();
        assert_eq!(stats, PassStats { chips: 2, records: 4, skipped: 2 });
        assert_eq!(records[0].centroid, (0.5, 1.5));
        assert_eq!(records[3].centroid, (6.5, 1.5));
        assert_eq!(records[3].roi, Rect::new(4, 0, 4, 4));
        assert_eq!(records[3].area, 8);
        // BGR blue on the left, so the extractor sees RGB blue there
        assert_eq!(records[0].feature, vec![0.0, 0.0, 1.0]);
        assert_eq!(records[1].feature, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn backend_is_recreated_on_chip_size_change() {
        let created = Rc::new(RefCell::new(vec![]));
        let log = created.clone();
        let mut pipeline = ChipPipeline::new(
            Size::new(32, 32),
            0.5,
            move |size| {
                log.borrow_mut().push(size);
                SlicSuperpixel::new(SlicConfig {
                    superpixel_size: 8,
                    ..SlicConfig::default()
                })
            },
            MeanColorFeatures::default(),
        )
        .unwrap();
        let big = Frame::from_fn(64, 48, |x, y| [(x * 4) as u8, (y * 5) as u8, 80]).unwrap();
        let small = Frame::from_pixel(20, 40, [10, 20, 30]).unwrap();
        assert!(pipeline.estimate_superpixels(big.view()).unwrap() >= 6);
        pipeline.process(big.view(), |_| {}).unwrap();
        pipeline.process(small.view(), |_| {}).unwrap();
        assert_eq!(
            *created.borrow(),
            vec![Size::new(32, 32), Size::new(20, 32)]
        );
    }

    #[test]
    fn factory_errors_are_returned() {
        let mut pipeline = ChipPipeline::new(
            Size::new(16, 16),
            0.5,
            |_| {
                SlicSuperpixel::new(SlicConfig {
                    superpixel_size: 0,
                    ..SlicConfig::default()
                })
            },
            MeanColorFeatures::default(),
        )
        .unwrap();
        let frame = Frame::new(16, 16).unwrap();
        assert!(matches!(
            pipeline.process(frame.view(), |_| {}),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let result =
            ChipPipeline::new(Size::new(16, 16), 1.5, |_| Ok(Halves), MeanColorFeatures::default());
        assert!(result.is_err());
    }

    #[test]
    fn mean_color_rejects_mismatched_labels() {
        let frame = Frame::new(4, 4).unwrap();
        let labels = LabelMap::from_fill(0, 3, 4);
        let mut features = MeanColorFeatures::default();
        assert!(matches!(
            features.compute(frame.view(), &labels),
            Err(Error::FeatureExtraction(_))
        ));
    }
}
