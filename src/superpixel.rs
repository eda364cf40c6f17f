//! The superpixel engine contract and the CPU SLIC backend.
//!
//! Every backend can segment a frame and draw its contours ([`Superpixel`]). Only some of them
//! can hand out the per-pixel labels and the number of segments ([`SuperpixelLabels`]). Code
//! that needs labels should bound on `SuperpixelLabels`; code that only holds a `Superpixel`
//! can ask at runtime through [`Superpixel::labels()`].

use crate::arrays::{Array2D, FrameView, LabelMap, Mask, PaddedImage};
use crate::common::{ColorSpace, Error, SlicConfig};
use crate::conectivity::enforce_connectivity;
use crate::slic::{iterate, Clusters, SlicParams};
use tracing::debug;

/// Value of contour pixels in a `Mask`.
pub const CONTOUR: u8 = 255;

/// What a backend can produce after `compute()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub contour: bool,
    pub labels: bool,
}

/// Base capability of every segmentation backend.
pub trait Superpixel {
    /// Output of `get_contour()`.
    type Contour;

    /// Segments `frame`, replacing the previous result.
    ///
    /// Panics when the frame is empty or has a size the backend was not set up for.
    fn compute(&mut self, frame: FrameView<'_>) -> &mut Self;

    /// Writes the segment boundaries of the last `compute()`. Panics before the first one.
    fn get_contour(&mut self, output: &mut Self::Contour);

    /// Label access, when the backend has it.
    fn labels(&self) -> Option<&dyn SuperpixelLabels> {
        None
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            contour: true,
            labels: self.labels().is_some(),
        }
    }
}

/// Per-pixel labels and segment count of the last `compute()`.
pub trait SuperpixelLabels {
    /// Writes a label map the size of the input, every value in `0..num_superpixels()`.
    fn get_labels(&self, output: &mut LabelMap);

    /// Number of distinct labels actually produced.
    fn num_superpixels(&self) -> u32;
}

/// Marks every pixel that has a 4-neighbour with a different label (both sides of a boundary).
pub fn label_contour_mask(labels: &LabelMap, output: &mut Mask) {
    let (width, height) = (labels.width, labels.height);
    output.reset(width, height, 0);
    for y in 0..height {
        let row = labels.get_row(y);
        for x in 0..width {
            let label = row[x];
            let differs = (x > 0 && row[x - 1] != label)
                || (x + 1 < width && row[x + 1] != label)
                || (y > 0 && labels[(x, y - 1)] != label)
                || (y + 1 < height && labels[(x, y + 1)] != label);
            if differs {
                output[(x, y)] = CONTOUR;
            }
        }
    }
}

struct Segmentation {
    labels: LabelMap,
    contour: Mask,
    num_superpixels: u32,
}

/// CPU SLIC backend.
///
/// Accepts any frame size: the seed grid is derived from the frame on every `compute()`, so
/// one instance can be reused across chips and images of different sizes.
pub struct SlicSuperpixel {
    config: SlicConfig,
    params: SlicParams,
    min_distances: Array2D<u16>,
    result: Option<Segmentation>,
}

impl SlicSuperpixel {
    pub fn new(config: SlicConfig) -> Result<Self, Error> {
        config.validate()?;
        debug!(
            superpixel_size = config.superpixel_size,
            ruler = config.ruler,
            num_iterations = config.num_iterations,
            min_size = config.min_size,
            "created SLIC backend"
        );
        Ok(Self {
            params: SlicParams::from(&config),
            config,
            min_distances: Array2D::empty(),
            result: None,
        })
    }

    pub fn config(&self) -> &SlicConfig {
        &self.config
    }

    fn result(&self) -> &Segmentation {
        self.result
            .as_ref()
            .unwrap_or_else(|| panic!("compute() must be called before reading the segmentation"))
    }
}

impl Superpixel for SlicSuperpixel {
    type Contour = Mask;

    fn compute(&mut self, frame: FrameView<'_>) -> &mut Self {
        assert!(
            !frame.size().is_empty(),
            "cannot segment an empty {} frame",
            frame.size()
        );
        let image = PaddedImage::from_bgr(frame, ColorSpace::CieLab);
        let mut clusters = Clusters::initialize_clusters(&image, self.params.search_region_size);
        iterate(&image, &self.params, &mut clusters, &mut self.min_distances);

        let mut segmentation = self.result.take().unwrap_or_else(|| Segmentation {
            labels: LabelMap::empty(),
            contour: Mask::empty(),
            num_superpixels: 0,
        });
        segmentation.num_superpixels = enforce_connectivity(
            &clusters.assignments,
            self.config.min_size,
            &mut segmentation.labels,
        );
        label_contour_mask(&segmentation.labels, &mut segmentation.contour);
        debug!(
            size = %frame.size(),
            seeds = clusters.clusters.len(),
            num_superpixels = segmentation.num_superpixels,
            "SLIC segmentation done"
        );
        self.result = Some(segmentation);
        self
    }

    fn get_contour(&mut self, output: &mut Mask) {
        output.clone_from(&self.result().contour);
    }

    fn labels(&self) -> Option<&dyn SuperpixelLabels> {
        Some(self)
    }
}

impl SuperpixelLabels for SlicSuperpixel {
    fn get_labels(&self, output: &mut LabelMap) {
        output.clone_from(&self.result().labels);
    }

    fn num_superpixels(&self) -> u32 {
        self.result().num_superpixels
    }
}
