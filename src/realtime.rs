//! Fixed-configuration real-time segmentation backend.
//!
//! The backend owns device images preallocated for exactly one frame size. A frame is first
//! staged (host BGR to the 4-channel device layout), then processed by a [`RealtimeEngine`]
//! which keeps its result on the device. The only result that comes back to the host is the
//! contour visualisation; labels and the segment count stay inside the engine.

use crate::arrays::{Array2D, Frame, FrameView, LabelMap, Mask, PaddedImage, Size};
use crate::common::{DistanceMetric, Error, RealtimeSettings, ThreadingStrategy};
use crate::conectivity::enforce_connectivity;
use crate::device::{DeviceImage, DEVICE_CHANNELS};
use crate::slic::{iterate, Clusters, SlicParams};
use crate::superpixel::{label_contour_mask, Superpixel};
use tracing::debug;

/// Maps the coherence weight onto the compactness of the SLIC distance.
const COHERENCE_TO_COMPACTNESS: f32 = 50.0;
/// Boundary color in device layout (B, G, R, A): red.
const BOUNDARY_COLOR: [u8; 4] = [0, 0, 255, 0];

/// Engine working on device-resident images.
pub trait RealtimeEngine {
    /// Segments `input`, keeping the result on the device.
    fn process_frame(&mut self, input: &DeviceImage);

    /// Writes the last processed frame with segment boundaries painted over it.
    fn draw_segmentation_result(&mut self, output: &mut DeviceImage);
}

/// Host-memory engine on top of the crate's SLIC core.
///
/// Every buffer is sized at construction for `RealtimeSettings::image_size` and reused for
/// every frame.
pub struct SlicEngine {
    settings: RealtimeSettings,
    params: SlicParams,
    min_size: u32,
    source: DeviceImage,
    image: PaddedImage,
    clusters: Clusters,
    min_distances: Array2D<u16>,
    segments: LabelMap,
    boundaries: Mask,
}

impl SlicEngine {
    pub fn new(settings: &RealtimeSettings) -> Result<Self, Error> {
        settings.validate()?;
        let size = settings.image_size;
        let step = settings.grid_step() as u32;
        let source = DeviceImage::new(size)?;
        let image = PaddedImage::new(size.width, size.height);
        let clusters = Clusters::initialize_clusters(&image, step);
        Ok(Self {
            params: SlicParams {
                search_region_size: step,
                compactness: settings.coherence_weight * COHERENCE_TO_COMPACTNESS,
                max_iterations: settings.num_iterations,
                subsample_stride: 1,
                distance_metric: DistanceMetric::RealDistManhattanColor,
                threading: ThreadingStrategy::RowBased,
            },
            min_size: step * step / 4,
            source,
            image,
            clusters,
            min_distances: Array2D::from_fill(u16::MAX, size.width, size.height),
            segments: LabelMap::from_fill(0, size.width, size.height),
            boundaries: Mask::from_fill(0, size.width, size.height),
            settings: settings.clone(),
        })
    }
}

impl RealtimeEngine for SlicEngine {
    fn process_frame(&mut self, input: &DeviceImage) {
        assert_eq!(input.size(), self.settings.image_size);
        self.source.host_data_mut().copy_from_slice(input.host_data());
        self.image
            .fill_from_bgra(input.host_data(), self.settings.color_space);
        self.clusters
            .reinitialize(&self.image, self.params.search_region_size);
        iterate(
            &self.image,
            &self.params,
            &mut self.clusters,
            &mut self.min_distances,
        );
        if self.settings.enforce_connectivity {
            enforce_connectivity(&self.clusters.assignments, self.min_size, &mut self.segments);
        } else {
            for (segment, assignment) in self
                .segments
                .data
                .iter_mut()
                .zip(self.clusters.assignments.data.iter())
            {
                *segment = *assignment as i32;
            }
        }
    }

    fn draw_segmentation_result(&mut self, output: &mut DeviceImage) {
        assert_eq!(output.size(), self.settings.image_size);
        label_contour_mask(&self.segments, &mut self.boundaries);
        output.host_data_mut().copy_from_slice(self.source.host_data());
        for (pixel, boundary) in output
            .host_data_mut()
            .chunks_exact_mut(DEVICE_CHANNELS)
            .zip(self.boundaries.data.iter())
        {
            if *boundary != 0 {
                pixel.copy_from_slice(&BOUNDARY_COLOR);
            }
        }
    }
}

/// Real-time backend. Settings, and with them the frame size, are fixed for its lifetime.
///
/// Implements only the base [`Superpixel`] capability: `labels()` is `None`.
pub struct RealtimeSlic<E: RealtimeEngine = SlicEngine> {
    settings: RealtimeSettings,
    in_img: DeviceImage,
    out_img: Option<DeviceImage>,
    engine: E,
    staged: bool,
    computed: bool,
}

impl RealtimeSlic<SlicEngine> {
    pub fn new(settings: RealtimeSettings) -> Result<Self, Error> {
        let engine = SlicEngine::new(&settings)?;
        Self::with_engine(settings, engine)
    }
}

impl<E: RealtimeEngine> RealtimeSlic<E> {
    pub fn with_engine(settings: RealtimeSettings, engine: E) -> Result<Self, Error> {
        settings.validate()?;
        let in_img = DeviceImage::new(settings.image_size)?;
        debug!(
            size = %settings.image_size,
            grid_step = settings.grid_step(),
            color_space = ?settings.color_space,
            "created real-time backend"
        );
        Ok(Self {
            settings,
            in_img,
            out_img: None,
            engine,
            staged: false,
            computed: false,
        })
    }

    pub fn settings(&self) -> &RealtimeSettings {
        &self.settings
    }

    pub fn image_size(&self) -> Size {
        self.settings.image_size
    }

    /// Copies `frame` (BGR) into the input device image.
    ///
    /// Panics when the frame size differs from the configured one. There is no resizing.
    pub fn stage(&mut self, frame: FrameView<'_>) -> &mut Self {
        assert_eq!(
            frame.size(),
            self.settings.image_size,
            "frame size {} does not match the configured {}",
            frame.size(),
            self.settings.image_size
        );
        copy_to_device(frame, &mut self.in_img);
        self.staged = true;
        self
    }

    /// Processes the staged frame.
    pub fn run(&mut self) -> &mut Self {
        assert!(self.staged, "stage() a frame before run()");
        self.engine.process_frame(&self.in_img);
        self.computed = true;
        self
    }
}

impl<E: RealtimeEngine> Superpixel for RealtimeSlic<E> {
    /// RGB image of the frame with boundaries painted red.
    type Contour = Frame;

    fn compute(&mut self, frame: FrameView<'_>) -> &mut Self {
        self.stage(frame).run()
    }

    fn get_contour(&mut self, output: &mut Frame) {
        assert!(
            self.computed,
            "compute() must be called before reading the segmentation"
        );
        let out_img = match self.out_img.as_mut() {
            Some(out_img) => out_img,
            // Same size as the input image, which was allocated fine.
            None => match DeviceImage::like(&self.in_img) {
                Ok(out_img) => self.out_img.insert(out_img),
                Err(error) => panic!("cannot allocate the contour image: {error}"),
            },
        };
        self.engine.draw_segmentation_result(out_img);
        copy_to_host(out_img, output);
    }
}

/// BGR interleaved host frame to B, G, R, A device pixels.
fn copy_to_device(frame: FrameView<'_>, device: &mut DeviceImage) {
    for y in 0..frame.height() {
        for (dst, src) in device
            .get_row_mut(y)
            .chunks_exact_mut(DEVICE_CHANNELS)
            .zip(frame.get_row(y).chunks_exact(3))
        {
            dst[0] = src[0];
            dst[1] = src[1];
            dst[2] = src[2];
            dst[3] = 255;
        }
    }
}

/// B, G, R, A device pixels to an RGB interleaved host frame.
fn copy_to_host(device: &DeviceImage, frame: &mut Frame) {
    let size = device.size();
    frame.ensure_size(size.width, size.height);
    for y in 0..size.height {
        for (dst, src) in frame
            .get_row_mut(y)
            .chunks_exact_mut(3)
            .zip(device.get_row(y).chunks_exact(DEVICE_CHANNELS))
        {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
        }
    }
}
