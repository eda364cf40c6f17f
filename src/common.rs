use crate::arrays::Size;
use std::ops::Range;
use thiserror::Error;

/// Errors reported by constructors and configuration validation.
///
/// Contract violations at call time (wrong frame size for a fixed-size backend, chip id out of
/// range, reading results before `compute()`) are not represented here. They panic.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("dimension mismatch: expected {expected} elements, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("image must have non-zero width and height")]
    EmptyImage,
    #[error("cannot allocate device image of {width}x{height}")]
    Allocation { width: usize, height: usize },
    #[error("feature extraction failed: {0}")]
    FeatureExtraction(String),
}

/// Type of spatial distance, if it's Manhattan distance ([wikipedia](https://en.wikipedia.org/wiki/Taxicab_geometry))
/// or Euclidean distance ([wikipedia](https://en.wikipedia.org/wiki/Euclidean_distance)).
///
/// The color distance is always a Sum of Absolute Differences over the three channels.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum DistanceMetric {
    /// Manhattan distance for spatial and color space.
    Manhattan,
    /// Euclidean distance for spatial and Manhattan for color space.
    RealDistManhattanColor,
}

/// How the assign step spreads its work.
///
/// Both strategies produce identical assignments: every pixel is decided on its own, visiting
/// clusters in the same order.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ThreadingStrategy {
    /// Everything on the calling thread.
    SingleThread,
    /// Image rows are split into `rayon::current_num_threads()` bands.
    RowBased,
}

/// Color space the clustering runs in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ColorSpace {
    /// CIELAB, perceptually uniform.
    CieLab,
    /// Linear CIE XYZ.
    Xyz,
    /// The input bytes as they are.
    Rgb,
}

/// How the initial grid of the real-time engine is derived.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SegMethod {
    /// Use `RealtimeSettings::superpixel_size` as the grid step.
    GivenSize,
    /// Derive the grid step from `RealtimeSettings::num_segments`.
    GivenNum,
}

/// Config of the CPU SLIC backend.
#[derive(Clone, Debug)]
pub struct SlicConfig {
    /// Nominal superpixel edge length in pixels. Also the grid step and search region size.
    pub superpixel_size: u16,
    /// Trades color fidelity for compact shapes. Higher means more compact superpixels.
    pub ruler: f32,
    /// Number of assign/update rounds before the final full assignment.
    pub num_iterations: u16,
    /// Fragments with fewer pixels than this are merged into a neighbouring segment.
    pub min_size: u32,
    /// By how much we advance on image row in assignment. Non-zero, 1 is no row subsampling.
    ///
    /// Higher means lower quality. The last assignment is always done on every row.
    pub subsample_stride: u8,
    pub distance_metric: DistanceMetric,
    pub threading: ThreadingStrategy,
}

impl Default for SlicConfig {
    fn default() -> Self {
        Self {
            superpixel_size: 32,
            ruler: 30.0,
            num_iterations: 3,
            min_size: 10,
            subsample_stride: 1,
            distance_metric: DistanceMetric::RealDistManhattanColor,
            threading: ThreadingStrategy::RowBased,
        }
    }
}

impl SlicConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.superpixel_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "superpixel_size must be at least 2, got {}",
                self.superpixel_size
            )));
        }
        if !self.ruler.is_finite() || self.ruler < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "ruler must be finite and non-negative, got {}",
                self.ruler
            )));
        }
        if self.subsample_stride == 0 {
            return Err(Error::InvalidConfig(
                "subsample_stride must be higher than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Settings of the real-time backend. Fixed for the lifetime of the backend.
#[derive(Clone, Debug)]
pub struct RealtimeSettings {
    pub image_size: Size,
    /// Grid step for `SegMethod::GivenSize`.
    pub superpixel_size: u16,
    /// Number of segments for `SegMethod::GivenNum`.
    pub num_segments: u32,
    pub num_iterations: u16,
    /// Weight of the spatial term, 0.0 to 1.0 is the useful range.
    pub coherence_weight: f32,
    pub enforce_connectivity: bool,
    pub color_space: ColorSpace,
    pub seg_method: SegMethod,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            image_size: Size::new(432, 240),
            superpixel_size: 32,
            num_segments: 200,
            num_iterations: 5,
            coherence_weight: 0.6,
            enforce_connectivity: true,
            color_space: ColorSpace::Xyz,
            seg_method: SegMethod::GivenSize,
        }
    }
}

impl RealtimeSettings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.image_size.is_empty() {
            return Err(Error::EmptyImage);
        }
        match self.seg_method {
            SegMethod::GivenSize if self.superpixel_size < 2 => {
                return Err(Error::InvalidConfig(format!(
                    "superpixel_size must be at least 2, got {}",
                    self.superpixel_size
                )))
            }
            SegMethod::GivenNum if self.num_segments == 0 => {
                return Err(Error::InvalidConfig("num_segments must be non-zero".into()))
            }
            _ => {}
        }
        if !self.coherence_weight.is_finite() || self.coherence_weight < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "coherence_weight must be finite and non-negative, got {}",
                self.coherence_weight
            )));
        }
        Ok(())
    }

    /// Grid step the engine seeds with.
    pub fn grid_step(&self) -> u16 {
        match self.seg_method {
            SegMethod::GivenSize => self.superpixel_size,
            SegMethod::GivenNum => {
                let area = self.image_size.area() as f32;
                ((area / self.num_segments as f32).sqrt().round() as u16).max(2)
            }
        }
    }
}

/// Config of a tiling, see `chipping::Chipping::from_config`.
#[derive(Clone, Debug, PartialEq)]
pub struct ChippingConfig {
    pub width: usize,
    pub height: usize,
    pub chip_width: usize,
    pub chip_height: usize,
    /// Fraction of a chip shared with the next chip along each axis, in `[0, 1)`.
    pub overlap: f32,
}

impl Default for ChippingConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            chip_width: 256,
            chip_height: 256,
            overlap: 0.5,
        }
    }
}

pub(crate) fn split_length_to_ranges(length: usize, splits: usize) -> Vec<Range<usize>> {
    let splits = splits.clamp(1, length.max(1));
    let chunk_size = length / splits;
    let rem = length % splits;
    (0..splits)
        .scan((rem, 0usize), |(r, acc), _split| {
            let mut size = chunk_size;
            if *r > 0 {
                *r -= 1;
                size += 1;
            }
            let out = (*acc, *acc + size);
            *acc += size;
            Some(out.0..out.1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ranges_cover_length() {
        let ranges = split_length_to_ranges(1080, 7);
        assert_eq!(ranges.len(), 7);
        assert_eq!(ranges.first().unwrap().start, 0);
        assert_eq!(ranges.last().unwrap().end, 1080);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        // more splits than rows
        assert_eq!(split_length_to_ranges(3, 16).len(), 3);
    }

    #[test]
    fn slic_config_validation() {
        assert!(SlicConfig::default().validate().is_ok());
        let config = SlicConfig {
            subsample_stride: 0,
            ..SlicConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        let config = SlicConfig {
            ruler: f32::NAN,
            ..SlicConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn realtime_grid_step() {
        let mut settings = RealtimeSettings::default();
        assert_eq!(settings.grid_step(), 32);
        settings.seg_method = SegMethod::GivenNum;
        settings.image_size = Size::new(256, 256);
        settings.num_segments = 64;
        assert_eq!(settings.grid_step(), 32);
        settings.num_segments = 0;
        assert!(settings.validate().is_err());
    }
}
