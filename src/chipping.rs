//! Tiling of a large image into fixed-size, overlapping chips.
//!
//! Chips are numbered `0..nchip` row-major. Along each axis the chips advance by
//! `stride = round(chip * (1 - overlap))` and the last row and column are pulled back inward,
//! so every chip lies inside the image and the far edges are covered.
//!
//! ```
//! use superpixel_chips::arrays::{Rect, Size};
//! use superpixel_chips::chipping::Chipping;
//!
//! let chipping = Chipping::new(Size::new(1000, 1000), Size::new(256, 256), 0.5).unwrap();
//! assert_eq!(chipping.stride(), Size::new(128, 128));
//! assert_eq!(chipping.nchip(), 49);
//! assert_eq!(chipping.roi(48), Rect::new(744, 744, 256, 256));
//! ```

use crate::arrays::{Rect, Size};
use crate::common::{ChippingConfig, Error};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chipping {
    input_size: Size,
    chip_size: Size,
    overlap: f32,
    stride: Size,
    nx: usize,
    ny: usize,
}

impl Chipping {
    pub fn new(input_size: Size, chip_size: Size, overlap: f32) -> Result<Self, Error> {
        if input_size.is_empty() {
            return Err(Error::EmptyImage);
        }
        if chip_size.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "chip size must be non-zero, got {chip_size}"
            )));
        }
        if !overlap.is_finite() || !(0.0..1.0).contains(&overlap) {
            return Err(Error::InvalidConfig(format!(
                "overlap must be in [0, 1), got {overlap}"
            )));
        }
        let (stride_x, nx) = axis(input_size.width, chip_size.width, overlap);
        let (stride_y, ny) = axis(input_size.height, chip_size.height, overlap);
        Ok(Self {
            input_size,
            chip_size,
            overlap,
            stride: Size::new(stride_x, stride_y),
            nx,
            ny,
        })
    }

    pub fn from_config(config: &ChippingConfig) -> Result<Self, Error> {
        Self::new(
            Size::new(config.width, config.height),
            Size::new(config.chip_width, config.chip_height),
            config.overlap,
        )
    }

    pub fn input_size(&self) -> Size {
        self.input_size
    }

    pub fn chip_size(&self) -> Size {
        self.chip_size
    }

    pub fn overlap(&self) -> f32 {
        self.overlap
    }

    /// Offset between neighbouring chips along each axis.
    pub fn stride(&self) -> Size {
        self.stride
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn nchip(&self) -> usize {
        self.nx * self.ny
    }

    /// Rectangle of chip `chip_id`. Panics when `chip_id >= nchip()`.
    ///
    /// A chip larger than the image is cut down to the image along that axis.
    pub fn roi(&self, chip_id: usize) -> Rect {
        assert!(
            chip_id < self.nchip(),
            "chip id {chip_id} is out of range, there are {} chips",
            self.nchip()
        );
        let (cx, cy) = (chip_id % self.nx, chip_id / self.nx);
        let width = self.chip_size.width.min(self.input_size.width);
        let height = self.chip_size.height.min(self.input_size.height);
        let x = (cx * self.stride.width).min(self.input_size.width - width);
        let y = (cy * self.stride.height).min(self.input_size.height - height);
        Rect::new(x, y, width, height)
    }

    /// `(chip_id, roi)` of every chip, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Rect)> + '_ {
        (0..self.nchip()).map(move |chip_id| (chip_id, self.roi(chip_id)))
    }
}

/// Stride and chip count along one axis.
fn axis(length: usize, chip: usize, overlap: f32) -> (usize, usize) {
    let stride = ((chip as f64 * (1.0 - overlap as f64)).round() as usize).max(1);
    let count = if length > chip {
        1 + (length - chip).div_ceil(stride)
    } else {
        1
    };
    (stride, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousand_pixels_half_overlap() {
        let chipping = Chipping::new(Size::new(1000, 1000), Size::new(256, 256), 0.5).unwrap();
        assert_eq!(chipping.stride(), Size::new(128, 128));
        assert_eq!((chipping.nx(), chipping.ny(), chipping.nchip()), (7, 7, 49));
        assert_eq!(chipping.roi(0), Rect::new(0, 0, 256, 256));
        assert_eq!(chipping.roi(1), Rect::new(128, 0, 256, 256));
        assert_eq!(chipping.roi(7), Rect::new(0, 128, 256, 256));
        assert_eq!(chipping.roi(48), Rect::new(744, 744, 256, 256));
    }

    #[test]
    fn last_column_is_pulled_inward() {
        let chipping = Chipping::new(Size::new(300, 100), Size::new(128, 100), 0.0).unwrap();
        assert_eq!((chipping.nx(), chipping.ny()), (3, 1));
        let rois: Vec<Rect> = chipping.iter().map(|(_, roi)| roi).collect();
        assert_eq!(
            rois,
            vec![
                Rect::new(0, 0, 128, 100),
                Rect::new(128, 0, 128, 100),
                Rect::new(172, 0, 128, 100),
            ]
        );
    }

    #[test]
    fn chip_larger_than_image_is_cut() {
        let chipping = Chipping::new(Size::new(100, 600), Size::new(256, 256), 0.25).unwrap();
        assert_eq!(chipping.stride(), Size::new(192, 192));
        assert_eq!((chipping.nx(), chipping.ny()), (1, 3));
        assert_eq!(chipping.roi(0), Rect::new(0, 0, 100, 256));
        assert_eq!(chipping.roi(2), Rect::new(0, 344, 100, 256));
    }

    #[test]
    fn tiny_chips_with_high_overlap_keep_stride_one() {
        let chipping = Chipping::new(Size::new(10, 4), Size::new(1, 1), 0.9).unwrap();
        assert_eq!(chipping.stride(), Size::new(1, 1));
        assert_eq!(chipping.nchip(), 40);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let image = Size::new(100, 100);
        let chip = Size::new(10, 10);
        assert_eq!(
            Chipping::new(Size::new(0, 100), chip, 0.5).unwrap_err(),
            Error::EmptyImage
        );
        assert!(Chipping::new(image, Size::new(10, 0), 0.5).is_err());
        assert!(Chipping::new(image, chip, 1.0).is_err());
        assert!(Chipping::new(image, chip, -0.1).is_err());
        assert!(Chipping::new(image, chip, f32::NAN).is_err());
    }

    #[test]
    fn config_defaults() {
        let chipping = Chipping::from_config(&ChippingConfig {
            width: 512,
            height: 256,
            ..ChippingConfig::default()
        })
        .unwrap();
        assert_eq!((chipping.nx(), chipping.ny()), (3, 1));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn roi_out_of_range_panics() {
        let chipping = Chipping::new(Size::new(1000, 1000), Size::new(256, 256), 0.5).unwrap();
        chipping.roi(49);
    }
}
