//! Per-superpixel measurements on a label map.
//!
//! Zero-area regions are legal (an id can vanish after connectivity enforcement or when a chip
//! changes), so everything that would divide by the area returns `Option`.

use crate::arrays::{FrameView, LabelMap, Mask};
use crate::superpixel::CONTOUR;

/// Writes a mask of the pixels labelled `id`, 255 inside and 0 outside.
pub fn select(labels: &LabelMap, id: i32, output: &mut Mask) {
    output.reset(labels.width, labels.height, 0);
    for (out, label) in output.data.iter_mut().zip(labels.data.iter()) {
        if *label == id {
            *out = CONTOUR;
        }
    }
}

/// Raw moments of a region up to the first order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RegionMoments {
    pub m00: u64,
    pub m10: u64,
    pub m01: u64,
}

impl RegionMoments {
    /// Moments of the pixels labelled `id`.
    pub fn compute(labels: &LabelMap, id: i32) -> Self {
        let mut moments = Self::default();
        for y in 0..labels.height {
            for (x, label) in labels.get_row(y).iter().enumerate() {
                if *label == id {
                    moments.add(x, y);
                }
            }
        }
        moments
    }

    /// Moments of every id in `0..n` in one pass. Labels outside that range are ignored.
    pub fn all(labels: &LabelMap, n: u32) -> Vec<Self> {
        let mut moments = vec![Self::default(); n as usize];
        for y in 0..labels.height {
            for (x, label) in labels.get_row(y).iter().enumerate() {
                if let Some(m) = usize::try_from(*label).ok().and_then(|l| moments.get_mut(l)) {
                    m.add(x, y);
                }
            }
        }
        moments
    }

    #[inline]
    fn add(&mut self, x: usize, y: usize) {
        self.m00 += 1;
        self.m10 += x as u64;
        self.m01 += y as u64;
    }

    pub fn area(&self) -> u64 {
        self.m00
    }

    /// `(x, y)` center of mass, `None` for an empty region.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00 == 0 {
            return None;
        }
        let area = self.m00 as f64;
        Some((self.m10 as f64 / area, self.m01 as f64 / area))
    }
}

/// Mean of every channel over the non-zero pixels of `mask`. `None` when the mask is empty.
///
/// Panics when the mask and the frame differ in size.
pub fn mean_color(frame: FrameView<'_>, mask: &Mask) -> Option<[f64; 3]> {
    assert_eq!(
        frame.size(),
        mask.size(),
        "mask {} does not match the frame {}",
        mask.size(),
        frame.size()
    );
    let mut sums = [0u64; 3];
    let mut count = 0u64;
    for y in 0..frame.height() {
        for (pixel, m) in frame.get_row(y).chunks_exact(3).zip(mask.get_row(y)) {
            if *m != 0 {
                for (sum, value) in sums.iter_mut().zip(pixel) {
                    *sum += *value as u64;
                }
                count += 1;
            }
        }
    }
    if count == 0 {
        return None;
    }
    Some(sums.map(|sum| sum as f64 / count as f64))
}
