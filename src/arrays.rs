use crate::cielab::convert_pixel;
use crate::common::{ColorSpace, Error};
use aligned_vec::{AVec, ConstAlign};
use rayon::prelude::*;
use std::fmt;
use std::ops::{Index, IndexMut};

const ALIGN: usize = 64;
const CHANNELS: usize = 3;

/// Width and height of an image or a chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: usize,
    pub height: usize,
}

impl Size {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned region of interest in the coordinates of a parent image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> usize {
        self.x + self.width
    }

    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} x {} from ({}, {})]", self.width, self.height, self.x, self.y)
    }
}

/// Row-major 2D array with 64-byte aligned storage. Indexed by `(x, y)`.
#[derive(Debug, Clone)]
pub struct Array2D<T> {
    pub data: AVec<T, ConstAlign<ALIGN>>,
    pub width: usize,
    pub height: usize,
}

/// Per-pixel superpixel ids.
pub type LabelMap = Array2D<i32>;
/// Single-channel mask, non-zero where set.
pub type Mask = Array2D<u8>;

impl<T> Array2D<T> {
    pub fn from_slice(data: &[T], width: usize, height: usize) -> Result<Self, Error>
    where
        T: Clone,
    {
        if data.len() != width * height {
            return Err(Error::DimensionMismatch {
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: AVec::from_slice(ALIGN, data),
        })
    }

    pub fn from_fill(value: T, width: usize, height: usize) -> Self
    where
        T: Clone + Copy,
    {
        let data: AVec<T, ConstAlign<ALIGN>> =
            AVec::from_iter(ALIGN, (0..width * height).map(|_| value));
        Self {
            width,
            height,
            data,
        }
    }

    /// An empty array, to be used as an output argument.
    pub fn empty() -> Self {
        Self {
            data: AVec::from_iter(ALIGN, std::iter::empty()),
            width: 0,
            height: 0,
        }
    }

    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        self.data.fill(value)
    }

    /// Reallocates to `width x height` filled with `value` unless the array already has that
    /// size, in which case only the fill happens.
    pub fn reset(&mut self, width: usize, height: usize, value: T)
    where
        T: Clone + Copy,
    {
        if self.width == width && self.height == height {
            self.fill(value);
        } else {
            *self = Self::from_fill(value, width, height);
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn get_row(&self, row: usize) -> &[T] {
        debug_assert!(row < self.height);
        &self.data[(self.width * row)..(self.width * row + self.width)]
    }

    pub fn get_row_mut(&mut self, row: usize) -> &mut [T] {
        debug_assert!(row < self.height);
        &mut self.data[(self.width * row)..(self.width * row + self.width)]
    }

    /// Inclusive on both ends, like the cluster window bounds.
    #[inline(always)]
    pub fn get_row_part(&self, row: usize, left: usize, right: usize) -> &[T] {
        debug_assert!(
            row < self.height,
            "Out-of-bounds row {row} < {}",
            self.height
        );
        debug_assert!(
            left < self.width,
            "Out-of-bounds left {left} < {}",
            self.width
        );
        debug_assert!(
            right < self.width,
            "Out-of-bounds right {right} < {}",
            self.width
        );
        &self.data[(self.width * row + left)..(self.width * row + right) + 1]
    }

    #[inline(always)]
    pub fn get_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(
            self.width > x && self.height > y,
            "Index ({x}, {y}) is out of bounds ({}, {})",
            self.width,
            self.height
        );
        self.width * y + x
    }

    pub fn get_x_y_index(&self, ind: usize) -> (usize, usize) {
        debug_assert!(ind < self.data.len());
        (ind % self.width, ind / self.width)
    }
}

impl<T: PartialEq> PartialEq for Array2D<T> {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.data[..] == other.data[..]
    }
}

impl<T> Index<(usize, usize)> for Array2D<T> {
    type Output = T;
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.data[self.get_index(x, y)]
    }
}

impl<T> IndexMut<(usize, usize)> for Array2D<T> {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        let idx = self.get_index(x, y);
        &mut self.data[idx]
    }
}

/// Owned 3-channel 8-bit interleaved image.
///
/// Channel order is up to the caller. Inputs are BGR by convention, the real-time backend
/// reorders BGR input into its device layout and hands contours back as RGB.
#[derive(Clone)]
pub struct Frame {
    data: AVec<u8, ConstAlign<ALIGN>>,
    width: usize,
    height: usize,
}

impl Frame {
    /// Black frame of the given size.
    pub fn new(width: usize, height: usize) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage);
        }
        Ok(Self {
            data: AVec::from_iter(ALIGN, std::iter::repeat(0u8).take(width * height * CHANNELS)),
            width,
            height,
        })
    }

    pub fn from_raw(data: &[u8], width: usize, height: usize) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage);
        }
        if data.len() != width * height * CHANNELS {
            return Err(Error::DimensionMismatch {
                expected: width * height * CHANNELS,
                actual: data.len(),
            });
        }
        Ok(Self {
            data: AVec::from_slice(ALIGN, data),
            width,
            height,
        })
    }

    /// A 0x0 frame, to be used as an output argument.
    pub fn empty() -> Self {
        Self {
            data: AVec::from_iter(ALIGN, std::iter::empty()),
            width: 0,
            height: 0,
        }
    }

    /// Frame where every pixel has the same value.
    pub fn from_pixel(width: usize, height: usize, pixel: [u8; 3]) -> Result<Self, Error> {
        let mut frame = Self::new(width, height)?;
        frame
            .data
            .chunks_exact_mut(CHANNELS)
            .for_each(|p| p.copy_from_slice(&pixel));
        Ok(frame)
    }

    /// Frame from a per-pixel function of `(x, y)`.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Result<Self, Error>
    where
        F: FnMut(usize, usize) -> [u8; 3],
    {
        let mut frame = Self::new(width, height)?;
        for y in 0..height {
            for (x, p) in frame.get_row_mut(y).chunks_exact_mut(CHANNELS).enumerate() {
                p.copy_from_slice(&f(x, y));
            }
        }
        Ok(frame)
    }

    /// Makes the frame `width x height`, keeping the allocation when the size already matches.
    /// Contents are unspecified afterwards.
    pub(crate) fn ensure_size(&mut self, width: usize, height: usize) {
        if self.width != width || self.height != height {
            self.data = AVec::from_iter(ALIGN, std::iter::repeat(0u8).take(width * height * CHANNELS));
            self.width = width;
            self.height = height;
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    pub fn get_row(&self, row: usize) -> &[u8] {
        debug_assert!(row < self.height);
        let stride = self.width * CHANNELS;
        &self.data[stride * row..stride * row + stride]
    }

    #[inline(always)]
    pub fn get_row_mut(&mut self, row: usize) -> &mut [u8] {
        debug_assert!(row < self.height);
        let stride = self.width * CHANNELS;
        &mut self.data[stride * row..stride * row + stride]
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> [u8; 3] {
        self.view().get_pixel(x, y)
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width * CHANNELS,
        }
    }

    /// Borrowed view of `roi`. Panics when `roi` is empty or not inside the frame.
    pub fn roi(&self, roi: Rect) -> FrameView<'_> {
        self.view().roi(roi)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("data", &"Omitted...")
            .finish()
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.data[..] == other.data[..]
    }
}

/// Borrowed 3-channel window into a `Frame`, rows `stride` bytes apart.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a> FrameView<'a> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline(always)]
    pub fn get_row(&self, row: usize) -> &'a [u8] {
        debug_assert!(row < self.height);
        let start = self.stride * row;
        &self.data[start..start + self.width * CHANNELS]
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> [u8; 3] {
        assert!(
            x < self.width && y < self.height,
            "Pixel ({x}, {y}) is out of bounds ({}, {})",
            self.width,
            self.height
        );
        let p = &self.get_row(y)[x * CHANNELS..x * CHANNELS + CHANNELS];
        [p[0], p[1], p[2]]
    }

    pub fn roi(&self, roi: Rect) -> FrameView<'a> {
        assert!(
            roi.width > 0 && roi.height > 0,
            "ROI {roi} must have non-zero size"
        );
        assert!(
            roi.right() <= self.width && roi.bottom() <= self.height,
            "ROI {roi} is outside of the {}x{} image",
            self.width,
            self.height
        );
        let start = roi.y * self.stride + roi.x * CHANNELS;
        let end = (roi.bottom() - 1) * self.stride + roi.right() * CHANNELS;
        FrameView {
            data: &self.data[start..end],
            width: roi.width,
            height: roi.height,
            stride: self.stride,
        }
    }

    /// Copy with the first and third channel swapped (BGR to RGB and back).
    pub fn to_swapped_rb(&self) -> Frame {
        let mut out = Frame {
            data: AVec::from_iter(
                ALIGN,
                std::iter::repeat(0u8).take(self.width * self.height * CHANNELS),
            ),
            width: self.width,
            height: self.height,
        };
        for y in 0..self.height {
            for (dst, src) in out
                .get_row_mut(y)
                .chunks_exact_mut(CHANNELS)
                .zip(self.get_row(y).chunks_exact(CHANNELS))
            {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            }
        }
        out
    }

    /// Owned copy of the viewed pixels.
    pub fn to_frame(&self) -> Frame {
        Frame {
            data: AVec::from_iter(
                ALIGN,
                (0..self.height).flat_map(|y| self.get_row(y).iter().copied()),
            ),
            width: self.width,
            height: self.height,
        }
    }
}

impl fmt::Debug for FrameView<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("FrameView")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish()
    }
}

/// Image in the clustering color space, packed as 3 channels plus a zero padding byte.
pub struct PaddedImage {
    pub data: AVec<u8, ConstAlign<ALIGN>>,
    pub width: usize,
    pub height: usize,
}

impl PaddedImage {
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0);
        assert!(height > 0);
        Self {
            data: AVec::from_iter(ALIGN, std::iter::repeat(0u8).take(width * height * 4)),
            width,
            height,
        }
    }

    /// Converts a BGR view into `space`.
    pub fn from_bgr(view: FrameView<'_>, space: ColorSpace) -> Self {
        let mut image = Self::new(view.width(), view.height());
        image.fill_from_bgr(view, space);
        image
    }

    /// Converts a BGR view into `space`, reusing this image's buffer. Sizes must match.
    pub fn fill_from_bgr(&mut self, view: FrameView<'_>, space: ColorSpace) {
        assert_eq!(view.size(), Size::new(self.width, self.height));
        self.data
            .par_chunks_mut(self.width * 4)
            .enumerate()
            .for_each(|(y, out_row)| {
                for (out, bgr) in out_row.chunks_exact_mut(4).zip(view.get_row(y).chunks_exact(3)) {
                    out[..3].copy_from_slice(&convert_pixel([bgr[2], bgr[1], bgr[0]], space));
                    out[3] = 0;
                }
            });
    }

    /// Converts a 4-channel BGRA buffer (alpha ignored) into `space`. Sizes must match.
    pub fn fill_from_bgra(&mut self, bgra: &[u8], space: ColorSpace) {
        assert_eq!(bgra.len(), self.data.len());
        self.data
            .par_chunks_mut(self.width * 4)
            .zip(bgra.par_chunks(self.width * 4))
            .for_each(|(out_row, in_row)| {
                for (out, p) in out_row.chunks_exact_mut(4).zip(in_row.chunks_exact(4)) {
                    out[..3].copy_from_slice(&convert_pixel([p[2], p[1], p[0]], space));
                    out[3] = 0;
                }
            });
    }

    #[inline(always)]
    pub fn get_row(&self, row: usize) -> &[u8] {
        debug_assert!(row < self.height);
        &self.data[(self.width * 4 * row)..(self.width * 4 * row + self.width * 4)]
    }

    #[inline(always)]
    pub fn get_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(self.width > x);
        debug_assert!(self.height > y);
        self.width * y * 4 + x * 4
    }

    #[inline(always)]
    pub fn get_pixel(&self, x: usize, y: usize) -> &[u8] {
        let idx = self.get_index(x, y);
        &self.data[idx..idx + 3]
    }

    /// Inclusive on both ends.
    #[inline(always)]
    pub fn get_row_part(&self, row: usize, left: usize, right: usize) -> &[u8] {
        debug_assert!(row < self.height);
        debug_assert!(left < self.width);
        debug_assert!(right < self.width);
        &self.data[(4 * self.width * row + 4 * left)..(4 * self.width * row + 4 * right) + 4]
    }
}
