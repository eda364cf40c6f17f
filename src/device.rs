use crate::arrays::Size;
use crate::common::Error;
use aligned_vec::{AVec, ConstAlign};
use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use tracing::trace;

const ALIGN: usize = 64;
/// Bytes per pixel of a device image: B, G, R and an alpha byte nobody reads.
pub const DEVICE_CHANNELS: usize = 4;

/// Fixed-size 4-channel image owned by a real-time engine.
///
/// The buffer is allocated once, at construction, and released on drop. The handle is neither
/// `Send` nor `Sync`: it belongs to the thread that created the engine.
pub struct DeviceImage {
    data: AVec<u8, ConstAlign<ALIGN>>,
    size: Size,
    _thread_bound: PhantomData<*const ()>,
}

impl DeviceImage {
    /// Allocates a zeroed `size` image. Fails instead of aborting when the buffer can't be had.
    pub fn new(size: Size) -> Result<Self, Error> {
        let data = alloc_zeroed(size)?;
        trace!(%size, "allocated device image");
        Ok(Self {
            data,
            size,
            _thread_bound: PhantomData,
        })
    }

    /// Allocates an image the size of `other`.
    pub fn like(other: &DeviceImage) -> Result<Self, Error> {
        Self::new(other.size)
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Host-visible pixels, `DEVICE_CHANNELS` bytes each, rows without padding.
    pub fn host_data(&self) -> &[u8] {
        &self.data
    }

    pub fn host_data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline(always)]
    pub fn get_row(&self, row: usize) -> &[u8] {
        debug_assert!(row < self.size.height);
        let stride = self.size.width * DEVICE_CHANNELS;
        &self.data[stride * row..stride * row + stride]
    }

    #[inline(always)]
    pub fn get_row_mut(&mut self, row: usize) -> &mut [u8] {
        debug_assert!(row < self.size.height);
        let stride = self.size.width * DEVICE_CHANNELS;
        &mut self.data[stride * row..stride * row + stride]
    }
}

impl Drop for DeviceImage {
    fn drop(&mut self) {
        trace!(size = %self.size, "released device image");
    }
}

impl fmt::Debug for DeviceImage {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("DeviceImage")
            .field("size", &self.size)
            .field("data", &"Omitted...")
            .finish()
    }
}

fn alloc_zeroed(size: Size) -> Result<AVec<u8, ConstAlign<ALIGN>>, Error> {
    let allocation_error = Error::Allocation {
        width: size.width,
        height: size.height,
    };
    if size.is_empty() {
        return Err(Error::EmptyImage);
    }
    let len = size
        .width
        .checked_mul(size.height)
        .and_then(|n| n.checked_mul(DEVICE_CHANNELS))
        .ok_or_else(|| allocation_error.clone())?;
    if len > isize::MAX as usize - (ALIGN - 1) {
        return Err(allocation_error);
    }
    let layout = Layout::from_size_align(len, ALIGN).map_err(|_| allocation_error.clone())?;
    let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(allocation_error);
    }
    // The layout matches what AVec would have allocated for `len` bytes with this alignment.
    Ok(unsafe { AVec::from_raw_parts(ptr, ALIGN, len, len) })
}

#[cfg(test)]
mod tests {
    use super::{DeviceImage, DEVICE_CHANNELS};
    use crate::arrays::Size;
    use crate::common::Error;

    #[test]
    fn allocation_is_zeroed_and_aligned() {
        let image = DeviceImage::new(Size::new(37, 11)).unwrap();
        assert_eq!(image.host_data().len(), 37 * 11 * DEVICE_CHANNELS);
        assert!(image.host_data().iter().all(|b| *b == 0));
        assert_eq!(image.host_data().as_ptr() as usize % 64, 0);
        assert_eq!(image.get_row(10).len(), 37 * DEVICE_CHANNELS);
        let other = DeviceImage::like(&image).unwrap();
        assert_eq!(other.size(), image.size());
    }

    #[test]
    fn impossible_sizes_are_errors() {
        assert_eq!(
            DeviceImage::new(Size::new(0, 10)).unwrap_err(),
            Error::EmptyImage
        );
        assert_eq!(
            DeviceImage::new(Size::new(usize::MAX / 2, 3)).unwrap_err(),
            Error::Allocation {
                width: usize::MAX / 2,
                height: 3
            }
        );
    }
}
