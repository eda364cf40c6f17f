/// SLIC cluster center.
///
/// Fields `x`, `y`, `c0`, `c1`, `c2`, `num_members` are updated by `slic::update()`. The window
/// fields below are refreshed by `Cluster::update_coords()` at the start of every assign step.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// x position of center (number of column (starting from 0))
    pub x: u32,
    /// y position of center
    pub y: u32,
    /// Average color of the cluster in the clustering color space
    pub c0: u8,
    pub c1: u8,
    pub c2: u8,
    /// Number of cluster (used in assignment)
    pub number: u32,
    /// Number of pixels inside cluster
    pub num_members: u32,
    // Search window, rows `top..bottom` and columns `left..=right`.
    pub(crate) top: u32,
    pub(crate) bottom: u32,
    pub(crate) left: u32,
    pub(crate) right: u32,
    // Columns of the spatial distance LUT matching `left` and `right`.
    pub(crate) lut_left: u32,
    pub(crate) lut_right: u32,
}

impl Default for Cluster {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            c0: 0,
            c1: 0,
            c2: 0,
            number: u32::MAX,
            num_members: 0,
            top: 0,
            bottom: 0,
            left: 0,
            right: 0,
            lut_left: 0,
            lut_right: 0,
        }
    }
}

impl Cluster {
    #[inline(always)]
    pub(crate) fn color(&self) -> [u8; 4] {
        [self.c0, self.c1, self.c2, 0]
    }

    pub(crate) fn is_boundary(&self, width: usize, height: usize, search_region_size: u32) -> bool {
        self.y < search_region_size
            || self.x < search_region_size
            || (self.y + search_region_size) as usize >= height
            || (self.x + search_region_size) as usize >= width
    }

    /// Row of the spatial distance LUT for image row `row`.
    #[inline(always)]
    pub(crate) fn lut_row(&self, row: usize, search_region_size: u32) -> usize {
        debug_assert!(row >= self.top as usize && row < self.bottom as usize);
        row + search_region_size as usize - self.y as usize
    }

    pub(crate) fn update_coords(&mut self, width: usize, height: usize, search_region_size: u32) {
        let s = search_region_size;
        self.top = self.y.saturating_sub(s);
        self.bottom = (self.y + s + 1).min(height as u32);
        self.left = self.x.saturating_sub(s);
        self.right = (self.x + s).min(width as u32 - 1);
        self.lut_left = self.left + s - self.x;
        self.lut_right = self.right + s - self.x;
        debug_assert!(self.lut_right <= 2 * s, "{self:?}");
        debug_assert!(
            self.lut_left == 0 || self.is_boundary(width, height, s),
            "Even through it's not boundary: {self:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::Cluster;

    #[test]
    fn window_is_clipped_at_image_edges() {
        let mut c = Cluster {
            x: 3,
            y: 2,
            ..Cluster::default()
        };
        c.update_coords(100, 50, 10);
        assert_eq!((c.top, c.bottom, c.left, c.right), (0, 13, 0, 13));
        assert_eq!((c.lut_left, c.lut_right), (7, 20));
        assert_eq!(c.lut_row(0, 10), 8);
        assert!(c.is_boundary(100, 50, 10));

        let mut c = Cluster {
            x: 50,
            y: 25,
            ..Cluster::default()
        };
        c.update_coords(100, 50, 10);
        assert_eq!((c.top, c.bottom, c.left, c.right), (15, 36, 40, 60));
        assert_eq!((c.lut_left, c.lut_right), (0, 20));
        assert!(!c.is_boundary(100, 50, 10));

        let mut c = Cluster {
            x: 99,
            y: 49,
            ..Cluster::default()
        };
        c.update_coords(100, 50, 10);
        assert_eq!((c.bottom, c.right), (50, 99));
        assert_eq!((c.lut_left, c.lut_right), (0, 10));
    }
}
