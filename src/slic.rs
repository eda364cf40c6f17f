use crate::arrays::{Array2D, PaddedImage};
use crate::assign::{assign, UNASSIGNED};
use crate::cielab::tables::OUTPUT_SHIFT;
use crate::cluster::Cluster;
use crate::common::{split_length_to_ranges, DistanceMetric, SlicConfig, ThreadingStrategy};
use multiversion::multiversion;
use rayon::current_num_threads;
use rayon::prelude::*;
use tracing::trace;

/// Parameters of one SLIC run, shared by the CPU backend and the real-time engine.
#[derive(Clone, Debug)]
pub struct SlicParams {
    /// Grid step of the seeds, also the half-size of the search window (_S_).
    pub search_region_size: u32,
    /// Higher means more compact superpixels -> this is about trading color accuracy for locality.
    pub compactness: f32,
    /// How many subsampled assign/update rounds are done before the final full assignment.
    pub max_iterations: u16,
    pub subsample_stride: u8,
    pub distance_metric: DistanceMetric,
    pub threading: ThreadingStrategy,
}

impl From<&SlicConfig> for SlicParams {
    fn from(config: &SlicConfig) -> Self {
        Self {
            search_region_size: config.superpixel_size as u32,
            compactness: config.ruler,
            max_iterations: config.num_iterations,
            subsample_stride: config.subsample_stride,
            distance_metric: config.distance_metric,
            threading: config.threading,
        }
    }
}

impl SlicParams {
    pub(crate) fn num_threads(&self) -> usize {
        match self.threading {
            ThreadingStrategy::SingleThread => 1,
            ThreadingStrategy::RowBased => current_num_threads(),
        }
    }
}

/// Convenient struct for passing values around.
pub struct Clusters {
    /// For every pixel in image this stores to which cluster it belongs (see `Cluster.number`).
    pub assignments: Array2D<u32>,
    pub clusters: Vec<Cluster>,
}

impl Clusters {
    /// Seeds a regular grid with spacing of at most `step` pixels in both directions.
    ///
    /// The number of clusters follows from the image size, so any image size works.
    pub fn initialize_clusters(image: &PaddedImage, step: u32) -> Clusters {
        Clusters {
            assignments: Array2D::from_fill(UNASSIGNED, image.width, image.height),
            clusters: seed_grid(image, step),
        }
    }

    /// Re-seeds in place, keeping the assignment buffer when its size matches.
    pub fn reinitialize(&mut self, image: &PaddedImage, step: u32) {
        self.clusters = seed_grid(image, step);
        self.assignments
            .reset(image.width, image.height, UNASSIGNED);
    }
}

fn seed_grid(image: &PaddedImage, step: u32) -> Vec<Cluster> {
    assert!(step > 0);
    let n_x = image.width.div_ceil(step as usize).max(1);
    let n_y = image.height.div_ceil(step as usize).max(1);
    let mut clusters = Vec::with_capacity(n_x * n_y);
    let step_x = image.width as f32 / n_x as f32;
    let step_y = image.height as f32 / n_y as f32;
    for j in 0..n_y {
        let center_y = (((j as f32 + 0.5) * step_y) as usize).min(image.height - 1);
        for i in 0..n_x {
            let center_x = (((i as f32 + 0.5) * step_x) as usize).min(image.width - 1);
            let p = image.get_pixel(center_x, center_y);
            clusters.push(Cluster {
                x: center_x as u32,
                y: center_y as u32,
                c0: p[0],
                c1: p[1],
                c2: p[2],
                number: clusters.len() as u32,
                ..Cluster::default()
            });
        }
    }
    debug_assert_eq!(clusters.len(), n_x * n_y);
    clusters
}

/// This function is the main loop.
///
/// The steps are generally:
/// - N iterations
///     - assign
///     - update
/// - full assign (_subsample stride_ = 1)
///
/// The subsample start increments in every iteration, so the rows of the image is every
/// iteration different (after `subsample_stride` iterations it starts over).
/// Without this row subsampling does not work.
///
/// Connectivity enforcement is a separate step, see `conectivity::enforce_connectivity()`.
pub fn iterate(
    image: &PaddedImage,
    params: &SlicParams,
    clusters: &mut Clusters,
    min_distances: &mut Array2D<u16>,
) {
    assert!(
        params.subsample_stride > 0,
        "Subsample stride must be higher than zero. How you want to advance by zero?"
    );
    if min_distances.width != image.width || min_distances.height != image.height {
        *min_distances = Array2D::from_fill(u16::MAX, image.width, image.height);
    }
    let spatial_distance_lut = compute_spatial_path(
        params.distance_metric,
        params.compactness,
        params.search_region_size,
    );
    let mut subsample_start = 0;
    for i in 0..params.max_iterations {
        assign(
            image,
            params,
            clusters,
            min_distances,
            &spatial_distance_lut,
            subsample_start,
        );
        update(clusters, image, params, subsample_start);
        trace!(iteration = i, subsample_start, "slic iteration done");
        subsample_start = (subsample_start + 1) % params.subsample_stride;
    }
    let no_subsample = SlicParams {
        subsample_stride: 1,
        ..params.clone()
    };
    assign(
        image,
        &no_subsample,
        clusters,
        min_distances,
        &spatial_distance_lut,
        0,
    );
}

/// This function computes LUT for spatial distances.
///
/// The LUT is `(2S+1) x (2S+1)`, the center is the cluster position.
pub fn compute_spatial_path(
    metric: DistanceMetric,
    compactness: f32,
    search_region_size: u32,
) -> Array2D<u16> {
    let coef = (compactness / search_region_size as f32) * (1 << OUTPUT_SHIFT) as f32;
    let s = search_region_size;
    let lut_size = (2 * s + 1) as usize;
    let mut spatial_distance_lut: Array2D<u16> = Array2D::from_fill(0xFFFFu16, lut_size, lut_size);
    // Leave room for the color part, the sum is saturating anyway.
    let cap = (u16::MAX - 1024) as f32;
    for i in 0..2 * s + 1 {
        for j in 0..2 * s + 1 {
            let (dy, dx) = (s.abs_diff(i) as f32, s.abs_diff(j) as f32);
            let dist = match metric {
                DistanceMetric::Manhattan => dx + dy,
                DistanceMetric::RealDistManhattanColor => dx.hypot(dy),
            };
            spatial_distance_lut[(j as usize, i as usize)] = (coef * dist).min(cap) as u16;
        }
    }
    spatial_distance_lut
}

/// Per-cluster sums of row, column and the three color channels.
type Accumulator = (Vec<u32>, Vec<[u64; 5]>);

/// This function does the update step.
///
/// Instead of median, average is used for the performance. Clusters without members keep
/// their previous position and color.
#[multiversion(targets = "simd")]
pub fn update(clusters: &mut Clusters, image: &PaddedImage, params: &SlicParams, subsample_start: u8) {
    let num_clusters = clusters.clusters.len();
    let stride = params.subsample_stride as usize;
    let assignments = &clusters.assignments;

    let accumulate = |rows: std::ops::Range<usize>| -> Accumulator {
        let mut num_members: Vec<u32> = vec![0; num_clusters];
        let mut acc: Vec<[u64; 5]> = vec![[0; 5]; num_clusters];
        for row in rows.filter(|r| r % stride == subsample_start as usize % stride) {
            let image_row = image.get_row(row);
            let assignments_row = assignments.get_row(row);
            for (column, (pixel, cluster_n)) in
                image_row.chunks_exact(4).zip(assignments_row).enumerate()
            {
                if *cluster_n == UNASSIGNED {
                    continue;
                }
                let n = *cluster_n as usize;
                num_members[n] += 1;
                acc[n][0] += row as u64;
                acc[n][1] += column as u64;
                acc[n][2] += pixel[0] as u64;
                acc[n][3] += pixel[1] as u64;
                acc[n][4] += pixel[2] as u64;
            }
        }
        (num_members, acc)
    };

    let ranges = split_length_to_ranges(image.height, params.num_threads());
    let (num_members, acc) = if ranges.len() > 1 {
        ranges.into_par_iter().map(accumulate).reduce(
            || (vec![0; num_clusters], vec![[0; 5]; num_clusters]),
            |(mut m_a, mut acc_a), (m_b, acc_b)| {
                for (a, b) in m_a.iter_mut().zip(m_b) {
                    *a += b;
                }
                for (a, b) in acc_a.iter_mut().zip(acc_b) {
                    for k in 0..5 {
                        a[k] += b[k];
                    }
                }
                (m_a, acc_a)
            },
        )
    } else {
        accumulate(0..image.height)
    };

    for cluster in clusters.clusters.iter_mut() {
        let n = cluster.number as usize;
        let members = num_members[n];
        if members == 0 {
            continue;
        }
        cluster.num_members = members;
        let m = members as u64;
        let half = m / 2;
        let mean = |v: u64| (v + half) / m;
        cluster.y = mean(acc[n][0]) as u32;
        cluster.x = mean(acc[n][1]) as u32;
        debug_assert!(
            (cluster.x as usize) < image.width && (cluster.y as usize) < image.height,
            "{:?} was updated out of bounds",
            cluster
        );
        cluster.c0 = mean(acc[n][2]) as u8;
        cluster.c1 = mean(acc[n][3]) as u8;
        cluster.c2 = mean(acc[n][4]) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::{compute_spatial_path, iterate, Clusters, SlicParams};
    use crate::arrays::{Array2D, Frame, PaddedImage};
    use crate::assign::UNASSIGNED;
    use crate::common::{ColorSpace, DistanceMetric, SlicConfig, ThreadingStrategy};

    fn two_halves(width: usize, height: usize) -> PaddedImage {
        let frame = Frame::from_fn(width, height, |x, _| {
            if x < width / 2 {
                [20, 40, 200]
            } else {
                [200, 180, 10]
            }
        })
        .unwrap();
        PaddedImage::from_bgr(frame.view(), ColorSpace::CieLab)
    }

    #[test]
    fn grid_seeding_covers_image() {
        let image = two_halves(432, 240);
        let clusters = Clusters::initialize_clusters(&image, 32);
        assert_eq!(clusters.clusters.len(), 14 * 8);
        for (i, c) in clusters.clusters.iter().enumerate() {
            assert_eq!(c.number as usize, i);
            assert!((c.x as usize) < 432 && (c.y as usize) < 240);
        }
        // image smaller than one step
        let tiny = two_halves(10, 7);
        assert_eq!(Clusters::initialize_clusters(&tiny, 32).clusters.len(), 1);
    }

    #[test]
    fn spatial_lut_is_centered() {
        let lut = compute_spatial_path(DistanceMetric::Manhattan, 10.0, 8);
        assert_eq!(lut.width, 17);
        assert_eq!(lut[(8, 8)], 0);
        assert_eq!(lut[(0, 8)], lut[(16, 8)]);
        assert!(lut[(0, 0)] > lut[(4, 4)]);
        let lut_e = compute_spatial_path(DistanceMetric::RealDistManhattanColor, 10.0, 8);
        assert!(lut_e[(0, 0)] < lut[(0, 0)]);
    }

    #[test]
    fn iterate_assigns_every_pixel_and_splits_colors() {
        let image = two_halves(128, 64);
        let config = SlicConfig {
            superpixel_size: 16,
            ..SlicConfig::default()
        };
        let params = SlicParams::from(&config);
        let mut clusters = Clusters::initialize_clusters(&image, 16);
        let mut min_distances = Array2D::from_fill(u16::MAX, 1, 1);
        iterate(&image, &params, &mut clusters, &mut min_distances);
        assert!(clusters.assignments.data.iter().all(|a| *a != UNASSIGNED));
        // no cluster straddles the color edge
        for y in 0..64 {
            let left = clusters.assignments[(63, y)];
            let right = clusters.assignments[(64, y)];
            assert_ne!(left, right, "row {y}");
        }
    }

    #[test]
    fn threading_does_not_change_result() {
        let frame = Frame::from_fn(200, 120, |x, y| {
            [(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x ^ y) % 256) as u8]
        })
        .unwrap();
        let image = PaddedImage::from_bgr(frame.view(), ColorSpace::CieLab);
        let mut results = vec![];
        for threading in [ThreadingStrategy::SingleThread, ThreadingStrategy::RowBased] {
            let config = SlicConfig {
                superpixel_size: 20,
                subsample_stride: 3,
                threading,
                ..SlicConfig::default()
            };
            let params = SlicParams::from(&config);
            let mut clusters = Clusters::initialize_clusters(&image, 20);
            let mut min_distances = Array2D::from_fill(u16::MAX, 1, 1);
            iterate(&image, &params, &mut clusters, &mut min_distances);
            results.push(clusters.assignments);
        }
        assert_eq!(results[0], results[1]);
    }
}
