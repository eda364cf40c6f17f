use crate::arrays::{Array2D, PaddedImage};
use crate::cluster::Cluster;
use crate::common::split_length_to_ranges;
use crate::slic::{Clusters, SlicParams};
use multiversion::multiversion;
use rayon::prelude::*;
use std::ops::Range;

/// Assignment of a pixel no cluster window has reached yet.
pub const UNASSIGNED: u32 = u32::MAX;

/// One horizontal band of the image with its part of the output arrays.
struct Band<'a> {
    rows: Range<usize>,
    assignments: &'a mut [u32],
    min_distances: &'a mut [u16],
}

/// This function implements the assign step in SLIC algorithm.
///
/// Only rows `subsample_start, subsample_start + stride, ...` are touched. The image is split
/// into horizontal bands (one per thread for `ThreadingStrategy::RowBased`). Every pixel is
/// decided on its own and clusters are visited in the same order in every band, so the result
/// does not depend on the number of bands.
pub fn assign(
    image: &PaddedImage,
    params: &SlicParams,
    clusters: &mut Clusters,
    min_distances: &mut Array2D<u16>,
    spatial_distance_lut: &Array2D<u16>,
    subsample_start: u8,
) {
    assert!(
        params.subsample_stride > 0,
        "Subsample stride must be higher than zero. How you want to advance by zero?"
    );
    assert_eq!(
        (min_distances.width, min_distances.height),
        (image.width, image.height)
    );
    let s = params.search_region_size;
    assert_eq!(spatial_distance_lut.width, (2 * s + 1) as usize);
    let stride = params.subsample_stride as usize;
    let start = subsample_start as usize % stride;
    let width = image.width;

    clusters
        .clusters
        .iter_mut()
        .for_each(|c| c.update_coords(image.width, image.height, s));

    let ranges = split_length_to_ranges(image.height, params.num_threads());
    let mut bands: Vec<Band> = Vec::with_capacity(ranges.len());
    let mut assignments_rest: &mut [u32] = &mut clusters.assignments.data;
    let mut min_distances_rest: &mut [u16] = &mut min_distances.data;
    for rows in ranges {
        let (assignments, a_rest) = assignments_rest.split_at_mut(rows.len() * width);
        let (band_min_distances, m_rest) = min_distances_rest.split_at_mut(rows.len() * width);
        assignments_rest = a_rest;
        min_distances_rest = m_rest;
        bands.push(Band {
            rows,
            assignments,
            min_distances: band_min_distances,
        });
    }

    let cluster_list = &clusters.clusters;
    let assign_band = |band: Band| {
        let band_clusters: Vec<&Cluster> = cluster_list
            .iter()
            .filter(|c| (c.bottom as usize > band.rows.start) && ((c.top as usize) < band.rows.end))
            .collect();
        let first = band.rows.start;
        for row in band.rows.clone().filter(|r| r % stride == start) {
            let local = (row - first) * width;
            let assignments_row = &mut band.assignments[local..local + width];
            let min_distances_row = &mut band.min_distances[local..local + width];
            min_distances_row.fill(u16::MAX);
            for cluster in band_clusters
                .iter()
                .filter(|c| (c.top as usize) <= row && row < c.bottom as usize)
            {
                let left = cluster.left as usize;
                let right = cluster.right as usize;
                let dist_row = spatial_distance_lut.get_row_part(
                    cluster.lut_row(row, s),
                    cluster.lut_left as usize,
                    cluster.lut_right as usize,
                );
                debug_assert_eq!(
                    dist_row.len(),
                    right - left + 1,
                    "Info: 2*search_region_size+1 = {}; cluster: {:?}",
                    2 * s + 1,
                    cluster
                );
                assign_row(
                    image.get_row_part(row, left, right),
                    dist_row,
                    &cluster.color(),
                    cluster.number,
                    &mut min_distances_row[left..=right],
                    &mut assignments_row[left..=right],
                );
            }
        }
    };

    if bands.len() > 1 {
        bands.into_par_iter().for_each(assign_band);
    } else {
        bands.into_iter().for_each(assign_band);
    }
}

#[multiversion(targets = "simd")]
fn assign_row(
    image_row: &[u8],
    dist_row: &[u16],
    cluster_color: &[u8; 4],
    cluster_number: u32,
    min_dist_row: &mut [u16],
    assign_row: &mut [u32],
) {
    debug_assert_eq!(image_row.len(), dist_row.len() * 4);
    for (((pixel, dist_lut), min_dist), assign) in image_row
        .chunks_exact(4)
        .zip(dist_row)
        .zip(min_dist_row.iter_mut())
        .zip(assign_row.iter_mut())
    {
        let color_dist = pixel[0].abs_diff(cluster_color[0]) as u16
            + pixel[1].abs_diff(cluster_color[1]) as u16
            + pixel[2].abs_diff(cluster_color[2]) as u16;
        let dist = color_dist.saturating_add(*dist_lut);
        if dist < *min_dist {
            *min_dist = dist;
            *assign = cluster_number;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{assign, UNASSIGNED};
    use crate::arrays::{Array2D, Frame, PaddedImage};
    use crate::common::{ColorSpace, SlicConfig};
    use crate::slic::{compute_spatial_path, Clusters, SlicParams};

    #[test]
    fn assign_test() {
        let mut config = SlicConfig::default();
        for width in (20..300usize).step_by(37) {
            for height in (20..200usize).step_by(29) {
                config.superpixel_size = ((width * height) as f32 / 150.0).sqrt().max(4.0) as u16;
                let params = SlicParams::from(&config);
                let frame = Frame::new(width, height).unwrap();
                let image = PaddedImage::from_bgr(frame.view(), ColorSpace::CieLab);
                let mut clusters =
                    Clusters::initialize_clusters(&image, params.search_region_size);
                let mut min_distances = Array2D::from_fill(0u16, width, height);
                let lut = compute_spatial_path(
                    params.distance_metric,
                    params.compactness,
                    params.search_region_size,
                );
                assign(&image, &params, &mut clusters, &mut min_distances, &lut, 0);
                let unassigned: Vec<(usize, usize)> = clusters
                    .assignments
                    .data
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| **a == UNASSIGNED)
                    .map(|(i, _)| clusters.assignments.get_x_y_index(i))
                    .collect();
                assert!(
                    unassigned.is_empty(),
                    "{width}x{height}: unassigned pixels {:?}",
                    unassigned
                );
            }
        }
    }

    #[test]
    fn subsampled_assign_touches_only_its_rows() {
        let config = SlicConfig {
            superpixel_size: 8,
            subsample_stride: 3,
            ..SlicConfig::default()
        };
        let params = SlicParams::from(&config);
        let frame = Frame::new(40, 30).unwrap();
        let image = PaddedImage::from_bgr(frame.view(), ColorSpace::CieLab);
        let mut clusters = Clusters::initialize_clusters(&image, 8);
        let mut min_distances = Array2D::from_fill(u16::MAX, 40, 30);
        let lut = compute_spatial_path(params.distance_metric, params.compactness, 8);
        assign(&image, &params, &mut clusters, &mut min_distances, &lut, 1);
        for y in 0..30 {
            let assigned = clusters.assignments.get_row(y).iter().all(|a| *a != UNASSIGNED);
            let untouched = clusters.assignments.get_row(y).iter().all(|a| *a == UNASSIGNED);
            if y % 3 == 1 {
                assert!(assigned, "row {y}");
            } else {
                assert!(untouched, "row {y}");
            }
        }
    }
}
