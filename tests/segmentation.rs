use std::collections::HashSet;
use superpixel_chips::arrays::{Frame, LabelMap, Mask, Rect, Size};
use superpixel_chips::common::{RealtimeSettings, SlicConfig, ThreadingStrategy};
use superpixel_chips::realtime::RealtimeSlic;
use superpixel_chips::superpixel::{SlicSuperpixel, Superpixel, SuperpixelLabels, CONTOUR};

/// Blocky BGR pattern with some texture, the kind of content SLIC splits on edges.
fn scene(width: usize, height: usize) -> Frame {
    Frame::from_fn(width, height, |x, y| {
        let block = (x / 37 + 3 * (y / 29)) % 5;
        let noise = ((x * 7 + y * 13) % 11) as u8;
        [
            (block * 50) as u8 + noise,
            (255 - block * 40) as u8 - noise,
            ((x + y) % 200) as u8,
        ]
    })
    .unwrap()
}

fn slic(size: u16, threading: ThreadingStrategy) -> SlicSuperpixel {
    SlicSuperpixel::new(SlicConfig {
        superpixel_size: size,
        threading,
        ..SlicConfig::default()
    })
    .unwrap()
}

fn check_contour_matches_labels(labels: &LabelMap, mask: &Mask) {
    assert_eq!(labels.size(), mask.size());
    for y in 0..labels.height {
        for x in 0..labels.width {
            if x + 1 < labels.width && labels[(x, y)] != labels[(x + 1, y)] {
                assert_eq!(mask[(x, y)], CONTOUR, "({x}, {y}) right");
                assert_eq!(mask[(x + 1, y)], CONTOUR, "({x}, {y}) right");
            }
            if y + 1 < labels.height && labels[(x, y)] != labels[(x, y + 1)] {
                assert_eq!(mask[(x, y)], CONTOUR, "({x}, {y}) down");
                assert_eq!(mask[(x, y + 1)], CONTOUR, "({x}, {y}) down");
            }
        }
    }
}

#[test]
fn contour_marks_every_label_change() {
    let frame = scene(300, 220);
    let mut slic = slic(24, ThreadingStrategy::RowBased);
    let mut labels = LabelMap::empty();
    let mut mask = Mask::empty();
    slic.compute(frame.view()).get_contour(&mut mask);
    slic.get_labels(&mut labels);
    check_contour_matches_labels(&labels, &mask);
    // and nothing else is marked
    let marked = mask.data.iter().filter(|m| **m == CONTOUR).count();
    assert!(marked > 0);
    assert!(mask.data.iter().all(|m| *m == 0 || *m == CONTOUR));
}

#[test]
fn count_equals_distinct_labels() {
    let frame = scene(257, 199);
    let mut labels = LabelMap::empty();
    for size in [8, 16, 32, 64] {
        let mut slic = slic(size, ThreadingStrategy::RowBased);
        let n = slic.compute(frame.view()).num_superpixels();
        slic.get_labels(&mut labels);
        let distinct: HashSet<i32> = labels.data.iter().copied().collect();
        assert_eq!(distinct.len(), n as usize, "superpixel_size {size}");
        assert_eq!(distinct, (0..n as i32).collect::<HashSet<_>>(), "superpixel_size {size}");
    }
}

#[test]
fn getters_are_idempotent() {
    let frame = scene(200, 150);
    let mut slic = slic(20, ThreadingStrategy::RowBased);
    slic.compute(frame.view());
    let (mut labels_a, mut labels_b) = (LabelMap::empty(), LabelMap::empty());
    let (mut mask_a, mut mask_b) = (Mask::empty(), Mask::empty());
    slic.get_labels(&mut labels_a);
    slic.get_contour(&mut mask_a);
    slic.get_labels(&mut labels_b);
    slic.get_contour(&mut mask_b);
    assert_eq!(labels_a, labels_b);
    assert_eq!(mask_a, mask_b);
    assert_eq!(slic.num_superpixels(), slic.num_superpixels());
}

#[test]
fn threading_does_not_change_the_result() {
    let frame = scene(331, 207);
    let mut single = slic(16, ThreadingStrategy::SingleThread);
    let mut rows = slic(16, ThreadingStrategy::RowBased);
    let (mut labels_single, mut labels_rows) = (LabelMap::empty(), LabelMap::empty());
    single.compute(frame.view()).get_labels(&mut labels_single);
    rows.compute(frame.view()).get_labels(&mut labels_rows);
    assert_eq!(labels_single, labels_rows);
    assert_eq!(single.num_superpixels(), rows.num_superpixels());
}

#[test]
fn recompute_replaces_the_result() {
    let mut slic = slic(32, ThreadingStrategy::RowBased);
    let mut labels = LabelMap::empty();
    let big = scene(400, 300);
    slic.compute(big.view()).get_labels(&mut labels);
    assert_eq!(labels.size(), Size::new(400, 300));
    slic.compute(big.roi(Rect::new(50, 60, 70, 40))).get_labels(&mut labels);
    assert_eq!(labels.size(), Size::new(70, 40));
    let n = slic.num_superpixels();
    assert!(labels.data.iter().all(|l| (0..n as i32).contains(l)));
}

#[test]
fn solid_color_432x240() {
    let frame = Frame::from_pixel(432, 240, [40, 160, 90]).unwrap();
    let mut slic = slic(32, ThreadingStrategy::RowBased);
    let mut mask = Mask::empty();
    let n = slic.compute(frame.view()).num_superpixels();
    slic.get_contour(&mut mask);
    assert!(n >= 1);
    assert_eq!(mask.size(), Size::new(432, 240));
    let all_zero = mask.data.iter().all(|m| *m == 0);
    assert_eq!(all_zero, n == 1);
}

#[test]
#[should_panic(expected = "does not match the configured")]
fn realtime_rejects_other_sizes() {
    let mut backend = RealtimeSlic::new(RealtimeSettings::default()).unwrap();
    let frame = Frame::new(431, 240).unwrap();
    backend.stage(frame.view());
}

#[test]
fn realtime_has_no_labels() {
    let mut backend = RealtimeSlic::new(RealtimeSettings::default()).unwrap();
    let frame = scene(432, 240);
    let mut contour = Frame::empty();
    backend.compute(frame.view()).get_contour(&mut contour);
    assert_eq!(contour.size(), Size::new(432, 240));
    assert!(backend.labels().is_none());
    assert!(!backend.capabilities().labels);
}

#[test]
fn realtime_contour_is_repeatable() {
    let mut backend = RealtimeSlic::new(RealtimeSettings::default()).unwrap();
    let frame = scene(432, 240);
    let (mut first, mut second) = (Frame::empty(), Frame::empty());
    backend.compute(frame.view()).get_contour(&mut first);
    backend.get_contour(&mut second);
    assert_eq!(first, second);
    backend.compute(frame.view()).get_contour(&mut second);
    assert_eq!(first, second);
}
