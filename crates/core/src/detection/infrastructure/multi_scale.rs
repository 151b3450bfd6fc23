use ndarray::ArrayView2;

use super::haar_cascade::{HaarCascade, Verdict};
use super::integral_image::IntegralImage;
use crate::detection::domain::detection_params::CascadeParams;
use crate::shared::constants::GROUP_EPS;
use crate::shared::region::Region;

/// Sliding-window cascade search over a window pyramid, followed by
/// neighbour voting.
///
/// The window grows from the cascade's native size by `scale_factor` per
/// step until it no longer fits. Windows smaller than `min_size` are skipped.
pub fn detect_multi_scale(
    cascade: &HaarCascade,
    luma: ArrayView2<'_, u8>,
    params: &CascadeParams,
) -> Vec<Region> {
    let ii = IntegralImage::new(luma);
    let candidates = collect_candidates(cascade, &ii, params);
    group_rectangles(&candidates, params.min_neighbors, GROUP_EPS)
}

/// Every accepted window, before grouping.
pub fn collect_candidates(
    cascade: &HaarCascade,
    ii: &IntegralImage,
    params: &CascadeParams,
) -> Vec<Region> {
    let mut out = Vec::new();
    if cascade.is_empty() || params.scale_factor <= 1.0 {
        return out;
    }

    let img_w = ii.width() as i32;
    let img_h = ii.height() as i32;
    let (base_w, base_h) = cascade.window_size();
    let (min_w, min_h) = (params.min_size.0 as i32, params.min_size.1 as i32);

    let mut factor = 1.0f64;
    loop {
        let win_w = (base_w as f64 * factor).round() as i32;
        let win_h = (base_h as f64 * factor).round() as i32;
        if win_w > img_w || win_h > img_h {
            break;
        }

        if win_w >= min_w && win_h >= min_h {
            let scaled = cascade.scaled(factor);
            let base_step = if factor > 2.0 { 1.0 } else { 2.0 };
            let step = ((base_step * factor).round() as i32).max(1);

            let mut y = 0;
            while y + win_h <= img_h {
                let mut x = 0;
                while x + win_w <= img_w {
                    match scaled.classify(ii, x, y) {
                        Verdict::Accepted => {
                            out.push(Region::new(x, y, win_w, win_h));
                            x += step;
                        }
                        // Rejected outright: the neighbour is unlikely too.
                        Verdict::Rejected { stage: 0 } => x += step * 2,
                        Verdict::Rejected { .. } => x += step,
                    }
                }
                y += step;
            }
        }

        factor *= params.scale_factor;
    }

    out
}

/// Clusters similar rectangles and keeps clusters with more than
/// `min_neighbors` members, averaged into one rectangle each.
///
/// With `min_neighbors == 0` the input is returned unchanged. Clusters nested
/// inside a stronger cluster are dropped.
pub fn group_rectangles(rects: &[Region], min_neighbors: u32, eps: f64) -> Vec<Region> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let labels = partition(rects, eps);
    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);

    let mut sums = vec![[0i64; 4]; n_classes];
    let mut votes = vec![0u32; n_classes];
    for (r, &label) in rects.iter().zip(&labels) {
        let s = &mut sums[label];
        s[0] += r.x as i64;
        s[1] += r.y as i64;
        s[2] += r.width as i64;
        s[3] += r.height as i64;
        votes[label] += 1;
    }

    let averaged: Vec<Region> = sums
        .iter()
        .zip(&votes)
        .map(|(s, &n)| {
            let inv = 1.0 / n as f64;
            Region::new(
                (s[0] as f64 * inv).round() as i32,
                (s[1] as f64 * inv).round() as i32,
                (s[2] as f64 * inv).round() as i32,
                (s[3] as f64 * inv).round() as i32,
            )
        })
        .collect();

    let mut kept = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = votes[i];
        if n1 <= min_neighbors {
            continue;
        }
        let swallowed = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = votes[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !swallowed {
            kept.push(*r1);
        }
    }
    kept
}

fn is_similar(a: &Region, b: &Region, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    ((a.x - b.x).abs() as f64) <= delta
        && ((a.y - b.y).abs() as f64) <= delta
        && ((a.right() - b.right()).abs() as f64) <= delta
        && ((a.bottom() - b.bottom()).abs() as f64) <= delta
}

/// Union-find over the similarity relation; returns dense class labels.
fn partition(rects: &[Region], eps: f64) -> Vec<usize> {
    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if is_similar(&rects[i], &rects[j], eps) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut label_of_root = vec![usize::MAX; n];
    let mut next = 0;
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let root = find(&mut parent, i);
        if label_of_root[root] == usize::MAX {
            label_of_root[root] = next;
            next += 1;
        }
        labels.push(label_of_root[root]);
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::infrastructure::haar_cascade::fixtures::edge_cascade;
    use ndarray::Array2;
    use rstest::rstest;

    fn params(min_neighbors: u32, min_size: (u32, u32)) -> CascadeParams {
        CascadeParams {
            scale_factor: 1.1,
            min_neighbors,
            min_size,
        }
    }

    fn top_bright(width: usize, height: usize, edge_row: usize) -> Array2<u8> {
        Array2::from_shape_fn((height, width), |(y, _)| if y < edge_row { 255 } else { 0 })
    }

    #[test]
    fn test_flat_image_yields_nothing() {
        let luma = Array2::<u8>::from_elem((40, 40), 90);
        let found = detect_multi_scale(&edge_cascade(), luma.view(), &params(0, (1, 1)));
        assert!(found.is_empty());
    }

    #[test]
    fn test_candidates_straddle_the_edge() {
        let luma = top_bright(40, 40, 20);
        let ii = IntegralImage::new(luma.view());
        let found = collect_candidates(&edge_cascade(), &ii, &params(0, (1, 1)));
        assert!(!found.is_empty());
        for r in &found {
            assert!(r.y < 20 && r.bottom() > 20, "{r:?} does not cross the edge");
        }
    }

    #[test]
    fn test_candidates_fit_inside_image() {
        let luma = top_bright(37, 29, 14);
        let ii = IntegralImage::new(luma.view());
        for r in collect_candidates(&edge_cascade(), &ii, &params(0, (1, 1))) {
            assert!(Region::new(0, 0, 37, 29).contains(&r));
        }
    }

    #[test]
    fn test_min_size_skips_small_windows() {
        let luma = top_bright(40, 40, 20);
        let ii = IntegralImage::new(luma.view());
        let found = collect_candidates(&edge_cascade(), &ii, &params(0, (12, 12)));
        assert!(!found.is_empty());
        assert!(found.iter().all(|r| r.width >= 12 && r.height >= 12));
    }

    #[test]
    fn test_window_larger_than_image_yields_nothing() {
        let luma = top_bright(5, 5, 2);
        let found = detect_multi_scale(&edge_cascade(), luma.view(), &params(0, (1, 1)));
        assert!(found.is_empty());
    }

    #[test]
    fn test_scale_factor_not_above_one_yields_nothing() {
        let luma = top_bright(40, 40, 20);
        let p = CascadeParams {
            scale_factor: 1.0,
            ..params(0, (1, 1))
        };
        assert!(detect_multi_scale(&edge_cascade(), luma.view(), &p).is_empty());
    }

    // ── Grouping ─────────────────────────────────────────────────────

    #[test]
    fn test_group_zero_neighbors_passthrough() {
        let rects = vec![Region::new(0, 0, 10, 10), Region::new(50, 50, 10, 10)];
        assert_eq!(group_rectangles(&rects, 0, GROUP_EPS), rects);
    }

    #[test]
    fn test_group_averages_cluster() {
        let rects = vec![
            Region::new(10, 10, 100, 100),
            Region::new(12, 10, 100, 100),
            Region::new(14, 10, 100, 100),
        ];
        let grouped = group_rectangles(&rects, 2, GROUP_EPS);
        assert_eq!(grouped, vec![Region::new(12, 10, 100, 100)]);
    }

    #[rstest]
    #[case::below_threshold(3, 3, 0)]
    #[case::above_threshold(4, 3, 1)]
    #[case::exactly_one_more(6, 5, 1)]
    #[case::stricter(6, 55, 0)]
    fn test_group_requires_more_than_min_neighbors(
        #[case] count: i32,
        #[case] min_neighbors: u32,
        #[case] expected: usize,
    ) {
        let rects: Vec<Region> = (0..count).map(|i| Region::new(100 + i, 100, 50, 50)).collect();
        assert_eq!(group_rectangles(&rects, min_neighbors, GROUP_EPS).len(), expected);
    }

    #[test]
    fn test_group_keeps_separate_clusters() {
        let mut rects = Vec::new();
        for i in 0..4 {
            rects.push(Region::new(i, 0, 40, 40));
            rects.push(Region::new(200 + i, 200, 40, 40));
        }
        assert_eq!(group_rectangles(&rects, 2, GROUP_EPS).len(), 2);
    }

    #[test]
    fn test_group_drops_weak_cluster_nested_in_strong_one() {
        let mut rects = Vec::new();
        for i in 0..10 {
            rects.push(Region::new(i % 2, 0, 100, 100));
        }
        for i in 0..3 {
            rects.push(Region::new(30 + i % 2, 30, 20, 20));
        }
        let grouped = group_rectangles(&rects, 1, GROUP_EPS);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].width, 100);
    }

    #[test]
    fn test_partition_labels_are_dense() {
        let rects = vec![
            Region::new(0, 0, 10, 10),
            Region::new(100, 100, 10, 10),
            Region::new(1, 0, 10, 10),
        ];
        assert_eq!(partition(&rects, GROUP_EPS), vec![0, 1, 0]);
    }
}
