//! Seam geometry, seam search and multi-block seam verification.

use std::ops::Range;

use ndarray::{s, Array2};

use crate::consts::{CANVAS_COMPARE_STRIDE, SEAM_BAND_ROWS, SEAM_BLOCKS, SEAM_BLOCK_MAX_DIFF};

use super::ncc_pairs;

/// Rows of the previous and current frame that show the same content when
/// the content moved by `scroll` rows.
///
/// Forward: `cur[r] == prev[r + scroll]`. Backward: `cur[r + scroll] == prev[r]`.
pub(crate) fn overlap_rows(len: usize, scroll: usize, forward: bool) -> (Range<usize>, Range<usize>) {
    let overlap = len - scroll;
    if forward {
        (scroll..len, 0..overlap)
    } else {
        (0..overlap, scroll..len)
    }
}

/// Overlap rows adjacent to the stitch boundary.
fn seam_rows(len: usize, scroll: usize, forward: bool) -> (Range<usize>, Range<usize>) {
    let overlap = len - scroll;
    let band = SEAM_BAND_ROWS.min(overlap);
    if forward {
        (len - band..len, overlap - band..overlap)
    } else {
        (0..band, scroll..scroll + band)
    }
}

/// Mean absolute difference across the seam band.
pub(crate) fn seam_difference(prev: &Array2<f32>, cur: &Array2<f32>, forward: bool, scroll: usize) -> f64 {
    let (pr, cr) = seam_rows(prev.nrows(), scroll, forward);
    let a = prev.slice(s![pr, ..]);
    let b = cur.slice(s![cr, ..]);
    if a.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = a.iter().zip(b.iter()).map(|(&x, &y)| (x - y).abs() as f64).sum();
    sum / a.len() as f64
}

/// Choose among the rounded refined offset and its two neighbours the one
/// with the smallest seam difference.
pub(crate) fn seam_search(prev: &Array2<f32>, cur: &Array2<f32>, forward: bool, refined: f64) -> usize {
    let len = prev.nrows();
    if len < 2 {
        return 1;
    }
    let center = (refined.round().max(1.0) as usize).min(len - 1);

    let mut best = center;
    let mut best_diff = seam_difference(prev, cur, forward, center);
    for candidate in [center.saturating_sub(1), center + 1] {
        if candidate == 0 || candidate >= len {
            continue;
        }
        let diff = seam_difference(prev, cur, forward, candidate);
        if diff < best_diff {
            best = candidate;
            best_diff = diff;
        }
    }
    best
}

/// Split the seam band into cross-axis blocks and count the blocks whose
/// mean absolute difference is too high. Returns (bad, total).
pub(crate) fn verify_blocks(prev: &Array2<f32>, cur: &Array2<f32>, forward: bool, scroll: usize) -> (usize, usize) {
    let (pr, cr) = seam_rows(prev.nrows(), scroll, forward);
    let width = prev.ncols();
    let blocks = SEAM_BLOCKS.min(width);
    if blocks == 0 || pr.is_empty() {
        return (0, 0);
    }

    let mut bad = 0;
    for block in 0..blocks {
        let c0 = block * width / blocks;
        let c1 = (block + 1) * width / blocks;
        let a = prev.slice(s![pr.clone(), c0..c1]);
        let b = cur.slice(s![cr.clone(), c0..c1]);
        let sum: f64 = a.iter().zip(b.iter()).map(|(&x, &y)| (x - y).abs() as f64).sum();
        if sum / a.len().max(1) as f64 > SEAM_BLOCK_MAX_DIFF {
            bad += 1;
        }
    }
    (bad, blocks)
}

/// Normalized cross-correlation of the full overlap at an integer scroll,
/// sampled on a `CANVAS_COMPARE_STRIDE` grid.
pub(crate) fn overlap_ncc(prev: &Array2<f32>, cur: &Array2<f32>, forward: bool, scroll: usize) -> f64 {
    let len = prev.nrows();
    if scroll == 0 || scroll >= len {
        return 0.0;
    }
    let (pr, cr) = overlap_rows(len, scroll, forward);
    let a = prev.slice(s![pr; CANVAS_COMPARE_STRIDE, ..;CANVAS_COMPARE_STRIDE]);
    let b = cur.slice(s![cr; CANVAS_COMPARE_STRIDE, ..;CANVAS_COMPARE_STRIDE]);
    ncc_pairs(a.iter().zip(b.iter()).map(|(&x, &y)| (x as f64, y as f64)))
}
