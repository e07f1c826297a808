//! Row-projection matching.
//!
//! Each row is reduced to `PROFILE_BANDS` cross-axis band means; the scroll
//! distance is the one whose overlapping profiles correlate best.

use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;

use crate::consts::PROFILE_BANDS;
use crate::result::MatchAlgorithm;

use super::candidate::{from_curve, MatchCandidate, MatchInput};
use super::ncc_pairs;
use super::seam::overlap_rows;
use super::subpixel::refine_peak_parabola;

/// Per-row band means, shape = (rows, bands).
pub fn row_profile(gray: &Array2<f32>) -> Array2<f64> {
    row_profile_view(gray.view())
}

pub(crate) fn row_profile_view(gray: ArrayView2<'_, f32>) -> Array2<f64> {
    let (rows, cols) = gray.dim();
    let bands = PROFILE_BANDS.min(cols).max(1);
    let mut profile = Array2::<f64>::zeros((rows, bands));
    if cols == 0 {
        return profile;
    }

    for (r, row) in gray.outer_iter().enumerate() {
        for band in 0..bands {
            let c0 = band * cols / bands;
            let c1 = ((band + 1) * cols / bands).max(c0 + 1);
            let sum: f32 = row.slice(s![c0..c1]).sum();
            profile[[r, band]] = sum as f64 / (c1 - c0) as f64;
        }
    }
    profile
}

/// Correlation of the overlapping profiles for a single scroll distance.
pub fn profile_score(prev: &Array2<f64>, cur: &Array2<f64>, forward: bool, scroll: usize) -> f64 {
    let len = prev.nrows();
    if scroll == 0 || scroll >= len {
        return 0.0;
    }
    let (pr, cr) = overlap_rows(len, scroll, forward);
    let a = prev.slice(s![pr, ..]);
    let b = cur.slice(s![cr, ..]);
    ncc_pairs(a.iter().zip(b.iter()).map(|(&x, &y)| (x, y)))
}

/// Score every scroll distance in `1..=max_scroll`. Index 0 is never a
/// candidate and holds `NEG_INFINITY`.
pub fn score_curve(prev: &Array2<f64>, cur: &Array2<f64>, forward: bool, max_scroll: usize) -> Vec<f64> {
    let mut curve: Vec<f64> = (0..=max_scroll)
        .into_par_iter()
        .map(|s| profile_score(prev, cur, forward, s))
        .collect();
    if let Some(first) = curve.first_mut() {
        *first = f64::NEG_INFINITY;
    }
    curve
}

/// Primary and secondary direction candidates.
pub(crate) fn match_rows(input: &MatchInput<'_>) -> (MatchCandidate, MatchCandidate) {
    let prev = row_profile(&input.prev.gray);
    let cur = row_profile(&input.cur.gray);
    let max_scroll = input.max_scroll();

    let run = |forward: bool| {
        let curve = score_curve(&prev, &cur, forward, max_scroll);
        from_curve(input, MatchAlgorithm::RowProjection, forward, &curve, |best| {
            refine_on_curve(&curve, best)
        })
    };
    (run(true), run(false))
}

/// Parabolic refinement of a curve peak; falls back to the integer peak
/// when a neighbour is missing.
pub(crate) fn refine_on_curve(curve: &[f64], best: usize) -> f64 {
    if best == 0 || best + 1 >= curve.len() {
        return best as f64;
    }
    let (l, c, r) = (curve[best - 1], curve[best], curve[best + 1]);
    if !l.is_finite() || !r.is_finite() {
        return best as f64;
    }
    best as f64 + refine_peak_parabola(l, c, r)
}
