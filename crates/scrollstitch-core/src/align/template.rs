//! Template matching on the equalized image.
//!
//! A `MIN_OVERLAP`-row strip from the edge of the current frame that stays
//! visible after the scroll is searched for in the previous frame.

use ndarray::{s, Array2};
use rayon::prelude::*;

use crate::consts::{MIN_OVERLAP, TEMPLATE_CROSS_MARGIN};
use crate::result::MatchAlgorithm;

use super::candidate::{from_curve, MatchCandidate, MatchInput};
use super::ncc_pairs;
use super::subpixel::refine_peak_paraboloid;

/// Template correlation at scroll distance `scroll` and cross-axis shift `dx`.
///
/// Forward: the template is the first rows of `cur`, found at row `scroll`
/// of `prev`. Backward: the template is the last rows of `cur`, found
/// `scroll` rows above its own position.
pub fn template_score(prev: &Array2<f32>, cur: &Array2<f32>, forward: bool, scroll: usize, dx: isize) -> f64 {
    let (len, cross) = prev.dim();
    let t = MIN_OVERLAP.min(len);
    let margin = TEMPLATE_CROSS_MARGIN.min(cross / 4);
    if scroll == 0 || scroll + t > len || cross <= 2 * margin {
        return 0.0;
    }
    if dx.unsigned_abs() > margin {
        return 0.0;
    }

    let (template_rows, window_start) = if forward {
        (0..t, scroll)
    } else {
        (len - t..len, len - t - scroll)
    };
    let c0 = margin;
    let c1 = cross - margin;
    let w0 = (c0 as isize + dx) as usize;
    let w1 = (c1 as isize + dx) as usize;

    let template = cur.slice(s![template_rows, c0..c1]);
    let window = prev.slice(s![window_start..window_start + t, w0..w1]);
    ncc_pairs(template.iter().zip(window.iter()).map(|(&a, &b)| (a as f64, b as f64)))
}

/// Template score for every scroll distance in `1..=max_scroll`, with
/// `NEG_INFINITY` at index 0.
pub fn score_curve(prev: &Array2<f32>, cur: &Array2<f32>, forward: bool, max_scroll: usize) -> Vec<f64> {
    let mut curve: Vec<f64> = (0..=max_scroll)
        .into_par_iter()
        .map(|s| template_score(prev, cur, forward, s, 0))
        .collect();
    if let Some(first) = curve.first_mut() {
        *first = f64::NEG_INFINITY;
    }
    curve
}

/// Sub-pixel scroll from a 3x3 grid over (scroll, cross shift).
fn refine(prev: &Array2<f32>, cur: &Array2<f32>, forward: bool, best: usize, max_scroll: usize) -> f64 {
    if best < 2 || best + 1 > max_scroll {
        return best as f64;
    }
    let grid = Array2::from_shape_fn((3, 3), |(i, j)| {
        template_score(prev, cur, forward, best + i - 1, j as isize - 1)
    });
    let (dr, _) = refine_peak_paraboloid(&grid, 1, 1);
    best as f64 + dr
}

/// Primary and secondary direction candidates.
pub(crate) fn match_template(input: &MatchInput<'_>) -> (MatchCandidate, MatchCandidate) {
    let prev = &input.prev.equalized;
    let cur = &input.cur.equalized;
    let max_scroll = input.max_scroll();

    let run = |forward: bool| {
        let curve = score_curve(prev, cur, forward, max_scroll);
        from_curve(input, MatchAlgorithm::TemplateMatching, forward, &curve, |best| {
            refine(prev, cur, forward, best, max_scroll)
        })
    };
    (run(true), run(false))
}
