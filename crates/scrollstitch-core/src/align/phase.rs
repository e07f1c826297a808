//! FFT phase correlation.
//!
//! Used as the last resort in `Auto` mode: it sees the whole frame at once
//! and so survives content that defeats the profile and template matchers,
//! but it cannot tell a forward scroll from a backward one by itself. Each
//! direction is therefore scored separately on the gray image.

use ndarray::Array2;
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::consts::MIN_PEAK_SEPARATION;
use crate::result::{FailureCode, MatchAlgorithm};

use super::candidate::{below_threshold, finish, MatchCandidate, MatchInput};
use super::seam::overlap_ncc;
use super::subpixel::refine_peak_paraboloid;

/// Peak of the phase-correlation surface between two frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseShift {
    /// Circular shift along the scroll axis, `cur(y) == prev(y + rows)`.
    pub rows: f64,
    /// Circular shift across the scroll axis.
    pub cols: f64,
    /// Peak height of the normalized correlation surface.
    pub response: f64,
    /// Highest row peak further than `MIN_PEAK_SEPARATION` rows away.
    pub second_response: f64,
}

/// Locate the translation between `prev` and `cur` (same shape).
pub fn phase_shift(prev: &Array2<f32>, cur: &Array2<f32>) -> PhaseShift {
    let (h, w) = prev.dim();
    let prev_fft = fft2d(&apply_hann(prev));
    let cur_fft = fft2d(&apply_hann(cur));
    let correlation = ifft2d(&normalized_cross_power(&prev_fft, &cur_fft));

    let (peak_row, peak_col, response) = find_peak(&correlation);
    let (sub_row, sub_col) = refine_peak_paraboloid(&correlation, peak_row, peak_col);

    let row_max: Vec<f64> = correlation
        .outer_iter()
        .map(|row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .collect();
    let second_response = row_max
        .iter()
        .enumerate()
        .filter(|&(r, _)| {
            let d = r.abs_diff(peak_row);
            d.min(h - d) > MIN_PEAK_SEPARATION
        })
        .map(|(_, &v)| v)
        .fold(f64::NEG_INFINITY, f64::max);

    PhaseShift {
        rows: (peak_row as f64 + sub_row).rem_euclid(h as f64),
        cols: (peak_col as f64 + sub_col).rem_euclid(w as f64),
        response,
        second_response,
    }
}

/// Primary and secondary direction candidates.
pub(crate) fn match_phase(input: &MatchInput<'_>) -> (MatchCandidate, MatchCandidate) {
    let len = input.len();
    let shift = phase_shift(&input.prev.equalized, &input.cur.equalized);
    let config = input.config;

    let fail_both = |code: FailureCode, confidence: f64, reason: String| {
        (
            MatchCandidate::failed(
                MatchAlgorithm::PhaseCorrelation,
                input.forward,
                code,
                confidence,
                reason.clone(),
            ),
            MatchCandidate::failed(
                MatchAlgorithm::PhaseCorrelation,
                input.backward,
                code,
                confidence,
                reason,
            ),
        )
    };

    if shift.response < config.min_phase_response {
        return fail_both(
            FailureCode::OverlapMismatch,
            shift.response,
            format!(
                "phase response {:.3} below {:.3}",
                shift.response, config.min_phase_response
            ),
        );
    }
    if shift.second_response.is_finite()
        && shift.response - shift.second_response < config.ambiguity_threshold * shift.response
    {
        return fail_both(
            FailureCode::AmbiguousMatch,
            shift.response,
            format!(
                "phase peaks {:.3} and {:.3} too close",
                shift.response, shift.second_response
            ),
        );
    }

    let run = |forward: bool| {
        let refined = if forward {
            shift.rows
        } else {
            len as f64 - shift.rows
        };
        let scroll = (refined.round().max(1.0) as usize).min(len.saturating_sub(1));
        let confidence = overlap_ncc(&input.prev.gray, &input.cur.gray, forward, scroll).clamp(0.0, 1.0);
        if confidence < config.confidence_threshold {
            return below_threshold(
                MatchAlgorithm::PhaseCorrelation,
                input.direction(forward),
                confidence,
                config.confidence_threshold,
            );
        }
        finish(input, MatchAlgorithm::PhaseCorrelation, forward, refined, confidence)
    };
    (run(true), run(false))
}

fn apply_hann(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let wy: Vec<f64> = (0..h)
        .map(|r| 0.5 * (1.0 - (std::f64::consts::TAU * r as f64 / h as f64).cos()))
        .collect();
    let wx: Vec<f64> = (0..w)
        .map(|c| 0.5 * (1.0 - (std::f64::consts::TAU * c as f64 / w as f64).cos()))
        .collect();
    Array2::from_shape_fn((h, w), |(r, c)| data[[r, c]] * (wy[r] * wx[c]) as f32)
}

/// Row-wise FFT, then column-wise FFT.
fn fft2d(data: &Array2<f32>) -> Array2<Complex<f64>> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let fft_row = planner.plan_fft_forward(w);
    let fft_col = planner.plan_fft_forward(h);

    let mut result = data.mapv(|v| Complex::new(v as f64, 0.0));
    let mut buffer = Vec::with_capacity(h.max(w));

    for mut row in result.rows_mut() {
        buffer.clear();
        buffer.extend(row.iter().copied());
        fft_row.process(&mut buffer);
        row.iter_mut().zip(&buffer).for_each(|(dst, &v)| *dst = v);
    }
    for mut col in result.columns_mut() {
        buffer.clear();
        buffer.extend(col.iter().copied());
        fft_col.process(&mut buffer);
        col.iter_mut().zip(&buffer).for_each(|(dst, &v)| *dst = v);
    }

    result
}

/// Inverse 2D FFT, real part, normalized.
fn ifft2d(data: &Array2<Complex<f64>>) -> Array2<f64> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let ifft_row = planner.plan_fft_inverse(w);
    let ifft_col = planner.plan_fft_inverse(h);

    let mut work = data.clone();
    let mut buffer = Vec::with_capacity(h.max(w));

    for mut col in work.columns_mut() {
        buffer.clear();
        buffer.extend(col.iter().copied());
        ifft_col.process(&mut buffer);
        col.iter_mut().zip(&buffer).for_each(|(dst, &v)| *dst = v);
    }
    for mut row in work.rows_mut() {
        buffer.clear();
        buffer.extend(row.iter().copied());
        ifft_row.process(&mut buffer);
        row.iter_mut().zip(&buffer).for_each(|(dst, &v)| *dst = v);
    }

    let scale = 1.0 / (h * w) as f64;
    work.mapv(|v| v.re * scale)
}

fn normalized_cross_power(
    prev_fft: &Array2<Complex<f64>>,
    cur_fft: &Array2<Complex<f64>>,
) -> Array2<Complex<f64>> {
    let mut result = prev_fft.clone();
    result.zip_mut_with(cur_fft, |p, c| {
        let cross = *p * c.conj();
        let mag = cross.norm();
        *p = if mag > 1e-12 {
            cross / mag
        } else {
            Complex::new(0.0, 0.0)
        };
    });
    result
}

fn find_peak(data: &Array2<f64>) -> (usize, usize, f64) {
    let mut best = (0, 0, f64::NEG_INFINITY);
    for ((row, col), &v) in data.indexed_iter() {
        if v > best.2 {
            best = (row, col, v);
        }
    }
    best
}
