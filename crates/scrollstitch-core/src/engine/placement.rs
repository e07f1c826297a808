//! Canvas placement of a matched frame: growth, in-place relocation and
//! the windowed duplicate check.

use ndarray::{s, ArrayView2};
use rayon::prelude::*;
use tracing::debug;

use crate::align::ncc_pairs;
use crate::align::row_projection::{row_profile, row_profile_view};
use crate::align::MatchCandidate;
use crate::consts::{
    CANVAS_COMPARE_STRIDE, DUPLICATE_MAX_DIFF, DUPLICATE_MIN_STD, DUPLICATE_WINDOW_FRAMES,
    IN_PLACE_MAX_DIFF, IN_PLACE_RADIUS,
};
use crate::error::Result;
use crate::frame::ScrollDirection;
use crate::preprocess::luminance;
use crate::result::FailureCode;

use super::AlignmentEngine;

/// Where a matched frame ended up. `y` is the new viewport position.
pub(super) enum Placement {
    Grew { forward: bool, rows: usize, y: usize },
    InPlace { y: usize },
    Rejected(FailureCode, String),
}

impl AlignmentEngine {
    pub(super) fn place(&mut self, candidate: &MatchCandidate) -> Result<Placement> {
        let h = self.current.axis_len();
        let valid = self.canvas.len();
        let forward = candidate.direction.is_forward();
        let y = self.viewport.y as isize;
        let scroll = candidate.scroll as isize;
        let predicted = if forward { y + scroll } else { y - scroll };

        if forward && predicted as usize + h > valid {
            self.grow(true, predicted as usize + h - valid)
        } else if !forward && predicted < 0 {
            self.grow(false, predicted.unsigned_abs())
        } else {
            Ok(self.locate_in_place(predicted as usize, candidate.direction))
        }
    }

    /// Extend the canvas by `rows` rows of the current frame.
    fn grow(&mut self, forward: bool, rows: usize) -> Result<Placement> {
        let h = self.current.axis_len();
        let valid = self.canvas.len();
        let limit = self.axis_limit(self.canvas.cross());
        if valid + rows > limit {
            return Ok(Placement::Rejected(
                FailureCode::MaxSizeReached,
                format!("growing to {} rows exceeds the limit of {limit}", valid + rows),
            ));
        }

        let strip = if forward { h - rows..h } else { 0..rows };
        if self.config.use_windowed_duplicate_check {
            if let Some(at) = self.find_duplicate(self.current.gray.slice(s![strip.clone(), ..]), forward) {
                return Ok(Placement::Rejected(
                    FailureCode::DuplicateDetected,
                    format!("new content repeats canvas rows from {at}"),
                ));
            }
        }

        let block = self.current.color.slice(s![strip, .., ..]);
        if forward {
            self.canvas.append(block)?;
            Ok(Placement::Grew {
                forward,
                rows,
                y: valid + rows - h,
            })
        } else {
            self.canvas.prepend(block)?;
            Ok(Placement::Grew { forward, rows, y: 0 })
        }
    }

    /// The frame lies inside the stitched area: find where.
    fn locate_in_place(&self, predicted: usize, direction: ScrollDirection) -> Placement {
        let h = self.current.axis_len();
        let Some(max_y) = self.canvas.len().checked_sub(h) else {
            return Placement::Rejected(
                FailureCode::ViewportMismatch,
                "canvas is shorter than the frame".into(),
            );
        };

        let mut best: Option<(usize, f64)> = None;
        for center in [predicted, self.viewport.y] {
            let lo = center.saturating_sub(IN_PLACE_RADIUS).min(max_y);
            let hi = (center + IN_PLACE_RADIUS).min(max_y);
            for y in lo..=hi {
                let diff = self.canvas_difference(y);
                if best.map_or(true, |(_, d)| diff < d) {
                    best = Some((y, diff));
                }
            }
        }

        if let Some((y, diff)) = best {
            if diff <= IN_PLACE_MAX_DIFF {
                return Placement::InPlace { y };
            }
        }

        if self.last_direction != Some(direction) {
            if let Some(y) = self.global_search(max_y) {
                debug!(y, "In-place match found by global search");
                return Placement::InPlace { y };
            }
        }

        let diff = best.map_or(f64::INFINITY, |(_, d)| d);
        Placement::Rejected(
            FailureCode::ViewportMismatch,
            format!("no canvas position near row {predicted} matches (best difference {diff:.3})"),
        )
    }

    /// Correlate row-gradient profiles over the whole canvas, then confirm
    /// the best position pixel-wise.
    fn global_search(&self, max_y: usize) -> Option<usize> {
        let h = self.current.axis_len();
        if h < 3 {
            return None;
        }
        let frame_profile = gradient_profile(self.current.gray.view());
        let canvas_gray = self.canvas.gray_rows(0, self.canvas.len());
        let canvas_profile = gradient_profile(canvas_gray.view());
        let span = frame_profile.len();

        let (y, score) = (0..=max_y)
            .into_par_iter()
            .map(|y| {
                let window = &canvas_profile[y..y + span];
                let score = ncc_pairs(frame_profile.iter().copied().zip(window.iter().copied()));
                (y, score)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))?;

        let diff = self.canvas_difference(y);
        debug!(y, score, diff, "Global in-place candidate");
        (diff <= IN_PLACE_MAX_DIFF).then_some(y)
    }

    /// Mean absolute difference between the current frame and the canvas
    /// rows starting at `y`, on a `CANVAS_COMPARE_STRIDE` grid.
    fn canvas_difference(&self, y: usize) -> f64 {
        let h = self.current.axis_len();
        let rows = self.canvas.rows(y, y + h);
        let gray = &self.current.gray;
        let (n, cross, _) = rows.dim();

        let mut sum = 0.0f64;
        let mut count = 0usize;
        for r in (0..n).step_by(CANVAS_COMPARE_STRIDE) {
            for c in (0..cross).step_by(CANVAS_COMPARE_STRIDE) {
                let canvas = luminance(rows[[r, c, 0]], rows[[r, c, 1]], rows[[r, c, 2]]);
                sum += (canvas - gray[[r, c]]).abs() as f64;
                count += 1;
            }
        }
        if count == 0 {
            return f64::INFINITY;
        }
        sum / count as f64
    }

    /// Search the new strip in the canvas window it is about to extend.
    /// Returns the canvas row where the repeated content starts.
    fn find_duplicate(&self, strip: ArrayView2<'_, f32>, forward: bool) -> Option<usize> {
        let n = strip.nrows();
        if n < 8 || std_dev(strip) < DUPLICATE_MIN_STD {
            return None;
        }

        let valid = self.canvas.len();
        let window = (DUPLICATE_WINDOW_FRAMES * self.current.axis_len()).min(valid);
        if window < n {
            return None;
        }
        let start = if forward { valid - window } else { 0 };
        let canvas_gray = self.canvas.gray_rows(start, start + window);
        let strip_profile = row_profile_view(strip);
        let window_profile = row_profile(&canvas_gray);
        let threshold = self.config.duplicate_threshold;

        (0..=window - n)
            .into_par_iter()
            .find_first(|&o| {
                let candidate = window_profile.slice(s![o..o + n, ..]);
                let score = ncc_pairs(
                    strip_profile
                        .iter()
                        .copied()
                        .zip(candidate.iter().copied()),
                );
                score >= threshold
                    && mean_abs_diff(strip, canvas_gray.slice(s![o..o + n, ..])) <= DUPLICATE_MAX_DIFF
            })
            .map(|o| start + o)
    }
}

/// Row-to-row change of the mean row intensity.
fn gradient_profile(gray: ArrayView2<'_, f32>) -> Vec<f64> {
    let means: Vec<f64> = gray
        .outer_iter()
        .map(|row| row.mean().unwrap_or(0.0) as f64)
        .collect();
    means.windows(2).map(|w| w[1] - w[0]).collect()
}

fn std_dev(values: ArrayView2<'_, f32>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let var = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    var.sqrt()
}

fn mean_abs_diff(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y).abs() as f64)
        .sum();
    sum / a.len().max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StitchConfig;
    use crate::frame::{CaptureMode, Frame};
    use crate::preprocess::prepare_into;
    use image::{imageops, Rgb, RgbImage};
    use ndarray::Array2;

    fn page(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let mut h = ((y as u64) << 20 | x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            h ^= h >> 29;
            h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
            h ^= h >> 32;
            Rgb([h as u8, (h >> 8) as u8, (h >> 16) as u8])
        })
    }

    fn rows(page: &RgbImage, top: u32, height: u32) -> Frame {
        Frame::from_rgb(imageops::crop_imm(page, 0, top, page.width(), height).to_image())
    }

    /// Canvas of page rows 0..500, viewport at row 300, last scroll `Down`.
    fn scrolled_engine(page: &RgbImage) -> AlignmentEngine {
        let mut engine = AlignmentEngine::new(StitchConfig::default());
        engine.start(&rows(page, 0, 200)).unwrap();
        assert!(engine.add_frame(&rows(page, 150, 200)).unwrap().success);
        assert!(engine.add_frame(&rows(page, 300, 200)).unwrap().success);
        assert_eq!(engine.viewport.y, 300);
        engine
    }

    #[test]
    fn reversal_falls_back_to_global_search() {
        let page = page(160, 600);
        let mut engine = scrolled_engine(&page);
        prepare_into(&mut engine.current, &rows(&page, 120, 200), CaptureMode::Vertical);

        // Neither row 40 nor the viewport at 300 is within reach of row 120.
        assert!(matches!(
            engine.locate_in_place(40, ScrollDirection::Up),
            Placement::InPlace { y: 120 }
        ));
    }

    #[test]
    fn missed_prediction_without_reversal_is_a_viewport_mismatch() {
        let page = page(160, 600);
        let mut engine = scrolled_engine(&page);
        prepare_into(&mut engine.current, &rows(&page, 120, 200), CaptureMode::Vertical);

        assert!(matches!(
            engine.locate_in_place(40, ScrollDirection::Down),
            Placement::Rejected(FailureCode::ViewportMismatch, _)
        ));
    }

    #[test]
    fn prediction_within_the_radius_is_refined() {
        let page = page(160, 600);
        let mut engine = scrolled_engine(&page);
        prepare_into(&mut engine.current, &rows(&page, 120, 200), CaptureMode::Vertical);

        assert!(matches!(
            engine.locate_in_place(114, ScrollDirection::Down),
            Placement::InPlace { y: 120 }
        ));
    }

    #[test]
    fn frame_longer_than_the_canvas_is_a_viewport_mismatch() {
        let page = page(160, 600);
        let mut engine = scrolled_engine(&page);
        prepare_into(&mut engine.current, &rows(&page, 0, 560), CaptureMode::Vertical);

        assert!(matches!(
            engine.locate_in_place(0, ScrollDirection::Up),
            Placement::Rejected(FailureCode::ViewportMismatch, _)
        ));
    }

    #[test]
    fn gradient_profile_of_a_ramp_is_flat() {
        let gray = Array2::from_shape_fn((5, 3), |(r, _)| r as f32 * 0.1);
        let profile = gradient_profile(gray.view());
        assert_eq!(profile.len(), 4);
        assert!(profile.iter().all(|&d| (d - 0.1).abs() < 1e-6));
    }

    #[test]
    fn flat_strip_has_no_spread() {
        let gray = Array2::<f32>::from_elem((10, 10), 0.4);
        assert!(std_dev(gray.view()) < 1e-9);
    }
}
