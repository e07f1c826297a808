use crate::config::StitchConfig;
use crate::consts::{
    max_overlap, DIRECTION_MARGIN, MIN_OVERLAP, MIN_PEAK_SEPARATION, MISMATCH_FLOOR,
    SEAM_BLOCK_PENALTY,
};
use crate::frame::ScrollDirection;
use crate::preprocess::FrameCache;
use crate::result::{FailureCode, MatchAlgorithm};

use super::seam;

/// The frame pair being matched.
pub(crate) struct MatchInput<'a> {
    pub prev: &'a FrameCache,
    pub cur: &'a FrameCache,
    pub config: &'a StitchConfig,
    pub forward: ScrollDirection,
    pub backward: ScrollDirection,
}

impl MatchInput<'_> {
    /// Frame length along the scroll axis.
    pub fn len(&self) -> usize {
        self.prev.axis_len()
    }

    /// Largest scroll that still leaves `MIN_OVERLAP` rows shared.
    pub fn max_scroll(&self) -> usize {
        self.len().saturating_sub(MIN_OVERLAP)
    }

    pub fn direction(&self, forward: bool) -> ScrollDirection {
        if forward {
            self.forward
        } else {
            self.backward
        }
    }
}

/// One algorithm's verdict for one direction.
#[derive(Clone, Debug)]
pub(crate) struct MatchCandidate {
    pub confidence: f64,
    pub overlap: usize,
    pub scroll: usize,
    pub offset: f64,
    pub direction: ScrollDirection,
    pub algorithm: MatchAlgorithm,
    pub failure: FailureCode,
    pub reason: String,
}

impl MatchCandidate {
    pub fn failed(
        algorithm: MatchAlgorithm,
        direction: ScrollDirection,
        failure: FailureCode,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
            overlap: 0,
            scroll: 0,
            offset: 0.0,
            direction,
            algorithm,
            failure,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure == FailureCode::None
    }

    /// Whether this verdict ends the `Auto` fallback chain: a success, or a
    /// confident failure that another algorithm would not overturn.
    pub fn is_decisive(&self) -> bool {
        self.is_success()
            || matches!(
                self.failure,
                FailureCode::AmbiguousMatch
                    | FailureCode::ScrollTooSmall
                    | FailureCode::OverlapTooSmall
            )
    }
}

/// Failure for a best score under the confidence threshold.
pub(crate) fn below_threshold(
    algorithm: MatchAlgorithm,
    direction: ScrollDirection,
    score: f64,
    threshold: f64,
) -> MatchCandidate {
    if score < MISMATCH_FLOOR {
        MatchCandidate::failed(
            algorithm,
            direction,
            FailureCode::OverlapMismatch,
            score,
            format!("no shared content (best score {score:.3})"),
        )
    } else {
        MatchCandidate::failed(
            algorithm,
            direction,
            FailureCode::LowConfidence,
            score,
            format!("best score {score:.3} below threshold {threshold:.3}"),
        )
    }
}

/// Index of the highest finite score.
pub(crate) fn peak(curve: &[f64]) -> Option<usize> {
    curve
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// Highest score outside the lobe of the peak at `best`.
///
/// The lobe extends while scores keep falling away from the peak, and is
/// always at least `MIN_PEAK_SEPARATION` wide on each side.
pub(crate) fn competing_peak(curve: &[f64], best: usize) -> Option<f64> {
    let mut left = best;
    while left > 0 && curve[left - 1].is_finite() && curve[left - 1] <= curve[left] {
        left -= 1;
    }
    let mut right = best;
    while right + 1 < curve.len() && curve[right + 1].is_finite() && curve[right + 1] <= curve[right] {
        right += 1;
    }
    let left = left.min(best.saturating_sub(MIN_PEAK_SEPARATION));
    let right = right.max(best + MIN_PEAK_SEPARATION);

    curve
        .iter()
        .enumerate()
        .filter(|&(i, v)| (i < left || i > right) && v.is_finite())
        .map(|(_, &v)| v)
        .max_by(f64::total_cmp)
}

/// Run the shared candidate pipeline over a score curve indexed by scroll
/// distance. `refine` maps the integer peak to a sub-pixel scroll.
pub(crate) fn from_curve(
    input: &MatchInput<'_>,
    algorithm: MatchAlgorithm,
    forward: bool,
    curve: &[f64],
    refine: impl FnOnce(usize) -> f64,
) -> MatchCandidate {
    let direction = input.direction(forward);
    let threshold = input.config.confidence_threshold;

    let Some(best) = peak(curve) else {
        return MatchCandidate::failed(
            algorithm,
            direction,
            FailureCode::NoAlgorithmSucceeded,
            0.0,
            "frame too short to score any offset",
        );
    };

    let score = curve[best].clamp(0.0, 1.0);
    if score < threshold {
        return below_threshold(algorithm, direction, score, threshold);
    }

    if let Some(second) = competing_peak(curve, best) {
        if second >= threshold && score - second < input.config.ambiguity_threshold {
            return MatchCandidate::failed(
                algorithm,
                direction,
                FailureCode::AmbiguousMatch,
                score,
                format!("competing offsets score {score:.3} and {second:.3}"),
            );
        }
    }

    finish(input, algorithm, forward, refine(best), score)
}

/// Seam search, overlap bounds and multi-block seam verification for a
/// refined scroll distance.
pub(crate) fn finish(
    input: &MatchInput<'_>,
    algorithm: MatchAlgorithm,
    forward: bool,
    refined: f64,
    confidence: f64,
) -> MatchCandidate {
    let direction = input.direction(forward);
    let threshold = input.config.confidence_threshold;
    let len = input.len();
    let prev = &input.prev.gray;
    let cur = &input.cur.gray;

    let scroll = seam::seam_search(prev, cur, forward, refined);
    let overlap = len - scroll;

    if overlap < MIN_OVERLAP {
        return MatchCandidate::failed(
            algorithm,
            direction,
            FailureCode::OverlapTooSmall,
            confidence,
            format!("overlap {overlap}px below minimum {MIN_OVERLAP}px"),
        );
    }
    let max = max_overlap(len);
    if overlap > max {
        return MatchCandidate::failed(
            algorithm,
            direction,
            FailureCode::ScrollTooSmall,
            confidence,
            format!("scroll of {scroll}px leaves overlap {overlap}px above maximum {max}px"),
        );
    }

    let (bad, total) = seam::verify_blocks(prev, cur, forward, scroll);
    if total > 0 && bad == total {
        return MatchCandidate::failed(
            algorithm,
            direction,
            FailureCode::OverlapMismatch,
            confidence,
            format!("all {total} seam blocks misaligned"),
        );
    }
    let confidence = (confidence * SEAM_BLOCK_PENALTY.powi(bad as i32)).clamp(0.0, 1.0);
    if confidence < threshold {
        return MatchCandidate::failed(
            algorithm,
            direction,
            FailureCode::LowConfidence,
            confidence,
            format!("{bad} of {total} seam blocks misaligned, confidence {confidence:.3}"),
        );
    }

    MatchCandidate {
        confidence,
        overlap,
        scroll,
        offset: refined,
        direction,
        algorithm,
        failure: FailureCode::None,
        reason: String::new(),
    }
}

/// Direction hysteresis between an algorithm's primary and secondary
/// candidates.
pub(crate) fn choose_direction(
    primary: MatchCandidate,
    secondary: MatchCandidate,
    last: Option<ScrollDirection>,
) -> MatchCandidate {
    match (primary.is_success(), secondary.is_success()) {
        (true, true) => {
            if secondary.confidence > primary.confidence + DIRECTION_MARGIN {
                secondary
            } else if last == Some(secondary.direction)
                && secondary.confidence + DIRECTION_MARGIN >= primary.confidence
            {
                secondary
            } else {
                primary
            }
        }
        (true, false) => primary,
        (false, true) => secondary,
        (false, false) => {
            if secondary.confidence > primary.confidence {
                secondary
            } else {
                primary
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(direction: ScrollDirection, confidence: f64) -> MatchCandidate {
        MatchCandidate {
            confidence,
            overlap: 100,
            scroll: 50,
            offset: 50.0,
            direction,
            algorithm: MatchAlgorithm::RowProjection,
            failure: FailureCode::None,
            reason: String::new(),
        }
    }

    #[test]
    fn competing_peak_skips_the_main_lobe() {
        let curve = [f64::NEG_INFINITY, 0.1, 0.4, 0.9, 1.0, 0.8, 0.2, 0.3, 0.6, 0.1];
        assert_eq!(competing_peak(&curve, 4), Some(0.6));
    }

    #[test]
    fn periodic_curve_has_a_strong_competitor() {
        let curve: Vec<f64> = (0..60)
            .map(|i| if i == 0 { f64::NEG_INFINITY } else { ((i as f64) * std::f64::consts::TAU / 20.0).cos() })
            .collect();
        let best = peak(&curve).unwrap();
        let second = competing_peak(&curve, best).unwrap();
        assert!((curve[best] - second).abs() < 1e-9);
    }

    #[test]
    fn hysteresis_prefers_primary_within_margin() {
        let chosen = choose_direction(
            success(ScrollDirection::Down, 0.80),
            success(ScrollDirection::Up, 0.90),
            None,
        );
        assert_eq!(chosen.direction, ScrollDirection::Down);
    }

    #[test]
    fn hysteresis_switches_on_clear_margin() {
        let chosen = choose_direction(
            success(ScrollDirection::Down, 0.72),
            success(ScrollDirection::Up, 0.95),
            None,
        );
        assert_eq!(chosen.direction, ScrollDirection::Up);
    }

    #[test]
    fn hysteresis_keeps_the_last_direction() {
        let chosen = choose_direction(
            success(ScrollDirection::Down, 0.90),
            success(ScrollDirection::Up, 0.85),
            Some(ScrollDirection::Up),
        );
        assert_eq!(chosen.direction, ScrollDirection::Up);
    }
}
