//! Scroll-offset matchers.
//!
//! Each matcher scores every admissible scroll distance between the
//! previous and current frame, once per direction, and hands its score
//! curve to the shared candidate pipeline (threshold, ambiguity, sub-pixel
//! refinement, seam search, overlap bounds, seam verification).

pub(crate) mod candidate;
pub mod phase;
pub mod row_projection;
pub(crate) mod seam;
pub mod subpixel;
pub mod template;

pub(crate) use candidate::{choose_direction, MatchCandidate, MatchInput};

/// Zero-mean normalized cross-correlation of paired samples.
///
/// Returns 0.0 when either side has no variance.
pub(crate) fn ncc_pairs(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    let mut n = 0.0f64;
    let (mut sa, mut sb, mut saa, mut sbb, mut sab) = (0.0f64, 0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for (a, b) in pairs {
        n += 1.0;
        sa += a;
        sb += b;
        saa += a * a;
        sbb += b * b;
        sab += a * b;
    }
    if n < 2.0 {
        return 0.0;
    }

    let var_a = saa - sa * sa / n;
    let var_b = sbb - sb * sb / n;
    let denom = (var_a * var_b).sqrt();
    if denom < 1e-9 {
        return 0.0;
    }
    ((sab - sa * sb / n) / denom).clamp(-1.0, 1.0)
}
