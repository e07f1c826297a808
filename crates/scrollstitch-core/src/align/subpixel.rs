use ndarray::Array2;

use crate::consts::EPSILON;

/// Vertex of the parabola through three equally spaced samples around a peak.
///
/// Returns the fractional offset from the middle sample, clamped to +/- 0.5.
pub fn refine_peak_parabola(prev: f64, curr: f64, next: f64) -> f64 {
    let curvature = prev - 2.0 * curr + next;
    if curvature.abs() <= EPSILON || !curvature.is_finite() {
        return 0.0;
    }
    ((prev - next) / (2.0 * curvature)).clamp(-0.5, 0.5)
}

/// Refine a 2-D peak using paraboloid fitting on its 3x3 neighborhood.
///
/// Returns (delta_row, delta_col) as fractional offsets from the integer peak.
pub fn refine_peak_paraboloid(
    correlation: &Array2<f64>,
    peak_row: usize,
    peak_col: usize,
) -> (f64, f64) {
    let (h, w) = correlation.dim();

    // Edge peaks have no 3x3 neighborhood.
    if peak_row == 0 || peak_row + 1 >= h || peak_col == 0 || peak_col + 1 >= w {
        return (0.0, 0.0);
    }

    let delta_row = refine_peak_parabola(
        correlation[[peak_row - 1, peak_col]],
        correlation[[peak_row, peak_col]],
        correlation[[peak_row + 1, peak_col]],
    );
    let delta_col = refine_peak_parabola(
        correlation[[peak_row, peak_col - 1]],
        correlation[[peak_row, peak_col]],
        correlation[[peak_row, peak_col + 1]],
    );

    (delta_row, delta_col)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn symmetric_peak_has_no_offset() {
        assert_eq!(refine_peak_parabola(0.5, 1.0, 0.5), 0.0);
    }

    #[test]
    fn parabola_vertex_is_recovered() {
        // y = -(x - 0.25)^2 sampled at -1, 0, 1
        let f = |x: f64| -(x - 0.25) * (x - 0.25);
        assert_abs_diff_eq!(refine_peak_parabola(f(-1.0), f(0.0), f(1.0)), 0.25, epsilon = 1e-9);
    }

    #[test]
    fn paraboloid_skips_edge_peaks() {
        let grid = Array2::<f64>::ones((3, 3));
        assert_eq!(refine_peak_paraboloid(&grid, 0, 1), (0.0, 0.0));
    }
}
