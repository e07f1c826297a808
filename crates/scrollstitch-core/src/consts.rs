/// Minimum overlap (in pixels along the scroll axis) between consecutive frames.
pub const MIN_OVERLAP: usize = 32;

/// Hard cap on the stitched canvas in each dimension.
pub const MAX_CANVAS_DIMENSION: usize = 32_768;

/// Default pixel budget of the stitched output (16384 x 16384).
pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 268_435_456;

/// Default cap on the number of frames placed in one session.
pub const DEFAULT_MAX_FRAME_COUNT: usize = 1000;

/// Default number of placements that can be undone.
pub const DEFAULT_UNDO_DEPTH: usize = 8;

/// Canvas capacity grows by at least this factor (numerator / denominator).
pub const CANVAS_GROWTH_NUM: usize = 3;
pub const CANVAS_GROWTH_DEN: usize = 2;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Side length of the grayscale thumbnail used by the frame-change gate.
pub const THUMBNAIL_SIZE: usize = 64;

/// Mean absolute thumbnail difference below which a frame counts as unchanged.
pub const UNCHANGED_MEAN_DIFF: f32 = 0.5 / 255.0;

/// Per-pixel thumbnail difference that marks a pixel as changed.
pub const UNCHANGED_PIXEL_DELTA: f32 = 8.0 / 255.0;

/// Fraction of changed thumbnail pixels tolerated for an unchanged frame.
pub const UNCHANGED_CHANGED_FRACTION: f32 = 0.002;

/// CLAHE grid size (tiles per axis).
pub const CLAHE_TILES: usize = 8;

/// CLAHE clip limit, as a multiple of the uniform histogram height.
pub const CLAHE_CLIP_LIMIT: f32 = 2.0;

/// Number of histogram bins for CLAHE.
pub const CLAHE_BINS: usize = 256;

/// Number of cross-axis bands in a row profile.
pub const PROFILE_BANDS: usize = 16;

/// Best score below which a failed match is reported as an overlap mismatch
/// rather than low confidence.
pub const MISMATCH_FLOOR: f64 = 0.35;

/// Minimum distance (pixels) between the best offset and a competing one.
pub const MIN_PEAK_SEPARATION: usize = 3;

/// Confidence margin used by direction hysteresis.
pub const DIRECTION_MARGIN: f64 = 0.15;

/// Rows on each side of the seam compared by the seam search.
pub const SEAM_BAND_ROWS: usize = 16;

/// Cross-axis blocks checked by multi-block seam verification.
pub const SEAM_BLOCKS: usize = 4;

/// Mean absolute difference above which a seam block is considered misaligned.
pub const SEAM_BLOCK_MAX_DIFF: f64 = 0.08;

/// Confidence multiplier applied per misaligned seam block.
pub const SEAM_BLOCK_PENALTY: f64 = 0.85;

/// Cross-axis inset of the template, leaves room for the 3x3 refinement grid.
pub const TEMPLATE_CROSS_MARGIN: usize = 2;

/// Confidence at or above which a match is reported as `Good`.
pub const GOOD_CONFIDENCE: f64 = 0.85;

/// Search radius (pixels) for in-place placement around a predicted position.
pub const IN_PLACE_RADIUS: usize = 8;

/// Mean absolute difference accepted for an in-place placement.
pub const IN_PLACE_MAX_DIFF: f64 = 0.04;

/// Pixel stride used when comparing a frame against the canvas.
pub const CANVAS_COMPARE_STRIDE: usize = 2;

/// Size of the duplicate-check window, in frame heights.
pub const DUPLICATE_WINDOW_FRAMES: usize = 2;

/// Minimum grayscale standard deviation for a strip to be checked for duplicates.
pub const DUPLICATE_MIN_STD: f64 = 0.02;

/// Mean absolute difference confirming a duplicate candidate.
pub const DUPLICATE_MAX_DIFF: f64 = 0.03;

/// Frames buffered by the fixed-element detector.
pub const DETECTION_BUFFER_FRAMES: usize = 5;

/// Frames required before fixed-element detection runs.
pub const DETECTION_MIN_FRAMES: usize = 3;

/// Changed frames held back at most while sticky-band detection is undecided.
pub const DETECTION_MAX_HELD_FRAMES: usize = 10;

/// Depth (pixels) of the leading/trailing analysis bands.
pub const DETECTION_BAND_DEPTH: usize = 100;

/// Grayscale difference (0..255) above which a band pixel counts as changed.
pub const DETECTION_PIXEL_TOLERANCE: u8 = 12;

/// Fraction of changed pixels a row may contain and still agree.
pub const DETECTION_ROW_DIFF_FRACTION: f32 = 0.1;

/// Scroll-axis size at or below which the tight overlap ratio applies.
pub const SMALL_FRAME_DIMENSION: usize = 400;

/// Scroll-axis size at or above which the loose overlap ratio applies.
pub const LARGE_FRAME_DIMENSION: usize = 1200;

/// Maximum overlap ratio for small frames.
pub const SMALL_FRAME_MAX_OVERLAP_RATIO: f64 = 0.90;

/// Maximum overlap ratio for large frames.
pub const LARGE_FRAME_MAX_OVERLAP_RATIO: f64 = 0.97;

/// Default bounded queue capacity of the stitch worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default queue depth at which the worker signals near-full.
pub const DEFAULT_QUEUE_HIGH_WATER: usize = 8;

/// Default queue depth at which the worker signals queue-low.
pub const DEFAULT_QUEUE_LOW_WATER: usize = 3;

/// Maximum overlap ratio allowed for a frame of `dimension` pixels along
/// the scroll axis. Interpolates linearly between the small and large limits.
pub fn max_overlap_ratio(dimension: usize) -> f64 {
    if dimension <= SMALL_FRAME_DIMENSION {
        return SMALL_FRAME_MAX_OVERLAP_RATIO;
    }
    if dimension >= LARGE_FRAME_DIMENSION {
        return LARGE_FRAME_MAX_OVERLAP_RATIO;
    }
    let t = (dimension - SMALL_FRAME_DIMENSION) as f64
        / (LARGE_FRAME_DIMENSION - SMALL_FRAME_DIMENSION) as f64;
    SMALL_FRAME_MAX_OVERLAP_RATIO
        + t * (LARGE_FRAME_MAX_OVERLAP_RATIO - SMALL_FRAME_MAX_OVERLAP_RATIO)
}

/// Maximum overlap in pixels for a frame of `dimension` pixels.
pub fn max_overlap(dimension: usize) -> usize {
    (dimension as f64 * max_overlap_ratio(dimension)).floor() as usize
}
