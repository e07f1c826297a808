//! Frame preprocessing.
//!
//! Every frame entering the alignment engine is converted once into a
//! [`FrameCache`]: packed RGB, BT.601 grayscale, a CLAHE-equalized
//! grayscale (used by template matching so brightness drift between frames
//! does not bias the match) and a small thumbnail for the frame-change gate.
//!
//! All buffers are stored in scroll orientation: rows run along the scroll
//! axis. Horizontal captures are transposed here and nowhere else.

use image::RgbImage;
use ndarray::{s, Array2, Array3};

use crate::consts::{
    CLAHE_BINS, CLAHE_CLIP_LIMIT, CLAHE_TILES, LUMINANCE_B, LUMINANCE_G, LUMINANCE_R,
    THUMBNAIL_SIZE, UNCHANGED_CHANGED_FRACTION, UNCHANGED_MEAN_DIFF, UNCHANGED_PIXEL_DELTA,
};
use crate::frame::{CaptureMode, Frame};

/// Derived per-frame buffers shared by all matchers.
#[derive(Clone, Debug)]
pub struct FrameCache {
    /// Packed RGB, shape = (axis, cross, 3).
    pub color: Array3<u8>,
    /// Grayscale in [0.0, 1.0], shape = (axis, cross).
    pub gray: Array2<f32>,
    /// CLAHE-equalized grayscale in [0.0, 1.0].
    pub equalized: Array2<f32>,
    /// Box-filtered grayscale thumbnail, `THUMBNAIL_SIZE` square.
    pub thumbnail: Array2<f32>,
}

impl FrameCache {
    pub fn empty() -> Self {
        Self {
            color: Array3::zeros((0, 0, 3)),
            gray: Array2::zeros((0, 0)),
            equalized: Array2::zeros((0, 0)),
            thumbnail: Array2::zeros((0, 0)),
        }
    }

    /// Length along the scroll axis.
    pub fn axis_len(&self) -> usize {
        self.gray.nrows()
    }

    /// Length across the scroll axis.
    pub fn cross_len(&self) -> usize {
        self.gray.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.gray.is_empty()
    }
}

/// Build a fresh cache for `frame`.
pub fn prepare(frame: &Frame, mode: CaptureMode) -> FrameCache {
    let mut cache = FrameCache::empty();
    prepare_into(&mut cache, frame, mode);
    cache
}

/// Fill `cache` from `frame`, reusing its buffers when the size matches.
pub fn prepare_into(cache: &mut FrameCache, frame: &Frame, mode: CaptureMode) {
    let converted;
    let rgb: &RgbImage = match frame.image().as_rgb8() {
        Some(rgb) => rgb,
        None => {
            converted = frame.image().to_rgb8();
            &converted
        }
    };

    let axis = frame.axis_len(mode);
    let cross = frame.cross_len(mode);
    if cache.color.dim() != (axis, cross, 3) {
        cache.color = Array3::zeros((axis, cross, 3));
        cache.gray = Array2::zeros((axis, cross));
        cache.equalized = Array2::zeros((axis, cross));
    }
    if cache.thumbnail.dim() != (THUMBNAIL_SIZE, THUMBNAIL_SIZE) {
        cache.thumbnail = Array2::zeros((THUMBNAIL_SIZE, THUMBNAIL_SIZE));
    }

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (a, c) = match mode {
            CaptureMode::Vertical => (y as usize, x as usize),
            CaptureMode::Horizontal => (x as usize, y as usize),
        };
        let [r, g, b] = pixel.0;
        cache.color[[a, c, 0]] = r;
        cache.color[[a, c, 1]] = g;
        cache.color[[a, c, 2]] = b;
        cache.gray[[a, c]] = luminance(r, g, b);
    }

    equalize_into(&cache.gray, &mut cache.equalized);
    thumbnail_into(&cache.gray, &mut cache.thumbnail);
}

/// Packed RGB copy of `frame` in scroll orientation, shape = (axis, cross, 3).
pub fn oriented_rgb(frame: &Frame, mode: CaptureMode) -> Array3<u8> {
    let rgb = frame.image().to_rgb8();
    let mut out = Array3::zeros((frame.axis_len(mode), frame.cross_len(mode), 3));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (a, c) = match mode {
            CaptureMode::Vertical => (y as usize, x as usize),
            CaptureMode::Horizontal => (x as usize, y as usize),
        };
        for (ch, &v) in pixel.0.iter().enumerate() {
            out[[a, c, ch]] = v;
        }
    }
    out
}

/// BT.601 luminance of an 8-bit RGB triple, scaled to [0.0, 1.0].
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    (LUMINANCE_R * r as f32 + LUMINANCE_G * g as f32 + LUMINANCE_B * b as f32) / 255.0
}

/// Frame-change gate: compares thumbnails by mean absolute difference and
/// by the fraction of thumbnail pixels that changed noticeably.
pub fn frames_differ(a: &FrameCache, b: &FrameCache) -> bool {
    if a.thumbnail.dim() != b.thumbnail.dim() || a.gray.dim() != b.gray.dim() {
        return true;
    }
    let n = a.thumbnail.len();
    if n == 0 {
        return false;
    }

    let mut sum = 0.0f32;
    let mut changed = 0usize;
    for (&pa, &pb) in a.thumbnail.iter().zip(b.thumbnail.iter()) {
        let d = (pa - pb).abs();
        sum += d;
        if d > UNCHANGED_PIXEL_DELTA {
            changed += 1;
        }
    }

    let mean = sum / n as f32;
    let changed_fraction = changed as f32 / n as f32;
    mean >= UNCHANGED_MEAN_DIFF || changed_fraction > UNCHANGED_CHANGED_FRACTION
}

/// Contrast-limited adaptive histogram equalization (allocating).
pub fn equalize_clahe(gray: &Array2<f32>) -> Array2<f32> {
    let mut out = Array2::zeros(gray.dim());
    equalize_into(gray, &mut out);
    out
}

/// CLAHE over a `CLAHE_TILES` x `CLAHE_TILES` grid with bilinear blending
/// of neighbouring tile mappings.
fn equalize_into(gray: &Array2<f32>, out: &mut Array2<f32>) {
    let (h, w) = gray.dim();
    if h == 0 || w == 0 {
        return;
    }

    let tile_h = h.div_ceil(CLAHE_TILES.min(h));
    let tile_w = w.div_ceil(CLAHE_TILES.min(w));
    let tiles_y = h.div_ceil(tile_h);
    let tiles_x = w.div_ceil(tile_w);

    let bin_of = |v: f32| -> usize { ((v * 255.0).round().max(0.0) as usize).min(CLAHE_BINS - 1) };

    let mut luts: Vec<[f32; CLAHE_BINS]> = Vec::with_capacity(tiles_y * tiles_x);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let y0 = ty * tile_h;
            let y1 = (y0 + tile_h).min(h);
            let x0 = tx * tile_w;
            let x1 = (x0 + tile_w).min(w);

            let mut hist = [0u32; CLAHE_BINS];
            for row in y0..y1 {
                for col in x0..x1 {
                    hist[bin_of(gray[[row, col]])] += 1;
                }
            }
            let count = ((y1 - y0) * (x1 - x0)) as u32;
            luts.push(clipped_lut(&mut hist, count));
        }
    }

    for row in 0..h {
        let fy = ((row as f32 + 0.5) / tile_h as f32 - 0.5).max(0.0);
        let ty0 = (fy.floor() as usize).min(tiles_y - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let wy = (fy - ty0 as f32).clamp(0.0, 1.0);

        for col in 0..w {
            let fx = ((col as f32 + 0.5) / tile_w as f32 - 0.5).max(0.0);
            let tx0 = (fx.floor() as usize).min(tiles_x - 1);
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let wx = (fx - tx0 as f32).clamp(0.0, 1.0);

            let bin = bin_of(gray[[row, col]]);
            let top = luts[ty0 * tiles_x + tx0][bin] * (1.0 - wx) + luts[ty0 * tiles_x + tx1][bin] * wx;
            let bottom =
                luts[ty1 * tiles_x + tx0][bin] * (1.0 - wx) + luts[ty1 * tiles_x + tx1][bin] * wx;
            out[[row, col]] = top * (1.0 - wy) + bottom * wy;
        }
    }
}

/// Clip a tile histogram, redistribute the excess uniformly, and return the
/// normalized cumulative mapping.
fn clipped_lut(hist: &mut [u32; CLAHE_BINS], count: u32) -> [f32; CLAHE_BINS] {
    let mut lut = [0.0f32; CLAHE_BINS];
    if count == 0 {
        return lut;
    }

    let limit = ((CLAHE_CLIP_LIMIT * count as f32 / CLAHE_BINS as f32) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let per_bin = excess / CLAHE_BINS as u32;
    let remainder = (excess % CLAHE_BINS as u32) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += per_bin + u32::from(i < remainder);
    }

    let mut cumulative = 0u32;
    for (i, &bin) in hist.iter().enumerate() {
        cumulative += bin;
        lut[i] = cumulative as f32 / count as f32;
    }
    lut
}

/// Box-filter `gray` down to the thumbnail grid.
fn thumbnail_into(gray: &Array2<f32>, out: &mut Array2<f32>) {
    let (h, w) = gray.dim();
    let (th, tw) = out.dim();
    if h == 0 || w == 0 {
        out.fill(0.0);
        return;
    }

    for i in 0..th {
        let r0 = i * h / th;
        let r1 = ((i + 1) * h / th).max(r0 + 1).min(h);
        for j in 0..tw {
            let c0 = j * w / tw;
            let c1 = ((j + 1) * w / tw).max(c0 + 1).min(w);
            let cell = gray.slice(s![r0..r1, c0..c1]);
            out[[i, j]] = cell.sum() / cell.len() as f32;
        }
    }
}
