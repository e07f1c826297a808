use std::collections::VecDeque;

use image::GrayImage;
use ndarray::{Array2, ArrayView1};
use tracing::{debug, info};

use crate::consts::{
    DETECTION_BAND_DEPTH, DETECTION_BUFFER_FRAMES, DETECTION_MIN_FRAMES,
    DETECTION_PIXEL_TOLERANCE, DETECTION_ROW_DIFF_FRACTION,
};
use crate::frame::{CaptureMode, Frame};

use super::{DetectionResult, StaticRegions};

/// Leading and trailing analysis bands of one frame, shape = (depth, cross).
///
/// Row 0 of each band is the outer edge of the frame.
#[derive(Clone, Debug)]
struct BandPair {
    leading: Array2<u8>,
    trailing: Array2<u8>,
}

/// Finds bands at the frame edges that stay identical while the content
/// between them scrolls.
#[derive(Clone, Debug)]
pub struct FixedElementDetector {
    mode: CaptureMode,
    frames: VecDeque<BandPair>,
    frame_size: Option<(u32, u32)>,
    locked: Option<DetectionResult>,
}

impl FixedElementDetector {
    pub fn new(mode: CaptureMode) -> Self {
        Self {
            mode,
            frames: VecDeque::with_capacity(DETECTION_BUFFER_FRAMES),
            frame_size: None,
            locked: None,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn buffered_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    /// Locked regions, or empty regions while undecided.
    pub fn regions(&self) -> StaticRegions {
        self.locked
            .as_ref()
            .map(|r| r.regions)
            .unwrap_or_default()
    }

    /// Buffer the analysis bands of `frame`. Ignored once locked.
    pub fn add_frame(&mut self, frame: &Frame) {
        if self.locked.is_some() {
            return;
        }
        let size = (frame.width(), frame.height());
        if self.frame_size != Some(size) {
            self.frames.clear();
            self.frame_size = Some(size);
        }

        let axis = frame.axis_len(self.mode);
        let cross = frame.cross_len(self.mode);
        let depth = DETECTION_BAND_DEPTH.min(axis / 3);
        if depth == 0 || cross == 0 {
            return;
        }

        let luma = frame.image().to_luma8();
        let mode = self.mode;
        let sample = |a: usize, c: usize| -> u8 { pixel_at(&luma, mode, a, c) };
        let leading = Array2::from_shape_fn((depth, cross), |(r, c)| sample(r, c));
        let trailing = Array2::from_shape_fn((depth, cross), |(r, c)| sample(axis - 1 - r, c));

        if self.frames.len() == DETECTION_BUFFER_FRAMES {
            self.frames.pop_front();
        }
        self.frames.push_back(BandPair { leading, trailing });
    }

    /// Run detection over the buffered frames.
    ///
    /// Returns `None` until `DETECTION_MIN_FRAMES` are buffered. A result
    /// with a non-empty region locks the detector; later calls return the
    /// locked result without re-running.
    pub fn detect(&mut self) -> Option<DetectionResult> {
        if let Some(locked) = &self.locked {
            return Some(locked.clone());
        }
        if self.frames.len() < DETECTION_MIN_FRAMES {
            return None;
        }

        let depth = self.frames[0].leading.nrows();
        let (leading_run, leading_edge) = self.static_run(|p| &p.leading);
        let (trailing_run, trailing_edge) = self.static_run(|p| &p.trailing);

        let spans = |run: usize| run >= depth;
        let inconclusive = spans(leading_run) || spans(trailing_run);
        let regions = StaticRegions {
            leading: if spans(leading_run) { 0 } else { leading_run },
            trailing: if spans(trailing_run) { 0 } else { trailing_run },
        };

        let edges: Vec<f64> = [(regions.leading, leading_edge), (regions.trailing, trailing_edge)]
            .into_iter()
            .filter(|&(run, _)| run > 0 || regions.is_empty())
            .filter_map(|(_, edge)| edge)
            .collect();
        let confidence = if edges.is_empty() {
            0.0
        } else {
            edges.iter().sum::<f64>() / edges.len() as f64
        };

        let result = DetectionResult {
            regions,
            confidence: confidence.clamp(0.0, 1.0),
            inconclusive: inconclusive && regions.is_empty(),
        };

        if result.is_locked() {
            info!(
                leading = regions.leading,
                trailing = regions.trailing,
                confidence = result.confidence,
                "Sticky bands locked"
            );
            self.locked = Some(result.clone());
        } else {
            debug!(
                frames = self.frames.len(),
                inconclusive = result.inconclusive,
                "No sticky bands found"
            );
        }
        Some(result)
    }

    /// Strip the locked bands from `frame` along the scroll axis.
    pub fn crop_fixed_regions(&self, frame: &Frame) -> Frame {
        let regions = self.regions();
        frame.crop_scroll_axis(self.mode, regions.leading, regions.trailing)
    }

    /// Forget buffered frames and any lock.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.frame_size = None;
        self.locked = None;
    }

    /// Length of the run of agreeing rows from the outer edge of the band,
    /// and the fraction of frame pairs that disagree on the first row past
    /// the run (`None` when the run spans the band).
    fn static_run(&self, band: impl Fn(&BandPair) -> &Array2<u8>) -> (usize, Option<f64>) {
        let depth = band(&self.frames[0]).nrows();
        let pairs = self.frames.len() - 1;

        for row in 0..depth {
            let disagreeing = self
                .frames
                .iter()
                .zip(self.frames.iter().skip(1))
                .filter(|&(a, b)| !rows_agree(band(a).row(row), band(b).row(row)))
                .count();
            if disagreeing > 0 {
                return (row, Some(disagreeing as f64 / pairs as f64));
            }
        }
        (depth, None)
    }
}

fn pixel_at(luma: &GrayImage, mode: CaptureMode, axis: usize, cross: usize) -> u8 {
    match mode {
        CaptureMode::Vertical => luma.get_pixel(cross as u32, axis as u32).0[0],
        CaptureMode::Horizontal => luma.get_pixel(axis as u32, cross as u32).0[0],
    }
}

/// Two rows agree when at most `DETECTION_ROW_DIFF_FRACTION` of their
/// pixels differ by more than `DETECTION_PIXEL_TOLERANCE`.
fn rows_agree(a: ArrayView1<'_, u8>, b: ArrayView1<'_, u8>) -> bool {
    let changed = a
        .iter()
        .zip(b.iter())
        .filter(|&(&x, &y)| x.abs_diff(y) > DETECTION_PIXEL_TOLERANCE)
        .count();
    changed as f32 <= DETECTION_ROW_DIFF_FRACTION * a.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Frames with a flat 10-row header over content that scrolls by
    /// `step` rows per frame.
    fn header_frame(index: usize, step: usize) -> Frame {
        Frame::from_rgb(RgbImage::from_fn(40, 90, |x, y| {
            if y < 10 {
                Rgb([200, 30, 30])
            } else {
                let v = ((y as usize + index * step) * 41 + x as usize * 13) % 251;
                Rgb([v as u8, v as u8, v as u8])
            }
        }))
    }

    #[test]
    fn needs_three_frames() {
        let mut detector = FixedElementDetector::new(CaptureMode::Vertical);
        detector.add_frame(&header_frame(0, 7));
        detector.add_frame(&header_frame(1, 7));
        assert!(detector.detect().is_none());
    }

    #[test]
    fn header_band_locks() {
        let mut detector = FixedElementDetector::new(CaptureMode::Vertical);
        for i in 0..3 {
            detector.add_frame(&header_frame(i, 7));
        }
        let result = detector.detect().unwrap();
        assert_eq!(result.regions, StaticRegions { leading: 10, trailing: 0 });
        assert!(detector.is_locked());
        assert_eq!(result.confidence, 1.0);

        let cropped = detector.crop_fixed_regions(&header_frame(3, 7));
        assert_eq!((cropped.width(), cropped.height()), (40, 80));
    }

    #[test]
    fn static_frames_are_inconclusive() {
        let mut detector = FixedElementDetector::new(CaptureMode::Vertical);
        for _ in 0..3 {
            detector.add_frame(&header_frame(0, 7));
        }
        let result = detector.detect().unwrap();
        assert!(result.regions.is_empty());
        assert!(result.inconclusive);
        assert!(!detector.is_locked());
    }

    #[test]
    fn size_change_restarts_the_buffer() {
        let mut detector = FixedElementDetector::new(CaptureMode::Vertical);
        detector.add_frame(&header_frame(0, 7));
        detector.add_frame(&header_frame(1, 7));
        detector.add_frame(&Frame::from_rgb(RgbImage::new(40, 60)));
        assert_eq!(detector.buffered_frames(), 1);
    }
}
