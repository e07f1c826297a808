//! The alignment state machine.
//!
//! [`AlignmentEngine`] owns the canvas and the two frame caches. Each new
//! frame is matched against the previous one, then placed: appended past
//! the trailing edge, prepended before the leading edge, or located inside
//! the already stitched area when the user scrolled back.

mod placement;

use std::collections::VecDeque;
use std::sync::Arc;

use image::RgbImage;
use ndarray::{s, Array3};
use tracing::{debug, info};

use crate::align::phase::match_phase;
use crate::align::row_projection::match_rows;
use crate::align::template::match_template;
use crate::align::{choose_direction, MatchCandidate, MatchInput};
use crate::canvas::{compose_image, StitchedCanvas};
use crate::config::{AlgorithmChoice, StitchConfig};
use crate::consts::{GOOD_CONFIDENCE, MAX_CANVAS_DIMENSION};
use crate::detection::StaticRegions;
use crate::error::{Result, StitchError};
use crate::frame::{CaptureMode, Frame, ScrollDirection, ViewportRect};
use crate::preprocess::{frames_differ, oriented_rgb, prepare_into, FrameCache};
use crate::result::{FailureCode, MatchAlgorithm, MatchQuality, StitchResult};

use placement::Placement;

/// Session state of an [`AlignmentEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Empty,
    /// First frame placed.
    Started,
    /// At least one frame matched after the first.
    Growing,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Started => write!(f, "Started"),
            Self::Growing => write!(f, "Growing"),
        }
    }
}

/// Sticky header and footer pixels, in scroll orientation.
#[derive(Clone, Debug)]
pub struct FixedBands {
    pub leading: Array3<u8>,
    pub trailing: Array3<u8>,
}

impl FixedBands {
    /// Cut the bands described by `regions` out of `frame`.
    pub fn capture(frame: &Frame, mode: CaptureMode, regions: StaticRegions) -> Self {
        let rgb = oriented_rgb(frame, mode);
        let axis = rgb.dim().0;
        let leading = regions.leading.min(axis);
        let trailing = regions.trailing.min(axis - leading);
        Self {
            leading: rgb.slice(s![..leading, .., ..]).to_owned(),
            trailing: rgb.slice(s![axis - trailing.., .., ..]).to_owned(),
        }
    }

    pub fn regions(&self) -> StaticRegions {
        StaticRegions {
            leading: self.leading.dim().0,
            trailing: self.trailing.dim().0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum PlacementKind {
    Growth { forward: bool, rows: usize },
    InPlace,
}

/// Everything needed to revert one placement.
struct UndoEntry {
    kind: PlacementKind,
    viewport: ViewportRect,
    previous: FrameCache,
    frame_count: usize,
    last_direction: Option<ScrollDirection>,
    fixed_bands: Option<Arc<FixedBands>>,
}

pub struct AlignmentEngine {
    config: StitchConfig,
    state: EngineState,
    canvas: StitchedCanvas,
    previous: FrameCache,
    current: FrameCache,
    /// Last placed frame, in scroll orientation.
    viewport: ViewportRect,
    frame_size: Option<(u32, u32)>,
    frame_count: usize,
    last_direction: Option<ScrollDirection>,
    fixed_bands: Option<Arc<FixedBands>>,
    history: VecDeque<UndoEntry>,
}

impl AlignmentEngine {
    pub fn new(config: StitchConfig) -> Self {
        Self {
            config,
            state: EngineState::Empty,
            canvas: StitchedCanvas::new(),
            previous: FrameCache::empty(),
            current: FrameCache::empty(),
            viewport: ViewportRect::default(),
            frame_size: None,
            frame_count: 0,
            last_direction: None,
            fixed_bands: None,
            history: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Size of the frames accepted by this session.
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.frame_size
    }

    /// Rectangle of the last placed frame, relative to the scrolling part
    /// of the canvas (sticky bands excluded).
    pub fn viewport(&self) -> ViewportRect {
        self.viewport.oriented(self.config.capture_mode)
    }

    pub fn static_regions(&self) -> StaticRegions {
        self.fixed_bands
            .as_ref()
            .map(|b| b.regions())
            .unwrap_or_default()
    }

    /// (width, height) of the image `stitched_image` would return.
    pub fn canvas_size(&self) -> (usize, usize) {
        if self.canvas.is_empty() {
            return (0, 0);
        }
        let axis = self.canvas.len() + self.static_regions().total();
        let cross = self.canvas.cross();
        match self.config.capture_mode {
            CaptureMode::Vertical => (cross, axis),
            CaptureMode::Horizontal => (axis, cross),
        }
    }

    /// Install sticky bands. Frames passed to `start`/`add_frame` must
    /// already have them cropped off.
    pub fn set_fixed_bands(&mut self, bands: FixedBands) {
        info!(regions = %bands.regions(), "Fixed bands installed");
        self.fixed_bands = Some(Arc::new(bands));
    }

    /// Assembled output: leading band, scrolling canvas, trailing band.
    pub fn stitched_image(&self) -> Result<RgbImage> {
        if self.canvas.is_empty() {
            return Err(StitchError::EmptySequence);
        }
        let mut parts = Vec::with_capacity(3);
        if let Some(bands) = &self.fixed_bands {
            parts.push(bands.leading.view());
        }
        parts.push(self.canvas.view());
        if let Some(bands) = &self.fixed_bands {
            parts.push(bands.trailing.view());
        }
        compose_image(&parts, self.config.capture_mode)
    }

    /// Drop the session, including sticky bands.
    pub fn reset(&mut self) {
        self.state = EngineState::Empty;
        self.canvas.clear();
        self.viewport = ViewportRect::default();
        self.frame_size = None;
        self.frame_count = 0;
        self.last_direction = None;
        self.fixed_bands = None;
        self.history.clear();
    }

    /// Begin a session with `frame`. Installed sticky bands are kept.
    ///
    /// An empty frame or one wider than the canvas limit is rejected in the
    /// returned [`StitchResult`] and leaves the engine `Empty`.
    pub fn start(&mut self, frame: &Frame) -> Result<StitchResult> {
        let mode = self.config.capture_mode;
        let axis = frame.axis_len(mode);
        let cross = frame.cross_len(mode);
        if axis == 0 || cross == 0 {
            return Ok(StitchResult::failed(
                FailureCode::InvalidState,
                format!("frame is {}x{}", frame.width(), frame.height()),
            ));
        }
        if cross > MAX_CANVAS_DIMENSION {
            return Ok(StitchResult::failed(
                FailureCode::MaxSizeReached,
                format!("frame is {cross}px across, canvas limit is {MAX_CANVAS_DIMENSION}px"),
            ));
        }

        self.history.clear();
        self.last_direction = None;
        prepare_into(&mut self.previous, frame, mode);

        let limit = self.axis_limit(cross).max(1);
        let seeded = axis.min(limit);
        if seeded < axis {
            info!(axis, seeded, "First frame clamped to the output budget");
        }
        self.canvas
            .seed(self.previous.color.slice(s![..seeded, .., ..]))?;

        self.viewport = ViewportRect {
            x: 0,
            y: 0,
            width: cross,
            height: axis,
        };
        self.frame_size = Some((frame.width(), frame.height()));
        self.frame_count = 1;
        self.state = EngineState::Started;

        info!(
            width = frame.width(),
            height = frame.height(),
            mode = %mode,
            "Stitch session started"
        );
        Ok(StitchResult {
            append_size: seeded,
            ..StitchResult::first_frame()
        })
    }

    /// Match `frame` against the previous frame and place it.
    ///
    /// Per-frame failures are reported in the returned [`StitchResult`];
    /// `Err` means the canvas could not grow.
    pub fn add_frame(&mut self, frame: &Frame) -> Result<StitchResult> {
        let Some(size) = self.frame_size.filter(|_| self.state != EngineState::Empty) else {
            return Ok(StitchResult::failed(
                FailureCode::InvalidState,
                "session not started",
            ));
        };
        if (frame.width(), frame.height()) != size {
            return Ok(StitchResult::failed(
                FailureCode::InvalidState,
                format!(
                    "frame is {}x{}, session frames are {}x{}",
                    frame.width(),
                    frame.height(),
                    size.0,
                    size.1
                ),
            ));
        }
        if self.frame_count >= self.config.max_frame_count {
            return Ok(StitchResult::failed(
                FailureCode::MaxSizeReached,
                format!("frame limit of {} reached", self.config.max_frame_count),
            ));
        }

        prepare_into(&mut self.current, frame, self.config.capture_mode);
        if !frames_differ(&self.previous, &self.current) {
            debug!(frame = self.frame_count, "Frame unchanged");
            return Ok(StitchResult::failed(
                FailureCode::FrameUnchanged,
                "frame matches the previous frame",
            ));
        }

        let candidate = self.select_candidate();
        if !candidate.is_success() {
            debug!(
                frame = self.frame_count,
                failure = %candidate.failure,
                algorithm = %candidate.algorithm,
                confidence = candidate.confidence,
                reason = %candidate.reason,
                "Frame rejected"
            );
            return Ok(candidate_failure(&candidate, candidate.failure, candidate.reason.clone()));
        }

        let (kind, y) = match self.place(&candidate)? {
            Placement::Grew { forward, rows, y } => (PlacementKind::Growth { forward, rows }, y),
            Placement::InPlace { y } => (PlacementKind::InPlace, y),
            Placement::Rejected(failure, reason) => {
                debug!(
                    frame = self.frame_count,
                    failure = %failure,
                    reason = %reason,
                    "Placement rejected"
                );
                return Ok(candidate_failure(&candidate, failure, reason));
            }
        };
        Ok(self.commit(&candidate, kind, y))
    }

    /// Revert the last placement. Returns false when there is nothing to
    /// undo; the first frame of a session is never undone.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.history.pop_back() else {
            return false;
        };
        match entry.kind {
            PlacementKind::Growth { forward: true, rows } => self.canvas.truncate(rows),
            PlacementKind::Growth { forward: false, rows } => self.canvas.drop_leading(rows),
            PlacementKind::InPlace => {}
        }
        self.current = std::mem::replace(&mut self.previous, entry.previous);
        self.viewport = entry.viewport;
        self.frame_count = entry.frame_count;
        self.last_direction = entry.last_direction;
        self.fixed_bands = entry.fixed_bands;
        if self.frame_count <= 1 {
            self.state = EngineState::Started;
        }
        debug!(frames = self.frame_count, canvas = self.canvas.len(), "Placement undone");
        true
    }

    /// Longest scroll axis the canvas may reach, sticky bands excluded.
    fn axis_limit(&self, cross: usize) -> usize {
        let budget = (self.config.max_output_pixels / cross.max(1) as u64)
            .min(MAX_CANVAS_DIMENSION as u64) as usize;
        budget.saturating_sub(self.static_regions().total())
    }

    fn select_candidate(&self) -> MatchCandidate {
        let mode = self.config.capture_mode;
        let input = MatchInput {
            prev: &self.previous,
            cur: &self.current,
            config: &self.config,
            forward: mode.primary(),
            backward: mode.secondary(),
        };

        let algorithms: &[MatchAlgorithm] = match self.config.algorithm {
            AlgorithmChoice::Auto if self.config.use_phase_correlation => &[
                MatchAlgorithm::RowProjection,
                MatchAlgorithm::TemplateMatching,
                MatchAlgorithm::PhaseCorrelation,
            ],
            AlgorithmChoice::Auto => &[MatchAlgorithm::RowProjection, MatchAlgorithm::TemplateMatching],
            AlgorithmChoice::RowProjection => &[MatchAlgorithm::RowProjection],
            AlgorithmChoice::TemplateMatching => &[MatchAlgorithm::TemplateMatching],
        };

        let mut fallback: Option<MatchCandidate> = None;
        for &algorithm in algorithms {
            let (primary, secondary) = match algorithm {
                MatchAlgorithm::RowProjection => match_rows(&input),
                MatchAlgorithm::TemplateMatching => match_template(&input),
                MatchAlgorithm::PhaseCorrelation => match_phase(&input),
            };
            let chosen = choose_direction(primary, secondary, self.last_direction);
            debug!(
                algorithm = %algorithm,
                direction = %chosen.direction,
                confidence = chosen.confidence,
                failure = %chosen.failure,
                "Candidate"
            );
            if chosen.is_decisive() {
                return chosen;
            }
            if fallback
                .as_ref()
                .map_or(true, |best| chosen.confidence > best.confidence)
            {
                fallback = Some(chosen);
            }
        }

        fallback.unwrap_or_else(|| {
            MatchCandidate::failed(
                MatchAlgorithm::RowProjection,
                mode.primary(),
                FailureCode::NoAlgorithmSucceeded,
                0.0,
                "no matching algorithm could run",
            )
        })
    }

    /// Record the placement, swap caches and report success.
    fn commit(&mut self, candidate: &MatchCandidate, kind: PlacementKind, y: usize) -> StitchResult {
        let before = self.viewport;
        self.viewport.y = y;

        std::mem::swap(&mut self.previous, &mut self.current);
        let depth = self.config.undo_depth;
        if depth > 0 {
            let recycled = if self.history.len() >= depth {
                self.history.pop_front().map(|e| e.previous)
            } else {
                None
            };
            let old_previous =
                std::mem::replace(&mut self.current, recycled.unwrap_or_else(FrameCache::empty));
            self.history.push_back(UndoEntry {
                kind,
                viewport: before,
                previous: old_previous,
                frame_count: self.frame_count,
                last_direction: self.last_direction,
                fixed_bands: self.fixed_bands.clone(),
            });
        }

        self.frame_count += 1;
        self.last_direction = Some(candidate.direction);
        self.state = EngineState::Growing;

        let append_size = match kind {
            PlacementKind::Growth { rows, .. } => rows,
            PlacementKind::InPlace => 0,
        };
        let quality = if candidate.confidence >= GOOD_CONFIDENCE {
            MatchQuality::Good
        } else {
            MatchQuality::PartiallyGood
        };
        debug!(
            frame = self.frame_count,
            direction = %candidate.direction,
            overlap = candidate.overlap,
            append_size,
            canvas = self.canvas.len(),
            "Frame placed"
        );

        StitchResult {
            success: true,
            failure: FailureCode::None,
            quality,
            confidence: candidate.confidence,
            overlap: candidate.overlap,
            offset: candidate.offset,
            append_size,
            algorithm: Some(candidate.algorithm),
            direction: Some(candidate.direction),
            failure_reason: String::new(),
        }
    }
}

fn candidate_failure(candidate: &MatchCandidate, failure: FailureCode, reason: String) -> StitchResult {
    StitchResult {
        confidence: candidate.confidence,
        offset: candidate.offset,
        algorithm: Some(candidate.algorithm),
        direction: Some(candidate.direction),
        ..StitchResult::failed(failure, reason)
    }
}
