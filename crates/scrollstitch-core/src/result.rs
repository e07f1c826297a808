use serde::{Deserialize, Serialize};

use crate::frame::ScrollDirection;

/// Why a frame could not be placed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCode {
    #[default]
    None,
    FrameUnchanged,
    ScrollTooSmall,
    OverlapTooSmall,
    OverlapMismatch,
    AmbiguousMatch,
    LowConfidence,
    ViewportMismatch,
    DuplicateDetected,
    MaxSizeReached,
    InvalidState,
    NoAlgorithmSucceeded,
    /// Reserved: the engine itself never times out.
    Timeout,
    Unknown,
}

impl FailureCode {
    /// Conditions that occur during normal use (pauses, scroll-back,
    /// repetitive content) and should not be surfaced as errors.
    pub fn is_expected(self) -> bool {
        matches!(
            self,
            Self::None
                | Self::FrameUnchanged
                | Self::ScrollTooSmall
                | Self::AmbiguousMatch
                | Self::DuplicateDetected
        )
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::FrameUnchanged => write!(f, "Frame unchanged"),
            Self::ScrollTooSmall => write!(f, "Scroll too small"),
            Self::OverlapTooSmall => write!(f, "Overlap too small"),
            Self::OverlapMismatch => write!(f, "Overlap mismatch"),
            Self::AmbiguousMatch => write!(f, "Ambiguous match"),
            Self::LowConfidence => write!(f, "Low confidence"),
            Self::ViewportMismatch => write!(f, "Viewport mismatch"),
            Self::DuplicateDetected => write!(f, "Duplicate detected"),
            Self::MaxSizeReached => write!(f, "Maximum size reached"),
            Self::InvalidState => write!(f, "Invalid state"),
            Self::NoAlgorithmSucceeded => write!(f, "No algorithm succeeded"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Matching strategy that produced a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchAlgorithm {
    RowProjection,
    TemplateMatching,
    PhaseCorrelation,
}

impl std::fmt::Display for MatchAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RowProjection => write!(f, "Row Projection"),
            Self::TemplateMatching => write!(f, "Template Matching"),
            Self::PhaseCorrelation => write!(f, "Phase Correlation"),
        }
    }
}

/// Confidence band of a placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchQuality {
    Good,
    PartiallyGood,
    NoChange,
    Failed,
}

impl std::fmt::Display for MatchQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Good => write!(f, "Good"),
            Self::PartiallyGood => write!(f, "Partially good"),
            Self::NoChange => write!(f, "No change"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Outcome of one `start`/`add_frame` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StitchResult {
    pub success: bool,
    pub failure: FailureCode,
    pub quality: MatchQuality,
    /// Match confidence in [0.0, 1.0].
    pub confidence: f64,
    /// Pixels shared with the previous frame along the scroll axis.
    pub overlap: usize,
    /// Sub-pixel scroll distance between the two frames.
    pub offset: f64,
    /// Net canvas growth along the scroll axis.
    pub append_size: usize,
    pub algorithm: Option<MatchAlgorithm>,
    pub direction: Option<ScrollDirection>,
    pub failure_reason: String,
}

impl StitchResult {
    pub(crate) fn first_frame() -> Self {
        Self {
            success: true,
            failure: FailureCode::None,
            quality: MatchQuality::Good,
            confidence: 1.0,
            overlap: 0,
            offset: 0.0,
            append_size: 0,
            algorithm: None,
            direction: None,
            failure_reason: String::new(),
        }
    }

    pub(crate) fn failed(failure: FailureCode, reason: impl Into<String>) -> Self {
        let quality = if failure == FailureCode::FrameUnchanged {
            MatchQuality::NoChange
        } else {
            MatchQuality::Failed
        };
        Self {
            success: false,
            failure,
            quality,
            confidence: 0.0,
            overlap: 0,
            offset: 0.0,
            append_size: 0,
            algorithm: None,
            direction: None,
            failure_reason: reason.into(),
        }
    }
}
