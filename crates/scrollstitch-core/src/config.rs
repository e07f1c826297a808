use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_MAX_FRAME_COUNT, DEFAULT_MAX_OUTPUT_PIXELS, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_QUEUE_HIGH_WATER, DEFAULT_QUEUE_LOW_WATER, DEFAULT_UNDO_DEPTH,
};
use crate::error::{Result, StitchError};
use crate::frame::CaptureMode;

/// Which matching strategy the alignment engine runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmChoice {
    /// Row projection, then template matching, then phase correlation.
    #[default]
    Auto,
    RowProjection,
    TemplateMatching,
}

impl std::fmt::Display for AlgorithmChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::RowProjection => write!(f, "Row Projection"),
            Self::TemplateMatching => write!(f, "Template Matching"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    pub algorithm: AlgorithmChoice,
    pub capture_mode: CaptureMode,
    /// Minimum confidence for a candidate to be accepted.
    pub confidence_threshold: f64,
    /// Minimum margin between the best and a competing offset.
    pub ambiguity_threshold: f64,
    /// Similarity above which new content counts as already stitched.
    pub duplicate_threshold: f64,
    /// Minimum normalized phase-correlation peak.
    pub min_phase_response: f64,
    pub use_phase_correlation: bool,
    pub use_windowed_duplicate_check: bool,
    pub detect_static_regions: bool,
    /// Pixel budget of the stitched output.
    pub max_output_pixels: u64,
    pub max_frame_count: usize,
    /// Number of placements kept for `undo`. Zero disables undo.
    pub undo_depth: usize,
    pub worker: WorkerConfig,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmChoice::Auto,
            capture_mode: CaptureMode::Vertical,
            confidence_threshold: 0.7,
            ambiguity_threshold: 0.05,
            duplicate_threshold: 0.97,
            min_phase_response: 0.05,
            use_phase_correlation: true,
            use_windowed_duplicate_check: true,
            detect_static_regions: true,
            max_output_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
            max_frame_count: DEFAULT_MAX_FRAME_COUNT,
            undo_depth: DEFAULT_UNDO_DEPTH,
            worker: WorkerConfig::default(),
        }
    }
}

impl StitchConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(StitchError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {v}"
                )))
            }
        };
        unit("confidence_threshold", self.confidence_threshold)?;
        unit("ambiguity_threshold", self.ambiguity_threshold)?;
        unit("duplicate_threshold", self.duplicate_threshold)?;
        unit("min_phase_response", self.min_phase_response)?;
        if self.max_output_pixels == 0 {
            return Err(StitchError::InvalidConfig(
                "max_output_pixels must be > 0".into(),
            ));
        }
        if self.max_frame_count < 1 {
            return Err(StitchError::InvalidConfig(
                "max_frame_count must be >= 1".into(),
            ));
        }
        self.worker.validate()
    }
}

/// Queue sizing for the background stitch worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue_capacity: usize,
    /// Depth at which `queue_near_full` is signalled.
    pub high_water: usize,
    /// Depth at which `queue_low` is signalled after a near-full signal.
    pub low_water: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            high_water: DEFAULT_QUEUE_HIGH_WATER,
            low_water: DEFAULT_QUEUE_LOW_WATER,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(StitchError::InvalidConfig(
                "queue_capacity must be > 0".into(),
            ));
        }
        if self.low_water >= self.high_water || self.high_water > self.queue_capacity {
            return Err(StitchError::InvalidConfig(format!(
                "expected low_water < high_water <= queue_capacity, got {} / {} / {}",
                self.low_water, self.high_water, self.queue_capacity
            )));
        }
        Ok(())
    }
}
