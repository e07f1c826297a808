//! Sticky header and footer detection.

pub mod fixed;

pub use fixed::FixedElementDetector;

use serde::{Deserialize, Serialize};

/// Rows (scroll-axis pixels) of static chrome at each end of the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRegions {
    /// Top band in vertical mode, left band in horizontal mode.
    pub leading: usize,
    /// Bottom band in vertical mode, right band in horizontal mode.
    pub trailing: usize,
}

impl StaticRegions {
    pub fn is_empty(&self) -> bool {
        self.leading == 0 && self.trailing == 0
    }

    pub fn total(&self) -> usize {
        self.leading + self.trailing
    }
}

impl std::fmt::Display for StaticRegions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "leading {}px, trailing {}px", self.leading, self.trailing)
    }
}

/// Outcome of one detection pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub regions: StaticRegions,
    /// Fraction of buffered frame pairs that change just inside the
    /// detected bands.
    pub confidence: f64,
    /// No scrolling was observed in the buffered frames, so a band of any
    /// depth would look static.
    pub inconclusive: bool,
}

impl DetectionResult {
    /// Whether a sticky band was found.
    pub fn is_locked(&self) -> bool {
        !self.regions.is_empty()
    }
}
