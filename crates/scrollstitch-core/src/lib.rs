//! Scrolling-screenshot stitching.
//!
//! Consecutive captures of a scrolling viewport are aligned against each
//! other and assembled into one tall (or wide) image. [`AlignmentEngine`]
//! does the matching and placement synchronously; [`StitchWorker`] runs it
//! on a background task behind a bounded frame queue and strips sticky
//! headers and footers found by [`FixedElementDetector`].

pub mod align;
pub mod canvas;
pub mod config;
pub mod consts;
pub mod detection;
pub mod engine;
pub mod error;
pub mod frame;
pub mod io;
pub mod preprocess;
pub mod result;
pub mod worker;

pub use config::{AlgorithmChoice, StitchConfig, WorkerConfig};
pub use detection::{DetectionResult, FixedElementDetector, StaticRegions};
pub use engine::{AlignmentEngine, EngineState, FixedBands};
pub use error::{Result, StitchError};
pub use frame::{CaptureMode, Frame, ScrollDirection, ViewportRect};
pub use result::{FailureCode, MatchAlgorithm, MatchQuality, StitchResult};
pub use worker::{ChannelObserver, FrameReport, NoOpObserver, StitchObserver, StitchWorker, WorkerEvent};
