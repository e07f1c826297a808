use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use scrollstitch_core::io::load_frame;
use scrollstitch_core::FixedElementDetector;

use super::capture_mode;

#[derive(Args)]
pub struct DetectArgs {
    /// Screenshots in capture order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Content scrolls sideways
    #[arg(long)]
    pub horizontal: bool,
}

pub fn run(args: &DetectArgs) -> Result<()> {
    let mut detector = FixedElementDetector::new(capture_mode(args.horizontal));
    for path in &args.files {
        detector.add_frame(&load_frame(path)?);
    }

    let Some(result) = detector.detect() else {
        bail!(
            "Need at least 3 frames of the same size, got {}",
            detector.buffered_frames()
        );
    };

    if result.is_locked() {
        println!("Sticky bands: {}", result.regions);
        println!("Confidence:   {:.2}", result.confidence);
    } else if result.inconclusive {
        println!("Inconclusive: the frames do not scroll");
    } else {
        println!("No sticky bands");
    }
    Ok(())
}
