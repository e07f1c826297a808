use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use scrollstitch_core::io::{load_frame, save_image};
use scrollstitch_core::{ChannelObserver, StitchWorker, WorkerEvent};

use super::{capture_mode, load_config, AlgorithmArg};
use crate::summary::{print_results, print_stitch_summary, StitchTally};

#[derive(Args)]
pub struct StitchArgs {
    /// Screenshots in capture order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Stitch config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Matching algorithm (overrides the config)
    #[arg(long, value_enum)]
    pub algorithm: Option<AlgorithmArg>,

    /// Content scrolls sideways
    #[arg(long)]
    pub horizontal: bool,

    /// Keep sticky headers and footers in every frame
    #[arg(long)]
    pub no_static_detection: bool,

    /// Skip the phase-correlation fallback
    #[arg(long)]
    pub no_phase: bool,

    /// Output file path
    #[arg(short, long, default_value = "stitched.png")]
    pub output: PathBuf,
}

pub fn run(args: &StitchArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm.into();
    }
    if args.horizontal {
        config.capture_mode = capture_mode(true);
    }
    if args.no_static_detection {
        config.detect_static_regions = false;
    }
    if args.no_phase {
        config.use_phase_correlation = false;
    }

    print_stitch_summary(&config, args.files.len(), &args.output);

    let (observer, events) = ChannelObserver::new();
    let capacity = config.worker.queue_capacity;
    let worker = StitchWorker::new(config, Arc::new(observer))?;

    let pb = ProgressBar::new(args.files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:12} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message("Stitching");

    let mut tally = StitchTally::default();
    for path in &args.files {
        let frame = load_frame(path)?;
        if worker.queue_depth() >= capacity {
            worker.wait_idle();
        }
        worker.enqueue_frame(frame);
        for event in events.try_iter() {
            record(&mut tally, &pb, event);
        }
    }
    worker.finish();
    for event in events.try_iter() {
        record(&mut tally, &pb, event);
    }
    pb.finish_with_message("Done");

    if let Some(error) = &tally.error {
        bail!("Stitching stopped: {error}");
    }
    let image = worker.stitched_image()?;
    save_image(&image, &args.output)?;

    print_results(&tally, worker.static_regions(), (image.width(), image.height()));
    println!("\nOutput saved to {}", args.output.display());
    Ok(())
}

fn record(tally: &mut StitchTally, pb: &ProgressBar, event: WorkerEvent) {
    match event {
        WorkerEvent::FrameProcessed(report) => {
            pb.inc(1);
            tally.add(&report);
        }
        WorkerEvent::FixedElementsDetected(result) => {
            pb.println(format!("Sticky bands found: {}", result.regions));
        }
        WorkerEvent::Error(error) => tally.error = Some(error),
        WorkerEvent::QueueNearFull(_) | WorkerEvent::QueueLow(_) => {}
    }
}
