use std::collections::BTreeMap;
use std::path::Path;

use console::Style;
use scrollstitch_core::{FrameReport, StaticRegions, StitchConfig};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    warn: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            warn: Style::new().yellow(),
        }
    }
}

/// Per-session outcome counts, fed from worker reports.
#[derive(Default)]
pub struct StitchTally {
    pub placed: usize,
    pub appended: usize,
    pub failures: BTreeMap<String, usize>,
    pub error: Option<String>,
}

impl StitchTally {
    pub fn add(&mut self, report: &FrameReport) {
        let result = &report.result;
        if result.success {
            self.placed += 1;
            self.appended += result.append_size;
        } else {
            *self.failures.entry(result.failure.to_string()).or_default() += 1;
        }
    }
}

pub fn print_stitch_summary(config: &StitchConfig, frames: usize, output: &Path) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Scroll Stitch"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(13)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(frames)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(output.display())
    );
    println!();

    println!("  {}", s.header.apply_to("Alignment"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Mode"),
        s.method.apply_to(config.capture_mode)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Algorithm"),
        s.method.apply_to(config.algorithm)
    );
    if config.use_phase_correlation {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Fallback"),
            s.method.apply_to("Phase Correlation")
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Fallback"),
            s.disabled.apply_to("disabled")
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Confidence"),
        s.value.apply_to(format!("{:.2}", config.confidence_threshold))
    );
    println!();

    if config.detect_static_regions {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Sticky bands"),
            s.method.apply_to("detect")
        );
    } else {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Sticky bands"),
            s.disabled.apply_to("disabled")
        );
    }
    println!();
}

pub fn print_results(tally: &StitchTally, regions: StaticRegions, size: (u32, u32)) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Placed"),
        s.value.apply_to(tally.placed)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Size"),
        s.value.apply_to(format!("{}x{}", size.0, size.1))
    );
    if !regions.is_empty() {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Sticky"),
            s.value.apply_to(regions)
        );
    }

    if tally.failures.is_empty() {
        return;
    }
    println!();
    println!("  {}", s.header.apply_to("Skipped frames"));
    for (failure, count) in &tally.failures {
        println!(
            "    {:<24}{}",
            s.label.apply_to(failure),
            s.warn.apply_to(count)
        );
    }
}
