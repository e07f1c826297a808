pub mod config;
pub mod detect;
pub mod stitch;

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use scrollstitch_core::{AlgorithmChoice, CaptureMode, StitchConfig};

#[derive(Clone, Copy, ValueEnum)]
pub enum AlgorithmArg {
    Auto,
    RowProjection,
    Template,
}

impl From<AlgorithmArg> for AlgorithmChoice {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Auto => AlgorithmChoice::Auto,
            AlgorithmArg::RowProjection => AlgorithmChoice::RowProjection,
            AlgorithmArg::Template => AlgorithmChoice::TemplateMatching,
        }
    }
}

pub fn capture_mode(horizontal: bool) -> CaptureMode {
    if horizontal {
        CaptureMode::Horizontal
    } else {
        CaptureMode::Vertical
    }
}

/// Read a stitch config from a TOML file, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<StitchConfig> {
    let Some(path) = path else {
        return Ok(StitchConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: StitchConfig = toml::from_str(&contents).context("Invalid stitch config")?;
    config.validate()?;
    Ok(config)
}
