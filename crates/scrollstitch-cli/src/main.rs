mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scrollstitch", about = "Stitch scrolling screenshots into one image")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stitch a sequence of screenshots
    Stitch(commands::stitch::StitchArgs),
    /// Find sticky headers and footers in a sequence of screenshots
    Detect(commands::detect::DetectArgs),
    /// Print or save the default stitch config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Stitch(args) => commands::stitch::run(args),
        Commands::Detect(args) => commands::detect::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
