use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pagepress")]
#[command(about = "PagePress CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the PagePress service: HTTP API plus the embedded render worker
    Serve(ServiceArgs),

    /// Run only the render worker and cleanup loops (no HTTP surface)
    Worker(ServiceArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServiceArgs {
    /// Path to a TOML configuration file (overrides PAGEPRESS_CONFIG)
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
}
