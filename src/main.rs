mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use pagepress::config::Config;
use pagepress::{api, observability, worker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => api::run(load_config(args.config)?).await?,
        Commands::Worker(args) => worker::run(load_config(args.config)?).await?,
    }

    Ok(())
}

fn load_config(
    path: Option<std::path::PathBuf>,
) -> Result<Config, Box<dyn std::error::Error + Send + Sync>> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}
