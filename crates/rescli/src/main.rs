use anyhow::Result;
use clap::Parser;
use tokio::task::LocalSet;

use rescache_service::logging;
use settings::{Cli, Commands, OutputFormat, Settings};

mod output;
mod resolve;
mod resource;
mod settings;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve(args) => {
            let settings = Settings::from_args(args)?;
            logging::init_logging(&settings.config.logging);

            let outcomes = LocalSet::new()
                .run_until(resolve::resolve_all(&settings))
                .await?;

            match settings.output_format {
                OutputFormat::Json => output::print_json(&outcomes)?,
                OutputFormat::Compact => output::print_compact(&outcomes),
            }
        }
    }

    Ok(())
}
