use clap::Parser;
use color_eyre::Result;
use rockfall_twin::cli::CliArgs;
use rockfall_twin::config::init_app_config;
use rockfall_twin::{event, logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Setup error handling
    color_eyre::install()?;

    let args = CliArgs::parse();
    args.apply_env_overrides();
    logging::init_logging();

    let config = init_app_config()?;
    tracing::debug!(api = %config.api_url, view = %config.view, "configuration loaded");

    if let Some(rain) = args.what_if {
        return event::run_what_if(&config, rain, args.hours, args.json).await;
    }

    if args.headless {
        return event::run_headless(&config, args.json).await;
    }

    // Live mode: one bbox per line on stdin
    event::run(&config, args.json).await
}
