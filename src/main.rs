// src/main.rs

use anyhow::Context;
use clap::Parser;
use std::io;
use std::time::Instant;
use sunset_blame::cli::Args;
use sunset_blame::RunConfig;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level())))
        .init();

    let start_time = Instant::now();
    let config = RunConfig::from_args(&args)?;
    let stdout = io::stdout();
    sunset_blame::run(&config, stdout.lock())
        .with_context(|| format!("sunset-blame failed for {}", config.git_dir.display()))?;
    info!("Total time: {:.2?}", start_time.elapsed());
    Ok(())
}
