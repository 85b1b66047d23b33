//! `dispatchd`: the fleet dispatch backbone binary. Thin wrapper around the
//! `dispatchd` library — parse flags, load settings, set up tracing, run.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use dispatchd::cli::CliArgs;
use dispatchd::config::Settings;
use dispatchd::{logging, run, work_dir};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let dir = work_dir()?;
    let settings = Settings::load(&dir, args.config.clone().map(PathBuf::from))?;

    let _guard = logging::init(&dir, &settings.logging, args.dev)?;

    let result = run(args, settings).await;
    if let Err(err) = &result {
        tracing::error!("dispatchd exited with error: {err}");
    }
    result
}
