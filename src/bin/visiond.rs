//! visiond - capture daemon
//!
//! This daemon:
//! 1. Optionally serves a live annotated preview over HTTP (-w)
//! 2. Optionally loads the detection model (-y)
//! 3. Captures frames until Ctrl-C, running detection on each one

use anyhow::Result;
use clap::Parser;

use vision_relay::config::{Cli, VisiondConfig};
use vision_relay::runtime;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let cfg = VisiondConfig::load(&cli)?;

    let rt = runtime::launch(&cfg)?;

    let shutdown = rt.shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        shutdown.trigger();
    })?;

    let stats = rt.run()?;
    log::info!(
        "visiond exiting: frames={} published={} acquire_failures={} inference_failures={}",
        stats.frames_captured,
        stats.frames_published,
        stats.acquire_failures,
        stats.inference_failures
    );
    Ok(())
}
