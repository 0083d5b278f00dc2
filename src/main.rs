mod audio;
mod config;
mod controller;
mod fps;
mod gesture;
mod model_download;
mod pipeline;
mod shutdown;
mod status;
mod types;

use anyhow::{Context, Result};
use clap::Parser;

use config::{CliArgs, ControlConfig};
use shutdown::ExitSignal;

fn main() -> Result<()> {
    env_logger::init();

    let config = ControlConfig::from_args(CliArgs::parse()).context("invalid arguments")?;
    log::debug!("{config:?}");

    let exit = ExitSignal::new();
    exit.register_os_signals()
        .context("failed to install signal handlers")?;

    controller::start(config, exit)
}
