#![forbid(unsafe_code)]

mod config;
mod workload;

use anyhow::{ensure, Result};
use tracing_subscriber::EnvFilter;

use crate::config::RunConfig;

fn main() -> Result<()> {
    let config = RunConfig::load()?;

    let filter = match config.log_level.as_deref() {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        queues = config.queues,
        buffers_per_queue = config.buffers_per_queue,
        simulated_clock = config.simulated_clock,
        "starting cmdsync workload"
    );

    let report = workload::run(&config)?;
    if config.json {
        println!("{}", report.to_json());
    } else {
        println!("{}", report.summary());
    }

    ensure!(
        report.final_value == report.expected_value,
        "event chain stopped at {} (expected {})",
        report.final_value,
        report.expected_value
    );
    ensure!(
        report.errored == report.expected_errors,
        "unexpected command buffer errors at chain positions {:?}",
        report.errored
    );
    Ok(())
}
