use anyhow::{bail, Result};
use clap::Parser;

/// Drive an event-chained workload through the simulated command processor.
#[derive(Debug, Clone, Parser)]
#[command(name = "cmdsync", version, about)]
pub struct Args {
    /// Number of command queues.
    ///
    /// Environment variable: `CMDSYNC_QUEUES`.
    #[arg(long, env = "CMDSYNC_QUEUES", default_value_t = 2)]
    queues: usize,

    /// Command buffers submitted per queue.
    ///
    /// Environment variable: `CMDSYNC_BUFFERS`.
    #[arg(long, env = "CMDSYNC_BUFFERS", default_value_t = 8)]
    buffers: usize,

    /// Device time each buffer's work item takes (nanoseconds).
    ///
    /// Environment variable: `CMDSYNC_WORK_COST_NS`.
    #[arg(long, env = "CMDSYNC_WORK_COST_NS", default_value_t = 1_000)]
    work_cost_ns: u64,

    /// Use a simulated device clock instead of sleeping for work cost.
    ///
    /// Environment variable: `CMDSYNC_SIMULATED_CLOCK`.
    #[arg(long, env = "CMDSYNC_SIMULATED_CLOCK")]
    simulated_clock: bool,

    /// Make the work item of the buffer at this chain position (0-based) fail.
    ///
    /// Environment variable: `CMDSYNC_FAIL_AT`.
    #[arg(long, env = "CMDSYNC_FAIL_AT")]
    fail_at: Option<usize>,

    /// Log filter (tracing-subscriber EnvFilter syntax). Falls back to `RUST_LOG`, then `warn`.
    ///
    /// Environment variable: `CMDSYNC_LOG_LEVEL`.
    #[arg(long, env = "CMDSYNC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub queues: usize,
    pub buffers_per_queue: usize,
    pub work_cost_ns: u64,
    pub simulated_clock: bool,
    pub fail_at: Option<usize>,
    pub log_level: Option<String>,
    pub json: bool,
}

impl RunConfig {
    pub fn load() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        if args.queues == 0 {
            bail!("--queues must be at least 1");
        }
        if args.buffers == 0 {
            bail!("--buffers must be at least 1");
        }
        let Some(total) = args.queues.checked_mul(args.buffers) else {
            bail!(
                "--queues {} times --buffers {} overflows the chain length",
                args.queues,
                args.buffers
            );
        };
        if let Some(fail_at) = args.fail_at {
            if fail_at >= total {
                bail!("--fail-at {fail_at} is outside the chain of {total} buffers");
            }
        }

        Ok(Self {
            queues: args.queues,
            buffers_per_queue: args.buffers,
            work_cost_ns: args.work_cost_ns,
            simulated_clock: args.simulated_clock,
            fail_at: args.fail_at,
            log_level: args.log_level,
            json: args.json,
        })
    }

    /// Length of the event chain, which is also the event's expected final value.
    pub fn total_buffers(&self) -> usize {
        self.queues.saturating_mul(self.buffers_per_queue)
    }
}
