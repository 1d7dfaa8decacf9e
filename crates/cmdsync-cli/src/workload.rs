//! Event-chained workload.
//!
//! Buffer `k` of the chain lives on queue `k % queues`, waits for the shared event to reach `k`,
//! runs one work item and signals `k + 1`. Each queue enqueues its buffers in chain order and then
//! commits them in reverse, so completion depends on the queues honouring enqueue order.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use cmdsync::{
    ClockSource, CommandBuffer, CommandBufferDescriptor, CommandBufferStatus, CommandQueueConfig,
    Device, DeviceConfig, ManualClock, SyncStatsSnapshot, Work,
};
use tracing::{debug, info, warn};

use crate::config::RunConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub final_value: u64,
    pub expected_value: u64,
    /// Chain positions that ended in the `Error` state.
    pub errored: Vec<usize>,
    /// Chain positions expected to error (from `--fail-at`).
    pub expected_errors: Vec<usize>,
    pub device_time_ns: u64,
    pub wall_time_ms: u128,
    pub stats: SyncStatsSnapshot,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.final_value == self.expected_value && self.errored == self.expected_errors
    }

    pub fn to_json(&self) -> String {
        let list = |items: &[usize]| {
            items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "{{\"final_value\":{},\"expected_value\":{},\"errored\":[{}],\"expected_errors\":[{}],\"device_time_ns\":{},\"wall_time_ms\":{},\"stats\":{}}}",
            self.final_value,
            self.expected_value,
            list(&self.errored),
            list(&self.expected_errors),
            self.device_time_ns,
            self.wall_time_ms,
            self.stats.to_json(),
        )
    }

    pub fn summary(&self) -> String {
        format!(
            "event value {}/{} | buffers committed={} completed={} errored={} | waits={} stalls={} | device time {}ns | wall {}ms",
            self.final_value,
            self.expected_value,
            self.stats.buffers_committed,
            self.stats.buffers_completed,
            self.stats.buffers_errored,
            self.stats.event_waits,
            self.stats.event_wait_stalls,
            self.device_time_ns,
            self.wall_time_ms,
        )
    }
}

pub fn run(config: &RunConfig) -> Result<RunReport> {
    let clock_source = if config.simulated_clock {
        ClockSource::manual(&Arc::new(ManualClock::default()))
    } else {
        ClockSource::Host
    };
    let device = Device::new(DeviceConfig {
        clock: clock_source,
        ..Default::default()
    });
    let started_ns = device.clock().now_ns();
    let wall_start = Instant::now();

    let queues = (0..config.queues)
        .map(|index| {
            device
                .new_command_queue_with_config(CommandQueueConfig {
                    label: Some(format!("queue-{index}")),
                    max_command_buffer_count: config.buffers_per_queue,
                })
                .with_context(|| format!("failed to create queue {index}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let event = device.new_event().context("failed to create chain event")?;
    event.set_label(Some("chain".to_string()));

    let total = config.total_buffers();
    let mut per_queue: Vec<Vec<(usize, CommandBuffer)>> =
        (0..config.queues).map(|_| Vec::new()).collect();
    for position in 0..total {
        let queue_index = position % config.queues;
        let mut buffer = queues[queue_index]
            .command_buffer_with_descriptor(&CommandBufferDescriptor {
                label: Some(format!("chain-{position}")),
                ..Default::default()
            })
            .with_context(|| format!("failed to create buffer {position}"))?;

        let mut work = Work::new(format!("step-{position}")).with_cost_ns(config.work_cost_ns);
        if config.fail_at == Some(position) {
            work = work.with_kernel(move || Err(format!("injected failure at {position}")));
        }

        buffer.encode_wait_for_event(&event, position as u64)?;
        buffer.work_encoder()?.dispatch(work);
        buffer.encode_signal_event(&event, position as u64 + 1)?;
        buffer.enqueue()?;
        per_queue[queue_index].push((position, buffer));
    }

    let mut submitted = Vec::with_capacity(total);
    for buffers in per_queue {
        for (position, mut buffer) in buffers.into_iter().rev() {
            buffer
                .commit()
                .with_context(|| format!("failed to commit buffer {position}"))?;
            debug!(position, buffer = %buffer.handle(), "committed chain buffer");
            submitted.push((position, buffer));
        }
    }
    info!(buffers = total, queues = config.queues, "workload submitted");

    submitted.sort_by_key(|(position, _)| *position);
    let mut errored = Vec::new();
    for (position, buffer) in &submitted {
        buffer.wait_until_completed()?;
        if buffer.status() == CommandBufferStatus::Error {
            warn!(
                position,
                error = ?buffer.error(),
                "chain buffer finished with an error"
            );
            errored.push(*position);
        }
    }

    Ok(RunReport {
        final_value: event.value(),
        expected_value: total as u64,
        errored,
        expected_errors: config.fail_at.into_iter().collect(),
        device_time_ns: device.clock().now_ns().saturating_sub(started_ns),
        wall_time_ms: wall_start.elapsed().as_millis(),
        stats: device.stats().snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(queues: usize, buffers: usize, fail_at: Option<usize>) -> RunConfig {
        RunConfig {
            queues,
            buffers_per_queue: buffers,
            work_cost_ns: 100,
            simulated_clock: true,
            fail_at,
            log_level: None,
            json: false,
        }
    }

    #[test]
    fn chain_reaches_total() {
        let report = run(&config(3, 4, None)).unwrap();
        assert_eq!(report.final_value, 12);
        assert!(report.errored.is_empty());
        assert!(report.is_success());
        assert_eq!(report.stats.buffers_completed, 12);
        assert_eq!(report.device_time_ns, 1_200);
    }

    #[test]
    fn injected_failure_still_lets_chain_finish() {
        let report = run(&config(2, 3, Some(2))).unwrap();
        assert_eq!(report.final_value, 6);
        assert_eq!(report.errored, vec![2]);
        assert!(report.is_success());
        assert_eq!(report.stats.buffers_errored, 1);
    }

    #[test]
    fn json_report_embeds_stats() {
        let report = run(&config(1, 2, None)).unwrap();
        let json = report.to_json();
        assert!(json.contains("\"final_value\":2"));
        assert!(json.contains("\"errored\":[]"));
        assert!(json.contains("\"stats\":{\"buffers_created\":2"));
    }
}
