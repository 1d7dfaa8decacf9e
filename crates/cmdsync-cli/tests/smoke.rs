use assert_cmd::Command;
use predicates::prelude::*;

fn cmdsync() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cmdsync"));
    for var in [
        "CMDSYNC_QUEUES",
        "CMDSYNC_BUFFERS",
        "CMDSYNC_WORK_COST_NS",
        "CMDSYNC_SIMULATED_CLOCK",
        "CMDSYNC_FAIL_AT",
        "CMDSYNC_LOG_LEVEL",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_mentions_workload_flags() {
    cmdsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--queues"))
        .stdout(predicate::str::contains("--fail-at"))
        .stdout(predicate::str::contains("--simulated-clock"));
}

#[test]
fn simulated_run_prints_json_report() {
    cmdsync()
        .args(["--simulated-clock", "--queues", "2", "--buffers", "4", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"final_value\":8"))
        .stdout(predicate::str::contains("\"buffers_completed\":8"))
        .stdout(predicate::str::contains("\"device_time_ns\":8000"));
}

#[test]
fn host_clock_run_prints_summary() {
    cmdsync()
        .args(["--queues", "3", "--buffers", "2", "--work-cost-ns", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("event value 6/6"));
}

#[test]
fn injected_failure_is_expected() {
    cmdsync()
        .args(["--simulated-clock", "--buffers", "2", "--fail-at", "1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"errored\":[1]"))
        .stdout(predicate::str::contains("\"buffers_errored\":1"));
}

#[test]
fn env_configures_the_run() {
    cmdsync()
        .env("CMDSYNC_QUEUES", "1")
        .env("CMDSYNC_BUFFERS", "5")
        .env("CMDSYNC_SIMULATED_CLOCK", "true")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"final_value\":5"));
}

#[test]
fn invalid_configuration_fails() {
    cmdsync()
        .args(["--queues", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--queues must be at least 1"));
}
