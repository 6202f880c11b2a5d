//! Integration tests for the vecbench CLI
//!
//! These tests run the vecbench binary against the simulated backend with
//! short measurement windows.

use std::fs;

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

/// Get a Command for vecbench with the user config directory isolated
fn vecbench(config_dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("vecbench");
    cmd.env("VECBENCH_CONFIG_DIR", config_dir.path())
        .env_remove("RUST_LOG")
        .env_remove("VECBENCH_LOG")
        .env_remove("VECBENCH_LOG_LEVEL");
    cmd
}

/// A short sweep against the simulated backend
fn quick_run(config_dir: &TempDir) -> Command {
    let mut cmd = vecbench(config_dir);
    cmd.args([
        "run",
        "--backend",
        "simulated",
        "--latency-ms",
        "0.2",
        "--duration",
        "0.2",
    ]);
    cmd
}

// ============================================================================
// Help and version
// ============================================================================

#[test]
fn test_help_flag() {
    let dir = tempdir().unwrap();
    vecbench(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: vecbench"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_no_subcommand_prints_version() {
    let dir = tempdir().unwrap();
    vecbench(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ============================================================================
// run
// ============================================================================

#[test]
fn test_run_human_output() {
    let dir = tempdir().unwrap();
    quick_run(&dir)
        .args(["--concurrency", "1,2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend: simulated"))
        .stdout(predicate::str::contains("concurrency"))
        .stdout(predicate::str::is_match(r"max qps: [0-9]+\.[0-9]{4} at concurrency [12]").unwrap());
}

#[test]
fn test_run_quiet_prints_only_summary() {
    let dir = tempdir().unwrap();
    let output = quick_run(&dir)
        .args(["--quiet", "--concurrency", "2"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "{stdout}");
    assert!(lines[0].starts_with("max qps: "));
    assert!(lines[0].ends_with("at concurrency 2"));
}

#[test]
fn test_run_json_output() {
    let dir = tempdir().unwrap();
    let output = quick_run(&dir)
        .args(["--format", "json", "--concurrency", "1,3", "--nq", "2"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(result["backend"], "simulated");
    let samples = result["samples"].as_array().unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0]["concurrency"], 1);
    assert_eq!(samples[1]["concurrency"], 3);
    assert_eq!(samples[1]["workers"].as_array().unwrap().len(), 3);

    let max_qps = result["max_qps"].as_f64().unwrap();
    assert!(max_qps > 0.0);
    let best = samples
        .iter()
        .map(|s| s["qps"].as_f64().unwrap())
        .fold(0.0, f64::max);
    assert_eq!(max_qps, best);
    assert!(result.get("aborted_at").is_none());
}

#[test]
fn test_run_with_query_file_and_filter() {
    let dir = tempdir().unwrap();
    let queries = dir.path().join("queries.json");
    fs::write(&queries, "[[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]").unwrap();

    vecbench(&dir)
        .args(["run", "--queries"])
        .arg(&queries)
        .args([
            "--backend",
            "flat",
            "--concurrency",
            "1",
            "--duration",
            "0.2",
            "-k",
            "5",
            "--filter-id-gte",
            "10",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend: flat"));
}

#[test]
fn test_run_from_config_file() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("bench.toml");
    fs::write(
        &config,
        r#"
concurrencies = [2]
duration_secs = 0.2
k = 10

[dataset]
source = "random"
count = 20
dim = 8
seed = 3

[backend]
kind = "simulated"
latency_ms = 0.1
"#,
    )
    .unwrap();

    vecbench(&dir)
        .args(["--quiet", "run", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("at concurrency 2"));
}

// ============================================================================
// Failures and exit codes
// ============================================================================

#[test]
fn test_backend_failure_aborts_sweep() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("bench.toml");
    fs::write(
        &config,
        "concurrencies = [1, 2]\nduration_secs = 1.0\n\n[backend]\nkind = \"simulated\"\nlatency_ms = 0.0\nfail_after = 0\n",
    )
    .unwrap();

    vecbench(&dir)
        .args(["run", "--config"])
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("sweep aborted at concurrency 1"));
}

#[test]
fn test_backend_failure_json_envelope() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("bench.toml");
    fs::write(
        &config,
        "concurrencies = [1]\n\n[backend]\nkind = \"simulated\"\nfail_after = 0\n",
    )
    .unwrap();

    let output = vecbench(&dir)
        .args(["--format", "json", "run", "--config"])
        .arg(&config)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let envelope: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(envelope["error"]["type"], "sweep_aborted");
    assert_eq!(envelope["error"]["concurrency"], 1);
}

#[test]
fn test_zero_concurrency_is_usage_error() {
    let dir = tempdir().unwrap();
    quick_run(&dir)
        .args(["--concurrency", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid concurrencies"));
}

#[test]
fn test_latency_without_simulated_backend() {
    let dir = tempdir().unwrap();
    vecbench(&dir)
        .args(["run", "--latency-ms", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--latency-ms"));
}

#[test]
fn test_missing_config_file() {
    let dir = tempdir().unwrap();
    vecbench(&dir)
        .args(["run", "--config"])
        .arg(dir.path().join("missing.toml"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn test_malformed_config_file() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("bench.toml");
    fs::write(&config, "concurrencies = \"many\"\n").unwrap();

    vecbench(&dir)
        .args(["run", "--config"])
        .arg(&config)
        .assert()
        .code(3);
}

#[test]
fn test_unknown_flag_json_envelope() {
    let dir = tempdir().unwrap();
    let output = vecbench(&dir)
        .args(["--format", "json", "run", "--bogus"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let envelope: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(envelope["error"]["type"], "usage_error");
}

// ============================================================================
// config
// ============================================================================

#[test]
fn test_config_prints_defaults() {
    let dir = tempdir().unwrap();
    vecbench(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("concurrencies = ["))
        .stdout(predicate::str::contains("duration_secs = 30.0"))
        .stdout(predicate::str::contains("[backend]"));
}

#[test]
fn test_config_output_round_trips_through_run() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("written.toml");

    vecbench(&dir)
        .args(["config", "--output"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default config"));

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("k = 100"));

    // The written file is accepted by `run`; flags still take precedence
    quick_run(&dir)
        .arg("--config")
        .arg(&path)
        .args(["--concurrency", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("at concurrency 1"));
}

#[test]
fn test_user_config_is_picked_up() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "concurrencies = [3]\nduration_secs = 0.2\n\n[backend]\nkind = \"simulated\"\nlatency_ms = 0.1\n",
    )
    .unwrap();

    vecbench(&dir)
        .args(["--quiet", "run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("at concurrency 3"));
}
