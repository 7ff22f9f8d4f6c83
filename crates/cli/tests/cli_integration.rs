//! Runs the `loopbot` binary against a market file on disk.

use std::path::Path;
use std::process::Command;

const MARKET: &str = r#"
[[pairs]]
exchange = "kraken"
base = "BTC"
quote = "USD"
bids = [["10", "5"]]
asks = [["10.1", "5"]]

[[pairs]]
exchange = "kraken"
base = "ETH"
quote = "USD"
bids = [["4.9", "100"]]
asks = [["5", "100"]]

[[pairs]]
exchange = "kraken"
base = "ETH"
quote = "BTC"
bids = [["1.8", "100"]]
asks = [["1.85", "100"]]

[[balances]]
exchange = "kraken"
symbol = "BTC"
available = "10"

[[balances]]
exchange = "kraken"
symbol = "USD"
available = "1000"

[[balances]]
exchange = "kraken"
symbol = "ETH"
available = "2"
"#;

fn loopbot(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_loopbot"))
        .args(args)
        .current_dir(dir)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run loopbot")
}

fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("market.toml"), MARKET).unwrap();
    dir
}

#[test]
fn test_scan_prints_json_summaries() {
    let dir = workspace();
    let output = loopbot(dir.path(), &["scan", "--market", "market.toml", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let loops: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let loops = loops.as_array().unwrap();
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0]["best_direction"], "forward");
    assert_eq!(loops[0]["limiting_coin"], "ETH@kraken");
}

#[test]
fn test_validate_reports_counts() {
    let dir = workspace();
    let output = loopbot(dir.path(), &["validate", "--market", "market.toml", "--json"]);
    assert!(output.status.success());

    let overview: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(overview["pairs"], 3);
    assert_eq!(overview["coins"], 3);
    assert_eq!(overview["funded_coins"], 3);
}

#[test]
fn test_run_executes_fixed_number_of_steps() {
    let dir = workspace();
    let output = loopbot(
        dir.path(),
        &["run", "--market", "market.toml", "--steps", "1", "--interval-ms", "1"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Executions:   1"), "{stdout}");
}

#[test]
fn test_missing_market_file_fails() {
    let dir = workspace();
    let output = loopbot(dir.path(), &["validate", "--market", "nope.toml"]);
    assert!(!output.status.success());
}
