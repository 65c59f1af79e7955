//! CLI integration tests for taskgraph
//!
//! Each test writes a machine file into a temporary directory and drives
//! the binary against it. The user config is pinned to an empty file so
//! the host's own config never leaks in.

use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const ADDER: &str = r#"
states = ["empty", "add", "print", "done"]

[[edges]]
id = "fill"
from = ["empty"]
to = ["add"]

[[edges]]
id = "count"
from = ["add"]
to = ["print"]

[[edges]]
id = "show"
from = ["print"]
to = ["done"]

[[items]]
id = "counter"
current = "empty"
desired = "done"
"#;

/// `dial` lands on `lost` the first time it fires and on `ready` after
const FLAKY: &str = r#"
states = ["idle", "ready", "lost"]

[[edges]]
id = "dial"
from = ["idle"]
to = ["ready"]
errors = ["lost"]
outcomes = ["lost", "ready"]

[[edges]]
id = "retry"
from = ["lost"]
to = ["idle"]

[[items]]
id = "svc"
current = "idle"
desired = "ready"
"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), "").unwrap();
        Self { dir }
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    /// Get a command instance for the taskgraph binary
    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("taskgraph"));
        cmd.env("TASKGRAPH_CONFIG", self.dir.path().join("config.toml"))
            .env_remove("TASKGRAPH_MAX_REPLANS")
            .env_remove("TASKGRAPH_WORKERS")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn json_stdout(assert: &assert_cmd::assert::Assert) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    serde_json::from_str(&stdout).unwrap()
}

// =============================================================================
// check
// =============================================================================

#[test]
fn test_check_summarizes_machine() {
    let ws = Workspace::new();
    let machine = ws.write("adder.toml", ADDER);

    ws.cmd()
        .arg("check")
        .arg(&machine)
        .assert()
        .success()
        .stdout(predicate::str::contains("4 states, 3 edges, 1 items (1 discrepant)"));
}

#[test]
fn test_check_json_reports_resolved_config() {
    let ws = Workspace::new();
    let machine = ws.write("adder.toml", ADDER);

    let assert = ws
        .cmd()
        .args(["--format", "json", "check"])
        .arg(&machine)
        .args(["--max-replans", "3"])
        .assert()
        .success();

    let json = json_stdout(&assert);
    assert_eq!(json["states"], 4);
    assert_eq!(json["items"], 1);
    assert_eq!(json["max_replans"], 3);
    assert_eq!(json["workers"], 1);
}

#[test]
fn test_check_rejects_unknown_state() {
    let ws = Workspace::new();
    let machine = ws.write(
        "bad.toml",
        r#"
states = ["a"]

[[edges]]
id = "jump"
from = ["a"]
to = ["b"]
"#,
    );

    ws.cmd()
        .arg("check")
        .arg(&machine)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown state 'b'"));
}

#[test]
fn test_check_missing_file_fails() {
    let ws = Workspace::new();

    ws.cmd()
        .arg("check")
        .arg(ws.dir.path().join("absent.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read machine file"));
}

#[test]
fn test_invalid_user_config_fails() {
    let ws = Workspace::new();
    let machine = ws.write("adder.toml", ADDER);
    let config = ws.write("bad-config.toml", "[reconciler]\nworkers = 0\n");

    ws.cmd()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .arg(&machine)
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers must be at least 1"));
}

// =============================================================================
// plan
// =============================================================================

#[test]
fn test_plan_shows_path_without_firing() {
    let ws = Workspace::new();
    let machine = ws.write("adder.toml", ADDER);

    ws.cmd()
        .arg("plan")
        .arg(&machine)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "counter\tempty -> [fill] -> add -> [count] -> print -> [show] -> done",
        ));
}

#[test]
fn test_plan_json_for_single_item() {
    let ws = Workspace::new();
    let machine = ws.write("adder.toml", ADDER);

    let assert = ws
        .cmd()
        .args(["-f", "json", "plan"])
        .arg(&machine)
        .args(["--item", "counter"])
        .assert()
        .success();

    let json = json_stdout(&assert);
    assert_eq!(json[0]["id"], "counter");
    assert_eq!(json[0]["transitions"], 3);
    assert_eq!(json[0]["path"].as_array().unwrap().len(), 7);
}

#[test]
fn test_plan_unknown_item_fails() {
    let ws = Workspace::new();
    let machine = ws.write("adder.toml", ADDER);

    ws.cmd()
        .arg("plan")
        .arg(&machine)
        .args(["--item", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Item not found: ghost"));
}

#[test]
fn test_plan_reports_unreachable_item() {
    let ws = Workspace::new();
    let machine = ws.write(
        "island.toml",
        r#"
states = ["a", "b"]

[[items]]
id = "stuck"
current = "a"
desired = "b"
"#,
    );

    ws.cmd()
        .arg("plan")
        .arg(&machine)
        .assert()
        .success()
        .stdout(predicate::str::contains("unreachable: No path from 'a' to 'b'"));
}

#[test]
fn test_plan_nothing_to_reconcile() {
    let ws = Workspace::new();
    let machine = ws.write(
        "settled.toml",
        r#"
states = ["a"]

[[items]]
id = "x"
current = "a"
desired = "a"
"#,
    );

    ws.cmd()
        .arg("plan")
        .arg(&machine)
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to reconcile"));
}

// =============================================================================
// run
// =============================================================================

#[test]
fn test_run_converges_and_prints_trace() {
    let ws = Workspace::new();
    let machine = ws.write("adder.toml", ADDER);

    ws.cmd()
        .arg("run")
        .arg(&machine)
        .assert()
        .success()
        .stdout(predicate::str::contains("pass 1: 1 converged, 0 failed, 3 transitions, 0 deviations"))
        .stdout(predicate::str::contains("counter\tdone\tfill count show"));
}

#[test]
fn test_run_recovers_from_deviation() {
    let ws = Workspace::new();
    let machine = ws.write("flaky.toml", FLAKY);

    let assert = ws
        .cmd()
        .args(["--format", "json", "run"])
        .arg(&machine)
        .assert()
        .success();

    let json = json_stdout(&assert);
    assert_eq!(json["passes"][0]["deviations"], 1);
    assert_eq!(json["items"][0]["state"], "ready");
    assert_eq!(json["items"][0]["converged"], true);
    assert_eq!(
        json["items"][0]["trace"],
        serde_json::json!(["dial", "retry", "dial"])
    );
}

#[test]
fn test_run_stalls_without_replans() {
    let ws = Workspace::new();
    let machine = ws.write("flaky.toml", FLAKY);

    ws.cmd()
        .args(["--max-replans", "0", "run"])
        .arg(&machine)
        .assert()
        .failure()
        .stdout(predicate::str::contains("svc\tlost (desired ready)\tdial"))
        .stdout(predicate::str::contains("Item svc stalled after 0 replans"));
}

#[test]
fn test_run_extra_pass_finishes_stalled_item() {
    let ws = Workspace::new();
    let machine = ws.write("flaky.toml", FLAKY);

    let assert = ws
        .cmd()
        .env("TASKGRAPH_MAX_REPLANS", "0")
        .args(["-f", "json", "run"])
        .arg(&machine)
        .args(["--passes", "3"])
        .assert()
        .success();

    let json = json_stdout(&assert);
    let passes = json["passes"].as_array().unwrap();
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0]["failed"], 1);
    assert_eq!(passes[1]["converged"], 1);
    assert!(json["items"][0].get("error").is_none());
}

#[test]
fn test_machine_reconciler_table_and_flag_override() {
    let ws = Workspace::new();
    let strict = format!("{}\n[reconciler]\nmax_replans = 0\n", FLAKY);
    let machine = ws.write("strict.toml", &strict);

    ws.cmd().arg("run").arg(&machine).assert().failure();

    ws.cmd()
        .args(["--max-replans", "1", "run"])
        .arg(&machine)
        .assert()
        .success();
}

#[test]
fn test_run_reports_unreachable_item() {
    let ws = Workspace::new();
    let machine = ws.write(
        "mixed.toml",
        r#"
states = ["a", "b", "c"]

[[edges]]
id = "go"
from = ["a"]
to = ["b"]

[[items]]
id = "ok"
current = "a"
desired = "b"

[[items]]
id = "stuck"
current = "c"
desired = "a"
"#,
    );

    ws.cmd()
        .arg("run")
        .arg(&machine)
        .assert()
        .failure()
        .stdout(predicate::str::contains("ok\tb\tgo"))
        .stdout(predicate::str::contains("No path from 'c' to 'a'"));
}

#[test]
fn test_run_parallel_workers() {
    let ws = Workspace::new();
    let mut machine = String::from(
        r#"
states = ["new", "built", "live"]

[[edges]]
id = "build"
from = ["new"]
to = ["built"]

[[edges]]
id = "deploy"
from = ["built"]
to = ["live"]
"#,
    );
    for n in 0..6 {
        machine.push_str(&format!(
            "\n[[items]]\nid = \"svc{}\"\ncurrent = \"new\"\ndesired = \"live\"\n",
            n
        ));
    }
    let machine = ws.write("fleet.toml", &machine);

    let assert = ws
        .cmd()
        .args(["--workers", "3", "-f", "json", "run"])
        .arg(&machine)
        .assert()
        .success();

    let json = json_stdout(&assert);
    assert_eq!(json["passes"][0]["converged"], 6);
    assert_eq!(json["passes"][0]["transitions"], 12);
    for item in json["items"].as_array().unwrap() {
        assert_eq!(item["trace"], serde_json::json!(["build", "deploy"]));
    }
}
