use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::{json, Value};
use tempfile::TempDir;

fn deploylog_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_deploylog"))
}

fn deploylog_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(deploylog_bin());
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env_remove("DEPLOYLOG_WRITE_TIMEOUT_MS")
        .env_remove("DEPLOYLOG_QUEUE_DEPTH");
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let assert = cmd.assert().success();
    serde_json::from_slice(&assert.get_output().stdout).expect("stdout is JSON")
}

// ---------------------------------------------------------------------------
// 1. Without a daemon
// ---------------------------------------------------------------------------

#[test]
fn status_reports_not_running() {
    let home = TempDir::new().expect("home");
    let status = json_output(deploylog_cmd(home.path()).args(["daemon", "status"]));
    assert_eq!(status["running"], json!(false));
}

#[test]
fn commands_need_a_project() {
    let home = TempDir::new().expect("home");
    deploylog_cmd(home.path())
        .args(["deploy", "list"])
        .assert()
        .failure()
        .stderr(contains("No project selected"));
}

#[test]
fn commands_explain_a_missing_daemon() {
    let home = TempDir::new().expect("home");
    deploylog_cmd(home.path())
        .args(["clients", "--project", "shop"])
        .assert()
        .failure()
        .stderr(contains("daemon is not running"));
}

#[test]
fn malformed_module_change_is_rejected_by_the_parser() {
    let home = TempDir::new().expect("home");
    deploylog_cmd(home.path())
        .args([
            "deploy", "add", "--project", "shop", "--user", "ci", "--version", "1", "--client",
            "acme", "--module", "cart-1.0",
        ])
        .assert()
        .failure()
        .stderr(contains("invalid module change"));
}

// ---------------------------------------------------------------------------
// 2. Against a running daemon
// ---------------------------------------------------------------------------

struct DaemonProcess {
    child: Child,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(home: PathBuf) -> Self {
        let child = deploylog_cmd(&home)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        Self { child, home }
    }

    fn stop(&mut self) {
        let _ = deploylog_cmd(&self.home).args(["daemon", "stop"]).status();

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn daemon_running(home: &Path) -> bool {
    let Ok(output) = deploylog_cmd(home).args(["daemon", "status"]).output() else {
        return false;
    };
    if !output.status.success() {
        return false;
    }
    serde_json::from_slice::<Value>(&output.stdout)
        .ok()
        .and_then(|value| value.get("running").and_then(Value::as_bool))
        .unwrap_or(false)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn add_deploy(home: &Path, client: &str, modules: &[&str]) -> String {
    let mut cmd = deploylog_cmd(home);
    cmd.args([
        "deploy", "add", "--user", "jenkins", "--version", "3.1.0", "--client", client,
        "--print-id",
    ]);
    for module in modules {
        cmd.args(["--module", *module]);
    }
    let assert = cmd.assert().success();
    String::from_utf8(assert.get_output().stdout.clone())
        .expect("stdout utf8")
        .trim()
        .to_string()
}

#[test]
fn deploy_history_through_the_cli() {
    let home = TempDir::new().expect("home");
    let mut daemon = DaemonProcess::start(home.path().to_path_buf());
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(home.path())),
        "daemon did not report running state in time",
    );

    deploylog_cmd(home.path())
        .args(["project", "create", "shop", "--description", "storefront", "--use"])
        .assert()
        .success()
        .stdout(contains("Created project 'shop'"));

    deploylog_cmd(home.path())
        .args(["project", "create", "shop"])
        .assert()
        .failure()
        .stderr(contains("already exists"));

    let first = add_deploy(home.path(), "acme", &["add:ModuleX@v0.1", "add:cart@1.0"]);
    let second = add_deploy(home.path(), "acme", &["remove:ModuleX@v0.1"]);
    add_deploy(home.path(), "globex", &["add:search@2.0"]);

    deploylog_cmd(home.path())
        .args(["event", "add", second.as_str(), "success", "-d", "rolled out"])
        .assert()
        .success();

    let deploy = json_output(
        deploylog_cmd(home.path()).args(["--json", "deploy", "show", second.as_str()]),
    );
    let statuses: Vec<&str> = deploy["events"]
        .as_array()
        .expect("events")
        .iter()
        .filter_map(|event| event["status"].as_str())
        .collect();
    assert_eq!(statuses, ["STARTED", "SUCCESS"]);

    let modules = json_output(deploylog_cmd(home.path()).args(["modules", "acme", "--json"]));
    assert_eq!(
        modules,
        json!([{"name": "cart", "version": "1.0", "status": "ADD"}])
    );

    let as_of = json_output(
        deploylog_cmd(home.path()).args(["modules", "acme", "--as-of", first.as_str(), "--json"]),
    );
    assert_eq!(as_of.as_array().map(Vec::len), Some(2));

    let clients = json_output(deploylog_cmd(home.path()).args(["clients", "--json"]));
    assert_eq!(clients, json!(["globex", "acme"]));

    let latest =
        json_output(deploylog_cmd(home.path()).args(["deploy", "list", "--max", "1", "--json"]));
    assert_eq!(latest[0]["client"], json!("globex"));

    deploylog_cmd(home.path())
        .args(["event", "add", second.as_str(), "done"])
        .assert()
        .failure();

    deploylog_cmd(home.path())
        .args(["project", "delete", "shop"])
        .assert()
        .success();
    deploylog_cmd(home.path())
        .args(["deploy", "list"])
        .assert()
        .failure()
        .stderr(contains("No project selected"));

    daemon.stop();
}
