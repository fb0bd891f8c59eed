#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use workerlink_transport::ControlSocket;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/wlcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("socket {} did not appear", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

/// Stub worker that is stopped and cleaned up when dropped.
struct StubWorker {
    child: Child,
    dir: PathBuf,
    sock_path: PathBuf,
}

impl StubWorker {
    fn start(tag: &str, extra: &[&str]) -> Self {
        let dir = unique_temp_dir(tag);
        let sock_path = dir.join("worker.sock");

        let child = Command::new(env!("CARGO_BIN_EXE_workerlink"))
            .arg("--log-level")
            .arg("error")
            .arg("stub-worker")
            .arg(&sock_path)
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("stub worker should start");

        wait_for_socket(&sock_path, Duration::from_secs(3));
        Self {
            child,
            dir,
            sock_path,
        }
    }
}

impl Drop for StubWorker {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn workerlink(args: &[&str], sock_path: &Path, tail: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_workerlink"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .arg(sock_path)
        .args(tail)
        .output()
        .expect("workerlink should run")
}

#[test]
fn request_prints_echoed_data_as_json() {
    let worker = StubWorker::start("request", &[]);

    let output = workerlink(
        &["--format", "json", "request"],
        &worker.sock_path,
        &[
            "--method",
            "router.dump",
            "--internal",
            r#"{"routerId":"r1"}"#,
            "--data",
            r#"{"foo":"bar"}"#,
        ],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let line: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("request should emit json");
    assert_eq!(line["method"], "router.dump");
    assert_eq!(line["accepted"], true);
    assert_eq!(line["data"], serde_json::json!({"foo": "bar"}));
}

#[test]
fn validation_rejection_exits_60() {
    let worker = StubWorker::start("reject", &[]);

    let output = workerlink(&["request"], &worker.sock_path, &["--method", "fail"]);

    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("validation error"), "stderr: {stderr}");
}

#[test]
fn request_to_missing_socket_exits_3() {
    let dir = unique_temp_dir("missing");
    let output = workerlink(
        &["request"],
        &dir.join("absent.sock"),
        &["--method", "worker.dump"],
    );

    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn silent_worker_times_out_with_124() {
    let dir = unique_temp_dir("silent");
    let sock_path = dir.join("silent.sock");
    let socket = ControlSocket::bind(&sock_path).expect("socket should bind");

    let silent = thread::spawn(move || {
        let stream = socket.accept().expect("socket should accept");
        // Hold the connection open without ever answering.
        thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let output = workerlink(
        &["request"],
        &sock_path,
        &["--method", "worker.dump", "--timeout", "200ms"],
    );

    assert_eq!(output.status.code(), Some(124));
    silent.join().expect("silent worker should finish");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_data_json_is_usage_error() {
    let worker = StubWorker::start("usage", &[]);

    let output = workerlink(
        &["request"],
        &worker.sock_path,
        &["--method", "worker.dump", "--data", "{nope"],
    );

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn watch_prints_periodic_notifications() {
    let worker = StubWorker::start(
        "watch",
        &[
            "--notify-target",
            "abc",
            "--notify-event",
            "tick",
            "--notify-interval",
            "50ms",
        ],
    );

    let output = workerlink(
        &["--format", "json", "watch"],
        &worker.sock_path,
        &["--target", "abc", "--event", "tick", "--count", "2"],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect();
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert_eq!(line["target_id"], "abc");
        assert_eq!(line["event"], "tick");
    }
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_workerlink"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("workerlink {}", env!("CARGO_PKG_VERSION"))
    );
}
