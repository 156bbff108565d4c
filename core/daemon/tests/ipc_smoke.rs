use serde_json::json;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use stint_daemon_protocol::{Method, Request, Response, PROTOCOL_VERSION};

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_daemon(home: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_stint-daemon"))
        .env("HOME", home)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn stint-daemon")
}

fn socket_path(home: &Path) -> PathBuf {
    home.join(".stint").join("daemon.sock")
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for daemon socket at {}", path.display());
}

fn send_request(socket: &Path, request: Request) -> Response {
    let mut stream = UnixStream::connect(socket).expect("Failed to connect to daemon socket");
    serde_json::to_writer(&mut stream, &request).expect("Failed to serialize request");
    stream.write_all(b"\n").expect("Failed to write request");
    stream.flush().ok();
    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).expect("Failed to read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    serde_json::from_slice(response_bytes).expect("Failed to parse response JSON")
}

fn request(method: Method, id: &str, params: Option<serde_json::Value>) -> Request {
    Request {
        protocol_version: PROTOCOL_VERSION,
        method,
        id: Some(id.to_string()),
        params,
    }
}

#[test]
fn daemon_ipc_start_stop_and_crash_recovery_smoke() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let guard = DaemonGuard { child };

    wait_for_socket(&socket, Duration::from_secs(2));

    let health = send_request(&socket, request(Method::GetHealth, "health-check", None));
    assert!(health.ok, "health response was not ok");
    let status = health
        .data
        .as_ref()
        .and_then(|data| data.get("status"))
        .and_then(|value| value.as_str())
        .unwrap_or("missing");
    assert_eq!(status, "ok");

    // An empty tag must be rejected before any state changes.
    let bad_start = send_request(
        &socket,
        request(Method::Start, "bad-start", Some(json!({ "tag": "  " }))),
    );
    assert!(!bad_start.ok);
    assert_eq!(
        bad_start.error.as_ref().map(|err| err.code.as_str()),
        Some("invalid_tag")
    );

    let started = send_request(
        &socket,
        request(Method::Start, "start-1", Some(json!({ "tag": "deep-work" }))),
    );
    assert!(started.ok, "start response was not ok");

    let status = send_request(&socket, request(Method::GetStatus, "status-1", None));
    let status_data = status.data.expect("status payload");
    assert_eq!(
        status_data.get("running").and_then(|value| value.as_bool()),
        Some(true)
    );
    assert_eq!(
        status_data.get("tag").and_then(|value| value.as_str()),
        Some("deep-work")
    );

    let stopped = send_request(&socket, request(Method::Stop, "stop-1", None));
    assert!(stopped.ok, "stop response was not ok");
    let stop_data = stopped.data.expect("stop payload");
    assert_eq!(
        stop_data.get("tag").and_then(|value| value.as_str()),
        Some("deep-work")
    );
    let duration = stop_data
        .get("duration_secs")
        .and_then(|value| value.as_i64())
        .expect("duration_secs");
    assert!(duration >= 0);

    let second_stop = send_request(&socket, request(Method::Stop, "stop-2", None));
    assert!(!second_stop.ok);
    assert_eq!(
        second_stop.error.as_ref().map(|err| err.code.as_str()),
        Some("not_running")
    );

    let tags = send_request(&socket, request(Method::ListTags, "tags-1", None));
    let tags_value = tags.data.expect("tags payload");
    assert_eq!(tags_value, json!(["deep-work"]));

    let stints = send_request(
        &socket,
        request(Method::ListStints, "stints-1", Some(json!({ "limit": 10 }))),
    );
    let stints_value = stints.data.expect("stints payload");
    let stints_array = stints_value.as_array().expect("stints payload is array");
    assert_eq!(stints_array.len(), 1);

    // Arm a new run, then kill the daemon without stopping it. The open
    // row must survive and be picked back up by a fresh process.
    let rearmed = send_request(
        &socket,
        request(Method::Start, "start-2", Some(json!({ "tag": "focus" }))),
    );
    assert!(rearmed.ok, "second start response was not ok");

    drop(guard);
    std::fs::remove_file(&socket).ok();

    let child = spawn_daemon(home.path());
    let _guard = DaemonGuard { child };
    wait_for_socket(&socket, Duration::from_secs(2));

    let recovered = send_request(&socket, request(Method::GetStatus, "status-2", None));
    let recovered_data = recovered.data.expect("recovered status payload");
    assert_eq!(
        recovered_data
            .get("running")
            .and_then(|value| value.as_bool()),
        Some(true),
        "run should be live again after restart"
    );
    assert_eq!(
        recovered_data.get("tag").and_then(|value| value.as_str()),
        Some("focus")
    );

    let closed = send_request(&socket, request(Method::Stop, "stop-3", None));
    assert!(closed.ok, "stop after recovery was not ok");

    let tags_after = send_request(&socket, request(Method::ListTags, "tags-2", None));
    let tags_after_value = tags_after.data.expect("tags payload");
    let tags_after_array = tags_after_value.as_array().expect("tags payload is array");
    assert!(tags_after_array.contains(&json!("deep-work")));
    assert!(tags_after_array.contains(&json!("focus")));

    // The recovered run closes exactly once: two records total, no
    // duplicate insertion of the interval that survived the crash.
    let stints_after = send_request(
        &socket,
        request(Method::ListStints, "stints-2", Some(json!({ "limit": 10 }))),
    );
    let stints_after_value = stints_after.data.expect("stints payload");
    let stints_after_array = stints_after_value
        .as_array()
        .expect("stints payload is array");
    assert_eq!(stints_after_array.len(), 2);
}
