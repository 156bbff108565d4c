//! Client helper for talking to the stint daemon.
//!
//! The daemon is the only writer; this side only frames requests and
//! parses responses. Failures are surfaced to the caller, which decides
//! how loudly to report them.

use serde_json::Value;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use stint_daemon_protocol::{Method, Request, Response, PROTOCOL_VERSION};

const SOCKET_ENV: &str = "STINT_DAEMON_SOCKET";
const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_MS: u64 = 2000;
const WRITE_TIMEOUT_MS: u64 = 2000;

pub fn send_request(
    method: Method,
    id: &str,
    params: Option<Value>,
) -> Result<Response, String> {
    let socket = socket_path()?;
    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        format!(
            "Failed to connect to daemon at {}: {} (is stint-daemon running?)",
            socket.display(),
            err
        )
    })?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method,
        id: Some(id.to_string()),
        params,
    };
    tracing::debug!(method = ?request.method, id = %id, "Sending daemon request");

    serde_json::to_writer(&mut stream, &request)
        .map_err(|err| format!("Failed to serialize request: {}", err))?;
    stream
        .write_all(b"\n")
        .map_err(|err| format!("Failed to write request: {}", err))?;
    stream
        .flush()
        .map_err(|err| format!("Failed to flush request: {}", err))?;

    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Result<Response, String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream
            .read(&mut chunk)
            .map_err(|err| format!("Failed to read response: {}", err))?;
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

    serde_json::from_slice(response_bytes)
        .map_err(|err| format!("Failed to parse response: {}", err))
}

fn socket_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".stint").join(SOCKET_NAME))
}
