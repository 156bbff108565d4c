//! Stint daemon entrypoint.
//!
//! A small, single-writer service that owns the stopwatch, its SQLite run
//! ledger, and the tick schedule. Clients talk to it over newline-framed
//! JSON on a Unix socket; suspend/resume lifecycle edges arrive either as
//! requests or as termination signals.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stint_daemon_protocol::{
    parse_list_params, parse_start_params, ErrorInfo, Method, Request, Response, StintPayload,
    MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};

use stint_core::{StintError, StintRecord};

mod config;
mod db;
mod observer;
mod service;
mod ticker;

use db::Db;
use service::{StintService, ToggleOutcome};

const SOCKET_NAME: &str = "daemon.sock";
const DB_NAME: &str = "stint.db";
const CONFIG_NAME: &str = "config.toml";
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

fn main() {
    init_logging();

    let socket_path = match daemon_socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "Stint daemon started");

    let db_path = match daemon_db_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon database path");
            std::process::exit(1);
        }
    };

    let db = match Db::new(db_path) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "Failed to initialize daemon database");
            std::process::exit(1);
        }
    };

    let config = match daemon_config_path().and_then(|path| config::load_config(&path)) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load daemon config; using defaults");
            config::DaemonConfig::default()
        }
    };
    info!(
        tick_interval_ms = config.timer.tick_interval_ms,
        "Daemon config loaded"
    );

    let service = StintService::new(db, Duration::from_millis(config.timer.tick_interval_ms));

    // The becameActive edge for a fresh process: pick up any run that was
    // armed when the previous process lost control.
    service.resume();

    spawn_signal_watcher(Arc::clone(&service), socket_path.clone());

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let service = Arc::clone(&service);
                thread::spawn(|| handle_connection(stream, service));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

/// Termination is treated as the enteredBackground edge: the schedule is
/// halted but the open row stays armed, so the run is reconstructed on the
/// next startup.
fn spawn_signal_watcher(service: Arc<StintService>, socket_path: PathBuf) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            warn!(error = %err, "Failed to register signal handlers");
            return;
        }
    };

    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "Shutting down; any open stint stays armed");
            service.suspend();
            let _ = fs::remove_file(&socket_path);
            std::process::exit(0);
        }
    });
}

fn init_logging() {
    let debug_enabled = env::var("STINT_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn daemon_socket_path() -> Result<PathBuf, String> {
    Ok(stint_home()?.join(SOCKET_NAME))
}

fn daemon_db_path() -> Result<PathBuf, String> {
    Ok(stint_home()?.join(DB_NAME))
}

fn daemon_config_path() -> Result<PathBuf, String> {
    Ok(stint_home()?.join(CONFIG_NAME))
}

fn stint_home() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".stint"))
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, service: Arc<StintService>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, service);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    if buffer.is_empty() {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let request_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(request: Request, service: Arc<StintService>) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => Response::ok(
            request.id,
            serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
            }),
        ),
        Method::GetStatus => status_response(request.id, &service),
        Method::Start => {
            let params = match parse_start_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            match service.start(&params.tag) {
                Ok(status) => match serde_json::to_value(status) {
                    Ok(value) => Response::ok(request.id, value),
                    Err(err) => serialization_error(request.id, err),
                },
                Err(err) => stint_error_response(request.id, err),
            }
        }
        Method::Stop => match service.stop() {
            Ok(Some(record)) => match serde_json::to_value(stint_payload(&record)) {
                Ok(value) => Response::ok(request.id, value),
                Err(err) => serialization_error(request.id, err),
            },
            Ok(None) => Response::error(request.id, "not_running", "no stint is running"),
            Err(err) => stint_error_response(request.id, err),
        },
        Method::Toggle => {
            let params = match parse_start_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            match service.toggle(&params.tag) {
                Ok(ToggleOutcome::Started(status)) => {
                    let payload = serde_json::json!({
                        "action": "started",
                        "status": status,
                    });
                    Response::ok(request.id, payload)
                }
                Ok(ToggleOutcome::Stopped(record)) => {
                    let payload = serde_json::json!({
                        "action": "stopped",
                        "stint": stint_payload(&record),
                    });
                    Response::ok(request.id, payload)
                }
                Err(err) => stint_error_response(request.id, err),
            }
        }
        Method::ListTags => match service.list_tags() {
            Ok(tags) => match serde_json::to_value(tags) {
                Ok(value) => Response::ok(request.id, value),
                Err(err) => serialization_error(request.id, err),
            },
            Err(err) => stint_error_response(request.id, err),
        },
        Method::ListStints => {
            let params = match parse_list_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            match service.list_stints(params.tag.as_deref(), params.limit) {
                Ok(records) => {
                    let payloads: Vec<StintPayload> =
                        records.iter().map(stint_payload).collect();
                    match serde_json::to_value(payloads) {
                        Ok(value) => Response::ok(request.id, value),
                        Err(err) => serialization_error(request.id, err),
                    }
                }
                Err(err) => stint_error_response(request.id, err),
            }
        }
        Method::Suspend => {
            service.suspend();
            status_response(request.id, &service)
        }
        Method::Resume => {
            service.resume();
            status_response(request.id, &service)
        }
    }
}

fn status_response(id: Option<String>, service: &Arc<StintService>) -> Response {
    match serde_json::to_value(service.status()) {
        Ok(value) => Response::ok(id, value),
        Err(err) => serialization_error(id, err),
    }
}

fn stint_payload(record: &StintRecord) -> StintPayload {
    StintPayload {
        started_at: record.started_at.to_rfc3339(),
        ended_at: record.ended_at.to_rfc3339(),
        duration_secs: record.duration_secs,
        tag: record.tag.clone(),
    }
}

fn stint_error_response(id: Option<String>, err: StintError) -> Response {
    let code = match &err {
        StintError::EmptyTag => "invalid_tag",
        StintError::Store(_) => "store_error",
        StintError::CorruptOpenStint(_) => "corrupt_open_stint",
    };
    Response::error(id, code, err.to_string())
}

fn serialization_error(id: Option<String>, err: serde_json::Error) -> Response {
    Response::error(
        id,
        "serialization_error",
        format!("Failed to serialize response payload: {}", err),
    )
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
