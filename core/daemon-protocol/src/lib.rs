//! IPC protocol types and validation for stint-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema
//! drift. The daemon remains the authority on validation, but clients can
//! reuse the same types to construct valid requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024; // 64KB
pub const MAX_TAG_BYTES: usize = 128;
pub const MAX_LIST_LIMIT: usize = 1000;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    GetStatus,
    Start,
    Stop,
    Toggle,
    ListTags,
    ListStints,
    Suspend,
    Resume,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// Wire form of the current timer state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusPayload {
    pub running: bool,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

/// Wire form of one completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StintPayload {
    pub started_at: String,
    pub ended_at: String,
    pub duration_secs: i64,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartParams {
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListStintsParams {
    pub tag: Option<String>,
    pub limit: usize,
}

/// Parse and validate `start`/`toggle` params. The core re-validates the
/// tag, but rejecting junk at the boundary keeps error codes stable for
/// clients.
pub fn parse_start_params(params: Option<Value>) -> Result<StartParams, ErrorInfo> {
    let params = match params {
        Some(params) => params,
        None => return Err(ErrorInfo::new("invalid_params", "tag is required")),
    };
    if !params.is_object() {
        return Err(ErrorInfo::new("invalid_params", "params must be an object"));
    }

    let tag = params
        .get("tag")
        .and_then(|value| value.as_str())
        .map(str::trim)
        .unwrap_or_default();
    if tag.is_empty() {
        return Err(ErrorInfo::new("invalid_tag", "tag must not be empty"));
    }
    if tag.len() > MAX_TAG_BYTES {
        return Err(ErrorInfo::new(
            "invalid_tag",
            format!("tag must be {} bytes or fewer", MAX_TAG_BYTES),
        ));
    }

    Ok(StartParams {
        tag: tag.to_string(),
    })
}

pub fn parse_list_params(params: Option<Value>) -> Result<ListStintsParams, ErrorInfo> {
    let mut tag = None;
    let mut limit = 100usize;

    if let Some(params) = params {
        if !params.is_object() {
            return Err(ErrorInfo::new("invalid_params", "params must be an object"));
        }
        if let Some(value) = params.get("tag").and_then(|value| value.as_str()) {
            if !value.trim().is_empty() {
                tag = Some(value.trim().to_string());
            }
        }
        if let Some(value) = params.get("limit").and_then(|value| value.as_u64()) {
            limit = (value as usize).min(MAX_LIST_LIMIT);
        }
    }

    Ok(ListStintsParams { tag, limit })
}
