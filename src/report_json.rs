//! Purpose: JSON envelopes for every CLI command and for errors.
//! Exports: `remaining_json`, `status_json`, `interval_json`, `location_json`,
//!          `capabilities_json`, `error_json`.
//! Role: Keep stdout/stderr payload shapes in one place.
//! Invariants: Key names are stable; optional keys are omitted rather than null.
use std::error::Error as StdError;
use std::time::Duration;

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use yogrt::api::{Capabilities, Error, ErrorKind, JobStatus, Remaining, ResolvedLocation};

pub(crate) fn remaining_json(remaining: Remaining, now: OffsetDateTime) -> Value {
    let mut map = Map::new();
    match remaining {
        Remaining::Unlimited => {
            map.insert("unlimited".to_string(), json!(true));
        }
        Remaining::Limited(left) => {
            map.insert("unlimited".to_string(), json!(false));
            map.insert("seconds".to_string(), json!(left.as_secs()));
            if let Some(ends_at) = ends_at(now, left) {
                map.insert("ends_at".to_string(), json!(ends_at));
            }
        }
    }
    json!({ "remaining": Value::Object(map) })
}

fn ends_at(now: OffsetDateTime, left: Duration) -> Option<String> {
    let left = time::Duration::try_from(left).ok()?;
    now.checked_add(left)?.format(&Rfc3339).ok()
}

pub(crate) fn status_json(status: JobStatus) -> Value {
    let mut map = Map::new();
    map.insert("state".to_string(), json!(status.as_str()));
    if let JobStatus::Unrecognized(code) = status {
        map.insert("code".to_string(), json!(code));
    }
    json!({ "status": Value::Object(map) })
}

pub(crate) fn interval_json(seconds: Duration) -> Value {
    json!({ "poll_interval": { "seconds": seconds.as_secs() } })
}

pub(crate) fn location_json(location: &ResolvedLocation) -> Value {
    let value = serde_json::to_value(location).unwrap_or_else(|_| json!({}));
    json!({ "location": value })
}

pub(crate) fn capabilities_json(caps: Capabilities, location: Option<&ResolvedLocation>) -> Value {
    let mut map = Map::new();
    map.insert(
        "capabilities".to_string(),
        serde_json::to_value(caps).unwrap_or_else(|_| json!({})),
    );
    if let Some(location) = location {
        map.insert(
            "library".to_string(),
            json!(location.library.display().to_string()),
        );
    }
    Value::Object(map)
}

pub(crate) fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::DiscoveryFailed => "libyogrt not found".to_string(),
        ErrorKind::InvalidOverride => "invalid override path".to_string(),
        ErrorKind::LoadFailed => "libyogrt failed to load".to_string(),
        ErrorKind::BindingIncomplete => "libyogrt is missing required symbols".to_string(),
        ErrorKind::NativeCallFailed => "libyogrt call failed".to_string(),
        ErrorKind::Unsupported => "not supported by this libyogrt".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

pub(crate) fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(failure) = err.load_failure() {
        inner.insert("load_failure".to_string(), json!(failure.as_str()));
    }
    if !err.tried().is_empty() {
        let tried: Vec<String> = err
            .tried()
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        inner.insert("tried".to_string(), json!(tried));
    }
    if !err.missing_symbols().is_empty() {
        inner.insert("missing".to_string(), json!(err.missing_symbols()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}
