//! Purpose: Structured schema for non-fatal stderr notices.
//! Exports: `Notice`, `notice_json`.
//! Role: Lets the CLI report a degraded answer (e.g. "no limit" fallback) without failing.
//! Invariants: Notices never alter stdout payloads.
//! Invariants: JSON schema is additive-only.
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub message: String,
    pub details: Map<String, Value>,
}

impl Notice {
    pub fn new(kind: impl Into<String>, cmd: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            time: String::new(),
            cmd: cmd.into(),
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn at(mut self, time: impl Into<String>) -> Self {
        self.time = time.into();
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind));
    if !notice.time.is_empty() {
        inner.insert("time".to_string(), json!(notice.time));
    }
    inner.insert("cmd".to_string(), json!(notice.cmd));
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));
    json!({ "notice": Value::Object(inner) })
}

#[cfg(test)]
mod tests {
    use super::{Notice, notice_json};

    #[test]
    fn notice_json_has_required_fields() {
        let notice = Notice::new("unavailable", "remaining", "reporting no time limit")
            .at("2026-02-01T00:00:00Z")
            .with_detail("error_kind", "DiscoveryFailed");

        let value = notice_json(&notice);
        let obj = value
            .get("notice")
            .and_then(|v| v.as_object())
            .expect("notice object");

        assert_eq!(obj.get("kind").and_then(|v| v.as_str()), Some("unavailable"));
        assert_eq!(
            obj.get("time").and_then(|v| v.as_str()),
            Some("2026-02-01T00:00:00Z")
        );
        assert_eq!(obj.get("cmd").and_then(|v| v.as_str()), Some("remaining"));
        assert_eq!(
            obj.get("details")
                .and_then(|v| v.get("error_kind"))
                .and_then(|v| v.as_str()),
            Some("DiscoveryFailed")
        );
    }

    #[test]
    fn untimed_notice_omits_time() {
        let value = notice_json(&Notice::new("unavailable", "remaining", "no limit"));
        assert!(value["notice"].get("time").is_none());
    }
}
