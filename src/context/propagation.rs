//! Carry a [`LogContext`] across process boundaries as HTTP headers or
//! message metadata.

use super::{keys, LogContext};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Header name for each propagated context key. The last two carry JSON.
pub const PROPAGATION_HEADERS: [(&str, &str); 10] = [
    (keys::REQUEST_ID, "x-request-id"),
    (keys::TRACE_ID, "x-trace-id"),
    (keys::CORRELATION_ID, "x-correlation-id"),
    (keys::USER_ID, "x-user-id"),
    (keys::TENANT_ID, "x-tenant-id"),
    (keys::SOURCE, "x-log-source"),
    (keys::ACTION, "x-log-action"),
    (keys::COMPONENT, "x-log-component"),
    (keys::FEATURE_FLAGS, "x-feature-flags"),
    (keys::TAGS, "x-log-tags"),
];

/// Anything that can hold string headers: HTTP header maps, queue message
/// attributes, plain maps in tests.
pub trait HeaderCarrier {
    fn get_header(&self, name: &str) -> Option<&str>;
    fn set_header(&mut self, name: &str, value: String);
}

impl HeaderCarrier for HashMap<String, String> {
    fn get_header(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str).or_else(|| {
            self.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        })
    }

    fn set_header(&mut self, name: &str, value: String) {
        self.insert(name.to_string(), value);
    }
}

impl HeaderCarrier for BTreeMap<String, String> {
    fn get_header(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str).or_else(|| {
            self.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        })
    }

    fn set_header(&mut self, name: &str, value: String) {
        self.insert(name.to_string(), value);
    }
}

fn is_json_key(key: &str) -> bool {
    key == keys::FEATURE_FLAGS || key == keys::TAGS
}

/// Write the propagated fields present in `ctx` into `carrier`.
pub fn inject(ctx: &LogContext, carrier: &mut impl HeaderCarrier) {
    for (key, header) in PROPAGATION_HEADERS {
        let Some(value) = ctx.get(key) else {
            continue;
        };
        let encoded = match value {
            Value::Null => continue,
            Value::String(s) if !is_json_key(key) => s.clone(),
            other if is_json_key(key) => match serde_json::to_string(other) {
                Ok(json) => json,
                Err(_) => continue,
            },
            other => other.to_string(),
        };
        carrier.set_header(header, encoded);
    }
}

/// Read the propagated fields from `carrier`.
///
/// Unknown headers are ignored. A JSON header that does not parse, or parses
/// to the wrong shape, is skipped without affecting the other fields.
pub fn extract(carrier: &impl HeaderCarrier) -> LogContext {
    let mut ctx = LogContext::new();
    for (key, header) in PROPAGATION_HEADERS {
        let Some(raw) = carrier.get_header(header) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        if key == keys::FEATURE_FLAGS {
            if let Ok(flags @ Value::Object(_)) = serde_json::from_str::<Value>(raw) {
                ctx.insert(key, flags);
            }
        } else if key == keys::TAGS {
            if let Ok(tags @ Value::Array(_)) = serde_json::from_str::<Value>(raw) {
                ctx.insert(key, tags);
            }
        } else {
            ctx.insert(key, raw.to_string());
        }
    }
    ctx
}
