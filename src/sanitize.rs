//! Scrubbing of secrets and personal data before a record leaves the
//! process.

use crate::error::ConfigError;
use crate::record::LogRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

pub const REDACTED: &str = "[REDACTED]";
pub const UNSERIALIZABLE: &str = "[unserializable]";
pub const TRUNCATED: &str = "[max depth]";

/// Nesting deeper than this is replaced with [`TRUNCATED`].
const MAX_DEPTH: usize = 8;

/// Which keys and value patterns count as sensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Key fragments, matched case-insensitively as substrings.
    pub sensitive_fields: Vec<String>,
    /// Regexes whose matches inside string values are redacted.
    pub pii_patterns: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        SanitizerConfig {
            sensitive_fields: [
                "password",
                "passwd",
                "secret",
                "token",
                "api_key",
                "apikey",
                "authorization",
                "cookie",
                "credit_card",
                "card_number",
                "cvv",
                "ssn",
                "private_key",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            pii_patterns: vec![
                // email
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}".to_string(),
                // JWT
                r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+".to_string(),
                // bearer credentials
                r"(?i)bearer\s+[A-Za-z0-9\-._~+/]+=*".to_string(),
                // US SSN
                r"\b\d{3}-\d{2}-\d{4}\b".to_string(),
                // payment card numbers: grouped, or contiguous with an issuer prefix
                r"\b(?:\d{4}[ -]){3}\d{4}\b|\b\d{4}[ -]\d{6}[ -]\d{5}\b".to_string(),
                r"\b(?:4\d{15}|5[1-5]\d{14}|3[47]\d{13}|6011\d{12})\b".to_string(),
            ],
        }
    }
}

/// Compiled [`SanitizerConfig`].
#[derive(Debug, Clone)]
pub struct Sanitizer {
    fields: Vec<String>,
    patterns: Vec<Regex>,
}

impl Sanitizer {
    pub fn new(config: &SanitizerConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .pii_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| ConfigError::InvalidPiiPattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Sanitizer {
            fields: config
                .sensitive_fields
                .iter()
                .map(|f| f.to_ascii_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
            patterns,
        })
    }

    /// A sanitizer that leaves everything untouched.
    pub fn disabled() -> Self {
        Sanitizer {
            fields: Vec::new(),
            patterns: Vec::new(),
        }
    }

    pub fn is_sensitive_key(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        self.fields.iter().any(|f| key.contains(f.as_str()))
    }

    pub fn scrub_text<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for pattern in &self.patterns {
            if pattern.is_match(&out) {
                out = Cow::Owned(pattern.replace_all(&out, REDACTED).into_owned());
            }
        }
        out
    }

    pub fn scrub_value(&self, value: Value) -> Value {
        self.scrub_at(value, 0)
    }

    fn scrub_at(&self, value: Value, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return Value::String(TRUNCATED.to_string());
        }
        match value {
            Value::String(s) => {
                let scrubbed = match self.scrub_text(&s) {
                    Cow::Owned(scrubbed) => Some(scrubbed),
                    Cow::Borrowed(_) => None,
                };
                Value::String(scrubbed.unwrap_or(s))
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.scrub_at(item, depth + 1))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        let v = if self.is_sensitive_key(&k) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.scrub_at(v, depth + 1)
                        };
                        (k, v)
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    fn scrub_map<I>(&self, entries: I) -> std::collections::BTreeMap<String, Value>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        entries
            .into_iter()
            .map(|(k, v)| {
                let v = if self.is_sensitive_key(&k) {
                    Value::String(REDACTED.to_string())
                } else {
                    self.scrub_at(v, 1)
                };
                (k, v)
            })
            .collect()
    }

    /// Mask sensitive keys and PII in every free-form part of `record`.
    pub fn scrub(&self, mut record: LogRecord) -> LogRecord {
        if self.fields.is_empty() && self.patterns.is_empty() {
            return record;
        }
        record.message = self.scrub_text(&record.message).into_owned();
        record.context = crate::context::LogContext::from_inner(
            self.scrub_map(record.context.into_inner()),
        );
        record.metadata = self.scrub_map(std::mem::take(&mut record.metadata));
        if let Some(error) = record.error.as_mut() {
            error.message = self.scrub_text(&error.message).into_owned();
            if let Some(stack) = error.stack.as_mut() {
                *stack = self.scrub_text(stack).into_owned();
            }
        }
        record
    }
}

/// Convert a call-site value to JSON. Values that refuse to serialize
/// become a placeholder instead of failing the record.
pub fn to_safe_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(UNSERIALIZABLE.to_string()))
}
