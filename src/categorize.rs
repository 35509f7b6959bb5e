//! Error classification and fingerprinting.
//!
//! Both are pure functions: the same input always gives the same output,
//! which is what makes the fingerprint usable as a grouping key for
//! deduplication and alerting downstream.

use crate::record::ErrorInfo;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

/// Coarse class of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Network,
    Database,
    Authentication,
    Authorization,
    RateLimit,
    Timeout,
    BusinessLogic,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Network => "network",
            ErrorCategory::Database => "database",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::BusinessLogic => "business_logic",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Rule {
    category: ErrorCategory,
    statuses: &'static [u16],
    codes: &'static [&'static str],
    code_prefixes: &'static [&'static str],
    message: Option<Regex>,
}

impl Rule {
    fn matches(&self, message: &str, code: Option<&str>, status: Option<u16>) -> bool {
        if let Some(status) = status {
            if self.statuses.contains(&status) {
                return true;
            }
        }
        if let Some(code) = code {
            if self.codes.iter().any(|c| c.eq_ignore_ascii_case(code))
                || self.code_prefixes.iter().any(|p| code.starts_with(p))
            {
                return true;
            }
        }
        self.message.as_ref().is_some_and(|re| re.is_match(message))
    }
}

// Evaluated top to bottom, first match wins.
fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule {
                category: ErrorCategory::RateLimit,
                statuses: &[429],
                codes: &["RATE_LIMITED", "TOO_MANY_REQUESTS"],
                code_prefixes: &[],
                message: Regex::new(r"(?i)rate.?limit|too many requests|throttl|quota exceeded").ok(),
            },
            Rule {
                category: ErrorCategory::Timeout,
                statuses: &[408, 504],
                // 57014: postgres query_canceled (statement timeout)
                codes: &["ETIMEDOUT", "ESOCKETTIMEDOUT", "57014"],
                code_prefixes: &[],
                message: Regex::new(r"(?i)time[sd]?\s?out|timed out|deadline exceeded").ok(),
            },
            Rule {
                category: ErrorCategory::Authentication,
                statuses: &[401],
                codes: &["PGRST301", "PGRST302", "UNAUTHENTICATED", "INVALID_GRANT"],
                code_prefixes: &[],
                message: Regex::new(
                    r"(?i)unauthori[sz]ed|unauthenticated|not authenticated|authentication|invalid (token|credentials|password|api key)|jwt|token expired|expired token|login required",
                )
                .ok(),
            },
            Rule {
                category: ErrorCategory::Authorization,
                statuses: &[403],
                codes: &["42501", "FORBIDDEN"],
                code_prefixes: &[],
                message: Regex::new(
                    r"(?i)forbidden|permission denied|access denied|not authori[sz]ed to|insufficient (privileges|permissions)|row-level security",
                )
                .ok(),
            },
            Rule {
                category: ErrorCategory::Validation,
                statuses: &[400, 422],
                codes: &["23505", "23503", "23502", "23514", "22P02", "22001", "VALIDATION_ERROR"],
                code_prefixes: &[],
                message: Regex::new(
                    r"(?i)validat|invalid|is required|required field|must be|malformed|duplicate key|violates",
                )
                .ok(),
            },
            Rule {
                category: ErrorCategory::Database,
                statuses: &[],
                codes: &["40P01", "40001"],
                code_prefixes: &["PGRST", "08", "42", "53", "XX"],
                message: Regex::new(
                    r"(?i)database|\bsql\b|postgres|relation .* does not exist|deadlock|connection pool|query failed",
                )
                .ok(),
            },
            Rule {
                category: ErrorCategory::Network,
                statuses: &[502, 503],
                codes: &[
                    "ECONNREFUSED",
                    "ECONNRESET",
                    "ENOTFOUND",
                    "EAI_AGAIN",
                    "EPIPE",
                    "ENETUNREACH",
                    "EHOSTUNREACH",
                ],
                code_prefixes: &[],
                message: Regex::new(
                    r"(?i)network|connection (refused|reset|closed|aborted)|econn|socket|\bdns\b|unreachable|fetch failed|broken pipe",
                )
                .ok(),
            },
            Rule {
                category: ErrorCategory::BusinessLogic,
                statuses: &[404, 409],
                codes: &["BUSINESS_RULE", "CONFLICT"],
                code_prefixes: &[],
                message: Regex::new(
                    r"(?i)not found|already exists|conflict|insufficient (funds|balance|stock)|business rule",
                )
                .ok(),
            },
        ]
    })
}

/// Classify an error. `code` and `status` override the ones carried by
/// `error` when given.
pub fn categorize_error(error: &ErrorInfo, code: Option<&str>, status: Option<u16>) -> ErrorCategory {
    let code = code.or(error.code.as_deref());
    let status = status.or(error.status_code);
    rules()
        .iter()
        .find(|rule| rule.matches(&error.message, code, status))
        .map(|rule| rule.category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Friendly text for well-known Postgres/PostgREST error codes.
pub fn known_code_message(code: &str) -> Option<&'static str> {
    match code {
        "PGRST116" => Some("No rows returned"),
        "23505" => Some("Unique constraint violation"),
        "23503" => Some("Foreign key constraint violation"),
        "42P01" => Some("Table does not exist"),
        "42501" => Some("Insufficient privileges"),
        "PGRST301" => Some("JWT expired"),
        "PGRST302" => Some("JWT invalid"),
        _ => None,
    }
}

struct Normalizer {
    uuid: Regex,
    timestamp: Regex,
    hex: Regex,
    number: Regex,
    spaces: Regex,
}

fn normalizer() -> Option<&'static Normalizer> {
    static NORMALIZER: OnceLock<Option<Normalizer>> = OnceLock::new();
    NORMALIZER
        .get_or_init(|| {
            Some(Normalizer {
                uuid: Regex::new(
                    r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b",
                )
                .ok()?,
                timestamp: Regex::new(
                    r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?|\b\d{8}_\d{6}\b",
                )
                .ok()?,
                hex: Regex::new(r"(?i)\b(?:0x)?[0-9a-f]{8,}\b").ok()?,
                number: Regex::new(r"\d+(?:\.\d+)?").ok()?,
                spaces: Regex::new(r"\s+").ok()?,
            })
        })
        .as_ref()
}

/// Replace variable substrings with placeholders so that occurrences of the
/// same error template compare equal.
pub fn normalize(text: &str) -> String {
    let Some(n) = normalizer() else {
        return text.trim().to_string();
    };
    let out = n.uuid.replace_all(text, "<uuid>");
    let out = n.timestamp.replace_all(&out, "<ts>");
    let out = n.hex.replace_all(&out, |caps: &regex::Captures<'_>| {
        // Long runs with at least one digit are ids, not words.
        if caps[0].bytes().any(|b| b.is_ascii_digit()) {
            "<hex>".to_string()
        } else {
            caps[0].to_string()
        }
    });
    let out = n.number.replace_all(&out, "<n>");
    n.spaces.replace_all(out.trim(), " ").into_owned()
}

fn short_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// 16 hex chars identifying the error template (name + normalized message).
pub fn fingerprint_error(error: &ErrorInfo) -> String {
    short_hash(&[&error.name, &normalize(&error.message)])
}

/// 16 hex chars identifying a request shape: method, normalized path and
/// status class (`2xx`, `5xx`...).
pub fn fingerprint_request(method: &str, path: &str, status: Option<u16>) -> String {
    let path = path.split('?').next().unwrap_or(path);
    let class = status
        .map(|s| format!("{}xx", s / 100))
        .unwrap_or_else(|| "-".to_string());
    short_hash(&[&method.to_ascii_uppercase(), &normalize(path), &class])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(message: &str) -> ErrorInfo {
        ErrorInfo::new("Error", message)
    }

    #[test]
    fn connection_refused_with_503_is_network() {
        assert_eq!(
            categorize_error(&err("Connection refused"), None, Some(503)),
            ErrorCategory::Network
        );
    }

    #[test]
    fn priority_order_decides_overlaps() {
        // Matches both timeout and network text; timeout is checked first.
        assert_eq!(
            categorize_error(&err("socket timed out"), None, None),
            ErrorCategory::Timeout
        );
        // "invalid token" is authentication even though "invalid" is validation.
        assert_eq!(
            categorize_error(&err("invalid token supplied"), None, None),
            ErrorCategory::Authentication
        );
        assert_eq!(
            categorize_error(&err("whatever"), None, Some(429)),
            ErrorCategory::RateLimit
        );
    }

    #[test]
    fn database_codes_are_recognised() {
        assert_eq!(
            categorize_error(&err("duplicate"), Some("23505"), None),
            ErrorCategory::Validation
        );
        assert_eq!(
            categorize_error(&err("nope"), Some("42501"), None),
            ErrorCategory::Authorization
        );
        assert_eq!(
            categorize_error(&err("relation \"posts\" does not exist"), Some("42P01"), None),
            ErrorCategory::Database
        );
        assert_eq!(
            categorize_error(&err("jwt"), Some("PGRST301"), None),
            ErrorCategory::Authentication
        );
        assert_eq!(known_code_message("23503"), Some("Foreign key constraint violation"));
    }

    #[test]
    fn explicit_code_overrides_error_code() {
        let e = err("boom").with_code("ECONNRESET");
        assert_eq!(categorize_error(&e, None, None), ErrorCategory::Network);
        assert_eq!(categorize_error(&e, Some("57014"), None), ErrorCategory::Timeout);
    }

    #[test]
    fn unmatched_is_unknown_and_deterministic() {
        let e = err("the flux capacitor is sad");
        let first = categorize_error(&e, None, Some(500));
        for _ in 0..10 {
            assert_eq!(categorize_error(&e, None, Some(500)), first);
        }
        assert_eq!(first, ErrorCategory::Unknown);
    }

    #[test]
    fn fingerprint_ignores_variable_parts() {
        let a = err("user 123 not found in org 3f2b8c1e-9d4a-4b6e-8f00-1a2b3c4d5e6f at 2024-01-31T10:00:00Z");
        let b = err("user 98765 not found in org 00000000-1111-2222-3333-444444444444 at 2025-06-01T22:13:09.123Z");
        assert_eq!(fingerprint_error(&a), fingerprint_error(&b));
        assert_eq!(fingerprint_error(&a).len(), 16);
    }

    #[test]
    fn fingerprint_separates_templates() {
        let samples = [
            "user 1 not found",
            "permission denied for table 1",
            "connection refused",
            "payment 7 declined",
            "timeout after 30s",
        ];
        let prints: std::collections::HashSet<_> =
            samples.iter().map(|m| fingerprint_error(&err(m))).collect();
        assert_eq!(prints.len(), samples.len());
        assert_ne!(
            fingerprint_error(&ErrorInfo::new("TypeError", "x")),
            fingerprint_error(&ErrorInfo::new("RangeError", "x"))
        );
    }

    #[test]
    fn request_fingerprint_groups_by_shape() {
        let a = fingerprint_request("get", "/users/42/orders?page=2", Some(500));
        let b = fingerprint_request("GET", "/users/7/orders", Some(503));
        let c = fingerprint_request("GET", "/users/7/orders", Some(200));
        assert_eq!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn normalize_replaces_placeholders() {
        assert_eq!(normalize("id 42 hash deadbeef01  done"), "id <n> hash <hex> done");
    }
}
