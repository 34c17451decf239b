//! Log redaction.
//!
//! [`LogRedactor`] produces a scrubbed copy of any JSON value before it is
//! logged. Strings pass through an ordered list of regex substitutions;
//! objects have sensitive keys blanked wholesale and everything else is
//! redacted recursively. Numbers, booleans and `null` are returned as-is.
//!
//! Redaction never mutates its input and never fails. Applying it twice gives
//! the same result as applying it once.
//!
//! # Rule order ([`REDACTION_RULES_VERSION`] = `v1`)
//!
//! 1. `Authorization: Bearer <token>` pairs
//! 2. bare `Bearer <token>` credentials
//! 3. `api_key` / `api-key` / `apikey` pairs (also covers URL query strings)
//! 4. `password` pairs
//! 5. `secret` pairs
//! 6. `token` pairs
//! 7. email addresses
//!
//! The authorization rule runs before the generic token rules so a bearer
//! header collapses into a single marker instead of a partially masked value.

use regex::Regex;
use serde_json::{Map, Value};

/// Version tag of the built-in rule list.
pub const REDACTION_RULES_VERSION: &str = "v1";

/// Marker substituted for sensitive values.
pub const REDACTED: &str = "[REDACTED]";

/// Marker substituted for email addresses.
pub const EMAIL_REDACTED: &str = "[EMAIL_REDACTED]";

/// Key fragments that mark an object field as sensitive (case-insensitive).
pub const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "secret",
    "apikey",
    "api_key",
    "api-key",
    "token",
    "access_token",
    "refresh_token",
    "private_key",
    "privatekey",
    "auth",
    "authorization",
    "credential",
    "key",
];

/// Built-in `(pattern, replacement)` pairs in application order.
pub const DEFAULT_REDACTION_RULES: &[(&str, &str)] = &[
    (
        r#"(?i)authorization["']?\s*[:=]\s*["']?bearer\s+[\w\-.]+"#,
        "Authorization=[REDACTED]",
    ),
    (r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*", "Bearer [REDACTED]"),
    (r#"(?i)api[_-]?key["']?\s*[:=]\s*["']?[\w\-]+"#, "api_key=[REDACTED]"),
    (r#"(?i)password["']?\s*[:=]\s*["']?[^"\s]+"#, "password=[REDACTED]"),
    (r#"(?i)secret["']?\s*[:=]\s*["']?[\w\-]+"#, "secret=[REDACTED]"),
    (r#"(?i)token["']?\s*[:=]\s*["']?[\w\-.]+"#, "token=[REDACTED]"),
    (
        r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}",
        "[EMAIL_REDACTED]",
    ),
];

/// A compiled substitution rule.
#[derive(Debug, Clone)]
pub struct RedactionRule {
    pattern: Regex,
    replacement: &'static str,
}

impl RedactionRule {
    /// # Errors
    ///
    /// Returns the regex error for a malformed pattern.
    pub fn new(pattern: &str, replacement: &'static str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement,
        })
    }

    fn apply(&self, text: &str) -> String {
        // `NoExpand`: replacements are literal markers.
        self.pattern
            .replace_all(text, regex::NoExpand(self.replacement))
            .into_owned()
    }
}

/// Structure-preserving scrubber for loggable values.
#[derive(Debug, Clone)]
pub struct LogRedactor {
    rules: Vec<RedactionRule>,
}

impl LogRedactor {
    /// Build a redactor from [`DEFAULT_REDACTION_RULES`].
    ///
    /// # Errors
    ///
    /// Returns the regex error if a built-in rule fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        let rules = DEFAULT_REDACTION_RULES
            .iter()
            .map(|(pattern, replacement)| RedactionRule::new(pattern, replacement))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Return a redacted copy of `value`.
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => Value::String(self.redact_str(text)),
            Value::Object(map) => {
                let redacted: Map<String, Value> = map
                    .iter()
                    .map(|(key, inner)| {
                        let replaced = if is_sensitive_key(key) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.redact(inner)
                        };
                        (key.clone(), replaced)
                    })
                    .collect();
                Value::Object(redacted)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            other => other.clone(),
        }
    }

    /// Apply the substitution rules to free text.
    pub fn redact_str(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, rule| rule.apply(&acc))
    }
}

/// Whether an object key names a sensitive field.
pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}
