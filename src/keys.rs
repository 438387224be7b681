//! Key Generation and Pattern Matching
//!
//! Deterministic cache-key builders and the glob matcher used by
//! pattern-based invalidation.

use regex::Regex;
use serde_json::Value;

/// Separator between the prefix and each key part
pub const KEY_DELIMITER: &str = ":";

// == Key Generator ==
/// Builds cache keys from a fixed prefix and a list of arguments.
///
/// Strings are used verbatim, other scalars are stringified, and arrays and
/// objects are serialized as JSON with object fields sorted, so that
/// `{"a":1,"b":2}` and `{"b":2,"a":1}` produce the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns `prefix:part1:part2:...`.
    pub fn key(&self, args: &[Value]) -> String {
        let parts: Vec<String> = args.iter().map(key_part).collect();
        format!("{}{}{}", self.prefix, KEY_DELIMITER, parts.join(KEY_DELIMITER))
    }
}

fn key_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => canonical_json(other),
    }
}

/// Serializes a value as compact JSON with object keys in sorted order.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(fields) => {
            let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(name, field)| format!("{}:{}", Value::from(name.as_str()), canonical_json(field)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

// == Glob Matching ==
/// Compiles a glob where `*` matches any run of characters into an anchored
/// regex. Every other character matches literally.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let body: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Regex::new(&format!("^{}$", body.join(".*")))
}
