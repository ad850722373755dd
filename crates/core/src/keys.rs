//! Cache key derivation
//!
//! Keys are pure string construction: `<variant>-<user key>`, with a trailing
//! `-` when a timestamp will be appended at save time. The trailing separator
//! keeps stable keys (`ccache-linux`) and timestamped keys
//! (`ccache-linux-2024-...`) from colliding under prefix matching.

use crate::variant::Variant;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Keys used to look up and publish an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKeys {
    /// Exact key tried first on restore and used (plus optional timestamp) on save
    pub primary_key: String,
    /// Fallback prefixes, most specific first
    pub restore_keys: Vec<String>,
}

impl CacheKeys {
    /// Primary key followed by the fallbacks, in lookup order
    pub fn lookup_order(&self) -> Vec<&str> {
        std::iter::once(self.primary_key.as_str())
            .chain(self.restore_keys.iter().map(String::as_str))
            .collect()
    }
}

/// Derive the primary and restore keys
pub fn derive_keys(
    variant: Variant,
    user_key: &str,
    user_restore_keys: &[String],
    append_timestamp: bool,
) -> CacheKeys {
    let prefix = format!("{}-", variant.name());
    let user_key = user_key.trim();

    let primary_key = if user_key.is_empty() {
        prefix.clone()
    } else if append_timestamp {
        format!("{}{}-", prefix, user_key)
    } else {
        format!("{}{}", prefix, user_key)
    };

    let restore_keys = user_restore_keys
        .iter()
        .map(|k| format!("{}{}", prefix, k))
        .collect();

    CacheKeys {
        primary_key,
        restore_keys,
    }
}

/// Split a newline-separated input into trimmed, non-blank entries
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Key an archive is saved under
pub fn save_key(primary_key: &str, append_timestamp: bool, now: DateTime<Utc>) -> String {
    if append_timestamp {
        format!("{}{}", primary_key, timestamp_suffix(now))
    } else {
        primary_key.to_string()
    }
}

/// ISO-8601 UTC timestamp with millisecond precision
pub fn timestamp_suffix(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}
