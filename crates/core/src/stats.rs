//! Structured stats parsing
//!
//! ccache 4.10+ prints its counters as a flat JSON object
//! (`ccache --print-stats --format=json`). The job summary only needs the
//! hit ratio, condensed into one [`SummaryRow`].

use serde::{Deserialize, Serialize};

/// Counters read from the JSON stats object; absent counters read as zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct StatsCounters {
    #[serde(default)]
    pub direct_cache_hit: u64,
    #[serde(default)]
    pub preprocessed_cache_hit: u64,
    #[serde(default)]
    pub cache_miss: u64,
    #[serde(default)]
    pub files_in_cache: u64,
    #[serde(default)]
    pub cache_size_kibibyte: u64,
}

impl StatsCounters {
    pub fn hits(&self) -> u64 {
        self.direct_cache_hit + self.preprocessed_cache_hit
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.cache_miss
    }
}

/// One summary table row: a header cell and two data cells
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub label: String,
    pub fraction: String,
    pub percentage: String,
}

/// Parse JSON stats into counters, `None` when the text is not a JSON object
pub fn parse_counters(json_text: &str) -> Option<StatsCounters> {
    match serde_json::from_str::<serde_json::Value>(json_text).ok()? {
        value @ serde_json::Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

/// Condense JSON stats into the "Cache hits" row
pub fn parse_stats_table(json_text: &str) -> Option<SummaryRow> {
    parse_counters(json_text).map(|c| summary_row(&c))
}

/// Build the "Cache hits" row from counters
pub fn summary_row(counters: &StatsCounters) -> SummaryRow {
    let hits = counters.hits();
    let total = counters.total();
    // 0 / 0 happens on a fresh cache before any compilation
    let ratio = if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    };

    SummaryRow {
        label: "Cache hits".to_string(),
        fraction: format!("{} / {}", hits, total),
        percentage: format!("{}%", to_precision(ratio, 3)),
    }
}

/// Format with a fixed number of significant digits, keeping trailing zeros
pub fn to_precision(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return format!("{:.*}", digits.saturating_sub(1), 0.0);
    }

    let digits = digits.max(1) as i32;
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (digits - 1 - magnitude).max(0) as usize;
    // Exact ties round away from zero, not to even
    let value = if is_halfway(value, decimals) {
        f64::from_bits(value.to_bits() + 1)
    } else {
        value
    };
    let formatted = format!("{:.*}", decimals, value);

    // Rounding can carry into a new leading digit (9.996 -> 10.00)
    let rounded: f64 = formatted.parse().unwrap_or(value);
    if decimals > 0 && rounded.abs() >= 10f64.powi(magnitude + 1) {
        format!("{:.*}", decimals - 1, value)
    } else {
        formatted
    }
}

/// Whether `value` lies exactly halfway between two numbers with `decimals` places
fn is_halfway(value: f64, decimals: usize) -> bool {
    // An f64 has at most 1074 fractional decimal digits
    let exact = format!("{:.1074}", value.abs());
    let Some((_, fraction)) = exact.split_once('.') else {
        return false;
    };
    let tail = &fraction[decimals.min(fraction.len())..];
    tail.starts_with('5') && tail[1..].bytes().all(|b| b == b'0')
}
