//! Eviction policy
//!
//! Parses the `evict-old-files` input and turns it into a single
//! `--evict-older-than <N><unit>` invocation. With `job`, the age is the time
//! elapsed since setup, so everything not touched by this job is dropped.

use crate::errors::ConfigError;
use std::fmt;

/// Unit of an eviction age
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeUnit {
    Seconds,
    Days,
    /// Age equals the duration of the current job
    Job,
}

/// Parsed `evict-old-files` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionAge {
    /// `None` for [`AgeUnit::Job`], resolved at eviction time
    pub value: Option<u64>,
    pub unit: AgeUnit,
}

impl EvictionAge {
    /// Resolve into the `<N><unit>` argument ccache expects
    pub fn to_arg(&self, start_timestamp_ms: u64, now_ms: u64) -> String {
        match (self.unit, self.value) {
            (AgeUnit::Days, Some(n)) => format!("{}d", n),
            (AgeUnit::Seconds, Some(n)) => format!("{}s", n),
            _ => format!("{}s", job_duration_seconds(start_timestamp_ms, now_ms)),
        }
    }
}

impl fmt::Display for EvictionAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.unit, self.value) {
            (AgeUnit::Job, _) | (_, None) => f.write_str("job"),
            (AgeUnit::Seconds, Some(n)) => write!(f, "{}s", n),
            (AgeUnit::Days, Some(n)) => write!(f, "{}d", n),
        }
    }
}

/// Parse `<digits>s`, `<digits>d` or `job`
pub fn parse_age(raw: &str) -> Result<EvictionAge, ConfigError> {
    let raw = raw.trim();
    if raw == "job" {
        return Ok(EvictionAge {
            value: None,
            unit: AgeUnit::Job,
        });
    }

    let invalid = || ConfigError::InvalidAge {
        value: raw.to_string(),
    };

    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, 's')) => (&raw[..idx], AgeUnit::Seconds),
        Some((idx, 'd')) => (&raw[..idx], AgeUnit::Days),
        _ => return Err(invalid()),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let value = digits.parse::<u64>().map_err(|_| invalid())?;
    Ok(EvictionAge {
        value: Some(value),
        unit,
    })
}

/// Interpret the raw `evict-old-files` input; empty or `false` disables eviction
pub fn parse_setting(raw: &str) -> Result<Option<EvictionAge>, ConfigError> {
    match raw.trim() {
        "" | "false" | "False" | "FALSE" => Ok(None),
        "true" | "True" | "TRUE" => parse_age("job").map(Some),
        other => parse_age(other).map(Some),
    }
}

/// Whole seconds elapsed since the setup timestamp
pub fn job_duration_seconds(start_timestamp_ms: u64, now_ms: u64) -> u64 {
    now_ms.saturating_sub(start_timestamp_ms) / 1000
}

/// Arguments for the eviction command
pub fn evict_args(age_arg: &str) -> Vec<String> {
    vec!["--evict-older-than".to_string(), age_arg.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds_and_days() {
        assert_eq!(
            parse_age("42s").unwrap(),
            EvictionAge {
                value: Some(42),
                unit: AgeUnit::Seconds
            }
        );
        assert_eq!(
            parse_age("3d").unwrap(),
            EvictionAge {
                value: Some(3),
                unit: AgeUnit::Days
            }
        );
    }

    #[test]
    fn test_parse_job() {
        assert_eq!(
            parse_age("job").unwrap(),
            EvictionAge {
                value: None,
                unit: AgeUnit::Job
            }
        );
    }

    #[test]
    fn test_parse_invalid() {
        for raw in ["xyz", "s", "12", "-3d", "4h", "1.5d", "3 d", "jobs"] {
            assert!(
                matches!(parse_age(raw), Err(ConfigError::InvalidAge { .. })),
                "expected {:?} to be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_parse_setting() {
        assert_eq!(parse_setting("").unwrap(), None);
        assert_eq!(parse_setting("false").unwrap(), None);
        assert_eq!(parse_setting("true").unwrap().unwrap().unit, AgeUnit::Job);
        assert_eq!(parse_setting("7d").unwrap().unwrap().value, Some(7));
        assert!(parse_setting("weekly").is_err());
    }

    #[test]
    fn test_job_duration() {
        let start = 1_734_258_917_128;
        assert_eq!(job_duration_seconds(start, start + 1_234_000), 1234);
        assert_eq!(job_duration_seconds(start, start + 999), 0);
        assert_eq!(job_duration_seconds(start, start - 10), 0);
    }

    #[test]
    fn test_to_arg() {
        let start = 1_000_000;
        assert_eq!(parse_age("42s").unwrap().to_arg(start, start), "42s");
        assert_eq!(parse_age("3d").unwrap().to_arg(start, start), "3d");
        assert_eq!(
            parse_age("job").unwrap().to_arg(start, start + 61_500),
            "61s"
        );
    }

    #[test]
    fn test_evict_args() {
        assert_eq!(evict_args("42s"), vec!["--evict-older-than", "42s"]);
    }
}
