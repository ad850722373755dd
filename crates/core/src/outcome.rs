//! Step outcomes
//!
//! Distinguishes "intentionally skipped" from "attempted" without relying on
//! log text. Failures are carried separately as `Err`.

use std::fmt;

/// Why a step did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `restore` input is false
    RestoreDisabled,
    /// `save` input was false at setup
    SaveDisabled,
    /// Stats show zero files / zero bytes
    EmptyCache,
    /// `evict-old-files` is unset
    EvictionDisabled,
    /// The active variant cannot evict by age
    EvictionUnsupported,
    /// No job state from setup, so setup did not complete
    MissingState,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::RestoreDisabled => "restore disabled",
            SkipReason::SaveDisabled => "save disabled",
            SkipReason::EmptyCache => "cache is empty",
            SkipReason::EvictionDisabled => "eviction disabled",
            SkipReason::EvictionUnsupported => "eviction not supported by variant",
            SkipReason::MissingState => "setup state missing",
        };
        f.write_str(text)
    }
}

/// Result of a step that may be skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Skipped(SkipReason),
    Completed(T),
}

impl<T> Step<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Step::Skipped(_))
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            Step::Completed(value) => Some(value),
            Step::Skipped(_) => None,
        }
    }
}

/// What an attempted restore found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreMatch {
    /// An archive was restored under this key
    Hit { key: String },
    /// No archive matched, or the store failed
    Miss,
}

impl RestoreMatch {
    pub fn is_hit(&self) -> bool {
        matches!(self, RestoreMatch::Hit { .. })
    }
}
