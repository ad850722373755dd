//! Compiler-cache tool variants
//!
//! A job uses exactly one of two tools. Everything that differs between them
//! (binary name, cache directory, stats invocations, emptiness detection,
//! structured stats support) is answered by [`Variant`]; installation and
//! configuration live in `install` and `configure` as further `impl Variant`
//! blocks.

use crate::errors::ConfigError;
use crate::version::ToolVersion;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Minimum ccache version that can print stats as JSON
pub const JSON_STATS_MIN_VERSION: ToolVersion = ToolVersion::new(4, 10, 0);

static CCACHE_EMPTY_VERBOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Files:\s+0\s*$").expect("valid regex"));
static CCACHE_EMPTY_LEGACY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*files in cache\s+0\s*$").expect("valid regex"));
static SCCACHE_EMPTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Cache size\s+0 bytes\s*$").expect("valid regex"));

/// The active compiler-cache tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Ccache,
    Sccache,
}

/// Raw stats output captured for the emptiness decision
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub variant: Variant,
    /// Whether the output came from the verbose (`-s -v`) form
    pub verbose: bool,
    pub raw: String,
}

impl Variant {
    /// Binary (and key prefix) name
    pub fn name(self) -> &'static str {
        match self {
            Variant::Ccache => "ccache",
            Variant::Sccache => "sccache",
        }
    }

    /// Directory name used below the workspace when no override is set
    pub fn cache_dir_name(self) -> &'static str {
        match self {
            Variant::Ccache => ".ccache",
            Variant::Sccache => ".sccache",
        }
    }

    /// Environment variable that overrides the cache location
    pub fn dir_env_var(self) -> &'static str {
        match self {
            Variant::Ccache => "CCACHE_DIR",
            Variant::Sccache => "SCCACHE_DIR",
        }
    }

    /// Resolve the cache directory from an optional override and the workspace root
    pub fn cache_dir(self, dir_override: Option<&str>, workspace: &Path) -> PathBuf {
        match dir_override.filter(|d| !d.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => workspace.join(self.cache_dir_name()),
        }
    }

    /// Arguments that print human-readable stats at a verbosity level
    pub fn stats_args(self, verbosity: Verbosity, knows_verbosity_flag: bool) -> Vec<&'static str> {
        match self {
            Variant::Ccache if knows_verbosity_flag => match verbosity {
                Verbosity::Quiet => vec!["-s"],
                Verbosity::Verbose => vec!["-s", "-v"],
                Verbosity::VeryVerbose => vec!["-s", "-vv"],
            },
            Variant::Ccache | Variant::Sccache => vec!["-s"],
        }
    }

    /// Arguments whose output feeds [`Variant::is_empty`]
    pub fn empty_check_args(self, knows_verbosity_flag: bool) -> Vec<&'static str> {
        self.stats_args(Verbosity::Verbose, knows_verbosity_flag)
    }

    /// Arguments printing machine-readable stats, when the tool supports them
    pub fn json_stats_args(self, version: Option<ToolVersion>) -> Option<Vec<&'static str>> {
        if self.supports_json_stats(version) {
            Some(vec!["--print-stats", "--format=json"])
        } else {
            None
        }
    }

    pub fn supports_json_stats(self, version: Option<ToolVersion>) -> bool {
        match (self, version) {
            (Variant::Ccache, Some(v)) => v >= JSON_STATS_MIN_VERSION,
            _ => false,
        }
    }

    /// Only ccache can evict by age
    pub fn supports_eviction(self) -> bool {
        matches!(self, Variant::Ccache)
    }

    /// Whether a stats snapshot shows a cache holding no files or no bytes
    pub fn is_empty(self, snapshot: &StatsSnapshot) -> bool {
        match self {
            Variant::Ccache if snapshot.verbose => CCACHE_EMPTY_VERBOSE.is_match(&snapshot.raw),
            Variant::Ccache => CCACHE_EMPTY_LEGACY.is_match(&snapshot.raw),
            Variant::Sccache => SCCACHE_EMPTY.is_match(&snapshot.raw),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ccache" => Ok(Variant::Ccache),
            "sccache" => Ok(Variant::Sccache),
            other => Err(ConfigError::UnknownVariant(other.to_string())),
        }
    }
}

/// Stats verbosity requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Quiet,
    Verbose,
    VeryVerbose,
}

impl Verbosity {
    /// Parse `0`, `1` or `2`; anything else warns and falls back to quiet
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim() {
            "" | "0" => Verbosity::Quiet,
            "1" => Verbosity::Verbose,
            "2" => Verbosity::VeryVerbose,
            other => {
                tracing::warn!(
                    "Invalid value \"{}\" for \"verbose\" input, should be 0, 1 or 2. Defaulting to 0.",
                    other
                );
                Verbosity::Quiet
            }
        }
    }
}

/// Whether a tool's `--help` output advertises `-v, --verbose`
pub fn knows_verbosity_flag(help_output: &str) -> bool {
    help_output.contains("-v, --verbose")
}
