//! Tool version parsing
//!
//! Only the first line of a `--version` banner is inspected, e.g.
//! `ccache version 4.10.2`. The first embedded `major.minor.patch` triple
//! wins; components may not carry leading zeros (except a literal `0`).

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static VERSION_TRIPLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)").expect("valid regex")
});

/// Ordered `(major, minor, patch)` triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ToolVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parse the version from raw `--version` output, `None` when absent or malformed
pub fn parse_version(raw_output: &str) -> Option<ToolVersion> {
    let first_line = raw_output.lines().next()?;
    let caps = VERSION_TRIPLE.captures(first_line)?;

    let component = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    Some(ToolVersion::new(component(1)?, component(2)?, component(3)?))
}
