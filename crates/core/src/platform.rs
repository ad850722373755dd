//! Platform detection
//!
//! Identifies the host OS and CPU architecture so installers and tool
//! configuration can branch on them with a plain `match`.

use std::fmt;
use tracing::{debug, instrument};

/// Host operating systems with installer support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOS,
    Windows,
}

impl Platform {
    /// Detect the current platform, `None` for anything without an installer
    #[instrument]
    pub fn detect() -> Option<Self> {
        let platform = Self::from_os(std::env::consts::OS);
        debug!(os = std::env::consts::OS, ?platform, "Detected platform");
        platform
    }

    /// Map a `std::env::consts::OS` value onto a platform
    pub fn from_os(os: &str) -> Option<Self> {
        match os {
            "linux" => Some(Platform::Linux),
            "macos" => Some(Platform::MacOS),
            "windows" => Some(Platform::Windows),
            _ => None,
        }
    }

    /// Whether file modification times are unreliable for detecting a changed
    /// compiler, so the cache must hash compiler contents instead
    pub fn needs_content_compiler_check(self) -> bool {
        matches!(self, Platform::MacOS | Platform::Windows)
    }

    /// Suffix of executables on this platform
    pub fn exe_suffix(self) -> &'static str {
        match self {
            Platform::Windows => ".exe",
            Platform::Linux | Platform::MacOS => "",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Linux => "linux",
            Platform::MacOS => "darwin",
            Platform::Windows => "win32",
        };
        f.write_str(name)
    }
}

/// CPU architectures with prebuilt release binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    /// Detect the current architecture
    pub fn detect() -> Option<Self> {
        Self::from_arch(std::env::consts::ARCH)
    }

    /// Map a `std::env::consts::ARCH` value onto an architecture
    pub fn from_arch(arch: &str) -> Option<Self> {
        match arch {
            "x86_64" => Some(Arch::X86_64),
            "aarch64" => Some(Arch::Aarch64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

/// Rust target triple of the prebuilt release for a platform/arch pair
pub fn release_target(platform: Platform, arch: Arch) -> Option<&'static str> {
    match (platform, arch) {
        (Platform::Linux, Arch::X86_64) => Some("x86_64-unknown-linux-musl"),
        (Platform::Linux, Arch::Aarch64) => Some("aarch64-unknown-linux-musl"),
        (Platform::MacOS, Arch::X86_64) => Some("x86_64-apple-darwin"),
        (Platform::MacOS, Arch::Aarch64) => Some("aarch64-apple-darwin"),
        (Platform::Windows, Arch::X86_64) => Some("x86_64-pc-windows-msvc"),
        (Platform::Windows, Arch::Aarch64) => None,
    }
}
