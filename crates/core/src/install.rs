//! Tool installation
//!
//! Installers are chosen by matching on `(Variant, Platform)`. ccache comes
//! from the platform package manager; sccache is downloaded from its GitHub
//! release together with the published `.sha256` file, verified, and unpacked
//! into a tool directory that is then put on `PATH`.

use crate::errors::{InstallError, Result};
use crate::platform::{release_target, Arch, Platform};
use crate::retry::{retry_async, RetryConfig, RetryDecision};
use crate::tool::{is_installed, run_checked, CommandRunner};
use crate::variant::Variant;
use crate::workflow::WorkflowEnv;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Pinned sccache release
pub const SCCACHE_VERSION: &str = "0.8.2";

/// Where sccache releases are published
pub const SCCACHE_RELEASE_BASE_URL: &str = "https://github.com/mozilla/sccache/releases/download";

/// Host facts and locations used by installers
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub platform: Platform,
    pub arch: Option<Arch>,
    /// Directory downloaded binaries are placed in
    pub install_dir: PathBuf,
    pub release_base_url: String,
    pub retry: RetryConfig,
}

impl InstallContext {
    /// Detect the host; unsupported operating systems are an error
    pub fn detect() -> std::result::Result<Self, InstallError> {
        let platform = Platform::detect().ok_or_else(|| InstallError::UnsupportedPlatform {
            platform: std::env::consts::OS.to_string(),
        })?;
        Ok(Self {
            platform,
            arch: Arch::detect(),
            install_dir: default_install_dir(),
            release_base_url: SCCACHE_RELEASE_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        })
    }
}

/// `$RUNNER_TOOL_CACHE/ccache-ci/bin`, or below the OS temp dir
pub fn default_install_dir() -> PathBuf {
    std::env::var_os("RUNNER_TOOL_CACHE")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("ccache-ci")
        .join("bin")
}

/// A prebuilt sccache release for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: String,
    pub target: String,
}

impl Release {
    pub fn sccache(platform: Platform, arch: Option<Arch>) -> std::result::Result<Self, InstallError> {
        let target = arch
            .and_then(|a| release_target(platform, a))
            .ok_or_else(|| InstallError::UnsupportedPlatform {
                platform: format!(
                    "{}/{}",
                    platform,
                    arch.map(Arch::as_str).unwrap_or(std::env::consts::ARCH)
                ),
            })?;
        Ok(Self {
            version: SCCACHE_VERSION.to_string(),
            target: target.to_string(),
        })
    }

    pub fn archive_name(&self) -> String {
        format!("sccache-v{}-{}.tar.gz", self.version, self.target)
    }

    pub fn archive_url(&self, base_url: &str) -> String {
        format!(
            "{}/v{}/{}",
            base_url.trim_end_matches('/'),
            self.version,
            self.archive_name()
        )
    }

    pub fn checksum_url(&self, base_url: &str) -> String {
        format!("{}.sha256", self.archive_url(base_url))
    }
}

impl Variant {
    /// Install the tool unless `<tool> --version` already works
    #[instrument(skip(runner, env, ctx), fields(variant = %self, platform = %ctx.platform))]
    pub async fn ensure_installed(
        self,
        runner: &dyn CommandRunner,
        env: &WorkflowEnv,
        ctx: &InstallContext,
    ) -> Result<()> {
        if is_installed(runner, self.name()).await {
            debug!("{} already installed", self);
            return Ok(());
        }

        info!("Install {}", self);
        self.install(runner, env, ctx).await?;

        if !is_installed(runner, self.name()).await {
            return Err(crate::errors::ToolError::NotInstalled {
                tool: self.name().to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Run the platform installer for this variant
    pub async fn install(
        self,
        runner: &dyn CommandRunner,
        env: &WorkflowEnv,
        ctx: &InstallContext,
    ) -> Result<()> {
        match (self, ctx.platform) {
            (Variant::Ccache, Platform::Linux) => {
                run_checked(runner, "sudo", &["apt-get", "install", "-y", "ccache"], &[]).await?;
            }
            (Variant::Ccache, Platform::MacOS) => {
                run_checked(runner, "brew", &["install", "ccache"], &[]).await?;
            }
            (Variant::Ccache, Platform::Windows) => {
                run_checked(runner, "choco", &["install", "ccache", "-y"], &[]).await?;
            }
            (Variant::Sccache, platform) => {
                let release = Release::sccache(platform, ctx.arch)?;
                let binary = install_release(&release, platform, ctx).await?;
                info!("Installed {}", binary.display());
                env.add_path(&ctx.install_dir)?;
            }
        }
        Ok(())
    }
}

/// Download, verify and unpack a release into `ctx.install_dir`
pub async fn install_release(
    release: &Release,
    platform: Platform,
    ctx: &InstallContext,
) -> std::result::Result<PathBuf, InstallError> {
    let client = reqwest::Client::new();
    let archive_url = release.archive_url(&ctx.release_base_url);
    let checksum_url = release.checksum_url(&ctx.release_base_url);

    let archive = download(&client, &archive_url, &ctx.retry).await?;
    let checksum = download(&client, &checksum_url, &ctx.retry).await?;
    verify_checksum(
        &archive,
        &String::from_utf8_lossy(&checksum),
        &release.archive_name(),
    )?;

    let binary_name = format!("sccache{}", platform.exe_suffix());
    extract_binary(&archive, &binary_name, &ctx.install_dir, &release.archive_name())
}

#[derive(Debug)]
struct DownloadFailure {
    status: Option<u16>,
    message: String,
}

impl fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

fn classify_download(failure: &DownloadFailure) -> RetryDecision {
    match failure.status {
        Some(status) if (400..500).contains(&status) && status != 429 => RetryDecision::Stop,
        _ => RetryDecision::Retry,
    }
}

#[instrument(skip(client, retry))]
async fn download(
    client: &reqwest::Client,
    url: &str,
    retry: &RetryConfig,
) -> std::result::Result<Vec<u8>, InstallError> {
    debug!("Downloading {}", url);
    retry_async(
        retry,
        || async {
            let response = client.get(url).send().await.map_err(|e| DownloadFailure {
                status: None,
                message: e.to_string(),
            })?;
            let status = response.status();
            if !status.is_success() {
                return Err(DownloadFailure {
                    status: Some(status.as_u16()),
                    message: status.canonical_reason().unwrap_or("request failed").to_string(),
                });
            }
            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| DownloadFailure {
                    status: None,
                    message: e.to_string(),
                })
        },
        classify_download,
    )
    .await
    .map_err(|failure| InstallError::Download {
        url: url.to_string(),
        message: failure.to_string(),
    })
}

/// Compare the SHA-256 of `data` with the digest in a `.sha256` file
///
/// The file holds the hex digest, optionally followed by the file name.
pub fn verify_checksum(
    data: &[u8],
    checksum_file: &str,
    artifact: &str,
) -> std::result::Result<(), InstallError> {
    let expected = checksum_file
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(data);
    let actual = format!("{:x}", hasher.finalize());

    if expected != actual {
        return Err(InstallError::ChecksumMismatch {
            artifact: artifact.to_string(),
            expected,
            actual,
        });
    }
    debug!(artifact, digest = %actual, "Checksum verified");
    Ok(())
}

/// Unpack the entry named `binary_name` from a gzipped tarball into `dest_dir`
pub fn extract_binary(
    archive: &[u8],
    binary_name: &str,
    dest_dir: &Path,
    artifact: &str,
) -> std::result::Result<PathBuf, InstallError> {
    fs::create_dir_all(dest_dir)?;
    let extraction = |message: String| InstallError::Extraction {
        artifact: artifact.to_string(),
        message,
    };

    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    for entry in tar.entries().map_err(|e| extraction(e.to_string()))? {
        let mut entry = entry.map_err(|e| extraction(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .map_err(|e| extraction(e.to_string()))?
            .file_name()
            .map(|name| name == binary_name)
            .unwrap_or(false);
        if !matches {
            continue;
        }

        let dest = dest_dir.join(binary_name);
        entry
            .unpack(&dest)
            .map_err(|e| extraction(e.to_string()))?;
        make_executable(&dest)?;
        return Ok(dest);
    }

    Err(extraction(format!("{} not found in archive", binary_name)))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
