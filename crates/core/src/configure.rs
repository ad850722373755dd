//! Tool configuration
//!
//! ccache keeps its settings in a persistent config file written through
//! `--set-config`. sccache reads its settings from the environment of the
//! server process, so they are exported for later steps before the server is
//! started. Any failure here is fatal to setup.

use crate::errors::{InstallError, Result, ToolError};
use crate::platform::Platform;
use crate::tool::{find_in_path, run_checked, CommandRunner};
use crate::variant::Variant;
use crate::workflow::WorkflowEnv;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Compiler names masqueraded by the cache binary
pub const COMPILER_NAMES: [&str; 8] = ["gcc", "g++", "cc", "c++", "clang", "clang++", "emcc", "em++"];

/// `$RUNNER_TOOL_CACHE/ccache-ci/shims`, or below the OS temp dir
pub fn default_symlink_dir() -> PathBuf {
    std::env::var_os("RUNNER_TOOL_CACHE")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("ccache-ci")
        .join("shims")
}

impl Variant {
    /// Point the tool at `cache_dir` with the given size limit
    #[instrument(skip(self, runner, env), fields(variant = %self))]
    pub async fn configure(
        self,
        runner: &dyn CommandRunner,
        env: &WorkflowEnv,
        cache_dir: &Path,
        max_size: &str,
        platform: Platform,
    ) -> Result<()> {
        let dir = cache_dir.to_string_lossy().into_owned();
        match self {
            Variant::Ccache => {
                let settings = ccache_settings(&dir, max_size, platform);
                for setting in &settings {
                    run_checked(runner, "ccache", &[setting.as_str()], &[]).await?;
                }

                let config = run_checked(runner, "ccache", &["-p"], &[]).await?;
                info!("ccache config:");
                forward_output(&config.stdout);
            }
            Variant::Sccache => {
                env.export_variable("SCCACHE_DIR", &dir)?;
                env.export_variable("SCCACHE_CACHE_SIZE", max_size)?;
                run_checked(
                    runner,
                    "sccache",
                    &["--start-server"],
                    &[("SCCACHE_DIR", dir.as_str()), ("SCCACHE_CACHE_SIZE", max_size)],
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Reset the hit/miss counters so save reports this job only
    pub async fn zero_stats(self, runner: &dyn CommandRunner) -> Result<()> {
        run_checked(runner, self.name(), &["-z"], &[]).await?;
        Ok(())
    }
}

/// `--set-config` arguments for ccache
pub fn ccache_settings(cache_dir: &str, max_size: &str, platform: Platform) -> Vec<String> {
    let mut settings = vec![
        format!("--set-config=cache_dir={}", cache_dir),
        format!("--set-config=max_size={}", max_size),
        "--set-config=compression=true".to_string(),
    ];
    // mtime is unreliable on these runners
    if platform.needs_content_compiler_check() {
        settings.push("--set-config=compiler_check=content".to_string());
    }
    settings
}

/// Log each line of a command's stdout
pub fn forward_output(stdout: &str) {
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        info!("{}", line);
    }
}

/// Create compiler-named symlinks to the tool in `dir` and put `dir` on `PATH`
#[instrument(skip(env), fields(variant = %variant, dir = %dir.display()))]
pub fn create_symlinks(
    variant: Variant,
    platform: Platform,
    dir: &Path,
    env: &WorkflowEnv,
) -> Result<Vec<PathBuf>> {
    let target = find_in_path(variant.name(), platform.exe_suffix()).ok_or_else(|| {
        ToolError::NotInstalled {
            tool: variant.name().to_string(),
        }
    })?;
    let links = link_compilers(&target, dir)?;
    env.add_path(dir)?;
    info!("Created {} compiler symlinks in {}", links.len(), dir.display());
    Ok(links)
}

/// Symlink every name in [`COMPILER_NAMES`] inside `dir` to `target`
#[cfg(unix)]
pub fn link_compilers(target: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(InstallError::from)?;

    let mut links = Vec::with_capacity(COMPILER_NAMES.len());
    for name in COMPILER_NAMES {
        let link = dir.join(name);
        if link.symlink_metadata().is_ok() {
            std::fs::remove_file(&link).map_err(InstallError::from)?;
        }
        std::os::unix::fs::symlink(target, &link).map_err(InstallError::from)?;
        debug!("{} -> {}", link.display(), target.display());
        links.push(link);
    }
    Ok(links)
}

#[cfg(not(unix))]
pub fn link_compilers(_target: &Path, _dir: &Path) -> Result<Vec<PathBuf>> {
    Err(crate::errors::ConfigError::Validation {
        message: "create-symlink is only supported on Linux and macOS runners".to_string(),
    }
    .into())
}
