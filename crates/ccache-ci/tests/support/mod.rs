//! Shared helpers for CLI integration tests

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::Path;

/// Runner variables that would leak the host CI environment into a test
const RUNNER_VARS: &[&str] = &[
    "GITHUB_OUTPUT",
    "GITHUB_ENV",
    "GITHUB_PATH",
    "GITHUB_STEP_SUMMARY",
    "GITHUB_WORKSPACE",
    "CCACHE_DIR",
    "SCCACHE_DIR",
    "CCACHE_CI_LOG",
    "CCACHE_CI_LOG_FORMAT",
    "RUST_LOG",
];

/// `ccache-ci` with state and store rooted in `tmp` and no inherited inputs
pub fn ccache_ci(tmp: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ccache-ci").unwrap();
    for var in RUNNER_VARS {
        cmd.env_remove(var);
    }
    for (name, _) in std::env::vars() {
        if name.starts_with("INPUT_") {
            cmd.env_remove(name);
        }
    }
    cmd.env("RUNNER_TEMP", tmp)
        .env("RUNNER_TOOL_CACHE", tmp.join("toolcache"))
        .env("CCACHE_CI_STORE_DIR", tmp.join("store"));
    cmd
}

/// Write an executable `ccache` stand-in into `dir`
#[cfg(unix)]
pub fn fake_ccache(dir: &Path, files_in_cache: u32) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir).unwrap();
    let script = format!(
        "#!/bin/sh\n\
         case \"$1\" in\n\
           --version) echo \"ccache version 4.9.1\" ;;\n\
           --help) echo \"    -v, --verbose    increase verbosity\" ;;\n\
           -s) echo \"Local storage:\"; echo \"  Files:            {}\" ;;\n\
         esac\n\
         exit 0\n",
        files_in_cache
    );
    let path = dir.join("ccache");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// `PATH` with `dir` in front
pub fn path_with(dir: &Path) -> std::ffi::OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(current) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&current));
    }
    std::env::join_paths(paths).unwrap()
}
