//! CI runner environment
//!
//! The runner exposes step outputs, exported variables, PATH additions and
//! the job summary as files named by environment variables. Each call appends
//! to the relevant file; when the variable is unset the call is a logged
//! no-op so the binary still works outside a runner. Log groups and warnings
//! are workflow commands printed on stdout.

use crate::errors::{CcacheCiError, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File locations published by the runner
#[derive(Debug, Clone, Default)]
pub struct WorkflowEnv {
    pub output_file: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub path_file: Option<PathBuf>,
    pub summary_file: Option<PathBuf>,
}

impl WorkflowEnv {
    /// Read `GITHUB_OUTPUT`, `GITHUB_ENV`, `GITHUB_PATH` and `GITHUB_STEP_SUMMARY`
    pub fn from_env() -> Self {
        let file = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            output_file: file("GITHUB_OUTPUT"),
            env_file: file("GITHUB_ENV"),
            path_file: file("GITHUB_PATH"),
            summary_file: file("GITHUB_STEP_SUMMARY"),
        }
    }

    /// Publish a step output
    pub fn set_output(&self, name: &str, value: &str) -> Result<()> {
        debug!(name, value, "Setting step output");
        append_key_value(self.output_file.as_deref(), name, value)
    }

    /// Set a variable for this process and export it to later steps
    pub fn export_variable(&self, name: &str, value: &str) -> Result<()> {
        debug!(name, value, "Exporting variable");
        std::env::set_var(name, value);
        append_key_value(self.env_file.as_deref(), name, value)
    }

    /// Prepend a directory to `PATH` for this process and later steps
    pub fn add_path(&self, dir: &Path) -> Result<()> {
        debug!(dir = %dir.display(), "Adding PATH entry");
        let mut paths = vec![dir.to_path_buf()];
        if let Some(current) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&current));
        }
        let joined = std::env::join_paths(paths)
            .map_err(|e| CcacheCiError::Runner(format!("Invalid PATH entry: {}", e)))?;
        std::env::set_var("PATH", joined);

        match self.path_file.as_deref() {
            Some(file) => append_line(file, &dir.to_string_lossy()),
            None => Ok(()),
        }
    }

    /// Append markdown to the job summary
    pub fn append_summary(&self, markdown: &str) -> Result<()> {
        match self.summary_file.as_deref() {
            Some(file) => append_line(file, markdown),
            None => {
                debug!("No job summary file configured, skipping summary");
                Ok(())
            }
        }
    }
}

/// Open a collapsible log group
pub fn start_group(name: &str) {
    println!("::group::{}", name);
}

pub fn end_group() {
    println!("::endgroup::");
}

/// Surface a warning annotation on the job
pub fn warning(message: &str) {
    println!("::warning::{}", escape_data(message));
}

/// Surface a notice annotation on the job
pub fn notice(message: &str) {
    println!("::notice::{}", escape_data(message));
}

fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn append_key_value(file: Option<&Path>, name: &str, value: &str) -> Result<()> {
    let Some(file) = file else {
        return Ok(());
    };

    if value.contains('\n') {
        let delimiter = format!("ghadelimiter_{:016x}", fastrand::u64(..));
        append_line(file, &format!("{}<<{}\n{}\n{}", name, delimiter, value, delimiter))
    } else {
        append_line(file, &format!("{}={}", name, value))
    }
}

fn append_line(file: &Path, line: &str) -> Result<()> {
    let mut handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .map_err(|e| {
            CcacheCiError::Runner(format!("Failed to open {}: {}", file.display(), e))
        })?;
    writeln!(handle, "{}", line)
        .map_err(|e| CcacheCiError::Runner(format!("Failed to write {}: {}", file.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn env_in(dir: &Path) -> WorkflowEnv {
        WorkflowEnv {
            output_file: Some(dir.join("output")),
            env_file: Some(dir.join("env")),
            path_file: Some(dir.join("path")),
            summary_file: Some(dir.join("summary")),
        }
    }

    #[test]
    fn test_set_output_appends() {
        let tmp = TempDir::new().unwrap();
        let env = env_in(tmp.path());

        env.set_output("cache-hit", "true").unwrap();
        env.set_output("restored-key", "ccache-k-2024").unwrap();

        let content = fs::read_to_string(tmp.path().join("output")).unwrap();
        assert_eq!(content, "cache-hit=true\nrestored-key=ccache-k-2024\n");
    }

    #[test]
    fn test_multiline_value_uses_delimiter() {
        let tmp = TempDir::new().unwrap();
        let env = env_in(tmp.path());

        env.set_output("stats", "a\nb").unwrap();

        let content = fs::read_to_string(tmp.path().join("output")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].starts_with("stats<<ghadelimiter_"));
        assert_eq!(&lines[1..3], &["a", "b"]);
        assert_eq!(lines[3], lines[0].trim_start_matches("stats<<"));
    }

    #[test]
    fn test_missing_files_are_noops() {
        let env = WorkflowEnv::default();
        assert!(env.set_output("cache-hit", "false").is_ok());
        assert!(env.append_summary("## stats").is_ok());
    }

    #[test]
    fn test_append_summary() {
        let tmp = TempDir::new().unwrap();
        let env = env_in(tmp.path());

        env.append_summary("## ccache stats").unwrap();

        let content = fs::read_to_string(tmp.path().join("summary")).unwrap();
        assert_eq!(content, "## ccache stats\n");
    }

    #[test]
    fn test_escape_data() {
        assert_eq!(escape_data("50% done\nnext"), "50%25 done%0Anext");
    }
}
