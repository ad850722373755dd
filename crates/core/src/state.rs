//! Job state shared between the setup and save phases
//!
//! Setup runs at job start and save at job end, in separate processes. The
//! facts save needs are captured in an immutable [`JobState`] snapshot that
//! setup writes as JSON once it has completed, and save reads back. Setup
//! clears any earlier snapshot first, so a failed setup leaves none behind.

use crate::errors::StateError;
use crate::variant::Variant;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Facts carried from setup to save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub ccache_variant: Variant,
    pub primary_key: String,
    /// Milliseconds since the Unix epoch when setup started
    pub start_timestamp: u64,
    pub should_save: bool,
    pub append_timestamp: bool,
    /// Raw `evict-old-files` input, validated at eviction time
    #[serde(default)]
    pub evict_old_files: String,
    pub cache_dir: PathBuf,
}

/// Location of the serialized job state
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `$RUNNER_TEMP/ccache-ci/state.json`, or the OS temp dir off-runner
    pub fn default_location() -> Self {
        let base = std::env::var_os("RUNNER_TEMP")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("ccache-ci").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self, state), fields(path = %self.path.display()))]
    pub fn save(&self, state: &JobState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(state).map_err(|e| StateError::Corrupt {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        // Write-then-rename so a crashed setup never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        info!(primary_key = %state.primary_key, "Job state saved");
        Ok(())
    }

    /// Remove state left by an earlier setup; a missing file is not an error
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn clear(&self) -> Result<(), StateError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed previous job state");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<JobState, StateError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound {
                    path: self.path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let state: JobState =
            serde_json::from_str(&content).map_err(|e| StateError::Corrupt {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        debug!(variant = %state.ccache_variant, "Job state loaded");
        Ok(state)
    }
}
