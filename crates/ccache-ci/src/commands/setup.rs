//! Setup command implementation
//!
//! Implements `ccache-ci setup`, run at job start. Any failure here fails the
//! step.

use super::keys::KeyArgs;
use crate::cli::parse_input_bool;
use anyhow::{Context, Result};
use ccache_ci_core::context::JobContext;
use ccache_ci_core::install::InstallContext;
use ccache_ci_core::keys::parse_key_list;
use ccache_ci_core::outcome::{RestoreMatch, Step};
use ccache_ci_core::setup::{run_setup, SetupOptions};
use ccache_ci_core::state::StateFile;
use ccache_ci_core::store::ArchiveStore;
use ccache_ci_core::tool::ProcessRunner;
use ccache_ci_core::workflow::WorkflowEnv;
use clap::{ArgAction, Args};
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// `setup` subcommand arguments
#[derive(Debug, Clone, Args)]
pub struct SetupArgs {
    #[command(flatten)]
    pub keys: KeyArgs,

    /// Maximum cache size (ccache/sccache size syntax, e.g. 500M, 2G)
    #[arg(long, env = "INPUT_MAX-SIZE", default_value = "500M")]
    pub max_size: String,

    /// Save the cache at job end
    #[arg(long, env = "INPUT_SAVE", default_value = "true", value_parser = parse_input_bool, action = ArgAction::Set)]
    pub save: bool,

    /// Restore a cached archive at job start
    #[arg(long, env = "INPUT_RESTORE", default_value = "true", value_parser = parse_input_bool, action = ArgAction::Set)]
    pub restore: bool,

    /// Create compiler-named symlinks to the cache binary and put them on PATH
    #[arg(long, env = "INPUT_CREATE-SYMLINK", default_value = "false", value_parser = parse_input_bool, action = ArgAction::Set)]
    pub create_symlink: bool,

    /// Directory the compiler symlinks are created in
    #[arg(long, value_name = "PATH")]
    pub symlink_dir: Option<PathBuf>,

    /// Evict entries older than this at job end: <N>s, <N>d, job or true
    #[arg(long, env = "INPUT_EVICT-OLD-FILES", default_value = "")]
    pub evict_old_files: String,

    /// Workspace root the default cache directory is placed in
    #[arg(long, value_name = "PATH", env = "GITHUB_WORKSPACE")]
    pub workspace: Option<PathBuf>,
}

impl SetupArgs {
    fn into_options(self) -> Result<SetupOptions> {
        let workspace = match self.workspace {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to determine workspace directory")?,
        };
        let variant = self.keys.variant;
        let defaults = SetupOptions::default();

        Ok(SetupOptions {
            variant,
            key: self.keys.key,
            restore_keys: parse_key_list(&self.keys.restore_keys),
            max_size: self.max_size,
            save: self.save,
            restore: self.restore,
            append_timestamp: self.keys.append_timestamp,
            create_symlink: self.create_symlink,
            symlink_dir: self.symlink_dir.unwrap_or(defaults.symlink_dir),
            evict_old_files: self.evict_old_files,
            cache_dir_override: std::env::var(variant.dir_env_var())
                .ok()
                .filter(|v| !v.is_empty()),
            workspace,
        })
    }
}

/// Execute the setup command
#[instrument(skip_all)]
pub async fn execute_setup(
    args: SetupArgs,
    state_file: &StateFile,
    store: &dyn ArchiveStore,
) -> Result<()> {
    let options = args.into_options()?;
    debug!("Setup options: {:?}", options);

    let install = InstallContext::detect()?;
    let runner = ProcessRunner;
    let workflow = WorkflowEnv::from_env();
    let ctx = JobContext {
        runner: &runner,
        store,
        workflow: &workflow,
        state_file,
    };

    let report = run_setup(&ctx, &install, &options, chrono::Utc::now()).await?;

    let outcome = match &report.restore {
        Step::Skipped(reason) => format!("skipped ({})", reason),
        Step::Completed(RestoreMatch::Hit { key }) => format!("hit ({})", key),
        Step::Completed(RestoreMatch::Miss) => "miss".to_string(),
    };
    info!(
        primary_key = %report.keys.primary_key,
        cache_dir = %report.cache_dir.display(),
        "{} ready, restore {}",
        options.variant,
        outcome
    );
    Ok(())
}
