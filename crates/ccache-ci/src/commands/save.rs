//! Save command implementation
//!
//! Implements `ccache-ci save`, run at job end. A failure here never fails
//! the step: it is logged and surfaced as a runner warning instead.

use anyhow::Result;
use ccache_ci_core::context::JobContext;
use ccache_ci_core::outcome::Step;
use ccache_ci_core::save::{run_save, SaveOptions};
use ccache_ci_core::state::StateFile;
use ccache_ci_core::store::ArchiveStore;
use ccache_ci_core::tool::ProcessRunner;
use ccache_ci_core::variant::Verbosity;
use ccache_ci_core::workflow::{self, WorkflowEnv};
use clap::Args;
use tracing::{info, instrument, warn};

/// `save` subcommand arguments
#[derive(Debug, Clone, Args)]
pub struct SaveArgs {
    /// Stats verbosity: 0, 1 or 2
    #[arg(long, env = "INPUT_VERBOSE", default_value = "0")]
    pub verbose: String,

    /// Job summary heading; empty disables the summary
    #[arg(long, env = "INPUT_JOB-SUMMARY", default_value = "")]
    pub job_summary: String,
}

/// Execute the save command
#[instrument(skip_all)]
pub async fn execute_save(
    args: SaveArgs,
    state_file: &StateFile,
    store: &dyn ArchiveStore,
) -> Result<()> {
    let options = SaveOptions {
        verbosity: Verbosity::parse_lenient(&args.verbose),
        job_summary: args.job_summary,
    };

    let runner = ProcessRunner;
    let workflow = WorkflowEnv::from_env();
    let ctx = JobContext {
        runner: &runner,
        store,
        workflow: &workflow,
        state_file,
    };

    match run_save(&ctx, &options, chrono::Utc::now()).await {
        Ok(report) => match report.archive {
            Step::Completed(key) => info!(key = %key, "Cache saved"),
            Step::Skipped(reason) => info!("Cache not saved: {}", reason),
        },
        Err(e) => {
            warn!("Saving cache failed: {}", e);
            workflow::warning(&format!("Saving cache failed: {}", e));
        }
    }
    Ok(())
}
