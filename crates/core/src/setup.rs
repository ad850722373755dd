//! Setup phase
//!
//! Runs at job start: install the tool if needed, restore the newest matching
//! archive, configure the tool, zero its counters and persist the facts the
//! save phase needs. Only the restore is allowed to fail softly.

use crate::configure::create_symlinks;
use crate::context::JobContext;
use crate::errors::Result;
use crate::eviction::parse_setting;
use crate::install::InstallContext;
use crate::keys::{derive_keys, CacheKeys};
use crate::logging::{setup_configure_span, setup_install_span, setup_restore_span};
use crate::outcome::{RestoreMatch, SkipReason, Step};
use crate::state::JobState;
use crate::store::ArchiveStore;
use crate::variant::Variant;
use crate::workflow::{self, WorkflowEnv};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Instrument, Span};

/// Setup inputs after CLI parsing
#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub variant: Variant,
    pub key: String,
    pub restore_keys: Vec<String>,
    pub max_size: String,
    pub save: bool,
    pub restore: bool,
    pub append_timestamp: bool,
    pub create_symlink: bool,
    pub symlink_dir: PathBuf,
    /// Raw `evict-old-files` input, carried to save
    pub evict_old_files: String,
    /// Value of the variant's cache-dir variable, if set
    pub cache_dir_override: Option<String>,
    pub workspace: PathBuf,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            variant: Variant::Ccache,
            key: String::new(),
            restore_keys: Vec::new(),
            max_size: "500M".to_string(),
            save: true,
            restore: true,
            append_timestamp: true,
            create_symlink: false,
            symlink_dir: crate::configure::default_symlink_dir(),
            evict_old_files: String::new(),
            cache_dir_override: None,
            workspace: PathBuf::from("."),
        }
    }
}

/// What setup did
#[derive(Debug, Clone)]
pub struct SetupReport {
    pub keys: CacheKeys,
    pub cache_dir: PathBuf,
    pub restore: Step<RestoreMatch>,
    pub symlinks: Vec<PathBuf>,
    pub state: JobState,
}

/// Run the setup phase
pub async fn run_setup(
    ctx: &JobContext<'_>,
    install: &InstallContext,
    options: &SetupOptions,
    started_at: DateTime<Utc>,
) -> Result<SetupReport> {
    let variant = options.variant;
    ctx.state_file.clear()?;

    if let Err(e) = parse_setting(&options.evict_old_files) {
        warn!("{}; eviction will be skipped", e);
    }

    workflow::start_group(&format!("Check {} installation", variant));
    let installed = variant
        .ensure_installed(ctx.runner, ctx.workflow, install)
        .instrument(setup_install_span(variant))
        .await;
    workflow::end_group();
    installed?;

    let keys = derive_keys(
        variant,
        &options.key,
        &options.restore_keys,
        options.append_timestamp,
    );
    let cache_dir = variant.cache_dir(options.cache_dir_override.as_deref(), &options.workspace);

    let restore = restore_cache(ctx.store, &keys, &cache_dir, options.restore)
        .instrument(setup_restore_span(variant, &keys.primary_key))
        .await;
    publish_restore_outcome(ctx.workflow, &keys, &restore)?;

    workflow::start_group(&format!("Configure {}", variant));
    let configured = async {
        variant
            .configure(
                ctx.runner,
                ctx.workflow,
                &cache_dir,
                &options.max_size,
                install.platform,
            )
            .await?;
        variant.zero_stats(ctx.runner).await
    }
    .instrument(setup_configure_span(variant, &cache_dir))
    .await;
    workflow::end_group();
    configured?;

    let symlinks = if options.create_symlink {
        create_symlinks(variant, install.platform, &options.symlink_dir, ctx.workflow)?
    } else {
        Vec::new()
    };

    let state = JobState {
        ccache_variant: variant,
        primary_key: keys.primary_key.clone(),
        start_timestamp: u64::try_from(started_at.timestamp_millis()).unwrap_or_default(),
        should_save: options.save,
        append_timestamp: options.append_timestamp,
        evict_old_files: options.evict_old_files.clone(),
        cache_dir: cache_dir.clone(),
    };
    ctx.state_file.save(&state)?;

    Ok(SetupReport {
        keys,
        cache_dir,
        restore,
        symlinks,
        state,
    })
}

/// Restore `cache_dir` from the store; store failures count as a miss
pub async fn restore_cache(
    store: &dyn ArchiveStore,
    keys: &CacheKeys,
    cache_dir: &Path,
    enabled: bool,
) -> Step<RestoreMatch> {
    if !enabled {
        info!("Restore disabled, not restoring cache.");
        return Step::Skipped(SkipReason::RestoreDisabled);
    }

    let paths = [cache_dir.to_path_buf()];
    match store
        .restore(&paths, &keys.primary_key, &keys.restore_keys)
        .await
    {
        Ok(Some(key)) => {
            Span::current().record("matched_key", key.as_str());
            info!("Restored from cache key \"{}\".", key);
            Step::Completed(RestoreMatch::Hit { key })
        }
        Ok(None) => {
            info!("No cache found.");
            Step::Completed(RestoreMatch::Miss)
        }
        Err(e) => {
            warn!("Failed to restore cache, continuing without it: {}", e);
            Step::Completed(RestoreMatch::Miss)
        }
    }
}

/// Publish `cache-hit`, `restore-outcome` and `restored-key` step outputs
///
/// `cache-hit` is `true` only for an exact primary-key match.
pub fn publish_restore_outcome(
    env: &WorkflowEnv,
    keys: &CacheKeys,
    restore: &Step<RestoreMatch>,
) -> Result<()> {
    let (outcome, restored_key) = match restore {
        Step::Skipped(_) => ("skipped", ""),
        Step::Completed(RestoreMatch::Miss) => ("miss", ""),
        Step::Completed(RestoreMatch::Hit { key }) => ("hit", key.as_str()),
    };
    let exact = restored_key == keys.primary_key;

    env.set_output("cache-hit", if exact { "true" } else { "false" })?;
    env.set_output("restore-outcome", outcome)?;
    env.set_output("restored-key", restored_key)?;
    Ok(())
}
