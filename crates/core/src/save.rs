//! Save phase
//!
//! Runs at job end from the state setup persisted. When saving was disabled
//! at setup nothing else runs. Otherwise stats are shown and summarized, old
//! entries optionally evicted, and the cache directory is archived unless
//! the cache is empty. Eviction is
//! best-effort; every other failure is returned so the CLI can downgrade it
//! to a warning.

use crate::configure::forward_output;
use crate::context::JobContext;
use crate::errors::{Result, StateError};
use crate::eviction::{evict_args, parse_setting};
use crate::keys::save_key;
use crate::logging::{save_archive_span, save_evict_span, save_stats_span};
use crate::outcome::{SkipReason, Step};
use crate::state::JobState;
use crate::stats::parse_stats_table;
use crate::summary::{write_job_summary, StatsReport};
use crate::tool::{run_checked, CommandRunner};
use crate::variant::{knows_verbosity_flag, StatsSnapshot, Variant, Verbosity};
use crate::version::parse_version;
use crate::workflow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn, Instrument};

/// Save inputs after CLI parsing
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub verbosity: Verbosity,
    /// Summary heading; empty disables the job summary
    pub job_summary: String,
}

/// What save did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// Resolved eviction age argument, or the reason eviction failed
    pub eviction: std::result::Result<Step<String>, String>,
    /// Key the archive was saved under
    pub archive: Step<String>,
    pub summary_written: bool,
}

impl SaveReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            eviction: Ok(Step::Skipped(reason)),
            archive: Step::Skipped(reason),
            summary_written: false,
        }
    }
}

/// Run the save phase
pub async fn run_save(
    ctx: &JobContext<'_>,
    options: &SaveOptions,
    now: DateTime<Utc>,
) -> Result<SaveReport> {
    let state = match ctx.state_file.load() {
        Ok(state) => state,
        Err(StateError::NotFound { path }) => {
            debug!(path = %path, "No job state");
            workflow::notice("ccache setup failed, skipping saving.");
            return Ok(SaveReport::skipped(SkipReason::MissingState));
        }
        Err(e) => return Err(e.into()),
    };
    let variant = state.ccache_variant;

    if !state.should_save {
        info!("Saving disabled, not saving cache.");
        return Ok(SaveReport::skipped(SkipReason::SaveDisabled));
    }

    let knows_verbose = detect_verbosity_flag(ctx.runner, variant).await;

    workflow::start_group(&format!("{} stats", variant));
    let shown = show_stats(ctx.runner, variant, options.verbosity, knows_verbose)
        .instrument(save_stats_span(variant))
        .await;
    workflow::end_group();
    let shown = shown?;

    let summary_written = if options.job_summary.trim().is_empty() {
        false
    } else {
        let report = stats_report(ctx.runner, variant, &shown).await?;
        write_job_summary(ctx.workflow, &options.job_summary, &report)?
    };

    let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    let eviction = match evict(ctx.runner, &state, now_ms).await {
        Ok(step) => Ok(step),
        Err(e) => {
            warn!("Eviction failed, continuing: {}", e);
            workflow::warning(&format!("Eviction failed: {}", e));
            Err(e.to_string())
        }
    };

    let snapshot = stats_snapshot(ctx.runner, variant, knows_verbose).await?;
    let archive = match save_decision(state.should_save, &snapshot) {
        Some(reason) => {
            info!("Not saving cache because no objects are cached.");
            Step::Skipped(reason)
        }
        None => {
            let key = save_key(&state.primary_key, state.append_timestamp, now);
            let paths = [state.cache_dir.clone()];
            ctx.store
                .save(&paths, &key)
                .instrument(save_archive_span(variant, &key))
                .await?;
            info!("Saved cache with key \"{}\".", key);
            Step::Completed(key)
        }
    };

    Ok(SaveReport {
        eviction,
        archive,
        summary_written,
    })
}

/// Why a save would be skipped, `None` when it should go ahead
pub fn save_decision(save_enabled: bool, snapshot: &StatsSnapshot) -> Option<SkipReason> {
    if !save_enabled {
        Some(SkipReason::SaveDisabled)
    } else if snapshot.variant.is_empty(snapshot) {
        Some(SkipReason::EmptyCache)
    } else {
        None
    }
}

pub fn should_save(save_enabled: bool, snapshot: &StatsSnapshot) -> bool {
    save_decision(save_enabled, snapshot).is_none()
}

/// ccache advertises `-v` in `--help` from 4.4 on; sccache never does
async fn detect_verbosity_flag(runner: &dyn CommandRunner, variant: Variant) -> bool {
    if variant != Variant::Ccache {
        return false;
    }
    match runner.run(variant.name(), &["--help"], &[]).await {
        Ok(output) => knows_verbosity_flag(&output.stdout),
        Err(e) => {
            debug!("Could not read {} --help: {}", variant, e);
            false
        }
    }
}

/// Print stats at the requested verbosity and return the text shown
async fn show_stats(
    runner: &dyn CommandRunner,
    variant: Variant,
    verbosity: Verbosity,
    knows_verbose: bool,
) -> Result<String> {
    let args = variant.stats_args(verbosity, knows_verbose);
    let output = run_checked(runner, variant.name(), &args, &[]).await?;
    forward_output(&output.stdout);
    Ok(output.stdout)
}

/// Stats for the job summary: the JSON table when supported, else `shown`
async fn stats_report(
    runner: &dyn CommandRunner,
    variant: Variant,
    shown: &str,
) -> Result<StatsReport> {
    let version = match runner.run(variant.name(), &["--version"], &[]).await {
        Ok(output) => parse_version(&output.stdout),
        Err(_) => None,
    };
    debug!(?version, "Detected tool version");

    if let Some(args) = variant.json_stats_args(version) {
        let output = run_checked(runner, variant.name(), &args, &[]).await?;
        if let Some(row) = parse_stats_table(&output.stdout) {
            return Ok(StatsReport::Table(row));
        }
        debug!("JSON stats could not be parsed, using text output");
    }
    Ok(StatsReport::Raw(shown.to_string()))
}

/// Capture the stats used for the emptiness check
async fn stats_snapshot(
    runner: &dyn CommandRunner,
    variant: Variant,
    knows_verbose: bool,
) -> Result<StatsSnapshot> {
    let args = variant.empty_check_args(knows_verbose);
    let output = run_checked(runner, variant.name(), &args, &[]).await?;
    Ok(StatsSnapshot {
        variant,
        verbose: variant == Variant::Ccache && knows_verbose,
        raw: output.stdout,
    })
}

/// Evict entries older than the configured age; returns the age argument used
pub async fn evict(
    runner: &dyn CommandRunner,
    state: &JobState,
    now_ms: u64,
) -> Result<Step<String>> {
    let Some(age) = parse_setting(&state.evict_old_files)? else {
        return Ok(Step::Skipped(SkipReason::EvictionDisabled));
    };
    let variant = state.ccache_variant;
    if !variant.supports_eviction() {
        warn!("{} does not support evicting old files, skipping", variant);
        return Ok(Step::Skipped(SkipReason::EvictionUnsupported));
    }

    let arg = age.to_arg(state.start_timestamp, now_ms);
    async {
        workflow::start_group(&format!("Evict {} files older than {}", variant, arg));
        let args = evict_args(&arg);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let result = run_checked(runner, variant.name(), &args, &[]).await;
        workflow::end_group();
        result.map(|output| forward_output(&output.stdout))
    }
    .instrument(save_evict_span(variant, &arg))
    .await?;

    Ok(Step::Completed(arg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateFile;
    use crate::store::mock::MockStore;
    use crate::tool::mock::MockRunner;
    use crate::tool::CommandOutput;
    use crate::workflow::WorkflowEnv;
    use chrono::TimeZone;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const START_MS: u64 = 1_734_258_917_128;

    const CCACHE_HELP: &str = "Usage:\n    ccache [options]\n\n    -v, --verbose    increase verbosity\n";
    const CCACHE_EMPTY: &str = "Local storage:\n  Cache size (GB):   0.0\n  Files:              0\n";
    const CCACHE_FULL: &str = "Local storage:\n  Cache size (GB):   0.1\n  Files:            512\n";
    const CCACHE_JSON: &str =
        r#"{"direct_cache_hit":254,"preprocessed_cache_hit":0,"cache_miss":3965}"#;

    fn state(variant: Variant) -> JobState {
        JobState {
            ccache_variant: variant,
            primary_key: format!("{}-linux-", variant),
            start_timestamp: START_MS,
            should_save: true,
            append_timestamp: true,
            evict_old_files: String::new(),
            cache_dir: PathBuf::from("/work/.ccache"),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt((START_MS + 1_234_000) as i64).unwrap()
    }

    struct Fixture {
        tmp: TempDir,
        runner: MockRunner,
        store: MockStore,
        workflow: WorkflowEnv,
        state_file: StateFile,
    }

    impl Fixture {
        fn new(state: Option<JobState>) -> Self {
            let tmp = TempDir::new().unwrap();
            let state_file = StateFile::new(tmp.path().join("state.json"));
            if let Some(state) = state {
                state_file.save(&state).unwrap();
            }
            let runner = MockRunner::new();
            runner.respond("ccache --help", CommandOutput::ok(CCACHE_HELP));
            runner.respond("ccache -s -v", CommandOutput::ok(CCACHE_FULL));
            Self {
                workflow: WorkflowEnv {
                    summary_file: Some(tmp.path().join("summary")),
                    ..WorkflowEnv::default()
                },
                tmp,
                runner,
                store: MockStore::new(),
                state_file,
            }
        }

        fn ctx(&self) -> JobContext<'_> {
            JobContext {
                runner: &self.runner,
                store: &self.store,
                workflow: &self.workflow,
                state_file: &self.state_file,
            }
        }

        fn summary(&self) -> String {
            fs::read_to_string(self.tmp.path().join("summary")).unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn test_saves_with_timestamped_key() {
        let fx = Fixture::new(Some(state(Variant::Ccache)));
        let report = run_save(&fx.ctx(), &SaveOptions::default(), now())
            .await
            .unwrap();

        let expected = "ccache-linux-2024-12-15T10:55:51.128Z";
        assert_eq!(report.archive, Step::Completed(expected.to_string()));
        let saves = fx.store.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].key, expected);
        assert_eq!(saves[0].paths, vec![PathBuf::from("/work/.ccache")]);
    }

    #[tokio::test]
    async fn test_stable_key_without_timestamp() {
        let mut st = state(Variant::Ccache);
        st.primary_key = "ccache-linux".to_string();
        st.append_timestamp = false;
        let fx = Fixture::new(Some(st));

        let report = run_save(&fx.ctx(), &SaveOptions::default(), now())
            .await
            .unwrap();
        assert_eq!(report.archive, Step::Completed("ccache-linux".to_string()));
    }

    #[tokio::test]
    async fn test_missing_state_skips() {
        let fx = Fixture::new(None);
        let report = run_save(&fx.ctx(), &SaveOptions::default(), now())
            .await
            .unwrap();

        assert_eq!(report.archive, Step::Skipped(SkipReason::MissingState));
        assert!(fx.runner.calls().is_empty());
        assert!(fx.store.saves().is_empty());
    }

    #[tokio::test]
    async fn test_empty_cache_is_not_saved() {
        let fx = Fixture::new(Some(state(Variant::Ccache)));
        fx.runner.respond("ccache -s -v", CommandOutput::ok(CCACHE_EMPTY));

        let report = run_save(&fx.ctx(), &SaveOptions::default(), now())
            .await
            .unwrap();
        assert_eq!(report.archive, Step::Skipped(SkipReason::EmptyCache));
        assert!(fx.store.saves().is_empty());
    }

    #[tokio::test]
    async fn test_save_disabled_skips_everything() {
        let mut st = state(Variant::Ccache);
        st.should_save = false;
        st.evict_old_files = "job".to_string();
        let fx = Fixture::new(Some(st));

        let options = SaveOptions {
            job_summary: "ccache stats".to_string(),
            ..SaveOptions::default()
        };
        let report = run_save(&fx.ctx(), &options, now()).await.unwrap();

        assert_eq!(report.archive, Step::Skipped(SkipReason::SaveDisabled));
        assert_eq!(report.eviction, Ok(Step::Skipped(SkipReason::SaveDisabled)));
        assert!(!report.summary_written);
        assert!(fx.runner.calls().is_empty());
        assert!(fx.store.saves().is_empty());
        assert_eq!(fx.summary(), "");
    }

    #[tokio::test]
    async fn test_verbosity_without_flag_support() {
        let fx = Fixture::new(Some(state(Variant::Ccache)));
        fx.runner
            .respond("ccache --help", CommandOutput::ok("Usage: ccache [options]\n"))
            .respond("ccache -s", CommandOutput::ok("files in cache 12\n"));

        let options = SaveOptions {
            verbosity: Verbosity::VeryVerbose,
            ..SaveOptions::default()
        };
        let report = run_save(&fx.ctx(), &options, now()).await.unwrap();

        assert!(!fx.runner.was_called("ccache -s -vv"));
        assert!(report.archive.completed().is_some());
    }

    #[tokio::test]
    async fn test_eviction_by_job_duration() {
        let mut st = state(Variant::Ccache);
        st.evict_old_files = "job".to_string();
        let fx = Fixture::new(Some(st));

        let report = run_save(&fx.ctx(), &SaveOptions::default(), now())
            .await
            .unwrap();
        assert_eq!(report.eviction, Ok(Step::Completed("1234s".to_string())));
        assert!(fx.runner.was_called("ccache --evict-older-than 1234s"));
    }

    #[tokio::test]
    async fn test_eviction_failure_does_not_block_save() {
        let mut st = state(Variant::Ccache);
        st.evict_old_files = "3d".to_string();
        let fx = Fixture::new(Some(st));
        fx.runner.respond(
            "ccache --evict-older-than 3d",
            CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "unknown option".to_string(),
            },
        );

        let report = run_save(&fx.ctx(), &SaveOptions::default(), now())
            .await
            .unwrap();
        assert!(report.eviction.is_err());
        assert_eq!(fx.store.saves().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_age_skips_eviction_only() {
        let mut st = state(Variant::Ccache);
        st.evict_old_files = "xyz".to_string();
        let fx = Fixture::new(Some(st));

        let report = run_save(&fx.ctx(), &SaveOptions::default(), now())
            .await
            .unwrap();
        assert!(report.eviction.is_err());
        assert!(report.archive.completed().is_some());
    }

    #[tokio::test]
    async fn test_sccache_eviction_unsupported() {
        let mut st = state(Variant::Sccache);
        st.evict_old_files = "job".to_string();
        let fx = Fixture::new(Some(st));
        fx.runner
            .respond("sccache -s", CommandOutput::ok("Cache size 1 MiB\n"));

        let report = run_save(&fx.ctx(), &SaveOptions::default(), now())
            .await
            .unwrap();
        assert_eq!(
            report.eviction,
            Ok(Step::Skipped(SkipReason::EvictionUnsupported))
        );
        assert!(!fx.runner.was_called("sccache --help"));
    }

    #[tokio::test]
    async fn test_json_summary_table() {
        let fx = Fixture::new(Some(state(Variant::Ccache)));
        fx.runner
            .respond("ccache --version", CommandOutput::ok("ccache version 4.10.2\n"))
            .respond("ccache --print-stats --format=json", CommandOutput::ok(CCACHE_JSON));

        let options = SaveOptions {
            job_summary: "ccache stats".to_string(),
            ..SaveOptions::default()
        };
        let report = run_save(&fx.ctx(), &options, now()).await.unwrap();

        assert!(report.summary_written);
        let summary = fx.summary();
        assert!(summary.starts_with("## ccache stats"));
        assert!(summary.contains("<td>254 / 4219</td><td>6.02%</td>"));
    }

    #[tokio::test]
    async fn test_old_version_summary_is_raw() {
        let fx = Fixture::new(Some(state(Variant::Ccache)));
        fx.runner
            .respond("ccache --version", CommandOutput::ok("ccache version 4.6.1\n"))
            .respond("ccache -s", CommandOutput::ok("Hits: 3 / 4 (75.00 %)\n"));

        let options = SaveOptions {
            job_summary: "stats".to_string(),
            ..SaveOptions::default()
        };
        run_save(&fx.ctx(), &options, now()).await.unwrap();

        assert!(!fx.runner.was_called("ccache --print-stats --format=json"));
        assert!(fx.summary().contains("```\nHits: 3 / 4 (75.00 %)\n```"));
    }

    #[tokio::test]
    async fn test_store_failure_is_returned() {
        let tmp = TempDir::new().unwrap();
        let state_file = StateFile::new(tmp.path().join("state.json"));
        state_file.save(&state(Variant::Ccache)).unwrap();
        let runner = MockRunner::new();
        runner.respond("ccache -s", CommandOutput::ok(CCACHE_FULL));
        let store = MockStore::new().failing("disk full");
        let workflow = WorkflowEnv::default();
        let ctx = JobContext {
            runner: &runner,
            store: &store,
            workflow: &workflow,
            state_file: &state_file,
        };

        assert!(run_save(&ctx, &SaveOptions::default(), now()).await.is_err());
    }

    #[test]
    fn test_should_save_empty_patterns() {
        let cases = [
            (Variant::Ccache, true, "  Files:   0\n"),
            (Variant::Ccache, false, "files in cache                     0\n"),
            (Variant::Sccache, false, "Cache size                      0 bytes\n"),
        ];
        for (variant, verbose, raw) in cases {
            let snapshot = StatsSnapshot {
                variant,
                verbose,
                raw: raw.to_string(),
            };
            assert!(!should_save(true, &snapshot), "{:?}", raw);
        }
    }
}
