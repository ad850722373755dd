//! Logging and observability
//!
//! Structured logging via `tracing`, with text or JSON output selected at
//! runtime. All log output goes to stderr; stdout is reserved for runner
//! workflow commands (`::group::`, `::warning::`) and machine-readable output.

use crate::variant::Variant;
use anyhow::Result;
use std::path::Path;
use std::{io, sync::Once};
use tracing::{span, Level, Span};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Canonical span names for the two job phases
pub mod spans {
    pub const SETUP_INSTALL: &str = "setup.install";
    pub const SETUP_RESTORE: &str = "setup.restore";
    pub const SETUP_CONFIGURE: &str = "setup.configure";
    pub const SAVE_STATS: &str = "save.stats";
    pub const SAVE_EVICT: &str = "save.evict";
    pub const SAVE_ARCHIVE: &str = "save.archive";
}

/// Span for tool installation
pub fn setup_install_span(variant: Variant) -> Span {
    span!(target: "ccache_ci_core::logging", Level::INFO, spans::SETUP_INSTALL, variant = %variant)
}

/// Span for the archive restore, recording the matched key
pub fn setup_restore_span(variant: Variant, primary_key: &str) -> Span {
    span!(
        target: "ccache_ci_core::logging",
        Level::INFO,
        spans::SETUP_RESTORE,
        variant = %variant,
        primary_key = %primary_key,
        matched_key = tracing::field::Empty
    )
}

pub fn setup_configure_span(variant: Variant, cache_dir: &Path) -> Span {
    span!(
        target: "ccache_ci_core::logging",
        Level::INFO,
        spans::SETUP_CONFIGURE,
        variant = %variant,
        cache_dir = %cache_dir.display()
    )
}

pub fn save_stats_span(variant: Variant) -> Span {
    span!(target: "ccache_ci_core::logging", Level::INFO, spans::SAVE_STATS, variant = %variant)
}

pub fn save_evict_span(variant: Variant, age: &str) -> Span {
    span!(
        target: "ccache_ci_core::logging",
        Level::INFO,
        spans::SAVE_EVICT,
        variant = %variant,
        age = %age
    )
}

pub fn save_archive_span(variant: Variant, key: &str) -> Span {
    span!(
        target: "ccache_ci_core::logging",
        Level::INFO,
        spans::SAVE_ARCHIVE,
        variant = %variant,
        key = %key
    )
}

/// Initialize the logging system
///
/// Safe to call more than once; only the first call installs a subscriber.
///
/// ## Environment Variables
///
/// * `CCACHE_CI_LOG_FORMAT` - `json` for JSON output, anything else for text
/// * `CCACHE_CI_LOG` - filter directives (falls back to `RUST_LOG`, then `info`)
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var("CCACHE_CI_LOG_FORMAT").ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(fmt::format::FmtSpan::CLOSE)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_target(false).with_writer(io::stderr))
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

fn create_env_filter() -> EnvFilter {
    if let Ok(spec) = std::env::var("CCACHE_CI_LOG") {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid CCACHE_CI_LOG specification '{}', using default 'info'",
                spec
            );
            EnvFilter::new("info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
