use crate::commands::keys::KeysArgs;
use crate::commands::save::SaveArgs;
use crate::commands::setup::SetupArgs;
use anyhow::Result;
use ccache_ci_core::errors::ConfigError;
use ccache_ci_core::state::StateFile;
use ccache_ci_core::store::LocalArchiveStore;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Parse a runner boolean input (`true | True | TRUE | false | False | FALSE`)
pub fn parse_input_bool(raw: &str) -> std::result::Result<bool, ConfigError> {
    match raw.trim() {
        "true" | "True" | "TRUE" => Ok(true),
        "false" | "False" | "FALSE" => Ok(false),
        other => Err(ConfigError::InvalidBoolean {
            value: other.to_string(),
        }),
    }
}

/// ccache-ci subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install, restore and configure the compiler cache (job start)
    Setup(SetupArgs),
    /// Report stats, evict and save the compiler cache (job end)
    Save(SaveArgs),
    /// Print the cache keys derived from the inputs as JSON
    Keys(KeysArgs),
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Compiler cache helper for CI runners",
    long_about = "Compiler cache helper for CI runners\n\nRestores a ccache or sccache directory at job start and saves it at job end, keyed for reuse by later jobs.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via CCACHE_CI_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// File carrying job state from setup to save
    #[arg(long, global = true, value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Root directory of the local archive store
    #[arg(long, global = true, value_name = "PATH", env = "CCACHE_CI_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Initialize logging and run the selected subcommand
    pub async fn dispatch(self) -> Result<()> {
        let log_format = self.log_format.map(|format| match format {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        });

        let log_level = self.log_level.as_str();
        if std::env::var_os("CCACHE_CI_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("ccache_ci={},ccache_ci_core={}", log_level, log_level),
            );
        }
        ccache_ci_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let state_file = self
            .state_file
            .map(StateFile::new)
            .unwrap_or_else(StateFile::default_location);
        let store = LocalArchiveStore::new(
            self.store_dir
                .unwrap_or_else(LocalArchiveStore::default_root),
        );

        match self.command {
            Commands::Setup(args) => {
                crate::commands::setup::execute_setup(args, &state_file, &store).await
            }
            Commands::Save(args) => {
                crate::commands::save::execute_save(args, &state_file, &store).await
            }
            Commands::Keys(args) => crate::commands::keys::execute_keys(args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccache_ci_core::variant::Variant;

    #[test]
    fn test_parse_input_bool() {
        for raw in ["true", "True", "TRUE"] {
            assert!(parse_input_bool(raw).unwrap());
        }
        for raw in ["false", "False", "FALSE"] {
            assert!(!parse_input_bool(raw).unwrap());
        }
        assert!(matches!(
            parse_input_bool("yes"),
            Err(ConfigError::InvalidBoolean { value }) if value == "yes"
        ));
        assert!(parse_input_bool("tRUE").is_err());
    }

    #[test]
    fn test_setup_defaults() {
        let cli = Cli::try_parse_from(["ccache-ci", "setup"]).unwrap();
        let Commands::Setup(args) = cli.command else {
            panic!("expected setup");
        };
        assert_eq!(args.keys.variant, Variant::Ccache);
        assert_eq!(args.max_size, "500M");
        assert!(args.save);
        assert!(args.restore);
        assert!(args.keys.append_timestamp);
        assert!(!args.create_symlink);
        assert_eq!(args.evict_old_files, "");
    }

    #[test]
    fn test_setup_flags() {
        let cli = Cli::try_parse_from([
            "ccache-ci",
            "--log-format",
            "json",
            "setup",
            "--variant",
            "sccache",
            "--key",
            "linux",
            "--restore",
            "False",
            "--evict-old-files",
            "job",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, Some(LogFormat::Json)));
        let Commands::Setup(args) = cli.command else {
            panic!("expected setup");
        };
        assert_eq!(args.keys.variant, Variant::Sccache);
        assert_eq!(args.keys.key, "linux");
        assert!(!args.restore);
        assert_eq!(args.evict_old_files, "job");
    }

    #[test]
    fn test_invalid_variant_rejected() {
        assert!(Cli::try_parse_from(["ccache-ci", "keys", "--variant", "distcc"]).is_err());
    }

    #[test]
    fn test_invalid_boolean_rejected() {
        let err = Cli::try_parse_from(["ccache-ci", "setup", "--save", "yes"]).unwrap_err();
        assert!(err.to_string().contains("YAML 1.2"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["ccache-ci"]).is_err());
    }
}
