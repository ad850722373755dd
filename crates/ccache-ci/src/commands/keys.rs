//! Keys command implementation
//!
//! Prints the keys setup would restore with and save under, for checking a
//! workflow's `key` and `restore-keys` inputs without touching any cache.

use crate::cli::parse_input_bool;
use anyhow::Result;
use ccache_ci_core::keys::{derive_keys, parse_key_list, CacheKeys};
use ccache_ci_core::variant::Variant;
use clap::{ArgAction, Args};
use serde::Serialize;

/// Inputs that determine the cache keys, shared with `setup`
#[derive(Debug, Clone, Args)]
pub struct KeyArgs {
    /// Compiler cache tool (ccache or sccache)
    #[arg(long, env = "INPUT_VARIANT", default_value = "ccache")]
    pub variant: Variant,

    /// Key fragment appended to the variant prefix
    #[arg(long, env = "INPUT_KEY", default_value = "")]
    pub key: String,

    /// Newline-separated fallback keys, most specific first
    #[arg(long, env = "INPUT_RESTORE-KEYS", default_value = "")]
    pub restore_keys: String,

    /// Append a timestamp to the key when saving
    #[arg(
        long,
        env = "INPUT_APPEND-TIMESTAMP",
        default_value = "true",
        value_parser = parse_input_bool,
        action = ArgAction::Set
    )]
    pub append_timestamp: bool,
}

impl KeyArgs {
    pub fn derive(&self) -> CacheKeys {
        derive_keys(
            self.variant,
            &self.key,
            &parse_key_list(&self.restore_keys),
            self.append_timestamp,
        )
    }
}

/// `keys` subcommand arguments
#[derive(Debug, Clone, Args)]
pub struct KeysArgs {
    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KeysOutput<'a> {
    variant: Variant,
    primary_key: &'a str,
    restore_keys: &'a [String],
    lookup_order: Vec<&'a str>,
}

/// Execute the keys command
pub fn execute_keys(args: KeysArgs) -> Result<()> {
    let keys = args.keys.derive();
    let output = KeysOutput {
        variant: args.keys.variant,
        primary_key: &keys.primary_key,
        restore_keys: &keys.restore_keys,
        lookup_order: keys.lookup_order(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
