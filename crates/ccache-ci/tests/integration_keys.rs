//! `ccache-ci keys` output

mod support;

use serde_json::Value;
use support::ccache_ci;
use tempfile::TempDir;

fn keys_json(cmd: &mut assert_cmd::Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{:?}", output);
    serde_json::from_slice(&output.stdout).expect("stdout is pure JSON")
}

#[test]
fn test_keys_from_flags() {
    let tmp = TempDir::new().unwrap();
    let json = keys_json(ccache_ci(tmp.path()).args([
        "keys",
        "--key",
        "linux-gcc",
        "--restore-keys",
        "linux-gcc-\n\nlinux-\n",
    ]));

    assert_eq!(json["variant"], "ccache");
    assert_eq!(json["primaryKey"], "ccache-linux-gcc-");
    assert_eq!(
        json["restoreKeys"],
        serde_json::json!(["ccache-linux-gcc-", "ccache-linux-"])
    );
    assert_eq!(
        json["lookupOrder"],
        serde_json::json!(["ccache-linux-gcc-", "ccache-linux-gcc-", "ccache-linux-"])
    );
}

#[test]
fn test_keys_from_input_env() {
    let tmp = TempDir::new().unwrap();
    let json = keys_json(
        ccache_ci(tmp.path())
            .arg("keys")
            .env("INPUT_VARIANT", "sccache")
            .env("INPUT_KEY", "windows")
            .env("INPUT_APPEND-TIMESTAMP", "FALSE"),
    );

    assert_eq!(json["variant"], "sccache");
    assert_eq!(json["primaryKey"], "sccache-windows");
    assert_eq!(json["restoreKeys"], serde_json::json!([]));
}

#[test]
fn test_empty_key_is_bare_prefix() {
    let tmp = TempDir::new().unwrap();
    let json = keys_json(ccache_ci(tmp.path()).arg("keys"));
    assert_eq!(json["primaryKey"], "ccache-");
}
