//! Environment-variable layer of the server configuration
//!
//! These tests mutate process-wide environment variables and therefore run
//! serially.

use clap::Parser;
use imgq_common::config::{CompiledDefaults, TomlConfig};
use imgq_common::Mode;
use imgq_server::config::{Args, ServerConfig};
use serial_test::serial;
use std::env;

const VARS: &[&str] = &["IMGQ_MODE", "IMGQ_BIND_ADDR", "IMGQ_RECENT_LIMIT"];

fn clear_vars() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_vars();
    env::set_var("IMGQ_MODE", "multi_user");
    env::set_var("IMGQ_RECENT_LIMIT", "7");

    let args = Args::try_parse_from(["imgq-server"]).unwrap();
    let file = TomlConfig::from_toml_str("mode = \"single_pool\"\nrecent_feed_limit = 20").unwrap();
    let config = ServerConfig::resolve(&args, file, CompiledDefaults::for_current_platform());

    assert_eq!(config.mode, Mode::MultiUser);
    assert_eq!(config.recent_feed_limit, 7);
    clear_vars();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_vars();
    env::set_var("IMGQ_BIND_ADDR", "0.0.0.0:1111");

    let args = Args::try_parse_from(["imgq-server", "--bind-addr", "127.0.0.1:2222"]).unwrap();
    let config = ServerConfig::resolve(
        &args,
        TomlConfig::default(),
        CompiledDefaults::for_current_platform(),
    );

    assert_eq!(config.bind_addr, "127.0.0.1:2222");
    clear_vars();
}

#[test]
#[serial]
fn test_invalid_mode_in_env_is_rejected() {
    clear_vars();
    env::set_var("IMGQ_MODE", "everyone");

    assert!(Args::try_parse_from(["imgq-server"]).is_err());
    clear_vars();
}
