//! Integration tests covering how configuration layers are merged.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use shadowlink_config::{Config, LogFormat};
use tempfile::TempDir;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe in edition 2024; the guard serialises
        // access across tests in this binary.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

fn write_config(dir: &TempDir, contents: &str) -> OsString {
    let path = dir.path().join("shadowlink.toml");
    fs::write(&path, contents).expect("write configuration file");
    path.into_os_string()
}

#[test]
fn file_values_override_defaults() {
    let _lock = ENV_MUTEX
        .lock()
        .unwrap_or_else(|poison| poison.into_inner());
    let dir = TempDir::new().expect("create temp dir");
    let path = write_config(
        &dir,
        "thing_name = \"lamp-01\"\naction_timeout_ms = 1500\nlog_format = \"compact\"\n",
    );

    let config = Config::load_from_iter([
        OsString::from("shadowlinkd"),
        OsString::from("--config-path"),
        path,
    ])
    .expect("configuration should load");

    assert_eq!(config.thing_name, "lamp-01");
    assert_eq!(config.action_timeout_ms, 1500);
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert_eq!(config.discover_max_retries, 9, "unset fields keep defaults");
}

#[test]
fn cli_flags_override_file_values() {
    let _lock = ENV_MUTEX
        .lock()
        .unwrap_or_else(|poison| poison.into_inner());
    let dir = TempDir::new().expect("create temp dir");
    let path = write_config(&dir, "thing_name = \"from-file\"\n");

    let config = Config::load_from_iter([
        OsString::from("shadowlinkd"),
        OsString::from("--config-path"),
        path,
        OsString::from("--thing-name"),
        OsString::from("from-cli"),
    ])
    .expect("configuration should load");

    assert_eq!(config.thing_name, "from-cli");
}

#[test]
fn environment_overrides_file_values() {
    let dir = TempDir::new().expect("create temp dir");
    let path = write_config(&dir, "telemetry_topic = \"/topic/file\"\n");
    let _env = EnvOverride::set_var("SHADOWLINK_TELEMETRY_TOPIC", OsStr::new("/topic/env"));

    let config = Config::load_from_iter([
        OsString::from("shadowlinkd"),
        OsString::from("--config-path"),
        path,
    ])
    .expect("configuration should load");

    assert_eq!(config.telemetry_topic, "/topic/env");
}
