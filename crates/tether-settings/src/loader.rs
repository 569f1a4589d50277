//! Builds [`TetherSettings`] from three layers, later layers winning:
//! compiled defaults, the JSON settings file, then `TETHER_*` variables.
//! The result is checked by [`validate`] before it is handed out.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::TetherSettings;

/// `$HOME/.tether/settings.json` (falls back to `/tmp` without `HOME`).
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".tether")
        .join("settings.json")
}

/// [`load_settings_from_path`] on [`settings_path`].
pub fn load_settings() -> Result<TetherSettings> {
    load_settings_from_path(&settings_path())
}

/// Defaults, overlaid with `path` when it exists, then the environment.
///
/// A missing file is not an error; an unreadable or malformed one is.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<TetherSettings> {
    let mut tree = serde_json::to_value(TetherSettings::default())?;
    if path.exists() {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        overlay(&mut tree, serde_json::from_str(&text)?);
        debug!(path = %path.display(), "settings file applied");
    } else {
        debug!(path = %path.display(), "no settings file");
    }
    Ok(serde_json::from_value(tree)?)
}

/// Write `layer` over `base` in place.
///
/// Objects merge key by key; anything else in `layer` replaces what is in
/// `base`. A `null` in `layer` leaves `base` untouched.
pub fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `TETHER_*` variables. Unparseable or out-of-range values are
/// reported and skipped.
pub fn apply_env_overrides(settings: &mut TetherSettings) {
    let server = &mut settings.server;
    env_text("TETHER_HOST", &mut server.host);
    env_number("TETHER_PORT", &(0..=u16::MAX), &mut server.port);
    if let Some(path) = env_var("TETHER_PATH") {
        match parse_http_path(&path) {
            Some(path) => server.path = path,
            None => warn!(key = "TETHER_PATH", value = %path, "not an absolute path, ignoring"),
        }
    }
    env_number("TETHER_MAX_CONNECTIONS", &(1..=100_000), &mut server.max_connections);
    env_number(
        "TETHER_HEARTBEAT_INTERVAL_MS",
        &(1_000..=600_000),
        &mut server.heartbeat_interval_ms,
    );
    env_number("TETHER_CALL_TIMEOUT_MS", &(1_000..=3_600_000), &mut server.call_timeout_ms);

    let client = &mut settings.client;
    env_text("TETHER_ENDPOINT", &mut client.endpoint);
    env_number("TETHER_RECONNECT_MAX_MS", &(100..=600_000), &mut client.reconnect_max_ms);

    env_text("TETHER_LOG_LEVEL", &mut settings.logging.level);
    env_text("TETHER_LOG_FORMAT", &mut settings.logging.format);
}

/// Check constraints that span fields.
pub fn validate(settings: &TetherSettings) -> Result<()> {
    let server = &settings.server;
    if !server.path.starts_with('/') {
        return Err(SettingsError::InvalidValue(format!(
            "server.path must start with '/', got '{}'",
            server.path
        )));
    }
    if server.heartbeat_timeout_ms < server.heartbeat_interval_ms {
        return Err(SettingsError::InvalidValue(format!(
            "server.heartbeatTimeoutMs ({}) is shorter than server.heartbeatIntervalMs ({})",
            server.heartbeat_timeout_ms, server.heartbeat_interval_ms
        )));
    }
    if server.max_connections == 0 || server.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.maxConnections and server.sendQueueCapacity must be positive".into(),
        ));
    }
    let client = &settings.client;
    if client.reconnect_initial_ms == 0 || client.reconnect_initial_ms > client.reconnect_max_ms {
        return Err(SettingsError::InvalidValue(format!(
            "client.reconnectInitialMs ({}) must be in 1..=client.reconnectMaxMs ({})",
            client.reconnect_initial_ms, client.reconnect_max_ms
        )));
    }
    if !(client.endpoint.starts_with("ws://") || client.endpoint.starts_with("wss://")) {
        return Err(SettingsError::InvalidValue(format!(
            "client.endpoint must be a ws:// or wss:// URL, got '{}'",
            client.endpoint
        )));
    }
    Ok(())
}

/// Parse `text` as a `T` inside `range`.
pub fn parse_in_range<T>(text: &str, range: &RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    text.trim().parse().ok().filter(|n| range.contains(n))
}

/// An absolute HTTP path without whitespace.
pub fn parse_http_path(text: &str) -> Option<String> {
    (text.starts_with('/') && !text.contains(char::is_whitespace)).then(|| text.to_owned())
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_text(key: &str, slot: &mut String) {
    if let Some(value) = env_var(key) {
        *slot = value;
    }
}

fn env_number<T>(key: &str, range: &RangeInclusive<T>, slot: &mut T)
where
    T: FromStr + PartialOrd + std::fmt::Debug,
{
    let Some(raw) = env_var(key) else { return };
    match parse_in_range(&raw, range) {
        Some(n) => *slot = n,
        None => warn!(key, value = %raw, ?range, "out of range or not a number, ignoring"),
    }
}
