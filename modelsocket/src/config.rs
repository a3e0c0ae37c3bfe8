//! Ambient configuration read from the process environment.

use std::env;
use std::sync::LazyLock;
use std::sync::RwLock;

pub const MODELSOCKET_API_KEY_ENV_VAR: &str = "MODELSOCKET_API_KEY";
pub const MODELSOCKET_LOG_ENV_VAR: &str = "MODELSOCKET_LOG";

static MODELSOCKET_API_KEY: LazyLock<RwLock<Option<String>>> = LazyLock::new(|| {
    let val = env::var(MODELSOCKET_API_KEY_ENV_VAR)
        .ok()
        .and_then(|s| if s.is_empty() { None } else { Some(s) });
    RwLock::new(val)
});

/// Bearer secret attached to the WebSocket handshake, if one is configured.
pub fn get_api_key() -> Option<String> {
    #![allow(clippy::unwrap_used)]
    MODELSOCKET_API_KEY.read().unwrap().clone()
}

/// Overrides the API key for the remainder of the process. Mainly useful in
/// tests; production callers should set the environment variable instead.
pub fn set_api_key(value: String) {
    #![allow(clippy::unwrap_used)]
    if !value.is_empty() {
        *MODELSOCKET_API_KEY.write().unwrap() = Some(value);
    }
}

/// Log-level gate read from `MODELSOCKET_LOG`. Unset disables logging
/// entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl LogLevel {
    fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "modelsocket=debug",
            LogLevel::Info => "modelsocket=info",
            LogLevel::Error => "modelsocket=error",
        }
    }
}

/// Reads `MODELSOCKET_LOG` and, if present, installs a minimal
/// `tracing_subscriber` filtered to the requested level. `try_init` itself
/// is the no-op guard: a binary that already installed its own global
/// subscriber (or a second call from this same process) leaves that
/// subscriber in place instead of being clobbered.
pub fn init_logging_from_env() {
    let Some(level) = read_log_level() else {
        return;
    };
    let filter = tracing_subscriber::EnvFilter::new(level.as_filter_str());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn read_log_level() -> Option<LogLevel> {
    match env::var(MODELSOCKET_LOG_ENV_VAR).ok()?.as_str() {
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn api_key_round_trips_through_set() {
        set_api_key("sk-test".to_string());
        assert_eq!(get_api_key().as_deref(), Some("sk-test"));
    }

    #[test]
    fn set_api_key_ignores_empty_string() {
        set_api_key("sk-keep".to_string());
        set_api_key(String::new());
        assert_eq!(get_api_key().as_deref(), Some("sk-keep"));
    }
}
