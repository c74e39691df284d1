//! Log subscriber setup for harness binaries.
//!
//! The library only emits `tracing` events; binaries call [`init_tracing`]
//! once to print them. `RUST_LOG` takes precedence over the default
//! directive, e.g. `RUST_LOG=listprobe=debug` to follow every wait.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Format named by `LISTPROBE_LOG_FORMAT`, pretty unless it says `json`
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var("LISTPROBE_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install a global subscriber in the format from the environment
///
/// Returns `false` if a subscriber was already installed, which is not an
/// error: test binaries may call this from every test.
pub fn init_tracing() -> bool {
    init_tracing_with(LogFormat::from_env(), DEFAULT_DIRECTIVE)
}

/// Install a global subscriber with an explicit format and fallback filter
pub fn init_tracing_with(format: LogFormat, default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _ = init_tracing_with(LogFormat::Pretty, "warn");
        assert!(!init_tracing_with(LogFormat::Json, "warn"));
    }

    #[test]
    fn test_format_serde() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap_or_default();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
