//! Harness configuration.
//!
//! Defaults match the todo application's fixed endpoint. Environment
//! variables may override the endpoint, the headless flag, the Chromium
//! binary and the server command:
//!
//! | variable               | field           |
//! |------------------------|-----------------|
//! | `LISTPROBE_BASE_URL`   | `base_url`      |
//! | `LISTPROBE_HEADLESS`   | `headless`      |
//! | `CHROMIUM_PATH`        | `chromium_path` |
//! | `LISTPROBE_SERVER_CMD` | `server`        |

use serde::{Deserialize, Serialize};

use crate::driver::SessionOptions;
use crate::result::{ProbeError, ProbeResult};
use crate::server::{Endpoint, ServerConfig};
use crate::wait::WaitOptions;

/// Root URL of the application under test
pub const DEFAULT_BASE_URL: &str = "http://localhost:7659";

/// Path prefix of every list view
pub const DEFAULT_LIST_PATH: &str = "/lists";

/// Default timeout for navigation to settle (10 seconds)
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 10_000;

/// Configuration shared by every scenario of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root URL; navigating here redirects to a fresh list
    pub base_url: String,
    /// Path prefix identifying a list view
    pub list_path: String,
    /// Launch sessions headless
    pub headless: bool,
    /// Timeout and polling for item waits
    pub wait: WaitOptions,
    /// Timeout for the root redirect to land on a list
    pub navigation_timeout_ms: u64,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// How to start the application server, if the harness owns it
    pub server: Option<ServerConfig>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            list_path: DEFAULT_LIST_PATH.to_string(),
            headless: true,
            wait: WaitOptions::default(),
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            chromium_path: None,
            server: None,
        }
    }
}

impl HarnessConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] if a variable holds an unusable value.
    pub fn from_env() -> ProbeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] if a variable holds an unusable value.
    pub fn from_lookup<F>(lookup: F) -> ProbeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("LISTPROBE_BASE_URL") {
            config.base_url = url;
        }
        if let Some(raw) = lookup("LISTPROBE_HEADLESS") {
            config.headless = parse_bool(&raw).ok_or_else(|| {
                ProbeError::config(format!("LISTPROBE_HEADLESS must be a boolean, got '{raw}'"))
            })?;
        }
        if let Some(path) = lookup("CHROMIUM_PATH") {
            config.chromium_path = Some(path);
        }
        if let Some(cmd) = lookup("LISTPROBE_SERVER_CMD") {
            let mut parts = cmd.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| ProbeError::config("LISTPROBE_SERVER_CMD is empty"))?;
            let endpoint = Endpoint::from_base_url(&config.base_url)?;
            config.server = Some(
                ServerConfig::new(program)
                    .with_args(parts.map(str::to_string))
                    .with_endpoint(endpoint),
            );
        }

        Ok(config)
    }

    /// Parse a JSON config; missing fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Json`] if the document is malformed.
    pub fn from_json(json: &str) -> ProbeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set wait options
    #[must_use]
    pub const fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn with_navigation_timeout(mut self, timeout_ms: u64) -> Self {
        self.navigation_timeout_ms = timeout_ms;
        self
    }

    /// Set server configuration
    #[must_use]
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Root URL without a trailing slash
    #[must_use]
    pub fn root_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// URL prefix shared by all list views
    #[must_use]
    pub fn list_prefix(&self) -> String {
        format!("{}{}", self.root_url(), self.list_path)
    }

    /// Whether `url` denotes a list view
    #[must_use]
    pub fn is_list_url(&self, url: &str) -> bool {
        url.starts_with(&self.list_prefix())
    }

    /// Options for the wait that follows the root redirect
    #[must_use]
    pub const fn navigation_wait(&self) -> WaitOptions {
        self.wait.with_timeout(self.navigation_timeout_ms)
    }

    /// Session options for one named participant
    #[must_use]
    pub fn session_options(&self, label: &str) -> SessionOptions {
        SessionOptions::headless()
            .with_headless(self.headless)
            .with_label(label)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
