//! Result and error types for listprobe.

use thiserror::Error;

use crate::locator::Role;

/// Result type for listprobe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur while driving the application under test
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Browser executable not found
    #[error("Browser not found. Install Chromium or set CHROMIUM_PATH")]
    BrowserNotFound,

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunchError {
        /// Error message
        message: String,
    },

    /// The server endpoint is already bound by another process
    #[error("Endpoint {endpoint} is already in use")]
    PortInUse {
        /// `host:port` that could not be claimed
        endpoint: String,
    },

    /// Server failed to come up
    #[error("Server failed to start: {message}")]
    ServerStartup {
        /// Error message
        message: String,
    },

    /// Page error
    #[error("Page error: {message}")]
    PageError {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    NavigationError {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Input simulation error
    #[error("Input simulation failed: {message}")]
    InputError {
        /// Error message
        message: String,
    },

    /// Element handle no longer refers to a node in the document
    #[error("Stale element: {id}")]
    StaleElement {
        /// Element handle id
        id: String,
    },

    /// A control the operation cannot do without is absent from the page
    #[error("Required control missing: {role}")]
    MissingControl {
        /// Role that resolved to no element
        role: Role,
    },

    /// A synchronized wait did not settle in time
    #[error("Timed out after {ms}ms waiting for {waited_for}")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
        /// Description of the awaited condition
        waited_for: String,
    },

    /// Assertion failed
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbeError {
    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the error reflects DOM churn that a later poll may not see
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StaleElement { .. })
    }

    /// Whether the error is a wait timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Fail with [`ProbeError::AssertionFailed`] unless `condition` holds
///
/// # Errors
///
/// Returns the assertion error carrying `message` when `condition` is false.
pub fn ensure(condition: bool, message: impl Into<String>) -> ProbeResult<()> {
    if condition {
        Ok(())
    } else {
        Err(ProbeError::assertion(message))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_element_is_transient() {
        let err = ProbeError::StaleElement { id: "item:3".into() };
        assert!(err.is_transient());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_is_not_transient() {
        let err = ProbeError::Timeout {
            ms: 5000,
            waited_for: "row".into(),
        };
        assert!(err.is_timeout());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Timed out after 5000ms waiting for row");
    }

    #[test]
    fn test_missing_control_message() {
        let err = ProbeError::MissingControl {
            role: Role::AddButton,
        };
        assert_eq!(err.to_string(), "Required control missing: add button");
    }

    #[test]
    fn test_ensure() {
        assert!(ensure(true, "never").is_ok());
        let err = ensure(false, "row missing").unwrap_err();
        assert!(matches!(
            err,
            ProbeError::AssertionFailed { ref message } if message == "row missing"
        ));
    }

    #[test]
    fn test_io_from() {
        let err: ProbeError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(err.to_string().contains("boom"));
    }
}
