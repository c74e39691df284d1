//! Session driver seam.
//!
//! [`SessionDriver`] is everything the page object needs from one browser
//! context; [`SessionProvider`] hands out fresh, isolated sessions.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  SessionProvider ──launch──► SessionDriver                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ChromiumProvider  (feature `browser`, CDP via chromiumoxide)│
//! │  MockListServer    (in-memory todo app, unit/integration)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::locator::Selector;
use crate::result::ProbeResult;

/// Opaque reference to one DOM node inside a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-assigned identifier
    pub id: String,
    /// Element tag name
    pub tag_name: String,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag_name: tag_name.into(),
        }
    }
}

/// Options for launching a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Run without a visible window
    pub headless: bool,
    /// Participant name, for logs
    pub label: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            label: "session".to_string(),
        }
    }
}

impl SessionOptions {
    /// Headless session options
    #[must_use]
    pub fn headless() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set participant label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// One browser automation context
///
/// All queries read the live document. Handles to nodes that have left the
/// document fail with [`crate::ProbeError::StaleElement`].
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Navigate to URL and wait for the load to settle
    async fn navigate(&self, url: &str) -> ProbeResult<()>;

    /// Get current URL
    async fn current_url(&self) -> ProbeResult<String>;

    /// Query all matching elements in document order
    async fn find_elements(&self, selector: &Selector) -> ProbeResult<Vec<ElementHandle>>;

    /// Query matching descendants of `parent`
    async fn find_within(
        &self,
        parent: &ElementHandle,
        selector: &Selector,
    ) -> ProbeResult<Vec<ElementHandle>>;

    /// Whether the element is rendered with a non-empty layout box
    async fn is_displayed(&self, element: &ElementHandle) -> ProbeResult<bool>;

    /// Rendered text of the element
    async fn text(&self, element: &ElementHandle) -> ProbeResult<String>;

    /// Click element
    async fn click(&self, element: &ElementHandle) -> ProbeResult<()>;

    /// Type text into element
    async fn type_text(&self, element: &ElementHandle, text: &str) -> ProbeResult<()>;

    /// Close the session and release its browser
    async fn close(&mut self) -> ProbeResult<()>;

    /// First matching element, if any
    async fn find_first(&self, selector: &Selector) -> ProbeResult<Option<ElementHandle>> {
        Ok(self.find_elements(selector).await?.into_iter().next())
    }
}

/// Factory for isolated sessions
///
/// Each call to [`SessionProvider::launch`] yields a session that shares no
/// profile, cookies or storage with any other.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Session type produced by this provider
    type Session: SessionDriver;

    /// Launch a fresh session
    async fn launch(&self, options: &SessionOptions) -> ProbeResult<Self::Session>;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod element_handle_tests {
        use super::*;

        #[test]
        fn test_element_handle_creation() {
            let elem = ElementHandle::new("add", "button");
            assert_eq!(elem.id, "add");
            assert_eq!(elem.tag_name, "button");
        }
    }

    mod session_options_tests {
        use super::*;

        #[test]
        fn test_default_is_headless() {
            let opts = SessionOptions::default();
            assert!(opts.headless);
            assert_eq!(opts, SessionOptions::headless());
        }

        #[test]
        fn test_builder() {
            let opts = SessionOptions::headless()
                .with_headless(false)
                .with_label("driver2");
            assert!(!opts.headless);
            assert_eq!(opts.label, "driver2");
        }
    }
}
