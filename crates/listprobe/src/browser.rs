//! Chromium sessions over the Chrome DevTools Protocol.
//!
//! Every [`ChromiumSession`] is its own Chromium process with its own
//! temporary profile directory, so sessions share no cookies, storage or
//! cache. Element handles are ids into a per-session registry of live
//! `chromiumoxide` elements. The registry holds one entry per DOM node, so
//! polling the same rows reuses their ids; it is cleared on navigation.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::driver::{ElementHandle, SessionDriver, SessionOptions, SessionProvider};
use crate::locator::Selector;
use crate::result::{ProbeError, ProbeResult};

const IS_DISPLAYED_JS: &str = "function() {
    const rect = this.getBoundingClientRect();
    const style = window.getComputedStyle(this);
    return rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none';
}";

/// Whether a CDP error message means the node left the document
fn is_stale_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("detached")
        || message.contains("no node with given id")
        || message.contains("could not find node")
        || message.contains("cannot find context with specified id")
}

/// Whether a CDP error message is an XPath search that matched nothing
///
/// `find_xpaths` asks for results `0..count` and CDP rejects that range
/// when `count` is zero.
fn is_empty_result_message(message: &str) -> bool {
    message
        .to_ascii_lowercase()
        .contains("invalid search result range")
}

fn page_error(e: impl std::fmt::Display) -> ProbeError {
    ProbeError::PageError {
        message: e.to_string(),
    }
}

fn element_error(id: &str, e: impl std::fmt::Display) -> ProbeError {
    let message = e.to_string();
    if is_stale_message(&message) {
        ProbeError::StaleElement { id: id.to_string() }
    } else {
        ProbeError::PageError { message }
    }
}

// =============================================================================
// ELEMENT REGISTRY
// =============================================================================

/// Live elements by handle id, one entry per DOM node
#[derive(Debug)]
struct ElementRegistry<T> {
    by_id: HashMap<String, Arc<T>>,
    by_node: HashMap<i64, String>,
    next_id: u64,
}

impl<T> Default for ElementRegistry<T> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            by_node: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<T> ElementRegistry<T> {
    /// Id for the element backing `node`, reusing the id of a node seen before
    fn register(&mut self, node: i64, element: T) -> String {
        if let Some(id) = self.by_node.get(&node) {
            return id.clone();
        }
        self.next_id += 1;
        let id = format!("el-{}", self.next_id);
        let _ = self.by_id.insert(id.clone(), Arc::new(element));
        let _ = self.by_node.insert(node, id.clone());
        id
    }

    fn get(&self, id: &str) -> Option<Arc<T>> {
        self.by_id.get(id).cloned()
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.by_node.clear();
    }
}

// =============================================================================
// PROVIDER
// =============================================================================

/// Launches one Chromium process per session
#[derive(Debug, Clone)]
pub struct ChromiumProvider {
    chromium_path: Option<String>,
    sandbox: bool,
}

impl ChromiumProvider {
    /// Provider using the Chromium binary from `config`
    #[must_use]
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            chromium_path: config.chromium_path.clone(),
            sandbox: false,
        }
    }

    /// Keep the Chromium sandbox enabled
    #[must_use]
    pub const fn with_sandbox(mut self) -> Self {
        self.sandbox = true;
        self
    }
}

#[async_trait]
impl SessionProvider for ChromiumProvider {
    type Session = ChromiumSession;

    async fn launch(&self, options: &SessionOptions) -> ProbeResult<ChromiumSession> {
        let profile = TempDir::new()?;

        let mut builder = CdpConfig::builder().user_data_dir(profile.path());
        if !options.headless {
            builder = builder.with_head();
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = self.chromium_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder.build().map_err(|message| {
            if self.chromium_path.is_none() && message.contains("detect") {
                ProbeError::BrowserNotFound
            } else {
                ProbeError::BrowserLaunchError { message }
            }
        })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| ProbeError::BrowserLaunchError {
                    message: e.to_string(),
                })?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handle.abort();
                return Err(ProbeError::BrowserLaunchError {
                    message: e.to_string(),
                });
            }
        };

        info!(label = %options.label, headless = options.headless, "chromium session launched");
        Ok(ChromiumSession {
            label: options.label.clone(),
            browser,
            page,
            handler: handle,
            elements: Mutex::new(ElementRegistry::default()),
            closed: false,
            _profile: profile,
        })
    }
}

/// One Chromium process driving a single page
#[derive(Debug)]
pub struct ChromiumSession {
    label: String,
    browser: CdpBrowser,
    page: CdpPage,
    handler: JoinHandle<()>,
    elements: Mutex<ElementRegistry<Element>>,
    closed: bool,
    _profile: TempDir,
}

impl ChromiumSession {
    /// Participant label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    fn registry(&self) -> MutexGuard<'_, ElementRegistry<Element>> {
        self.elements.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, found: Vec<Element>, tag_name: &str) -> Vec<ElementHandle> {
        let mut registry = self.registry();
        let handles = found
            .into_iter()
            .map(|element| {
                let node = *element.backend_node_id.inner();
                ElementHandle::new(registry.register(node, element), tag_name)
            })
            .collect();
        debug!(label = %self.label, live = registry.len(), "elements registered");
        handles
    }

    fn element(&self, handle: &ElementHandle) -> ProbeResult<Arc<Element>> {
        self.registry()
            .get(&handle.id)
            .ok_or_else(|| ProbeError::StaleElement {
                id: handle.id.clone(),
            })
    }
}

/// Tag name a selector matches, when it names one
fn tag_hint(selector: &Selector) -> &str {
    match selector {
        Selector::TagName(tag) => tag,
        _ => "",
    }
}

#[async_trait]
impl SessionDriver for ChromiumSession {
    async fn navigate(&self, url: &str) -> ProbeResult<()> {
        debug!(label = %self.label, url, "navigate");
        self.registry().clear();
        let _ = self
            .page
            .goto(url)
            .await
            .map_err(|e| ProbeError::NavigationError {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> ProbeResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(page_error)?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn find_elements(&self, selector: &Selector) -> ProbeResult<Vec<ElementHandle>> {
        let found = match selector.to_css() {
            Some(css) => self.page.find_elements(css).await,
            None => self.page.find_xpaths(selector.expression()).await,
        };
        match found {
            Ok(found) => Ok(self.register(found, tag_hint(selector))),
            Err(e) if is_empty_result_message(&e.to_string()) => {
                debug!(%selector, "query matched nothing");
                Ok(Vec::new())
            }
            Err(e) => Err(page_error(e)),
        }
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        selector: &Selector,
    ) -> ProbeResult<Vec<ElementHandle>> {
        let css = selector.to_css().ok_or_else(|| ProbeError::PageError {
            message: format!("relative lookup needs a CSS-expressible selector, got {selector}"),
        })?;
        let element = self.element(parent)?;
        let found = element
            .find_elements(css)
            .await
            .map_err(|e| element_error(&parent.id, e))?;
        Ok(self.register(found, tag_hint(selector)))
    }

    async fn is_displayed(&self, element: &ElementHandle) -> ProbeResult<bool> {
        let node = self.element(element)?;
        let returns = node
            .call_js_fn(IS_DISPLAYED_JS, false)
            .await
            .map_err(|e| element_error(&element.id, e))?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn text(&self, element: &ElementHandle) -> ProbeResult<String> {
        let node = self.element(element)?;
        Ok(node
            .inner_text()
            .await
            .map_err(|e| element_error(&element.id, e))?
            .unwrap_or_default())
    }

    async fn click(&self, element: &ElementHandle) -> ProbeResult<()> {
        let node = self.element(element)?;
        let _ = node
            .click()
            .await
            .map_err(|e| element_error(&element.id, e))?;
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> ProbeResult<()> {
        let node = self.element(element)?;
        let _ = node
            .focus()
            .await
            .map_err(|e| element_error(&element.id, e))?;
        let _ = node
            .type_str(text)
            .await
            .map_err(|e| ProbeError::InputError {
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn close(&mut self) -> ProbeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.registry().clear();

        if let Err(e) = self.browser.close().await {
            warn!(label = %self.label, error = %e, "browser did not close cleanly");
        }
        let _ = self.browser.wait().await?;
        self.handler.abort();
        info!(label = %self.label, "chromium session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod error_mapping_tests {
        use super::*;

        #[test]
        fn test_detached_node_is_stale() {
            let err = element_error("el-3", "Node is detached from document");
            assert!(matches!(err, ProbeError::StaleElement { ref id } if id == "el-3"));
        }

        #[test]
        fn test_missing_node_is_stale() {
            assert!(is_stale_message("No node with given id found"));
            assert!(is_stale_message("Could not find node with given id"));
        }

        #[test]
        fn test_other_errors_are_page_errors() {
            let err = element_error("el-1", "Target closed");
            assert!(matches!(err, ProbeError::PageError { .. }));
        }

        #[test]
        fn test_only_empty_xpath_search_counts_as_no_match() {
            assert!(is_empty_result_message(
                "Error -32000: Invalid search result range"
            ));
            assert!(!is_empty_result_message("Target closed"));
            assert!(!is_empty_result_message("ChannelSendError: send failed"));
            assert!(!is_empty_result_message(
                "DOM Error while querying: SyntaxError: '>>' is not a valid selector"
            ));
        }
    }

    mod registry_tests {
        use super::*;

        #[test]
        fn test_refinding_a_node_reuses_its_id() {
            let mut registry = ElementRegistry::default();
            let first = registry.register(7, "row");
            let other = registry.register(8, "button");
            assert_ne!(first, other);

            for _ in 0..100 {
                assert_eq!(registry.register(7, "row again"), first);
            }
            assert_eq!(registry.len(), 2);
            assert_eq!(registry.get(&first).as_deref(), Some(&"row"));
        }

        #[test]
        fn test_clear_drops_every_entry() {
            let mut registry = ElementRegistry::default();
            let id = registry.register(1, ());
            registry.clear();
            assert_eq!(registry.len(), 0);
            assert!(registry.get(&id).is_none());
            assert_ne!(registry.register(1, ()), id);
        }
    }

    mod provider_tests {
        use super::*;

        #[test]
        fn test_provider_takes_chromium_path() {
            let config = HarnessConfig {
                chromium_path: Some("/usr/bin/chromium".into()),
                ..HarnessConfig::default()
            };
            let provider = ChromiumProvider::new(&config);
            assert_eq!(provider.chromium_path.as_deref(), Some("/usr/bin/chromium"));
            assert!(!provider.sandbox);
            assert!(provider.with_sandbox().sandbox);
        }

        #[test]
        fn test_tag_hint() {
            assert_eq!(tag_hint(&Selector::tag_name("button")), "button");
            assert_eq!(tag_hint(&Selector::xpath("//div")), "");
        }
    }
}
