//! In-memory todo application for testing without a browser.
//!
//! [`MockListServer`] plays the server: it owns every list and applies
//! changes after a configurable push delay, the way the real application
//! only re-renders once its update round-trips. Each [`MockDriver`] it
//! hands out plays one isolated browser session rendering the standard
//! DOM contract:
//!
//! ```text
//! <div class="message">  <h1>  <input>  <button>Add</button>
//! <div class="item">text <button/></div>   (one per rendered item)
//! ```
//!
//! Only the selectors of [`LocatorMap::standard`] match anything.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{DEFAULT_BASE_URL, DEFAULT_LIST_PATH};
use crate::driver::{ElementHandle, SessionDriver, SessionOptions, SessionProvider};
use crate::locator::{LocatorMap, Role, Selector};
use crate::result::{ProbeError, ProbeResult};

/// Default delay between a mutation and its push to every session (20ms)
pub const DEFAULT_PUSH_DELAY_MS: u64 = 20;

const MESSAGE_TEXT: &str = "Edit this list by typing below";
const HEADER_TEXT: &str = "Todo List";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// ITEMS
// =============================================================================

/// How a seeded item renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemOptions {
    /// Row renders a delete button
    pub delete_control: bool,
    /// Row has a visible layout box
    pub displayed: bool,
}

impl Default for ItemOptions {
    fn default() -> Self {
        Self {
            delete_control: true,
            displayed: true,
        }
    }
}

impl ItemOptions {
    /// Row without a delete button
    #[must_use]
    pub const fn without_delete_control(mut self) -> Self {
        self.delete_control = false;
        self
    }

    /// Row present in the DOM but not displayed
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }
}

#[derive(Debug, Clone)]
struct MockItem {
    id: u64,
    text: String,
    options: ItemOptions,
    visible_at: Instant,
    removed_at: Option<Instant>,
}

impl MockItem {
    fn rendered(&self, now: Instant) -> bool {
        self.visible_at <= now && self.removed_at.map_or(true, |at| at > now)
    }
}

// =============================================================================
// SERVER
// =============================================================================

#[derive(Debug)]
struct AppState {
    base_url: String,
    push_delay: Duration,
    absent: BTreeSet<Role>,
    hidden: BTreeSet<Role>,
    lists: HashMap<String, Vec<MockItem>>,
    next_list: u64,
    next_item: u64,
    launch_limit: Option<usize>,
    launched: usize,
    closed: usize,
    redirect: bool,
    evict_on_add: bool,
}

impl AppState {
    fn list_prefix(&self) -> String {
        format!("{}{DEFAULT_LIST_PATH}/", self.base_url)
    }

    fn list_id(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.list_prefix())
            .map(|rest| rest.trim_end_matches('/').to_string())
            .filter(|id| !id.is_empty())
    }

    fn new_list(&mut self) -> String {
        self.next_list += 1;
        let id = format!("{:08x}", self.next_list.wrapping_mul(0x9e37_79b9));
        let _ = self.lists.insert(id.clone(), Vec::new());
        id
    }

    fn push_item(&mut self, list: &str, text: &str, options: ItemOptions, visible_at: Instant) {
        self.next_item += 1;
        let item = MockItem {
            id: self.next_item,
            text: text.to_string(),
            options,
            visible_at,
            removed_at: None,
        };
        self.lists.entry(list.to_string()).or_default().push(item);
    }

    /// Schedule removal of the oldest item still rendered in `list`
    fn evict_oldest(&mut self, list: &str, due: Instant) {
        let now = Instant::now();
        let oldest = self
            .lists
            .get_mut(list)
            .and_then(|items| {
                items
                    .iter_mut()
                    .find(|item| item.rendered(now) && item.removed_at.is_none())
            });
        if let Some(item) = oldest {
            item.removed_at = Some(due);
        }
    }

    fn item(&self, id: u64) -> Option<&MockItem> {
        self.lists.values().flatten().find(|item| item.id == id)
    }

    fn item_mut(&mut self, id: u64) -> Option<&mut MockItem> {
        self.lists.values_mut().flatten().find(|item| item.id == id)
    }

    fn rendered_item(&self, id: u64, handle: &ElementHandle) -> ProbeResult<&MockItem> {
        self.item(id)
            .filter(|item| item.rendered(Instant::now()))
            .ok_or_else(|| ProbeError::StaleElement {
                id: handle.id.clone(),
            })
    }
}

/// In-memory stand-in for the todo application server
///
/// Cloning yields another handle onto the same application.
#[derive(Debug, Clone)]
pub struct MockListServer {
    state: Arc<Mutex<AppState>>,
}

impl Default for MockListServer {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(AppState {
                base_url: DEFAULT_BASE_URL.to_string(),
                push_delay: Duration::from_millis(DEFAULT_PUSH_DELAY_MS),
                absent: BTreeSet::new(),
                hidden: BTreeSet::new(),
                lists: HashMap::new(),
                next_list: 0,
                next_item: 0,
                launch_limit: None,
                launched: 0,
                closed: 0,
                redirect: true,
                evict_on_add: false,
            })),
        }
    }
}

impl MockListServer {
    /// Create an application with the default endpoint and push delay
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve under a different root URL
    #[must_use]
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        lock(&self.state).base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the delay before mutations reach the sessions
    #[must_use]
    pub fn with_push_delay_ms(self, delay_ms: u64) -> Self {
        lock(&self.state).push_delay = Duration::from_millis(delay_ms);
        self
    }

    /// Render the page without `role`
    #[must_use]
    pub fn without_control(self, role: Role) -> Self {
        let _ = lock(&self.state).absent.insert(role);
        self
    }

    /// Render `role` with no layout box
    #[must_use]
    pub fn with_hidden_control(self, role: Role) -> Self {
        let _ = lock(&self.state).hidden.insert(role);
        self
    }

    /// Fail every launch after the first `limit`
    #[must_use]
    pub fn with_launch_limit(self, limit: usize) -> Self {
        lock(&self.state).launch_limit = Some(limit);
        self
    }

    /// Leave sessions on the root URL instead of redirecting to a new list
    #[must_use]
    pub fn without_redirect(self) -> Self {
        lock(&self.state).redirect = false;
        self
    }

    /// Misbehave: every add also drops the oldest rendered item
    ///
    /// The drop is pushed together with the new item.
    #[must_use]
    pub fn with_eviction_on_add(self) -> Self {
        lock(&self.state).evict_on_add = true;
        self
    }

    /// Root URL
    #[must_use]
    pub fn base_url(&self) -> String {
        lock(&self.state).base_url.clone()
    }

    /// A fresh session with no history, showing a blank page
    #[must_use]
    pub fn session(&self) -> MockDriver {
        MockDriver::new(Arc::clone(&self.state), "session")
    }

    /// List id of a list URL
    #[must_use]
    pub fn list_id(&self, url: &str) -> Option<String> {
        lock(&self.state).list_id(url)
    }

    /// Add an item that is rendered immediately
    pub fn seed(&self, list: &str, text: &str, options: ItemOptions) {
        lock(&self.state).push_item(list, text, options, Instant::now());
    }

    /// Texts currently rendered in `list`
    #[must_use]
    pub fn items(&self, list: &str) -> Vec<String> {
        let now = Instant::now();
        lock(&self.state)
            .lists
            .get(list)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.rendered(now))
                    .map(|item| item.text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sessions launched through [`SessionProvider::launch`]
    #[must_use]
    pub fn launched_sessions(&self) -> usize {
        lock(&self.state).launched
    }

    /// Sessions closed so far
    #[must_use]
    pub fn closed_sessions(&self) -> usize {
        lock(&self.state).closed
    }
}

#[async_trait]
impl SessionProvider for MockListServer {
    type Session = MockDriver;

    async fn launch(&self, options: &SessionOptions) -> ProbeResult<MockDriver> {
        let mut state = lock(&self.state);
        if state.launch_limit.is_some_and(|limit| state.launched >= limit) {
            return Err(ProbeError::BrowserLaunchError {
                message: format!("launch limit reached for {}", options.label),
            });
        }
        state.launched += 1;
        drop(state);
        Ok(MockDriver::new(Arc::clone(&self.state), &options.label))
    }
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Debug)]
struct SessionState {
    url: String,
    input: String,
    call_history: Vec<String>,
    navigations: usize,
    closed: bool,
}

/// One simulated browser session
#[derive(Debug)]
pub struct MockDriver {
    app: Arc<Mutex<AppState>>,
    label: String,
    session: Mutex<SessionState>,
}

/// What a mock element handle id refers to
enum Node {
    Control(Role),
    Row(u64),
    Delete(u64),
}

impl Node {
    fn parse(handle: &ElementHandle) -> Option<Self> {
        let control = match handle.id.as_str() {
            "message" => Some(Role::MessageBanner),
            "header" => Some(Role::Header),
            "input" => Some(Role::Input),
            "add" => Some(Role::AddButton),
            _ => None,
        };
        if let Some(role) = control {
            return Some(Self::Control(role));
        }
        let (kind, id) = handle.id.split_once(':')?;
        let id = id.parse().ok()?;
        match kind {
            "item" => Some(Self::Row(id)),
            "delete" => Some(Self::Delete(id)),
            _ => None,
        }
    }
}

fn control_handle(role: Role) -> ElementHandle {
    match role {
        Role::MessageBanner => ElementHandle::new("message", "div"),
        Role::Header => ElementHandle::new("header", "h1"),
        Role::Input => ElementHandle::new("input", "input"),
        Role::AddButton => ElementHandle::new("add", "button"),
        Role::ItemRow | Role::ItemDeleteControl => ElementHandle::new("unknown", "div"),
    }
}

fn row_handle(id: u64) -> ElementHandle {
    ElementHandle::new(format!("item:{id}"), "div")
}

fn delete_handle(id: u64) -> ElementHandle {
    ElementHandle::new(format!("delete:{id}"), "button")
}

impl MockDriver {
    fn new(app: Arc<Mutex<AppState>>, label: &str) -> Self {
        Self {
            app,
            label: label.to_string(),
            session: Mutex::new(SessionState {
                url: "about:blank".to_string(),
                input: String::new(),
                call_history: Vec::new(),
                navigations: 0,
                closed: false,
            }),
        }
    }

    /// Participant label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Calls made on this session, oldest first
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        lock(&self.session).call_history.clone()
    }

    /// Check if a call starting with `method` was made
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        lock(&self.session)
            .call_history
            .iter()
            .any(|c| c.starts_with(method))
    }

    /// Number of navigations issued
    #[must_use]
    pub fn navigation_count(&self) -> usize {
        lock(&self.session).navigations
    }

    /// Whether [`SessionDriver::close`] was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.session).closed
    }

    fn record(&self, call: String) -> ProbeResult<String> {
        let mut session = lock(&self.session);
        if session.closed {
            return Err(ProbeError::PageError {
                message: format!("session {} is closed", self.label),
            });
        }
        session.call_history.push(call);
        Ok(session.url.clone())
    }

    fn land(&self, url: String) {
        let mut session = lock(&self.session);
        session.navigations += 1;
        session.url = url;
        session.input.clear();
    }

    /// Elements of the rendered page matching `selector`
    fn query(&self, url: &str, selector: &Selector) -> Vec<ElementHandle> {
        let app = lock(&self.app);
        let Some(list) = app.list_id(url) else {
            return Vec::new();
        };
        let standard = LocatorMap::standard();
        let role = Role::ALL
            .into_iter()
            .find(|role| standard.get(*role) == Some(selector));

        let now = Instant::now();
        let rendered: Vec<&MockItem> = app
            .lists
            .get(&list)
            .map(|items| items.iter().filter(|item| item.rendered(now)).collect())
            .unwrap_or_default();

        match role {
            Some(Role::ItemRow) => rendered.iter().map(|item| row_handle(item.id)).collect(),
            // tag=button at document level: the add button, then every row's delete button
            Some(Role::ItemDeleteControl) => {
                let mut buttons = Vec::new();
                if !app.absent.contains(&Role::AddButton) {
                    buttons.push(control_handle(Role::AddButton));
                }
                buttons.extend(
                    rendered
                        .iter()
                        .filter(|item| item.options.delete_control)
                        .map(|item| delete_handle(item.id)),
                );
                buttons
            }
            Some(control) if !app.absent.contains(&control) => vec![control_handle(control)],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl SessionDriver for MockDriver {
    async fn navigate(&self, url: &str) -> ProbeResult<()> {
        let _ = self.record(format!("navigate:{url}"))?;
        let mut app = lock(&self.app);
        let root = url.trim_end_matches('/') == app.base_url;
        let target = if root && !app.redirect {
            app.base_url.clone()
        } else if root {
            let id = app.new_list();
            format!("{}{id}", app.list_prefix())
        } else if let Some(id) = app.list_id(url) {
            let _ = app.lists.entry(id).or_default();
            url.to_string()
        } else if url == "about:blank" {
            url.to_string()
        } else {
            return Err(ProbeError::NavigationError {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        };
        drop(app);
        self.land(target);
        Ok(())
    }

    async fn current_url(&self) -> ProbeResult<String> {
        Ok(lock(&self.session).url.clone())
    }

    async fn find_elements(&self, selector: &Selector) -> ProbeResult<Vec<ElementHandle>> {
        let url = self.record(format!("find {selector}"))?;
        Ok(self.query(&url, selector))
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        selector: &Selector,
    ) -> ProbeResult<Vec<ElementHandle>> {
        let _ = self.record(format!("find {selector} in {}", parent.id))?;
        let Some(Node::Row(id)) = Node::parse(parent) else {
            return Ok(Vec::new());
        };
        let app = lock(&self.app);
        let item = app.rendered_item(id, parent)?;
        let delete_selector = LocatorMap::standard()
            .get(Role::ItemDeleteControl)
            .cloned();
        if item.options.delete_control && delete_selector.as_ref() == Some(selector) {
            Ok(vec![delete_handle(id)])
        } else {
            Ok(Vec::new())
        }
    }

    async fn is_displayed(&self, element: &ElementHandle) -> ProbeResult<bool> {
        let _ = self.record(format!("is_displayed {}", element.id))?;
        let app = lock(&self.app);
        match Node::parse(element) {
            Some(Node::Control(role)) => Ok(!app.hidden.contains(&role)),
            Some(Node::Row(id)) => Ok(app.rendered_item(id, element)?.options.displayed),
            Some(Node::Delete(id)) => Ok(app.rendered_item(id, element)?.options.displayed),
            None => Err(ProbeError::StaleElement {
                id: element.id.clone(),
            }),
        }
    }

    async fn text(&self, element: &ElementHandle) -> ProbeResult<String> {
        let _ = self.record(format!("text {}", element.id))?;
        let app = lock(&self.app);
        match Node::parse(element) {
            Some(Node::Control(Role::MessageBanner)) => Ok(MESSAGE_TEXT.to_string()),
            Some(Node::Control(Role::Header)) => Ok(HEADER_TEXT.to_string()),
            Some(Node::Control(Role::AddButton)) => Ok("Add".to_string()),
            Some(Node::Control(_) | Node::Delete(_)) => Ok(String::new()),
            Some(Node::Row(id)) => Ok(app.rendered_item(id, element)?.text.clone()),
            None => Err(ProbeError::StaleElement {
                id: element.id.clone(),
            }),
        }
    }

    async fn click(&self, element: &ElementHandle) -> ProbeResult<()> {
        let url = self.record(format!("click {}", element.id))?;
        let mut app = lock(&self.app);
        let due = Instant::now() + app.push_delay;
        match Node::parse(element) {
            Some(Node::Control(Role::AddButton)) => {
                let text = std::mem::take(&mut lock(&self.session).input);
                if let (Some(list), false) = (app.list_id(&url), text.is_empty()) {
                    if app.evict_on_add {
                        app.evict_oldest(&list, due);
                    }
                    app.push_item(&list, &text, ItemOptions::default(), due);
                }
                Ok(())
            }
            Some(Node::Delete(id)) => {
                let _ = app.rendered_item(id, element)?;
                if let Some(item) = app.item_mut(id) {
                    item.removed_at = Some(due);
                }
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(ProbeError::StaleElement {
                id: element.id.clone(),
            }),
        }
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> ProbeResult<()> {
        let _ = self.record(format!("type {} {text:?}", element.id))?;
        match Node::parse(element) {
            Some(Node::Control(Role::Input)) => {
                lock(&self.session).input.push_str(text);
                Ok(())
            }
            _ => Err(ProbeError::InputError {
                message: format!("element {} does not accept text", element.id),
            }),
        }
    }

    async fn close(&mut self) -> ProbeResult<()> {
        let mut session = lock(&self.session);
        if !session.closed {
            session.closed = true;
            session.call_history.push("close".to_string());
            lock(&self.app).closed += 1;
        }
        Ok(())
    }
}
