//! Page object for the todo list view.
//!
//! [`TodoPage`] binds one session to the list page. It keeps the locator
//! map, never element handles: every operation resolves its roles against
//! the live document, so a page object stays valid however often the
//! server re-renders the list.
//!
//! None of the mutating operations wait. The list only changes once the
//! server pushes the update back, so callers synchronize through
//! [`crate::wait::wait_until`].

use tracing::debug;

use crate::config::HarnessConfig;
use crate::driver::{ElementHandle, SessionDriver};
use crate::locator::{LocatorMap, Role, Selector};
use crate::result::{ProbeError, ProbeResult};
use crate::wait::wait_until;

/// Snapshot of one rendered item row
///
/// Only meaningful until the next DOM change; match on [`Item::text`],
/// never on position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Rendered text, trimmed
    pub text: String,
    /// The row element
    pub element: ElementHandle,
    /// Delete control inside the row, if rendered
    pub delete_control: Option<ElementHandle>,
}

/// One session bound to the todo list view
#[derive(Debug)]
pub struct TodoPage<'s, S: SessionDriver + ?Sized> {
    session: &'s S,
    locators: LocatorMap,
}

impl<'s, S: SessionDriver + ?Sized> TodoPage<'s, S> {
    /// Bind `session` to a list view using the standard locator map
    ///
    /// # Errors
    ///
    /// See [`TodoPage::with_locators`].
    pub async fn open(session: &'s S, config: &HarnessConfig) -> ProbeResult<Self> {
        Self::with_locators(session, config, LocatorMap::standard()).await
    }

    /// Bind `session` to a list view using `locators`
    ///
    /// A session already showing a list is left where it is. Any other
    /// session is sent to the root URL, which the application redirects to
    /// a fresh list. Controls that are absent from the page are not an
    /// error here; operations that need them fail later.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] if `locators` leaves a role unbound,
    /// [`ProbeError::Timeout`] if the redirect never lands on a list, or
    /// any driver error raised while navigating.
    pub async fn with_locators(
        session: &'s S,
        config: &HarnessConfig,
        locators: LocatorMap,
    ) -> ProbeResult<Self> {
        if let Some(role) = locators.unbound().first() {
            return Err(ProbeError::config(format!("no locator bound for {role}")));
        }

        let url = session.current_url().await?;
        if config.is_list_url(&url) {
            debug!(%url, "session already on a list view");
        } else {
            debug!(from = %url, to = config.root_url(), "navigating to application root");
            session.navigate(config.root_url()).await?;
            let landed = wait_until(&config.navigation_wait(), "redirect to a list view", move || {
                async move {
                    let url = session.current_url().await?;
                    Ok(config.is_list_url(&url).then_some(url))
                }
            })
            .await?;
            debug!(url = %landed, "landed on list view");
        }

        let page = Self { session, locators };
        let missing = page.missing_controls().await?;
        if !missing.is_empty() {
            debug!(?missing, "list view bound with controls absent");
        }
        Ok(page)
    }

    /// The bound session
    #[must_use]
    pub const fn session(&self) -> &'s S {
        self.session
    }

    /// Release the page, keeping the session borrow
    #[must_use]
    pub fn into_session(self) -> &'s S {
        self.session
    }

    /// Locators this page resolves roles with
    #[must_use]
    pub const fn locators(&self) -> &LocatorMap {
        &self.locators
    }

    /// URL of the list this page shows
    ///
    /// # Errors
    ///
    /// Returns the driver error if the URL cannot be read.
    pub async fn current_url(&self) -> ProbeResult<String> {
        self.session.current_url().await
    }

    /// Whether message banner, header, input and add button are all
    /// present and displayed
    ///
    /// Stops at the first control that is absent or hidden.
    ///
    /// # Errors
    ///
    /// Returns any driver error raised by the queries.
    pub async fn all_controls_visible(&self) -> ProbeResult<bool> {
        for role in Role::CONTROLS {
            let visible = match self.resolve(role).await? {
                Some(element) => self.session.is_displayed(&element).await?,
                None => false,
            };
            if !visible {
                debug!(%role, "control not visible");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Controls that match no element right now
    ///
    /// # Errors
    ///
    /// Returns any driver error raised by the queries.
    pub async fn missing_controls(&self) -> ProbeResult<Vec<Role>> {
        let mut missing = Vec::new();
        for role in Role::CONTROLS {
            if self.resolve(role).await?.is_none() {
                missing.push(role);
            }
        }
        Ok(missing)
    }

    /// Type `text` into the input and click the add button
    ///
    /// Returns as soon as the click is issued; the new row appears once the
    /// server pushes it back.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::MissingControl`] if the input or the add button
    /// is absent, or any driver error raised while typing or clicking.
    pub async fn add_item(&self, text: &str) -> ProbeResult<()> {
        let input = self.require(Role::Input).await?;
        let add = self.require(Role::AddButton).await?;
        self.session.type_text(&input, text).await?;
        self.session.click(&add).await?;
        debug!(text, "item submitted");
        Ok(())
    }

    /// Fresh snapshot of every rendered item row, in document order
    ///
    /// # Errors
    ///
    /// Returns any driver error raised by the queries, including
    /// [`ProbeError::StaleElement`] if a row vanishes mid-snapshot.
    pub async fn list_items(&self) -> ProbeResult<Vec<Item>> {
        let rows = self
            .session
            .find_elements(self.selector(Role::ItemRow)?)
            .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(self.project(row).await?);
        }
        Ok(items)
    }

    /// Texts of every rendered item row, in document order
    ///
    /// # Errors
    ///
    /// See [`TodoPage::list_items`].
    pub async fn item_texts(&self) -> ProbeResult<Vec<String>> {
        Ok(self
            .list_items()
            .await?
            .into_iter()
            .map(|item| item.text)
            .collect())
    }

    /// First row whose text contains `text`
    ///
    /// # Errors
    ///
    /// See [`TodoPage::list_items`].
    pub async fn find_item_containing(&self, text: &str) -> ProbeResult<Option<Item>> {
        Ok(self
            .list_items()
            .await?
            .into_iter()
            .find(|item| item.text.contains(text)))
    }

    /// Click the delete control of the first row whose text equals `text`
    ///
    /// Nothing happens when no row matches or the matching row renders no
    /// delete control. Does not wait for the row to disappear.
    ///
    /// # Errors
    ///
    /// Returns any driver error raised by the queries or the click.
    pub async fn delete_item_by_text(&self, text: &str) -> ProbeResult<()> {
        let target = self
            .list_items()
            .await?
            .into_iter()
            .find(|item| item.text == text);

        match target.and_then(|item| item.delete_control) {
            Some(control) => {
                self.session.click(&control).await?;
                debug!(text, "delete issued");
            }
            None => debug!(text, "no deletable row matches, nothing to delete"),
        }
        Ok(())
    }

    fn selector(&self, role: Role) -> ProbeResult<&Selector> {
        self.locators.selector(role)
    }

    async fn resolve(&self, role: Role) -> ProbeResult<Option<ElementHandle>> {
        self.session.find_first(self.selector(role)?).await
    }

    async fn require(&self, role: Role) -> ProbeResult<ElementHandle> {
        self.resolve(role)
            .await?
            .ok_or(ProbeError::MissingControl { role })
    }

    async fn project(&self, row: ElementHandle) -> ProbeResult<Item> {
        let text = self.session.text(&row).await?.trim().to_string();
        let delete_control = self
            .session
            .find_within(&row, self.selector(Role::ItemDeleteControl)?)
            .await?
            .into_iter()
            .next();
        Ok(Item {
            text,
            element: row,
            delete_control,
        })
    }
}
