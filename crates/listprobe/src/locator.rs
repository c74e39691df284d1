//! Locator map: semantic roles bound to DOM selectors.
//!
//! Scenarios speak in [`Role`]s ("the add button", "an item row"); only
//! this module knows how each role is found in the document. The map is
//! declared once and never mutated after it is handed to a page.
//!
//! ```text
//!   Role::MessageBanner      ──► class  "message"
//!   Role::Header             ──► tag    "h1"
//!   Role::Input              ──► tag    "input"
//!   Role::AddButton          ──► xpath  //button[text()='Add']
//!   Role::ItemRow            ──► xpath  //div[@class='item']
//!   Role::ItemDeleteControl  ──► tag    "button"   (relative to a row)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::result::{ProbeError, ProbeResult};

/// Selector strategy and expression for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "expression", rename_all = "snake_case")]
pub enum Selector {
    /// Elements carrying a class name
    ClassName(String),
    /// Elements with a tag name
    TagName(String),
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// XPath expression
    XPath(String),
}

impl Selector {
    /// Create a class name selector
    #[must_use]
    pub fn class_name(name: impl Into<String>) -> Self {
        Self::ClassName(name.into())
    }

    /// Create a tag name selector
    #[must_use]
    pub fn tag_name(tag: impl Into<String>) -> Self {
        Self::TagName(tag.into())
    }

    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// Strategy name, as used in logs
    #[must_use]
    pub const fn strategy(&self) -> &'static str {
        match self {
            Self::ClassName(_) => "class",
            Self::TagName(_) => "tag",
            Self::Css(_) => "css",
            Self::XPath(_) => "xpath",
        }
    }

    /// Raw expression
    #[must_use]
    pub fn expression(&self) -> &str {
        match self {
            Self::ClassName(s) | Self::TagName(s) | Self::Css(s) | Self::XPath(s) => s,
        }
    }

    /// Equivalent CSS selector, if the strategy has one
    #[must_use]
    pub fn to_css(&self) -> Option<String> {
        match self {
            Self::ClassName(name) => Some(format!(".{name}")),
            Self::TagName(tag) | Self::Css(tag) => Some(tag.clone()),
            Self::XPath(_) => None,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy(), self.expression())
    }
}

/// Semantic role of an element on the list page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Status banner at the top of the page
    MessageBanner,
    /// Page heading
    Header,
    /// Text input for new items
    Input,
    /// Button that submits the input
    AddButton,
    /// One rendered item
    ItemRow,
    /// Delete button inside an item row
    ItemDeleteControl,
}

impl Role {
    /// Controls every list view must render, in check order
    pub const CONTROLS: [Self; 4] = [
        Self::MessageBanner,
        Self::Header,
        Self::Input,
        Self::AddButton,
    ];

    /// All roles
    pub const ALL: [Self; 6] = [
        Self::MessageBanner,
        Self::Header,
        Self::Input,
        Self::AddButton,
        Self::ItemRow,
        Self::ItemDeleteControl,
    ];

    /// Human readable name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MessageBanner => "message banner",
            Self::Header => "header",
            Self::Input => "input",
            Self::AddButton => "add button",
            Self::ItemRow => "item row",
            Self::ItemDeleteControl => "item delete control",
        }
    }

    /// Whether the selector is evaluated inside an item row
    #[must_use]
    pub const fn is_relative(&self) -> bool {
        matches!(self, Self::ItemDeleteControl)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only mapping from [`Role`] to [`Selector`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorMap {
    entries: BTreeMap<Role, Selector>,
}

impl Default for LocatorMap {
    fn default() -> Self {
        Self::standard()
    }
}

impl LocatorMap {
    /// The DOM contract of the todo application
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with(Role::MessageBanner, Selector::class_name("message"))
            .with(Role::Header, Selector::tag_name("h1"))
            .with(Role::Input, Selector::tag_name("input"))
            .with(Role::AddButton, Selector::xpath("//button[text()='Add']"))
            .with(Role::ItemRow, Selector::xpath("//div[@class='item']"))
            .with(Role::ItemDeleteControl, Selector::tag_name("button"))
    }

    /// A map with no bindings
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Bind a role, replacing any previous binding
    #[must_use]
    pub fn with(mut self, role: Role, selector: Selector) -> Self {
        let _ = self.entries.insert(role, selector);
        self
    }

    /// Look up a role
    #[must_use]
    pub fn get(&self, role: Role) -> Option<&Selector> {
        self.entries.get(&role)
    }

    /// Look up a role that must be bound
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] if the map has no entry for `role`.
    pub fn selector(&self, role: Role) -> ProbeResult<&Selector> {
        self.get(role)
            .ok_or_else(|| ProbeError::config(format!("no locator bound for {role}")))
    }

    /// Roles without a binding
    #[must_use]
    pub fn unbound(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| !self.entries.contains_key(role))
            .collect()
    }

    /// Iterate over bindings in role order
    pub fn iter(&self) -> impl Iterator<Item = (Role, &Selector)> {
        self.entries.iter().map(|(role, selector)| (*role, selector))
    }

    /// Number of bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no bindings
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod selector_tests {
        use super::*;

        #[test]
        fn test_to_css() {
            assert_eq!(Selector::class_name("message").to_css().unwrap(), ".message");
            assert_eq!(Selector::tag_name("h1").to_css().unwrap(), "h1");
            assert_eq!(Selector::css("div > b").to_css().unwrap(), "div > b");
            assert!(Selector::xpath("//div").to_css().is_none());
        }

        #[test]
        fn test_display() {
            let sel = Selector::xpath("//button[text()='Add']");
            assert_eq!(sel.to_string(), "xpath=//button[text()='Add']");
        }

        #[test]
        fn test_serde_shape() {
            let json = serde_json::to_value(Selector::class_name("message")).unwrap();
            assert_eq!(
                json,
                serde_json::json!({"strategy": "class_name", "expression": "message"})
            );
        }
    }

    mod role_tests {
        use super::*;

        #[test]
        fn test_controls_order() {
            assert_eq!(Role::CONTROLS[0], Role::MessageBanner);
            assert_eq!(Role::CONTROLS[3], Role::AddButton);
        }

        #[test]
        fn test_only_delete_control_is_relative() {
            let relative: Vec<_> = Role::ALL.into_iter().filter(Role::is_relative).collect();
            assert_eq!(relative, vec![Role::ItemDeleteControl]);
        }
    }

    mod locator_map_tests {
        use super::*;

        #[test]
        fn test_standard_binds_every_role() {
            let map = LocatorMap::standard();
            assert_eq!(map.len(), Role::ALL.len());
            assert!(map.unbound().is_empty());
        }

        #[test]
        fn test_standard_dom_contract() {
            let map = LocatorMap::standard();
            assert_eq!(
                map.get(Role::MessageBanner),
                Some(&Selector::class_name("message"))
            );
            assert_eq!(map.get(Role::Header), Some(&Selector::tag_name("h1")));
            assert_eq!(map.get(Role::Input), Some(&Selector::tag_name("input")));
            assert_eq!(
                map.get(Role::AddButton),
                Some(&Selector::xpath("//button[text()='Add']"))
            );
            assert_eq!(
                map.get(Role::ItemRow),
                Some(&Selector::xpath("//div[@class='item']"))
            );
            assert_eq!(
                map.get(Role::ItemDeleteControl),
                Some(&Selector::tag_name("button"))
            );
        }

        #[test]
        fn test_missing_binding_is_config_error() {
            let map = LocatorMap::empty().with(Role::Header, Selector::tag_name("h1"));
            assert!(map.selector(Role::Header).is_ok());
            let err = map.selector(Role::Input).unwrap_err();
            assert!(matches!(err, ProbeError::Config { .. }));
            assert_eq!(map.unbound().len(), 5);
        }

        #[test]
        fn test_with_replaces() {
            let map = LocatorMap::standard().with(Role::Header, Selector::tag_name("h2"));
            assert_eq!(map.get(Role::Header), Some(&Selector::tag_name("h2")));
            assert_eq!(map.len(), 6);
        }

        #[test]
        fn test_json_roundtrip_preserves_map() {
            let map = LocatorMap::standard();
            let json = serde_json::to_string(&map).unwrap();
            let back: LocatorMap = serde_json::from_str(&json).unwrap();
            assert_eq!(back, map);
        }
    }
}
