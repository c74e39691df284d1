//! Acceptance scenarios for the todo list.
//!
//! Each [`Scenario`] is an independent procedure over freshly launched
//! sessions: it builds its own pages, drives them, waits for the pushed
//! result and asserts. Scenarios share nothing but the application server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::driver::SessionDriver;
use crate::page_object::{Item, TodoPage};
use crate::result::{ensure, ProbeError, ProbeResult};
use crate::wait::{wait_until, WaitOptions};

/// Item added by [`Scenario::EnterNewItem`]
pub const NEW_ITEM_TEXT: &str = "feel like an ocean, warmed by the sun";

/// Item shared between sessions by [`Scenario::MultipleUsers`]
pub const SHARED_ITEM_TEXT: &str = "bring me a great big flood";

/// Items added by [`Scenario::DeleteItems`]; the second one is deleted
///
/// [`Scenario::DeleteMissingItem`] keeps the first, deletes the second
/// without adding it, and adds the third after the delete.
pub const DELETE_ITEM_TEXTS: [&str; 3] = [
    "We'll be all right",
    "Stay here some time",
    "This country dog won't die in the city",
];

/// Progress of one scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    /// Sessions launched, nothing done yet
    Init,
    /// Every page is on the list view
    Navigated,
    /// Operations issued
    Acting,
    /// Awaited DOM state observed
    Settled,
    /// Assertions passed
    Asserted,
    /// Stopped by an error
    Aborted,
}

impl fmt::Display for ScenarioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Navigated => "navigated",
            Self::Acting => "acting",
            Self::Settled => "settled",
            Self::Asserted => "asserted",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

fn enter(phase: &mut ScenarioPhase, next: ScenarioPhase) {
    debug!(from = %phase, to = %next, "scenario phase");
    *phase = next;
}

/// The acceptance scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// A fresh list view renders every control
    PageRenders,
    /// An added item shows up in the list
    EnterNewItem,
    /// An item added in one session shows up in another on the same list
    MultipleUsers,
    /// Deleting one item leaves exactly the others
    DeleteItems,
    /// Deleting a text that matches nothing changes nothing
    DeleteMissingItem,
}

impl Scenario {
    /// Every scenario, in run order
    pub const ALL: [Self; 5] = [
        Self::PageRenders,
        Self::EnterNewItem,
        Self::MultipleUsers,
        Self::DeleteItems,
        Self::DeleteMissingItem,
    ];

    /// Stable scenario name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PageRenders => "page_renders",
            Self::EnterNewItem => "enter_new_item",
            Self::MultipleUsers => "multiple_users",
            Self::DeleteItems => "delete_items",
            Self::DeleteMissingItem => "delete_missing_item",
        }
    }

    /// Number of sessions the scenario drives
    #[must_use]
    pub const fn participants(&self) -> usize {
        match self {
            Self::MultipleUsers => 2,
            _ => 1,
        }
    }

    /// Run the scenario over `sessions`, recording progress in `phase`
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] if fewer sessions than
    /// [`Scenario::participants`] are supplied, otherwise the first wait
    /// timeout, assertion failure or driver error.
    pub async fn run<S: SessionDriver>(
        &self,
        sessions: &[S],
        config: &HarnessConfig,
        phase: &mut ScenarioPhase,
    ) -> ProbeResult<()> {
        if sessions.len() < self.participants() {
            return Err(ProbeError::config(format!(
                "{} needs {} sessions, got {}",
                self.name(),
                self.participants(),
                sessions.len()
            )));
        }

        match self {
            Self::PageRenders => page_renders(&sessions[0], config, phase).await,
            Self::EnterNewItem => enter_new_item(&sessions[0], config, phase).await,
            Self::MultipleUsers => multiple_users(&sessions[0], &sessions[1], config, phase).await,
            Self::DeleteItems => delete_items(&sessions[0], config, phase).await,
            Self::DeleteMissingItem => delete_missing_item(&sessions[0], config, phase).await,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s.trim())
            .ok_or_else(|| ProbeError::config(format!("unknown scenario '{s}'")))
    }
}

// =============================================================================
// WAITS
// =============================================================================

/// Wait for a displayed row whose text contains `text`
///
/// # Errors
///
/// Returns [`ProbeError::Timeout`] if no such row shows up in time.
pub async fn wait_for_visible_item<S: SessionDriver + ?Sized>(
    page: &TodoPage<'_, S>,
    text: &str,
    options: &WaitOptions,
) -> ProbeResult<Item> {
    let waited_for = format!("a visible row containing '{text}'");
    wait_until(options, &waited_for, move || async move {
        let Some(item) = page.find_item_containing(text).await? else {
            return Ok(None);
        };
        let shown = page.session().is_displayed(&item.element).await?;
        Ok(shown.then_some(item))
    })
    .await
}

/// Wait until the rendered texts satisfy `condition`
///
/// # Errors
///
/// Returns [`ProbeError::Timeout`] if the condition never holds.
pub async fn wait_for_texts<S, F>(
    page: &TodoPage<'_, S>,
    waited_for: &str,
    options: &WaitOptions,
    condition: F,
) -> ProbeResult<Vec<String>>
where
    S: SessionDriver + ?Sized,
    F: Fn(&[String]) -> bool,
{
    let condition = &condition;
    wait_until(options, waited_for, move || async move {
        let texts = page.item_texts().await?;
        Ok(condition(&texts).then_some(texts))
    })
    .await
}

// =============================================================================
// SCENARIOS
// =============================================================================

async fn page_renders<S: SessionDriver>(
    session: &S,
    config: &HarnessConfig,
    phase: &mut ScenarioPhase,
) -> ProbeResult<()> {
    let page = TodoPage::open(session, config).await?;
    enter(phase, ScenarioPhase::Navigated);
    enter(phase, ScenarioPhase::Settled);
    ensure(
        page.all_controls_visible().await?,
        "message banner, header, input and add button should all be visible",
    )?;
    enter(phase, ScenarioPhase::Asserted);
    Ok(())
}

async fn enter_new_item<S: SessionDriver>(
    session: &S,
    config: &HarnessConfig,
    phase: &mut ScenarioPhase,
) -> ProbeResult<()> {
    let page = TodoPage::open(session, config).await?;
    enter(phase, ScenarioPhase::Navigated);

    page.add_item(NEW_ITEM_TEXT).await?;
    enter(phase, ScenarioPhase::Acting);

    let item = wait_for_visible_item(&page, NEW_ITEM_TEXT, &config.wait).await?;
    enter(phase, ScenarioPhase::Settled);

    ensure(
        item.text.contains(NEW_ITEM_TEXT),
        format!("row text '{}' should contain '{NEW_ITEM_TEXT}'", item.text),
    )?;
    enter(phase, ScenarioPhase::Asserted);
    Ok(())
}

async fn multiple_users<S: SessionDriver>(
    first: &S,
    second: &S,
    config: &HarnessConfig,
    phase: &mut ScenarioPhase,
) -> ProbeResult<()> {
    let writer = TodoPage::open(first, config).await?;
    let url = writer.current_url().await?;
    second.navigate(&url).await?;
    let reader = TodoPage::open(second, config).await?;
    ensure(
        reader.current_url().await? == url,
        format!("second session should show {url}"),
    )?;
    enter(phase, ScenarioPhase::Navigated);

    writer.add_item(SHARED_ITEM_TEXT).await?;
    enter(phase, ScenarioPhase::Acting);

    let item = wait_for_visible_item(&reader, SHARED_ITEM_TEXT, &config.wait).await?;
    enter(phase, ScenarioPhase::Settled);

    debug!(text = %item.text, "item observed by second session");
    enter(phase, ScenarioPhase::Asserted);
    Ok(())
}

async fn delete_items<S: SessionDriver>(
    session: &S,
    config: &HarnessConfig,
    phase: &mut ScenarioPhase,
) -> ProbeResult<()> {
    let [first, second, third] = DELETE_ITEM_TEXTS;
    let page = TodoPage::open(session, config).await?;
    enter(phase, ScenarioPhase::Navigated);

    for text in DELETE_ITEM_TEXTS {
        page.add_item(text).await?;
    }
    enter(phase, ScenarioPhase::Acting);

    let _ = wait_for_texts(&page, "all three items rendered", &config.wait, |texts| {
        DELETE_ITEM_TEXTS
            .iter()
            .all(|wanted| texts.iter().any(|t| t == wanted))
    })
    .await?;

    page.delete_item_by_text(second).await?;
    let mut remaining = wait_for_texts(&page, "deleted item removed", &config.wait, |texts| {
        !texts.iter().any(|t| t == second)
    })
    .await?;
    enter(phase, ScenarioPhase::Settled);

    remaining.sort();
    let mut expected = vec![first.to_string(), third.to_string()];
    expected.sort();
    ensure(
        remaining == expected,
        format!("remaining items should be {expected:?}, got {remaining:?}"),
    )?;
    enter(phase, ScenarioPhase::Asserted);
    Ok(())
}

async fn delete_missing_item<S: SessionDriver>(
    session: &S,
    config: &HarnessConfig,
    phase: &mut ScenarioPhase,
) -> ProbeResult<()> {
    let [kept, missing, sentinel] = DELETE_ITEM_TEXTS;
    let page = TodoPage::open(session, config).await?;
    enter(phase, ScenarioPhase::Navigated);

    page.add_item(kept).await?;
    let _ = wait_for_visible_item(&page, kept, &config.wait).await?;
    page.delete_item_by_text(missing).await?;
    // Pushes to one list arrive in order: once the sentinel renders, any
    // change caused by the delete has rendered too.
    page.add_item(sentinel).await?;
    enter(phase, ScenarioPhase::Acting);

    let _ = wait_for_visible_item(&page, sentinel, &config.wait).await?;
    enter(phase, ScenarioPhase::Settled);

    let mut texts = page.item_texts().await?;
    texts.sort();
    let mut expected = vec![kept.to_string(), sentinel.to_string()];
    expected.sort();
    ensure(
        texts == expected,
        format!("list should hold exactly {expected:?}, got {texts:?}"),
    )?;
    enter(phase, ScenarioPhase::Asserted);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::Role;
    use crate::mock::MockListServer;

    fn config() -> HarnessConfig {
        HarnessConfig::default()
            .with_wait(WaitOptions::new().with_timeout(2_000).with_poll_interval(5))
    }

    mod metadata_tests {
        use super::*;

        #[test]
        fn test_participants() {
            assert_eq!(Scenario::MultipleUsers.participants(), 2);
            assert_eq!(Scenario::DeleteItems.participants(), 1);
        }

        #[test]
        fn test_from_str() {
            assert_eq!(
                "multiple_users".parse::<Scenario>().unwrap(),
                Scenario::MultipleUsers
            );
            assert!("nope".parse::<Scenario>().is_err());
            for scenario in Scenario::ALL {
                assert_eq!(scenario.to_string().parse::<Scenario>().unwrap(), scenario);
            }
        }

        #[test]
        fn test_phase_order() {
            assert!(ScenarioPhase::Init < ScenarioPhase::Navigated);
            assert!(ScenarioPhase::Settled < ScenarioPhase::Asserted);
        }
    }

    mod run_tests {
        use super::*;

        #[tokio::test]
        async fn test_every_scenario_passes_on_mock() {
            let server = MockListServer::new();
            for scenario in Scenario::ALL {
                let sessions: Vec<_> = (0..scenario.participants())
                    .map(|_| server.session())
                    .collect();
                let mut phase = ScenarioPhase::Init;
                scenario.run(&sessions, &config(), &mut phase).await.unwrap();
                assert_eq!(phase, ScenarioPhase::Asserted, "{scenario}");
            }
        }

        #[tokio::test]
        async fn test_too_few_sessions() {
            let server = MockListServer::new();
            let sessions = vec![server.session()];
            let mut phase = ScenarioPhase::Init;
            let err = Scenario::MultipleUsers
                .run(&sessions, &config(), &mut phase)
                .await
                .unwrap_err();
            assert!(matches!(err, ProbeError::Config { .. }));
            assert_eq!(phase, ScenarioPhase::Init);
        }

        #[tokio::test]
        async fn test_multiple_users_second_session_not_redirected() {
            let server = MockListServer::new();
            let sessions = vec![server.session(), server.session()];
            let mut phase = ScenarioPhase::Init;
            Scenario::MultipleUsers
                .run(&sessions, &config(), &mut phase)
                .await
                .unwrap();
            assert_eq!(sessions[1].navigation_count(), 1);
            assert_eq!(
                sessions[0].current_url().await.unwrap(),
                sessions[1].current_url().await.unwrap()
            );
        }

        #[tokio::test]
        async fn test_hidden_control_fails_assertion() {
            let server = MockListServer::new().with_hidden_control(Role::Header);
            let sessions = vec![server.session()];
            let mut phase = ScenarioPhase::Init;
            let err = Scenario::PageRenders
                .run(&sessions, &config(), &mut phase)
                .await
                .unwrap_err();
            assert!(matches!(err, ProbeError::AssertionFailed { .. }));
            assert_eq!(phase, ScenarioPhase::Settled);
        }

        #[tokio::test]
        async fn test_delete_missing_item_leaves_exactly_kept_and_sentinel() {
            let server = MockListServer::new();
            let sessions = vec![server.session()];
            let mut phase = ScenarioPhase::Init;
            Scenario::DeleteMissingItem
                .run(&sessions, &config(), &mut phase)
                .await
                .unwrap();

            let list = server
                .list_id(&sessions[0].current_url().await.unwrap())
                .unwrap();
            let [kept, _, sentinel] = DELETE_ITEM_TEXTS;
            assert_eq!(server.items(&list), vec![kept, sentinel]);
            assert!(!sessions[0].was_called("click delete"));
        }

        #[tokio::test]
        async fn test_delete_missing_item_catches_late_collateral_removal() {
            // The stray removal only lands after the push delay
            let server = MockListServer::new()
                .with_push_delay_ms(30)
                .with_eviction_on_add();
            let sessions = vec![server.session()];
            let mut phase = ScenarioPhase::Init;
            let err = Scenario::DeleteMissingItem
                .run(&sessions, &config(), &mut phase)
                .await
                .unwrap_err();
            assert!(matches!(err, ProbeError::AssertionFailed { .. }), "{err}");
            assert_eq!(phase, ScenarioPhase::Settled);
        }

        #[tokio::test]
        async fn test_missing_add_button_aborts_while_navigated() {
            let server = MockListServer::new().without_control(Role::AddButton);
            let sessions = vec![server.session()];
            let mut phase = ScenarioPhase::Init;
            let err = Scenario::EnterNewItem
                .run(&sessions, &config(), &mut phase)
                .await
                .unwrap_err();
            assert!(matches!(err, ProbeError::MissingControl { .. }));
            assert_eq!(phase, ScenarioPhase::Navigated);
        }
    }
}
