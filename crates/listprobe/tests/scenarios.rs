//! Scenario and page-object behavior against the in-memory application.

use listprobe::prelude::*;
use proptest::prelude::*;

fn fast_config() -> HarnessConfig {
    HarnessConfig::default()
        .with_wait(WaitOptions::new().with_timeout(1_000).with_poll_interval(5))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

// ===== Runner =====

#[tokio::test]
async fn full_suite_passes_and_releases_every_session() {
    let app = MockListServer::new();
    let runner = ScenarioRunner::new(app.clone(), fast_config());
    let suite = runner.run_all(&Scenario::ALL).await;

    assert!(suite.all_passed(), "failures: {:?}", suite.failures());
    assert_eq!(app.launched_sessions(), app.closed_sessions());
    for report in &suite.reports {
        assert_eq!(report.phase, ScenarioPhase::Asserted);
    }
}

#[tokio::test]
async fn slow_push_times_out_after_acting() {
    let app = MockListServer::new().with_push_delay_ms(5_000);
    let config = HarnessConfig::default()
        .with_wait(WaitOptions::new().with_timeout(100).with_poll_interval(10));
    let runner = ScenarioRunner::new(app.clone(), config);

    let report = runner.run(Scenario::EnterNewItem).await;
    assert!(!report.passed);
    assert_eq!(report.phase, ScenarioPhase::Aborted);
    assert_eq!(report.reached, ScenarioPhase::Acting);
    assert!(report.error.unwrap().contains("Timed out after 100ms"));
    assert_eq!(app.closed_sessions(), 1);
}

#[tokio::test]
async fn delete_missing_item_fails_when_an_add_drops_existing_rows() {
    let app = MockListServer::new().with_eviction_on_add();
    let runner = ScenarioRunner::new(app.clone(), fast_config());

    let report = runner.run(Scenario::DeleteMissingItem).await;
    assert!(!report.passed);
    assert_eq!(report.reached, ScenarioPhase::Settled);
    assert!(report.error.unwrap().contains("should hold exactly"));
    assert_eq!(app.launched_sessions(), app.closed_sessions());
}

#[tokio::test]
async fn page_renders_fails_without_banner_but_others_still_run() {
    let app = MockListServer::new().without_control(Role::MessageBanner);
    let runner = ScenarioRunner::new(app, fast_config());
    let suite = runner.run_all(&Scenario::ALL).await;

    assert_eq!(suite.failed_count(), 1);
    assert_eq!(suite.failures()[0].name, "page_renders");
}

// ===== Multi-session =====

#[tokio::test]
async fn three_sessions_on_one_list_converge() {
    let app = MockListServer::new();
    let config = fast_config();
    let sessions = [app.session(), app.session(), app.session()];

    let writer = TodoPage::open(&sessions[0], &config).await.unwrap();
    let url = writer.current_url().await.unwrap();
    let mut readers = Vec::new();
    for session in &sessions[1..] {
        session.navigate(&url).await.unwrap();
        readers.push(TodoPage::open(session, &config).await.unwrap());
    }

    writer.add_item("shared").await.unwrap();
    for reader in &readers {
        let item = wait_for_visible_item(reader, "shared", &config.wait)
            .await
            .unwrap();
        assert_eq!(item.text, "shared");
    }
    for session in &sessions[1..] {
        assert_eq!(session.navigation_count(), 1);
    }
}

#[tokio::test]
async fn separate_lists_do_not_leak() {
    let app = MockListServer::new().with_push_delay_ms(0);
    let config = fast_config();
    let (a, b) = (app.session(), app.session());
    let page_a = TodoPage::open(&a, &config).await.unwrap();
    let page_b = TodoPage::open(&b, &config).await.unwrap();
    assert_ne!(
        page_a.current_url().await.unwrap(),
        page_b.current_url().await.unwrap()
    );

    page_a.add_item("only in a").await.unwrap();
    let _ = wait_for_visible_item(&page_a, "only in a", &config.wait)
        .await
        .unwrap();
    assert!(page_b.list_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_from_one_session_disappears_in_another() {
    let app = MockListServer::new();
    let config = fast_config();
    let (a, b) = (app.session(), app.session());
    let page_a = TodoPage::open(&a, &config).await.unwrap();
    b.navigate(&page_a.current_url().await.unwrap()).await.unwrap();
    let page_b = TodoPage::open(&b, &config).await.unwrap();

    page_a.add_item("short lived").await.unwrap();
    let _ = wait_for_visible_item(&page_b, "short lived", &config.wait)
        .await
        .unwrap();
    page_b.delete_item_by_text("short lived").await.unwrap();
    let texts = wait_for_texts(&page_a, "row removed", &config.wait, <[String]>::is_empty)
        .await
        .unwrap();
    assert!(texts.is_empty());
}

// ===== Properties =====

fn item_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9,.'!?]([a-zA-Z0-9 ,.'!?]{0,38}[a-zA-Z0-9,.'!?])?"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any added text shows up as a visible row with exactly that text
    #[test]
    fn prop_added_item_appears(text in item_text()) {
        let rt = runtime();
        let found = rt.block_on(async {
            let app = MockListServer::new().with_push_delay_ms(1);
            let session = app.session();
            let config = fast_config();
            let page = TodoPage::open(&session, &config).await?;
            page.add_item(&text).await?;
            wait_for_visible_item(&page, &text, &config.wait).await
        });
        let item = found.unwrap();
        prop_assert_eq!(item.text, text);
    }

    /// Deleting one of several distinct items leaves exactly the others
    #[test]
    fn prop_delete_is_precise(
        texts in prop::collection::btree_set("[a-z]{3,10}", 2..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let texts: Vec<String> = texts.into_iter().collect();
        let victim = texts[pick.index(texts.len())].clone();
        let rt = runtime();
        let remaining = rt.block_on(async {
            let app = MockListServer::new().with_push_delay_ms(0);
            let session = app.session();
            let config = fast_config();
            let page = TodoPage::open(&session, &config).await?;
            for text in &texts {
                page.add_item(text).await?;
            }
            page.delete_item_by_text(&victim).await?;
            page.item_texts().await
        });
        let remaining = remaining.unwrap();
        let expected: Vec<String> = texts.iter().filter(|t| **t != victim).cloned().collect();
        prop_assert_eq!(remaining, expected);
    }
}
