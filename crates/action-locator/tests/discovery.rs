use std::sync::Arc;
use std::time::Duration;

use action_locator::{DiscoveryEngine, LocatorError, ProbeVerdict, ScopeResolver};
use healkit_core_types::{ActionKind, Intent, StabilityClass, StrategyId};
use page_port::{FixtureNode, FixturePage};

const IDLE: Duration = Duration::from_millis(200);

fn login_page() -> Arc<FixturePage> {
    let page = Arc::new(FixturePage::new("https://example.com/login"));
    let form = page.add(None, FixtureNode::new("form"));
    page.add(
        Some(&form),
        FixtureNode::new("label").attr("for", "u").text("Username"),
    );
    page.add(Some(&form), FixtureNode::new("input").attr("id", "u"));
    page
}

#[tokio::test]
async fn label_linkage_wins_at_tier_one() {
    let page = login_page();
    let discovery = DiscoveryEngine::new(page.clone());
    let outcome = discovery
        .discover(&Intent::new("Username", ActionKind::Fill), None, IDLE)
        .await
        .unwrap();

    let probe = outcome.matched.as_ref().expect("username should resolve");
    assert_eq!(probe.strategy, StrategyId::SemanticLabel);
    assert_eq!(probe.confidence, 0.92);
    assert_eq!(probe.stability, StabilityClass::Stable);
    assert_eq!(probe.node.description, "input#u");
    assert_eq!(outcome.tried(), vec![StrategyId::SemanticLabel]);
    assert_eq!(discovery.passes(), 1);
}

#[tokio::test]
async fn falls_through_to_placeholder() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(None, FixtureNode::new("input").attr("placeholder", "Email"));
    let discovery = DiscoveryEngine::new(page.clone());
    let outcome = discovery
        .discover(&Intent::new("Email", ActionKind::Fill), None, IDLE)
        .await
        .unwrap();

    let probe = outcome.matched.unwrap();
    assert_eq!(probe.strategy, StrategyId::Placeholder);
    assert_eq!(probe.confidence, 0.88);
    assert_eq!(outcome.trials[0].verdict, ProbeVerdict::NoMatch);
    assert_eq!(outcome.trials[1].verdict, ProbeVerdict::Matched);
}

fn twin_search_boxes() -> Arc<FixturePage> {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(None, FixtureNode::new("input").attr("placeholder", "Search"));
    page.add(
        None,
        FixtureNode::new("input")
            .attr("placeholder", "Search")
            .attr("data-testid", "search"),
    );
    page
}

#[tokio::test]
async fn ambiguous_strategy_is_skipped_not_arbitrated() {
    let page = twin_search_boxes();
    let discovery = DiscoveryEngine::new(page.clone());
    let outcome = discovery
        .discover(&Intent::new("Search", ActionKind::Fill), None, IDLE)
        .await
        .unwrap();

    let placeholder = outcome
        .trials
        .iter()
        .find(|t| t.strategy == StrategyId::Placeholder)
        .unwrap();
    assert_eq!(placeholder.verdict, ProbeVerdict::Ambiguous(2));
    let probe = outcome.matched.unwrap();
    assert_eq!(probe.strategy, StrategyId::TestId);
    assert_eq!(probe.node.node_id, 2);
}

#[tokio::test]
async fn ordinal_picks_among_equal_candidates() {
    let page = twin_search_boxes();
    let discovery = DiscoveryEngine::new(page.clone());
    let outcome = discovery
        .discover(
            &Intent::new("Search", ActionKind::Fill).with_ordinal(2),
            None,
            IDLE,
        )
        .await
        .unwrap();

    let probe = outcome.matched.unwrap();
    assert_eq!(probe.strategy, StrategyId::Placeholder);
    assert_eq!(probe.node.node_id, 2);
    assert_eq!(probe.locator.ordinal, Some(2));
}

#[tokio::test]
async fn action_incompatible_candidates_are_skipped() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(
        None,
        FixtureNode::new("input")
            .attr("type", "checkbox")
            .attr("aria-label", "Newsletter"),
    );
    let text = page.add(None, FixtureNode::new("input").attr("placeholder", "Newsletter"));
    let discovery = DiscoveryEngine::new(page.clone());
    let outcome = discovery
        .discover(&Intent::new("Newsletter", ActionKind::Fill), None, IDLE)
        .await
        .unwrap();

    assert_eq!(outcome.trials[0].verdict, ProbeVerdict::NoMatch);
    let probe = outcome.matched.unwrap();
    assert_eq!(probe.strategy, StrategyId::Placeholder);
    assert_eq!(probe.node, text);
}

#[tokio::test]
async fn volatile_tiers_report_volatile() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(None, FixtureNode::new("span").text("Continue"));
    let discovery = DiscoveryEngine::new(page.clone());
    let outcome = discovery
        .discover(&Intent::new("Continue", ActionKind::Click), None, IDLE)
        .await
        .unwrap();

    let probe = outcome.matched.unwrap();
    assert_eq!(probe.strategy, StrategyId::VisibleText);
    assert_eq!(probe.stability, StabilityClass::Volatile);
    assert_eq!(probe.confidence, 0.65);
}

#[tokio::test]
async fn nothing_matches_runs_every_tier() {
    let page = login_page();
    let discovery = DiscoveryEngine::new(page.clone());
    let outcome = discovery
        .discover(&Intent::new("Password", ActionKind::Fill), None, IDLE)
        .await
        .unwrap();
    assert!(!outcome.is_match());
    assert_eq!(outcome.trials.len(), StrategyId::ALL.len());
}

#[tokio::test]
async fn unresolved_scope_fails_fast_without_searching() {
    let page = login_page();
    page.add(None, FixtureNode::new("button").text("Sign in"));
    let discovery = DiscoveryEngine::new(page.clone());
    let before = page.query_count();
    let err = discovery
        .discover(
            &Intent::new("Sign in", ActionKind::Click).with_scope("Login Modal"),
            None,
            IDLE,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LocatorError::ScopeNotFound(ref hint) if hint == "Login Modal"));
    assert_eq!(page.query_count(), before);
    assert_eq!(discovery.passes(), 0);
}

#[tokio::test]
async fn scoped_search_ignores_identical_controls_outside() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(None, FixtureNode::new("button").text("Save"));
    let dialog = page.add(
        None,
        FixtureNode::new("div")
            .attr("role", "dialog")
            .attr("aria-label", "Edit profile"),
    );
    let inner = page.add(Some(&dialog), FixtureNode::new("button").text("Save"));

    let scope = ScopeResolver::new(page.clone())
        .resolve_scope("Edit profile")
        .await
        .unwrap()
        .unwrap();
    let discovery = DiscoveryEngine::new(page.clone());
    let outcome = discovery
        .discover(
            &Intent::new("Save", ActionKind::Click).with_scope("Edit profile"),
            Some(&scope),
            IDLE,
        )
        .await
        .unwrap();
    let probe = outcome.matched.unwrap();
    assert_eq!(probe.strategy, StrategyId::RoleName);
    assert_eq!(probe.node, inner);
}

#[tokio::test(start_paused = true)]
async fn busy_page_is_probed_after_idle_timeout() {
    let page = login_page();
    page.set_idle_delay(Duration::from_secs(30));
    let discovery = DiscoveryEngine::new(page.clone());
    let outcome = discovery
        .discover(&Intent::new("Username", ActionKind::Fill), None, IDLE)
        .await
        .unwrap();
    assert!(outcome.is_match());
}

#[tokio::test]
async fn empty_element_name_is_rejected() {
    let page = login_page();
    let discovery = DiscoveryEngine::new(page.clone());
    let err = discovery
        .discover(&Intent::new("  ", ActionKind::Click), None, IDLE)
        .await
        .unwrap_err();
    assert!(matches!(err, LocatorError::InvalidIntent(_)));
}
