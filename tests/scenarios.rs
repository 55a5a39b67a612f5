mod common;

use std::time::{Duration, Instant};

use healkit::{
    ActionKind, EngineSettings, FailureReason, HistoryStore, Intent, ResolutionSource,
    RuntimeProfile, StrategyId,
};
use healkit_core_types::StabilityClass;
use selector_cache::CacheKey;

use common::*;

fn username() -> Intent {
    Intent::new("Username", ActionKind::Fill)
}

fn username_key() -> CacheKey {
    CacheKey::new("example.com", RuntimeProfile::Static, "Username")
}

#[tokio::test(start_paused = true)]
async fn label_resolves_at_tier_one_and_is_cached() {
    let login = login_page();
    let engine = engine_on(login.page.clone(), EngineSettings::default()).await;

    let resolution = engine.resolve(&username()).await.unwrap();
    assert_eq!(resolution.source, ResolutionSource::Discovery);
    assert_eq!(resolution.strategy, StrategyId::SemanticLabel);
    assert_eq!(resolution.confidence, 0.92);
    assert_eq!(resolution.stability, StabilityClass::Stable);
    assert_eq!(resolution.target, login.input);

    let stats = engine.cache().stats();
    assert_eq!((stats.misses, stats.writes), (1, 1));
    let entry = engine.cache().get(&username_key()).expect("entry cached");
    assert_eq!(entry.strategy, StrategyId::SemanticLabel);
}

#[tokio::test(start_paused = true)]
async fn repeat_run_is_served_from_the_fast_tier() {
    let login = login_page();
    let engine = engine_on(login.page.clone(), EngineSettings::default()).await;
    engine.resolve(&username()).await.unwrap();
    let passes = engine.discovery_passes();

    let again = engine.resolve(&username()).await.unwrap();
    assert_eq!(again.source, ResolutionSource::CacheFast);
    assert_eq!(again.target, login.input);
    assert_eq!(engine.discovery_passes(), passes);
    assert_eq!(engine.cache().stats().fast_hits, 1);

    let started = Instant::now();
    let hit = engine.cache().get(&username_key());
    assert!(hit.is_some());
    assert!(started.elapsed() < Duration::from_millis(5));
}

#[tokio::test(start_paused = true)]
async fn drifted_region_invalidates_and_rediscovers() {
    let login = login_page();
    let engine = engine_on(login.page.clone(), EngineSettings::default()).await;
    engine.resolve(&username()).await.unwrap();

    // the input is renamed and its label follows it
    login.page.set_attr(&login.input, "id", "user");
    login.page.set_attr(&login.label, "for", "user");

    let resolution = engine.resolve(&username()).await.unwrap();
    assert_eq!(resolution.source, ResolutionSource::Discovery);
    assert_eq!(resolution.target, login.input);

    let stats = engine.cache().stats();
    assert_eq!(stats.drift_invalidations, 1);
    assert_eq!(stats.writes, 2);
    assert_eq!(engine.discovery_passes(), 2);

    let fresh = engine.cache().get(&username_key()).unwrap();
    assert_eq!(fresh.strategy, StrategyId::SemanticLabel);
}

#[tokio::test(start_paused = true)]
async fn renamed_id_alone_is_full_drift_and_the_rematch_stays_uncached() {
    let login = login_page();
    let (engine, mut rx) = observed_engine_on(login.page.clone()).await;
    engine.resolve(&username()).await.unwrap();
    drain(&mut rx);

    // the label still says for="u", so it no longer names the input
    login.page.set_attr(&login.input, "id", "user");

    let resolution = engine.resolve(&username()).await.unwrap();
    assert_eq!(resolution.source, ResolutionSource::Discovery);
    assert_eq!(resolution.strategy, StrategyId::NearbyText);
    assert_eq!(resolution.stability, StabilityClass::Volatile);
    assert_eq!(resolution.target, login.input);

    let mut drift = None;
    while let Ok(event) = rx.try_recv() {
        if event.kind == "cache.drift_invalidated" {
            drift = event.detail["drift"].as_f64();
        }
    }
    assert_eq!(drift, Some(1.0));

    let stats = engine.cache().stats();
    assert_eq!(stats.drift_invalidations, 1);
    assert_eq!(stats.writes, 1);
    assert_eq!(stats.rejected_volatile, 1);
    assert!(engine.cache().get(&username_key()).is_none());
}

#[tokio::test(start_paused = true)]
async fn element_mid_transition_heals_in_round_one() {
    let login = sliding_login_page();
    let (engine, mut rx) = observed_engine_on(login.page.clone()).await;

    let resolution = engine.resolve(&username()).await.unwrap();
    assert_eq!(resolution.source, ResolutionSource::Healed);
    assert_eq!(resolution.rounds, 1);
    assert_eq!(resolution.target, login.input);

    let kinds = drain(&mut rx);
    let failed = kinds.iter().position(|k| k == "readiness.failed").unwrap();
    let healed = kinds.iter().position(|k| k == "heal.succeeded").unwrap();
    assert!(failed < healed, "{kinds:?}");
    assert!(kinds.contains(&"cache.stored".to_string()));

    let record = engine
        .history()
        .get("Username", "example.com", StrategyId::SemanticLabel)
        .unwrap()
        .unwrap();
    assert_eq!(record.success_count, 1);
}

#[tokio::test(start_paused = true)]
async fn closed_modal_fails_fast_without_discovery() {
    let login = login_page();
    login
        .page
        .add(None, healkit::FixtureNode::new("button").text("Sign in"));
    let (engine, mut rx) = observed_engine_on(login.page.clone()).await;

    let err = engine
        .resolve(&Intent::new("Sign in", ActionKind::Click).with_scope("Login Modal"))
        .await
        .unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::ScopeNotFound);
    assert_eq!(failure.detail.as_deref(), Some("Login Modal"));
    assert_eq!(engine.discovery_passes(), 0);

    let kinds = drain(&mut rx);
    assert!(kinds.contains(&"scope.not_found".to_string()));
    assert!(!kinds.iter().any(|k| k.starts_with("discovery.")), "{kinds:?}");
}
