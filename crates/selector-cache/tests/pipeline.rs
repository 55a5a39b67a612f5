use std::sync::Arc;
use std::time::Duration;

use healkit_core_types::{RuntimeProfile, StabilityClass, StrategyId};
use page_port::{ContentFingerprint, Locator, Query};
use selector_cache::{
    CacheEntry, CacheKey, CachePipeline, CacheStats, CacheTier, JsonFileTier, MemoryTier,
    PutOutcome, Tier, TtlPolicy,
};

const HOUR: Duration = Duration::from_secs(3600);

fn ttl() -> TtlPolicy {
    TtlPolicy::new(HOUR, HOUR)
}

fn region() -> ContentFingerprint {
    ContentFingerprint::from_parts(["form", "label|for=u|Username", "input|id=u"])
}

fn entry(name: &str, stability: StabilityClass) -> CacheEntry {
    CacheEntry::new(
        CacheKey::new("example.com", RuntimeProfile::Static, name),
        Locator::new(Query::Label { text: name.into() }),
        StrategyId::SemanticLabel,
        0.92,
        stability,
        region(),
    )
}

#[test]
fn counters_follow_every_read_path() {
    let fast = Arc::new(MemoryTier::new(CacheTier::Fast, ttl()));
    let durable = Arc::new(MemoryTier::new(CacheTier::Durable, ttl()));
    let cache = CachePipeline::new(fast.clone(), durable.clone(), 0.25);
    let stored = entry("Username", StabilityClass::Stable);

    assert!(cache.get(&stored.key).is_none());
    assert_eq!(cache.put(&stored).unwrap(), PutOutcome::Stored);

    let hit = cache.get(&stored.key).expect("fast hit");
    assert_eq!(hit.tier_of_origin, CacheTier::Fast);

    // durable-only copy: the next read warms the fast tier back
    fast.remove(&stored.key).unwrap();
    let hit = cache.get(&stored.key).expect("durable hit");
    assert_eq!(hit.tier_of_origin, CacheTier::Durable);
    assert!(fast.get(&stored.key).unwrap().is_some());

    let hit = cache.get(&stored.key).expect("fast hit after warm-back");
    assert_eq!(hit.tier_of_origin, CacheTier::Fast);

    assert_eq!(
        cache.stats(),
        CacheStats {
            fast_hits: 2,
            durable_hits: 1,
            misses: 1,
            drift_invalidations: 0,
            writes: 1,
            rejected_volatile: 0,
        }
    );
}

#[test]
fn volatile_entries_never_reach_either_tier() {
    let fast = Arc::new(MemoryTier::new(CacheTier::Fast, ttl()));
    let durable = Arc::new(MemoryTier::new(CacheTier::Durable, ttl()));
    let cache = CachePipeline::new(fast.clone(), durable.clone(), 0.25);
    let volatile = entry("Search", StabilityClass::Volatile);

    assert_eq!(cache.put(&volatile).unwrap(), PutOutcome::RejectedVolatile);
    assert!(fast.is_empty());
    assert!(durable.is_empty());
    assert!(cache.get(&volatile.key).is_none());

    let stats = cache.stats();
    assert_eq!(stats.rejected_volatile, 1);
    assert_eq!(stats.writes, 0);
    assert_eq!(stats.misses, 1);
}

#[test]
fn drift_beyond_threshold_invalidates_both_tiers() {
    let cache = CachePipeline::in_memory(ttl(), ttl(), 0.25);
    let stored = entry("Username", StabilityClass::Stable);
    cache.put(&stored).unwrap();

    let same = region();
    let check = cache.check_drift(&stored, Some(&same)).unwrap();
    assert_eq!(check.drift, 0.0);
    assert!(!check.invalidated);
    assert!(cache.get(&stored.key).is_some());

    let changed =
        ContentFingerprint::from_parts(["form", "label|for=user|Username", "input|id=user"]);
    let check = cache.check_drift(&stored, Some(&changed)).unwrap();
    assert!(check.drift > 0.25);
    assert!(check.invalidated);
    assert!(cache.get(&stored.key).is_none());

    let stats = cache.stats();
    assert_eq!(stats.drift_invalidations, 1);
    assert_eq!(stats.fast_hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn unresolvable_locator_counts_as_full_drift() {
    let cache = CachePipeline::in_memory(ttl(), ttl(), 0.25);
    let stored = entry("Username", StabilityClass::Stable);
    cache.put(&stored).unwrap();
    let check = cache.check_drift(&stored, None).unwrap();
    assert_eq!(check.drift, 1.0);
    assert!(check.invalidated);
    assert_eq!(cache.stats().drift_invalidations, 1);
}

#[test]
fn durable_file_is_shared_across_pipelines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("selectors.json");
    let stored = entry("Username", StabilityClass::Stable);

    let first = CachePipeline::new(
        Arc::new(MemoryTier::new(CacheTier::Fast, ttl())),
        Arc::new(JsonFileTier::new(&path, ttl())),
        0.25,
    );
    first.put(&stored).unwrap();

    // a second run starts with a cold fast tier
    let second = CachePipeline::new(
        Arc::new(MemoryTier::new(CacheTier::Fast, ttl())),
        Arc::new(JsonFileTier::new(&path, ttl())),
        0.25,
    );
    let hit = second.get(&stored.key).expect("durable hit");
    assert_eq!(hit.tier_of_origin, CacheTier::Durable);
    assert_eq!(hit.locator, stored.locator);
    assert_eq!(hit.fingerprint, stored.fingerprint);
    assert_eq!(second.stats().durable_hits, 1);

    assert_eq!(second.purge_domain("example.com").unwrap(), 1);
    assert!(first.get(&stored.key).is_some(), "first run still has its fast copy");
    assert!(JsonFileTier::new(&path, ttl()).get(&stored.key).unwrap().is_none());
}

#[test]
fn keys_normalize_element_names() {
    let cache = CachePipeline::in_memory(ttl(), ttl(), 0.25);
    cache.put(&entry("Username", StabilityClass::Stable)).unwrap();
    let key = CacheKey::new("Example.com", RuntimeProfile::Static, "  username: ");
    assert!(cache.get(&key).is_some());
    let other_profile = CacheKey::new("example.com", RuntimeProfile::Dynamic, "Username");
    assert!(cache.get(&other_profile).is_none());
}

#[test]
fn refresh_restarts_ttl() {
    let short = TtlPolicy::new(Duration::from_secs(1), Duration::from_secs(1));
    let fast = Arc::new(MemoryTier::new(CacheTier::Fast, short));
    let cache = CachePipeline::new(
        fast.clone(),
        Arc::new(MemoryTier::new(CacheTier::Durable, short)),
        0.25,
    );
    let mut stored = entry("Username", StabilityClass::Stable);
    stored.verified_at = chrono::Utc::now() - chrono::Duration::milliseconds(900);
    cache.put(&stored).unwrap();
    cache.refresh(&stored.key).unwrap();
    let hit = fast.get(&stored.key).unwrap().expect("still live");
    assert!(hit.age() < Duration::from_millis(500));
}

#[test]
fn separately_opened_durable_tiers_keep_every_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("selectors.json");

    let writers: Vec<_> = (0..6)
        .map(|worker| {
            let path = path.clone();
            std::thread::spawn(move || {
                let tier = JsonFileTier::new(path, ttl());
                for i in 0..25 {
                    let element = format!("field {worker} {i}");
                    tier.put(&entry(&element, StabilityClass::Stable)).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let tier = JsonFileTier::new(&path, ttl());
    for worker in 0..6 {
        for i in 0..25 {
            let element = format!("field {worker} {i}");
            let key = CacheKey::new("example.com", RuntimeProfile::Static, &element);
            assert!(tier.get(&key).unwrap().is_some(), "lost {element}");
        }
    }
}

#[test]
fn warm_back_outlives_an_aged_durable_entry() {
    let fast_ttl = TtlPolicy::new(Duration::from_secs(60), Duration::from_secs(60));
    let durable_ttl = TtlPolicy::new(Duration::from_secs(86_400), Duration::from_secs(86_400));
    let durable = Arc::new(MemoryTier::new(CacheTier::Durable, durable_ttl));
    let cache = CachePipeline::new(
        Arc::new(MemoryTier::new(CacheTier::Fast, fast_ttl)),
        durable.clone(),
        0.25,
    );

    // verified five minutes ago by an earlier run
    let mut stored = entry("Username", StabilityClass::Stable);
    stored.verified_at = chrono::Utc::now() - chrono::Duration::minutes(5);
    durable.put(&stored).unwrap();

    let first = cache.get(&stored.key).expect("durable hit");
    assert_eq!(first.tier_of_origin, CacheTier::Durable);
    let second = cache.get(&stored.key).expect("fast hit");
    assert_eq!(second.tier_of_origin, CacheTier::Fast);

    let stats = cache.stats();
    assert_eq!((stats.durable_hits, stats.fast_hits), (1, 1));
}
