use std::sync::Arc;

use action_gate::{
    ActionabilityGate, DefaultActionabilityGate, FailingReason, GateOptions, GateTarget,
};
use action_locator::{
    AttemptOutcome, DiscoveryEngine, HealOutcome, HealParams, HealTrigger, HealingEngine,
    HistoryStore, InMemoryHistory, RoundOutcome,
};
use healkit_core_types::{ActionKind, Intent, StabilityClass, StepId, StrategyId};
use healkit_event_bus::{EngineEvent, EventBus, EventEmitter, InMemoryBus};
use page_port::{BoundingBox, FixtureNode, FixturePage, Locator, Query};

const DOMAIN: &str = "example.com";

struct Harness {
    page: Arc<FixturePage>,
    history: Arc<InMemoryHistory>,
    healer: HealingEngine,
}

fn harness(page: Arc<FixturePage>, params: HealParams) -> Harness {
    let history = Arc::new(InMemoryHistory::new());
    let healer = HealingEngine::new(
        Arc::new(DiscoveryEngine::new(page.clone())),
        Arc::new(DefaultActionabilityGate::new(page.clone())),
        history.clone(),
        params,
    );
    Harness {
        page,
        history,
        healer,
    }
}

fn sliding_username() -> Arc<FixturePage> {
    let page = Arc::new(FixturePage::new("https://example.com/login"));
    let form = page.add(None, FixtureNode::new("form"));
    page.add(
        Some(&form),
        FixtureNode::new("label").attr("for", "u").text("Username"),
    );
    page.add(
        Some(&form),
        FixtureNode::new("input")
            .attr("id", "u")
            .bbox(0.0, 120.0, 240.0, 24.0)
            .moving([
                BoundingBox::new(0.0, 30.0, 240.0, 24.0),
                BoundingBox::new(0.0, 60.0, 240.0, 24.0),
                BoundingBox::new(0.0, 90.0, 240.0, 24.0),
                BoundingBox::new(0.0, 120.0, 240.0, 24.0),
            ]),
    );
    page
}

#[tokio::test(start_paused = true)]
async fn mid_transition_candidate_heals_in_round_one() {
    let h = harness(sliding_username(), HealParams::default());
    let intent = Intent::new("Username", ActionKind::Fill);

    let locator = Locator::new(Query::Label {
        text: "Username".into(),
    })
    .for_action(ActionKind::Fill);
    let gate = DefaultActionabilityGate::new(h.page.clone());
    let baseline = gate
        .verify(&GateTarget::new(locator, None), &GateOptions::default())
        .await
        .unwrap();
    assert_eq!(baseline.failing_reason, Some(FailingReason::Unstable));

    let outcome = h
        .healer
        .heal(
            &intent,
            DOMAIN,
            None,
            &HealTrigger::GateRejected {
                reason: FailingReason::Unstable,
            },
            None,
        )
        .await
        .unwrap();

    let HealOutcome::Healed {
        probe,
        report,
        round,
        attempts,
    } = outcome
    else {
        panic!("expected a heal, got {outcome:?}");
    };
    assert_eq!(round, 1);
    assert_eq!(probe.strategy, StrategyId::SemanticLabel);
    assert_eq!(report.samples.len(), 4);
    assert!(report.passed());
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, AttemptOutcome::Accepted);

    let record = h
        .history
        .get("Username", DOMAIN, StrategyId::SemanticLabel)
        .unwrap()
        .unwrap();
    assert_eq!((record.success_count, record.failure_count), (1, 0));
}

#[tokio::test(start_paused = true)]
async fn ladder_only_moves_forward_and_stops_at_three_rounds() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(
        None,
        FixtureNode::new("input")
            .attr("id", "username")
            .attr("aria-label", "Username")
            .attr("placeholder", "Username")
            .attr("data-testid", "username")
            .attr("disabled", ""),
    );
    let h = harness(page, HealParams::default());
    let intent = Intent::new("Username", ActionKind::Fill);

    let outcome = h
        .healer
        .heal(
            &intent,
            DOMAIN,
            None,
            &HealTrigger::GateRejected {
                reason: FailingReason::Disabled,
            },
            None,
        )
        .await
        .unwrap();

    let HealOutcome::Exhausted {
        rounds,
        attempts,
        last_failing_reason,
    } = &outcome
    else {
        panic!("disabled input must not heal: {outcome:?}");
    };
    assert_eq!(*rounds, 3);
    assert_eq!(*last_failing_reason, Some(FailingReason::Disabled));
    assert_eq!(
        outcome.strategies_tried(),
        vec![
            StrategyId::SemanticLabel,
            StrategyId::Placeholder,
            StrategyId::NameOrId
        ]
    );
    let rounds_seen: Vec<u8> = attempts.iter().map(|a| a.round).collect();
    assert_eq!(rounds_seen, vec![1, 2, 3]);

    for strategy in outcome.strategies_tried() {
        let record = h.history.get("Username", DOMAIN, strategy).unwrap().unwrap();
        assert_eq!((record.success_count, record.failure_count), (0, 1));
    }
}

#[test]
fn configured_rounds_never_exceed_the_ceiling() {
    let params = HealParams {
        max_rounds: 9,
        ..HealParams::default()
    };
    assert_eq!(params.rounds(), 3);
}

#[tokio::test(start_paused = true)]
async fn learned_strategies_are_tried_first() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(
        None,
        FixtureNode::new("input")
            .attr("aria-label", "Username")
            .attr("data-testid", "username"),
    );
    let h = harness(page, HealParams::default());
    h.history
        .record(
            "Username",
            DOMAIN,
            StrategyId::TestId,
            true,
            std::time::Duration::from_millis(20),
        )
        .unwrap();
    let intent = Intent::new("Username", ActionKind::Fill);

    let plan = h.healer.plan_for(&intent, DOMAIN);
    assert_eq!(plan.len(), StrategyId::ALL.len());
    assert_eq!(plan[0], StrategyId::TestId);
    assert_eq!(plan[1], StrategyId::SemanticLabel);

    let outcome = h
        .healer
        .heal(&intent, DOMAIN, None, &HealTrigger::NoMatch, None)
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.strategies_tried(), vec![StrategyId::TestId]);
}

#[tokio::test(start_paused = true)]
async fn empty_plan_stops_early_as_exhausted() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(None, FixtureNode::new("input").attr("id", "u"));
    let h = harness(page, HealParams::default());
    let intent = Intent::new("Password", ActionKind::Fill);

    let outcome = h
        .healer
        .heal(&intent, DOMAIN, None, &HealTrigger::NoMatch, None)
        .await
        .unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.rounds(), 1);
    assert_eq!(outcome.attempts().len(), StrategyId::ALL.len());
    assert!(outcome
        .attempts()
        .iter()
        .all(|a| a.outcome == AttemptOutcome::NoMatch));
    assert_eq!(h.history.len(), StrategyId::ALL.len());
}

#[tokio::test(start_paused = true)]
async fn volatile_winner_is_promoted() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(None, FixtureNode::new("span").text("Continue"));
    let h = harness(page, HealParams::default());
    let intent = Intent::new("Continue", ActionKind::Click);

    let outcome = h
        .healer
        .heal(
            &intent,
            DOMAIN,
            None,
            &HealTrigger::ActionFailed {
                message: "click intercepted".into(),
            },
            None,
        )
        .await
        .unwrap();
    let HealOutcome::Healed { probe, .. } = outcome else {
        panic!("expected heal");
    };
    assert_eq!(probe.strategy, StrategyId::VisibleText);
    assert_eq!(probe.stability, StabilityClass::Stable);
    assert!(probe.promoted);
}

#[tokio::test(start_paused = true)]
async fn sequence_cursor_never_rewinds() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(
        None,
        FixtureNode::new("input")
            .attr("aria-label", "Username")
            .attr("placeholder", "Username")
            .attr("readonly", ""),
    );
    let h = harness(page, HealParams::default());
    let intent = Intent::new("Username", ActionKind::Fill);

    let mut sequence = h.healer.begin(&intent, DOMAIN, None);
    assert_eq!(sequence.remaining().len(), 8);
    let first = sequence.heal_round(1).await.unwrap();
    assert!(matches!(first, RoundOutcome::Rejected { reason: FailingReason::Disabled }));
    assert_eq!(sequence.remaining()[0], StrategyId::Placeholder);
    let second = sequence.heal_round(2).await.unwrap();
    assert!(matches!(second, RoundOutcome::Rejected { .. }));
    let third = sequence.heal_round(3).await.unwrap();
    assert!(matches!(third, RoundOutcome::Rejected { .. }));
    assert_eq!(sequence.remaining()[0], StrategyId::TestId);
    // nothing past the role tier matches
    let fourth = sequence.heal_round(3).await.unwrap();
    assert!(matches!(fourth, RoundOutcome::NoMatch));
    assert!(sequence.remaining().is_empty());

    let mut tried: Vec<StrategyId> = sequence.attempts().iter().map(|a| a.strategy).collect();
    assert_eq!(tried.len(), StrategyId::ALL.len());
    tried.sort();
    tried.dedup();
    assert_eq!(tried.len(), StrategyId::ALL.len());
}

#[tokio::test(start_paused = true)]
async fn heal_events_are_published() {
    let bus = InMemoryBus::<EngineEvent>::new(32);
    let mut rx = bus.subscribe();
    let h = harness(sliding_username(), HealParams::default());
    let healer = h.healer.with_emitter(EventEmitter::new(bus.clone()));
    let step = StepId::new();

    healer
        .heal(
            &Intent::new("Username", ActionKind::Fill),
            DOMAIN,
            None,
            &HealTrigger::NoMatch,
            Some(&step),
        )
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.step_id.as_ref(), Some(&step));
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            "heal.round_started",
            "heal.round_failed",
            "heal.round_started",
            "heal.succeeded"
        ]
    );
}
