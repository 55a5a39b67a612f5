use std::sync::Arc;
use std::time::Duration;

use action_gate::{
    ActionabilityGate, DefaultActionabilityGate, FailingReason, GateOptions, GateTarget, Widening,
};
use healkit_core_types::ActionKind;
use page_port::{BoundingBox, FixtureNode, FixturePage, Locator, Query};

fn label(text: &str) -> Locator {
    Locator::new(Query::Label { text: text.into() }).for_action(ActionKind::Fill)
}

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

#[tokio::test(start_paused = true)]
async fn all_checks_pass_for_settled_input() {
    let page = login_page();
    let gate = DefaultActionabilityGate::new(page.clone());
    let report = gate
        .verify(&GateTarget::new(label("Username"), None), &GateOptions::default())
        .await
        .unwrap();
    assert!(report.passed(), "{report:?}");
    assert_eq!(report.samples.len(), 3);
    assert_eq!(report.match_count, 1);
    assert_eq!(report.node.as_ref().map(|n| n.description.as_str()), Some("input#u"));
}

#[tokio::test(start_paused = true)]
async fn duplicate_matches_are_not_unique() {
    let page = login_page();
    page.add(None, FixtureNode::new("input").attr("aria-label", "Username"));
    let gate = DefaultActionabilityGate::new(page.clone());
    let report = gate
        .verify(&GateTarget::new(label("Username"), None), &GateOptions::default())
        .await
        .unwrap();
    assert_eq!(report.failing_reason, Some(FailingReason::NotUnique));
    assert_eq!(report.match_count, 2);
    assert!(!report.unique && !report.visible);
}

#[tokio::test(start_paused = true)]
async fn hidden_overlaid_and_disabled_elements_fail_in_order() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    let hidden = page.add(None, FixtureNode::new("input").attr("aria-label", "A").hidden());
    page.add(None, FixtureNode::new("input").attr("aria-label", "B").obscured());
    page.add(
        None,
        FixtureNode::new("input")
            .attr("aria-label", "C")
            .attr("disabled", "")
            .obscured(),
    );
    page.add(None, FixtureNode::new("input").attr("aria-label", "D").attr("readonly", ""));
    let gate = DefaultActionabilityGate::new(page.clone());
    let options = GateOptions::default();

    let verdict = |name: &'static str| {
        let gate = &gate;
        async move {
            gate.verify(&GateTarget::new(label(name), None), &options)
                .await
                .unwrap()
                .failing_reason
        }
    };
    assert_eq!(verdict("A").await, Some(FailingReason::NotVisible));
    assert_eq!(verdict("B").await, Some(FailingReason::NotVisible));
    // visibility is checked before enablement
    assert_eq!(verdict("C").await, Some(FailingReason::NotVisible));
    assert_eq!(verdict("D").await, Some(FailingReason::Disabled));

    page.set_visible(&hidden, true);
    assert_eq!(verdict("A").await, None);
}

#[tokio::test(start_paused = true)]
async fn moving_box_is_unstable_until_it_settles() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(
        None,
        FixtureNode::new("input")
            .attr("aria-label", "Email")
            .bbox(0.0, 100.0, 200.0, 24.0)
            .moving([
                BoundingBox::new(0.0, 40.0, 200.0, 24.0),
                BoundingBox::new(0.0, 70.0, 200.0, 24.0),
                BoundingBox::new(0.0, 100.0, 200.0, 24.0),
            ]),
    );
    let gate = DefaultActionabilityGate::new(page.clone());
    let target = GateTarget::new(label("Email"), None);
    let base = GateOptions::default();

    let first = gate.verify(&target, &base).await.unwrap();
    assert_eq!(first.failing_reason, Some(FailingReason::Unstable));
    assert!(first.unique && first.visible && first.enabled);
    assert!(!first.stable_bbox);

    let widened = base.for_round(1, &Widening::default());
    let second = gate.verify(&target, &widened).await.unwrap();
    assert!(second.passed(), "{second:?}");
    assert_eq!(second.samples.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn jitter_within_tolerance_is_stable() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    page.add(
        None,
        FixtureNode::new("input")
            .attr("aria-label", "Email")
            .bbox(0.0, 100.0, 200.0, 24.0)
            .moving([
                BoundingBox::new(0.5, 100.0, 200.0, 24.0),
                BoundingBox::new(1.5, 100.0, 200.0, 24.0),
            ]),
    );
    let gate = DefaultActionabilityGate::new(page.clone());
    let report = gate
        .verify(&GateTarget::new(label("Email"), None), &GateOptions::default())
        .await
        .unwrap();
    assert!(report.passed(), "{report:?}");
}

#[tokio::test(start_paused = true)]
async fn candidate_outside_scope_is_rejected() {
    let page = Arc::new(FixturePage::new("https://example.com"));
    let dialog = page.add(None, FixtureNode::new("div").attr("role", "dialog"));
    let panel = page.add(None, FixtureNode::new("div").attr("role", "tabpanel"));
    page.add(Some(&panel), FixtureNode::new("button").text("Save"));
    let gate = DefaultActionabilityGate::new(page.clone());
    let save = Locator::new(Query::Text {
        text: "Save".into(),
    });

    let in_dialog = gate
        .verify(&GateTarget::new(save.clone(), Some(dialog)), &GateOptions::default())
        .await
        .unwrap();
    assert_eq!(in_dialog.failing_reason, Some(FailingReason::NotUnique));

    let in_panel = gate
        .verify(&GateTarget::new(save, Some(panel)), &GateOptions::default())
        .await
        .unwrap();
    assert!(in_panel.passed());
    assert!(in_panel.scoped);
}

#[tokio::test(start_paused = true)]
async fn slow_sampling_reports_timeout() {
    let page = login_page();
    let gate = DefaultActionabilityGate::new(page.clone());
    let options = GateOptions::new(
        5,
        Duration::from_millis(400),
        2.0,
        Duration::from_millis(1000),
    );
    let report = gate
        .verify(&GateTarget::new(label("Username"), None), &options)
        .await
        .unwrap();
    assert_eq!(report.failing_reason, Some(FailingReason::Timeout));
    assert!(!report.passed());
}

#[tokio::test]
async fn zero_samples_is_rejected() {
    let page = login_page();
    let gate = DefaultActionabilityGate::new(page.clone());
    let options = GateOptions::new(0, Duration::ZERO, 2.0, Duration::from_secs(1));
    assert!(gate
        .verify(&GateTarget::new(label("Username"), None), &options)
        .await
        .is_err());
}
