#![allow(dead_code)]

use std::sync::Arc;

use healkit::{
    EngineEvent, EngineSettings, FixtureNode, FixturePage, InMemoryBus, ResolutionEngine,
};
use healkit_event_bus::EventBus;
use page_port::{BoundingBox, NodeRef};
use tokio::sync::broadcast;

pub const LOGIN_URL: &str = "https://www.example.com/login";

pub struct LoginPage {
    pub page: Arc<FixturePage>,
    pub form: NodeRef,
    pub label: NodeRef,
    pub input: NodeRef,
}

/// `<form><label for="u">Username</label><input id="u"></form>`
pub fn login_page() -> LoginPage {
    let page = Arc::new(FixturePage::new(LOGIN_URL));
    let form = page.add(None, FixtureNode::new("form"));
    let label = page.add(
        Some(&form),
        FixtureNode::new("label").attr("for", "u").text("Username"),
    );
    let input = page.add(Some(&form), FixtureNode::new("input").attr("id", "u"));
    LoginPage {
        page,
        form,
        label,
        input,
    }
}

/// The username input slides in over four layout frames.
pub fn sliding_login_page() -> LoginPage {
    let login = login_page();
    login.page.set_motion(
        &login.input,
        [
            BoundingBox::new(0.0, 30.0, 240.0, 24.0),
            BoundingBox::new(0.0, 60.0, 240.0, 24.0),
            BoundingBox::new(0.0, 90.0, 240.0, 24.0),
            BoundingBox::new(0.0, 120.0, 240.0, 24.0),
        ],
    );
    login
}

pub async fn engine_on(page: Arc<FixturePage>, settings: EngineSettings) -> ResolutionEngine {
    // a second init in the same test binary is reported, not fatal
    let _ = healkit::telemetry::init_tracing("warn");
    let engine = ResolutionEngine::builder(page)
        .settings(settings)
        .build()
        .unwrap();
    engine.on_navigation(LOGIN_URL).await.unwrap();
    engine
}

pub async fn observed_engine_on(
    page: Arc<FixturePage>,
) -> (ResolutionEngine, broadcast::Receiver<EngineEvent>) {
    let bus = InMemoryBus::<EngineEvent>::new(256);
    let rx = bus.subscribe();
    let engine = ResolutionEngine::builder(page)
        .event_bus(bus)
        .build()
        .unwrap();
    engine.on_navigation(LOGIN_URL).await.unwrap();
    (engine, rx)
}

pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<String> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}
