//! Discovery strategy table
//!
//! Eight strategies in tier order. Tiers 1-5 key on attributes authors set on purpose
//! and are cacheable; tiers 6-8 key on layout or incidental text and are one-shot.

use healkit_core_types::{Intent, StabilityClass, StrategyId};
use page_port::{normalize_ident, Query};

use crate::types::StrategyDescriptor;

/// Generated-id fragments shorter than this match too much to be useful.
const MIN_HEURISTIC_FRAGMENT: usize = 3;

pub static STRATEGY_TABLE: [StrategyDescriptor; 8] = [
    StrategyDescriptor {
        id: StrategyId::SemanticLabel,
        confidence: 0.92,
        stability: StabilityClass::Stable,
        build: semantic_label,
    },
    StrategyDescriptor {
        id: StrategyId::Placeholder,
        confidence: 0.88,
        stability: StabilityClass::Stable,
        build: placeholder,
    },
    StrategyDescriptor {
        id: StrategyId::NameOrId,
        confidence: 0.85,
        stability: StabilityClass::Stable,
        build: name_or_id,
    },
    StrategyDescriptor {
        id: StrategyId::RoleName,
        confidence: 0.95,
        stability: StabilityClass::Stable,
        build: role_name,
    },
    StrategyDescriptor {
        id: StrategyId::TestId,
        confidence: 0.90,
        stability: StabilityClass::Stable,
        build: test_id,
    },
    StrategyDescriptor {
        id: StrategyId::NearbyText,
        confidence: 0.75,
        stability: StabilityClass::Volatile,
        build: nearby_text,
    },
    StrategyDescriptor {
        id: StrategyId::VisibleText,
        confidence: 0.65,
        stability: StabilityClass::Volatile,
        build: visible_text,
    },
    StrategyDescriptor {
        id: StrategyId::GeneratedHeuristic,
        confidence: 0.55,
        stability: StabilityClass::Volatile,
        build: generated_heuristic,
    },
];

/// Descriptor for `id`.
pub fn descriptor(id: StrategyId) -> &'static StrategyDescriptor {
    // table rows are declared in tier order
    &STRATEGY_TABLE[usize::from(id.tier() - 1)]
}

/// Default plan: every tier, ascending.
pub fn default_plan() -> Vec<StrategyId> {
    STRATEGY_TABLE.iter().map(|d| d.id).collect()
}

fn name(intent: &Intent) -> Option<String> {
    let trimmed = intent.element_name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn semantic_label(intent: &Intent) -> Option<Query> {
    name(intent).map(|text| Query::Label { text })
}

fn placeholder(intent: &Intent) -> Option<Query> {
    name(intent).map(|text| Query::Placeholder { text })
}

fn name_or_id(intent: &Intent) -> Option<Query> {
    name(intent).map(|value| Query::NameOrId { value })
}

fn role_name(intent: &Intent) -> Option<Query> {
    name(intent).map(|name| Query::Role {
        roles: intent
            .action
            .candidate_roles()
            .iter()
            .map(|r| r.to_string())
            .collect(),
        name: Some(name),
    })
}

fn test_id(intent: &Intent) -> Option<Query> {
    name(intent).map(|name| Query::TestId {
        value: kebab(&name),
    })
}

fn nearby_text(intent: &Intent) -> Option<Query> {
    name(intent).map(|text| Query::NearText { text })
}

fn visible_text(intent: &Intent) -> Option<Query> {
    name(intent).map(|text| Query::Text { text })
}

fn generated_heuristic(intent: &Intent) -> Option<Query> {
    let fragment = normalize_ident(&intent.element_name);
    (fragment.chars().count() >= MIN_HEURISTIC_FRAGMENT).then_some(Query::Heuristic { fragment })
}

/// `"Sign In Button"` → `"sign-in-button"`
fn kebab(raw: &str) -> String {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}
