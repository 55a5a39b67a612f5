//! Page-level data model shared by discovery, the gate and the cache.

use std::collections::HashMap;
use std::fmt;

use blake3::Hasher;
use healkit_core_types::{ActionKind, ElementKind};
use serde::{Deserialize, Serialize};

/// Opaque handle to a live element.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRef {
    pub node_id: u64,
    /// Short human description, e.g. `input#u`
    pub description: String,
}

impl NodeRef {
    pub fn new(node_id: u64, description: impl Into<String>) -> Self {
        Self {
            node_id,
            description: description.into(),
        }
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl Eq for NodeRef {}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.description, self.node_id)
    }
}

/// A single driver query. Text comparisons are whitespace/case normalized.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Query {
    /// Accessible-name linkage: `label[for]`, wrapping label, aria-labelledby, aria-label
    Label { text: String },
    Placeholder { text: String },
    /// `name` or `id` attribute, compared as identifiers
    NameOrId { value: String },
    Role {
        roles: Vec<String>,
        name: Option<String>,
    },
    /// `data-testid` and its common aliases
    TestId { value: String },
    /// Interactive element adjacent to a text node
    NearText { text: String },
    /// Element whose own text content matches
    Text { text: String },
    /// id/class fragment match
    Heuristic { fragment: String },
}

impl Query {
    pub fn cache_key(&self) -> String {
        match self {
            Query::Label { text } => format!("label:{}", normalize_text(text)),
            Query::Placeholder { text } => format!("placeholder:{}", normalize_text(text)),
            Query::NameOrId { value } => format!("name:{}", normalize_ident(value)),
            Query::Role { roles, name } => format!(
                "role:{}:{}",
                roles.join("|"),
                name.as_deref().map(normalize_text).unwrap_or_default()
            ),
            Query::TestId { value } => format!("testid:{}", normalize_ident(value)),
            Query::NearText { text } => format!("near:{}", normalize_text(text)),
            Query::Text { text } => format!("text:{}", normalize_text(text)),
            Query::Heuristic { fragment } => format!("heuristic:{}", normalize_ident(fragment)),
        }
    }
}

/// A re-resolvable element locator: query, action compatibility filter and ordinal.
///
/// This is what the selector cache stores; resolving it again later goes through
/// [`crate::resolve_locator`] so the gate sees exactly what discovery saw.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub query: Query,
    #[serde(default)]
    pub action: Option<ActionKind>,
    #[serde(default)]
    pub ordinal: Option<usize>,
}

impl Locator {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            action: None,
            ordinal: None,
        }
    }

    pub fn for_action(mut self, action: ActionKind) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_ordinal(mut self, ordinal: Option<usize>) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn cache_key(&self) -> String {
        let mut key = self.query.cache_key();
        if let Some(action) = self.action {
            key.push_str(&format!("|{}", action.name()));
        }
        if let Some(n) = self.ordinal {
            key.push_str(&format!("|#{}", n));
        }
        key
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Position and size both agree within `tolerance` pixels.
    pub fn agrees_with(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }
}

/// Live state of one element as reported by the driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    pub tag: String,
    pub input_type: Option<String>,
    pub role: Option<String>,
    pub accessible_name: Option<String>,
    pub content_editable: bool,
    pub visible: bool,
    /// Covered by an overlay at its center point
    pub obscured: bool,
    pub disabled: bool,
    pub readonly: bool,
    pub bbox: Option<BoundingBox>,
}

impl ElementState {
    pub fn kind(&self) -> ElementKind {
        ElementKind::classify(
            &self.tag,
            self.input_type.as_deref(),
            self.role.as_deref(),
            self.content_editable,
        )
    }
}

/// Signals used for runtime profile classification.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSignals {
    pub url: String,
    /// Framework fingerprints seen on the page (globals, root attributes)
    pub framework_markers: Vec<String>,
}

/// Content hash of the page region an element was resolved against.
///
/// `digest` covers the whole region; `nodes` keeps one hash per region node so that
/// drift can be measured rather than only detected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFingerprint {
    pub digest: u64,
    pub nodes: Vec<u64>,
}

impl ContentFingerprint {
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut region = Hasher::new();
        let mut nodes = Vec::new();
        for part in parts {
            let bytes = part.as_ref().as_bytes();
            nodes.push(hash64(bytes));
            region.update(bytes);
            region.update(&[0x1f]);
        }
        Self {
            digest: truncate(region.finalize().as_bytes()),
            nodes,
        }
    }

    /// Fraction of the region that changed: `1 - jaccard(nodes)` over multisets.
    pub fn drift(&self, current: &ContentFingerprint) -> f64 {
        if self.digest == current.digest {
            return 0.0;
        }
        if self.nodes.is_empty() && current.nodes.is_empty() {
            return 1.0;
        }
        let mut counts: HashMap<u64, (usize, usize)> = HashMap::new();
        for node in &self.nodes {
            counts.entry(*node).or_default().0 += 1;
        }
        for node in &current.nodes {
            counts.entry(*node).or_default().1 += 1;
        }
        let (intersection, union) = counts
            .values()
            .fold((0usize, 0usize), |(i, u), (a, b)| (i + a.min(b), u + a.max(b)));
        if union == 0 {
            return 0.0;
        }
        1.0 - intersection as f64 / union as f64
    }
}

fn hash64(bytes: &[u8]) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    truncate(hasher.finalize().as_bytes())
}

fn truncate(bytes: &[u8; 32]) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(head)
}

/// Lowercase, collapse whitespace, drop trailing `:` and `*` decorations.
pub fn normalize_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c == ':' || c == '*' || c.is_whitespace())
        .to_lowercase()
}

/// Identifier form: lowercase alphanumerics only (`user_name`, `User Name` → `username`).
pub fn normalize_ident(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_label_decorations() {
        assert_eq!(normalize_text("  User   Name: *"), "user name");
        assert_eq!(normalize_ident("user-name_Field"), "usernamefield");
    }

    #[test]
    fn identical_regions_have_zero_drift() {
        let a = ContentFingerprint::from_parts(["div", "label|for=u|Username", "input|id=u"]);
        let b = ContentFingerprint::from_parts(["div", "label|for=u|Username", "input|id=u"]);
        assert_eq!(a, b);
        assert_eq!(a.drift(&b), 0.0);
    }

    #[test]
    fn single_node_change_is_measured() {
        let a = ContentFingerprint::from_parts(["div", "label|for=u|Username", "input|id=u"]);
        let b = ContentFingerprint::from_parts(["div", "label|for=u|Username", "input|id=u2"]);
        let drift = a.drift(&b);
        // two of four distinct node hashes are shared
        assert!((drift - 0.5).abs() < 1e-9, "drift was {drift}");
    }

    #[test]
    fn bbox_agreement_respects_tolerance() {
        let a = BoundingBox::new(10.0, 10.0, 100.0, 20.0);
        let b = BoundingBox::new(11.5, 10.0, 100.0, 20.0);
        assert!(a.agrees_with(&b, 2.0));
        assert!(!a.agrees_with(&b, 1.0));
    }

    #[test]
    fn locator_cache_key_includes_filters() {
        let locator = Locator::new(Query::Label {
            text: "Username".into(),
        })
        .for_action(ActionKind::Fill)
        .with_ordinal(Some(2));
        assert_eq!(locator.cache_key(), "label:username|fill|#2");
    }
}
