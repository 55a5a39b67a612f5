//! Scope resolution: locate an already-open container by role and name

use std::sync::Arc;

use page_port::{normalize_text, NodeRef, PagePort, Query};
use tracing::debug;

use crate::errors::LocatorError;
use crate::types::ScopeHandle;

/// Roles that can bound a discovery search.
pub const CONTAINER_ROLES: [&str; 6] = [
    "dialog",
    "alertdialog",
    "listbox",
    "menu",
    "tabpanel",
    "complementary",
];

/// Words in a hint that name the container kind rather than the container.
const KIND_KEYWORDS: [(&str, &[&str]); 8] = [
    ("modal", &["dialog", "alertdialog"]),
    ("dialog", &["dialog", "alertdialog"]),
    ("popup", &["dialog", "alertdialog", "menu"]),
    ("dropdown", &["listbox", "menu"]),
    ("list", &["listbox"]),
    ("menu", &["menu"]),
    ("tab", &["tabpanel"]),
    ("drawer", &["complementary", "dialog"]),
];

const PANEL_KEYWORDS: [&str; 2] = ["sidebar", "panel"];

struct Container {
    node: NodeRef,
    role: String,
    name: String,
}

/// Finds containers; never opens them.
pub struct ScopeResolver {
    port: Arc<dyn PagePort>,
}

impl ScopeResolver {
    pub fn new(port: Arc<dyn PagePort>) -> Self {
        Self { port }
    }

    /// Resolve `hint` to a visible container, or `None` when nothing matching is open.
    ///
    /// Tried in order: exact accessible-name match; name match after dropping kind
    /// words (`"Login Modal"` → `"login"` among dialogs); the single visible container
    /// of the kind the hint names.
    pub async fn resolve_scope(&self, hint: &str) -> Result<Option<ScopeHandle>, LocatorError> {
        let wanted = normalize_text(hint);
        if wanted.is_empty() {
            return Ok(None);
        }
        let containers = self.open_containers().await?;

        if let Some(found) = containers.iter().find(|c| c.name == wanted) {
            return Ok(Some(handle(found, hint)));
        }

        let (stripped, kinds) = split_kind_words(&wanted);
        let kind_ok = |c: &&Container| kinds.is_empty() || kinds.contains(&c.role.as_str());
        if !stripped.is_empty() {
            let named: Vec<&Container> = containers
                .iter()
                .filter(kind_ok)
                .filter(|c| c.name == stripped || c.name.contains(&stripped))
                .collect();
            if let [only] = named.as_slice() {
                return Ok(Some(handle(only, hint)));
            }
        }

        if !kinds.is_empty() {
            let of_kind: Vec<&Container> = containers.iter().filter(kind_ok).collect();
            // a kind-only hint ("the dropdown") is usable only when unambiguous
            if let [only] = of_kind.as_slice() {
                if stripped.is_empty() || only.name.is_empty() {
                    return Ok(Some(handle(only, hint)));
                }
            }
        }

        debug!(target: "scope", hint, open = containers.len(), "no open container matches");
        Ok(None)
    }

    async fn open_containers(&self) -> Result<Vec<Container>, LocatorError> {
        let query = Query::Role {
            roles: CONTAINER_ROLES.iter().map(|r| r.to_string()).collect(),
            name: None,
        };
        let mut open = Vec::new();
        for node in self.port.query(None, &query).await? {
            let state = self.port.inspect(&node).await?;
            if !state.visible {
                continue;
            }
            open.push(Container {
                node,
                role: state.role.unwrap_or_default(),
                name: state
                    .accessible_name
                    .as_deref()
                    .map(normalize_text)
                    .unwrap_or_default(),
            });
        }
        Ok(open)
    }
}

fn handle(container: &Container, hint: &str) -> ScopeHandle {
    ScopeHandle {
        node: container.node.clone(),
        hint: hint.to_string(),
        role: container.role.clone(),
    }
}

/// Split a normalized hint into its name words and the container roles its kind words imply.
fn split_kind_words(hint: &str) -> (String, Vec<&'static str>) {
    let mut kinds: Vec<&'static str> = Vec::new();
    let mut rest = Vec::new();
    for word in hint.split_whitespace() {
        if let Some((_, roles)) = KIND_KEYWORDS.iter().find(|(k, _)| *k == word) {
            for role in roles.iter() {
                if !kinds.contains(role) {
                    kinds.push(role);
                }
            }
        } else if PANEL_KEYWORDS.contains(&word) {
            for role in ["complementary", "tabpanel"] {
                if !kinds.contains(&role) {
                    kinds.push(role);
                }
            }
        } else {
            rest.push(word);
        }
    }
    (rest.join(" "), kinds)
}
