//! In-memory page driver.
//!
//! `FixturePage` models just enough of a DOM (tree, attributes, own text, visibility,
//! layout boxes) to evaluate every [`Query`] the resolution core issues. Layout boxes can
//! be scripted with motion frames so stability sampling sees an element mid-transition.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::errors::PortError;
use crate::model::{
    normalize_ident, normalize_text, BoundingBox, ContentFingerprint, ElementState, NodeRef,
    PageSignals, Query,
};
use crate::port::PagePort;

const TEST_ID_ATTRS: [&str; 5] = ["data-testid", "data-test", "data-test-id", "data-qa", "data-cy"];

/// Builder for one fixture element.
#[derive(Clone, Debug)]
pub struct FixtureNode {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    visible: bool,
    obscured: bool,
    bbox: Option<BoundingBox>,
    motion: VecDeque<BoundingBox>,
}

impl FixtureNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            visible: true,
            obscured: false,
            bbox: None,
            motion: VecDeque::new(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn obscured(mut self) -> Self {
        self.obscured = true;
        self
    }

    pub fn bbox(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bbox = Some(BoundingBox::new(x, y, width, height));
        self
    }

    /// Frames returned by successive layout reads before the box settles on the last one.
    pub fn moving(mut self, frames: impl IntoIterator<Item = BoundingBox>) -> Self {
        self.motion = frames.into_iter().collect();
        self
    }
}

#[derive(Debug)]
struct Slot {
    node: FixtureNode,
    bbox: BoundingBox,
    parent: Option<u64>,
    children: Vec<u64>,
}

#[derive(Debug, Default)]
struct FixtureDom {
    url: String,
    markers: Vec<String>,
    idle_delay: Duration,
    slots: HashMap<u64, Slot>,
    roots: Vec<u64>,
    next_id: u64,
}

/// In-memory [`PagePort`] implementation.
#[derive(Debug, Default)]
pub struct FixturePage {
    dom: RwLock<FixtureDom>,
    queries: AtomicU64,
}

impl FixturePage {
    pub fn new(url: impl Into<String>) -> Self {
        let page = Self::default();
        page.dom.write().url = url.into();
        page
    }

    /// Append `node` under `parent` (or as a document root).
    pub fn add(&self, parent: Option<&NodeRef>, node: FixtureNode) -> NodeRef {
        let mut dom = self.dom.write();
        dom.next_id += 1;
        let id = dom.next_id;
        let bbox = node
            .bbox
            .unwrap_or_else(|| BoundingBox::new(0.0, 24.0 * id as f64, 160.0, 22.0));
        let description = describe(&node);
        let parent_id = parent.map(|p| p.node_id).filter(|p| dom.slots.contains_key(p));
        dom.slots.insert(
            id,
            Slot {
                node,
                bbox,
                parent: parent_id,
                children: Vec::new(),
            },
        );
        match parent_id {
            Some(pid) => {
                if let Some(slot) = dom.slots.get_mut(&pid) {
                    slot.children.push(id);
                }
            }
            None => dom.roots.push(id),
        }
        NodeRef::new(id, description)
    }

    pub fn set_attr(&self, node: &NodeRef, key: &str, value: &str) {
        if let Some(slot) = self.dom.write().slots.get_mut(&node.node_id) {
            slot.node.attrs.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&self, node: &NodeRef, key: &str) {
        if let Some(slot) = self.dom.write().slots.get_mut(&node.node_id) {
            slot.node.attrs.remove(key);
        }
    }

    pub fn set_text(&self, node: &NodeRef, text: &str) {
        if let Some(slot) = self.dom.write().slots.get_mut(&node.node_id) {
            slot.node.text = text.to_string();
        }
    }

    pub fn set_visible(&self, node: &NodeRef, visible: bool) {
        if let Some(slot) = self.dom.write().slots.get_mut(&node.node_id) {
            slot.node.visible = visible;
        }
    }

    pub fn set_obscured(&self, node: &NodeRef, obscured: bool) {
        if let Some(slot) = self.dom.write().slots.get_mut(&node.node_id) {
            slot.node.obscured = obscured;
        }
    }

    pub fn set_motion(&self, node: &NodeRef, frames: impl IntoIterator<Item = BoundingBox>) {
        if let Some(slot) = self.dom.write().slots.get_mut(&node.node_id) {
            slot.node.motion = frames.into_iter().collect();
        }
    }

    /// Detach `node` and its subtree.
    pub fn remove(&self, node: &NodeRef) {
        let mut dom = self.dom.write();
        let Some(slot) = dom.slots.get(&node.node_id) else {
            return;
        };
        let parent = slot.parent;
        let doomed = subtree(&dom, node.node_id);
        for id in doomed {
            dom.slots.remove(&id);
        }
        match parent {
            Some(pid) => {
                if let Some(p) = dom.slots.get_mut(&pid) {
                    p.children.retain(|c| *c != node.node_id);
                }
            }
            None => dom.roots.retain(|r| *r != node.node_id),
        }
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.dom.write().url = url.into();
    }

    pub fn set_framework_markers<I, S>(&self, markers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dom.write().markers = markers.into_iter().map(Into::into).collect();
    }

    /// Simulated time until the page is idle.
    pub fn set_idle_delay(&self, delay: Duration) {
        self.dom.write().idle_delay = delay;
    }

    /// Number of queries evaluated so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    fn slot_ref(dom: &FixtureDom, node: &NodeRef) -> Result<(), PortError> {
        if dom.slots.contains_key(&node.node_id) {
            Ok(())
        } else {
            Err(PortError::Detached(node.node_id))
        }
    }
}

#[async_trait]
impl PagePort for FixturePage {
    async fn query(&self, root: Option<&NodeRef>, query: &Query) -> Result<Vec<NodeRef>, PortError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let dom = self.dom.read();
        let scope: Vec<u64> = match root {
            Some(root) => {
                Self::slot_ref(&dom, root)?;
                subtree(&dom, root.node_id)
                    .into_iter()
                    .filter(|id| *id != root.node_id)
                    .collect()
            }
            None => document_order(&dom),
        };
        let matches = scope
            .into_iter()
            .filter(|id| matches_query(&dom, *id, query))
            .filter_map(|id| dom.slots.get(&id).map(|s| NodeRef::new(id, describe(&s.node))))
            .collect();
        Ok(matches)
    }

    async fn inspect(&self, node: &NodeRef) -> Result<ElementState, PortError> {
        let dom = self.dom.read();
        let slot = dom
            .slots
            .get(&node.node_id)
            .ok_or(PortError::Detached(node.node_id))?;
        let attrs = &slot.node.attrs;
        Ok(ElementState {
            tag: slot.node.tag.clone(),
            input_type: attrs.get("type").cloned(),
            role: effective_role(&slot.node),
            accessible_name: accessible_name(&dom, node.node_id),
            content_editable: attrs
                .get("contenteditable")
                .map_or(false, |v| v.is_empty() || v == "true"),
            visible: effectively_visible(&dom, node.node_id),
            obscured: slot.node.obscured,
            disabled: attrs.contains_key("disabled") || flag(attrs, "aria-disabled"),
            readonly: attrs.contains_key("readonly") || flag(attrs, "aria-readonly"),
            bbox: Some(slot.bbox),
        })
    }

    async fn bounding_box(&self, node: &NodeRef) -> Result<Option<BoundingBox>, PortError> {
        let mut dom = self.dom.write();
        let visible = effectively_visible(&dom, node.node_id);
        let slot = dom
            .slots
            .get_mut(&node.node_id)
            .ok_or(PortError::Detached(node.node_id))?;
        if let Some(frame) = slot.node.motion.pop_front() {
            slot.bbox = frame;
        }
        Ok(visible.then_some(slot.bbox))
    }

    async fn contains(&self, ancestor: &NodeRef, node: &NodeRef) -> Result<bool, PortError> {
        let dom = self.dom.read();
        Self::slot_ref(&dom, ancestor)?;
        Self::slot_ref(&dom, node)?;
        let mut cursor = dom.slots.get(&node.node_id).and_then(|s| s.parent);
        while let Some(id) = cursor {
            if id == ancestor.node_id {
                return Ok(true);
            }
            cursor = dom.slots.get(&id).and_then(|s| s.parent);
        }
        Ok(false)
    }

    async fn region_fingerprint(&self, node: &NodeRef) -> Result<ContentFingerprint, PortError> {
        let dom = self.dom.read();
        let slot = dom
            .slots
            .get(&node.node_id)
            .ok_or(PortError::Detached(node.node_id))?;
        let region_root = slot.parent.unwrap_or(node.node_id);
        let parts: Vec<String> = subtree(&dom, region_root)
            .into_iter()
            .filter_map(|id| dom.slots.get(&id))
            .map(|s| canonical(&s.node))
            .collect();
        Ok(ContentFingerprint::from_parts(parts))
    }

    async fn wait_for_idle(&self, timeout: Duration) -> Result<(), PortError> {
        let delay = self.dom.read().idle_delay;
        if delay.is_zero() {
            return Ok(());
        }
        if delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(PortError::Timeout(format!(
                "page not idle after {}ms",
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn page_signals(&self) -> Result<PageSignals, PortError> {
        let dom = self.dom.read();
        Ok(PageSignals {
            url: dom.url.clone(),
            framework_markers: dom.markers.clone(),
        })
    }
}

fn describe(node: &FixtureNode) -> String {
    match node.attrs.get("id") {
        Some(id) => format!("{}#{}", node.tag, id),
        None => node.tag.clone(),
    }
}

fn canonical(node: &FixtureNode) -> String {
    let attrs: Vec<String> = node
        .attrs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    format!("{}|{}|{}", node.tag, attrs.join(";"), node.text.trim())
}

fn flag(attrs: &BTreeMap<String, String>, key: &str) -> bool {
    attrs.get(key).map_or(false, |v| v == "true")
}

fn document_order(dom: &FixtureDom) -> Vec<u64> {
    dom.roots
        .iter()
        .flat_map(|root| subtree(dom, *root))
        .collect()
}

/// Pre-order walk including `root`.
fn subtree(dom: &FixtureDom, root: u64) -> Vec<u64> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if let Some(slot) = dom.slots.get(&id) {
            out.push(id);
            stack.extend(slot.children.iter().rev().copied());
        }
    }
    out
}

fn full_text(dom: &FixtureDom, id: u64) -> String {
    subtree(dom, id)
        .into_iter()
        .filter_map(|n| dom.slots.get(&n))
        .map(|s| s.node.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn effectively_visible(dom: &FixtureDom, id: u64) -> bool {
    let mut cursor = Some(id);
    while let Some(current) = cursor {
        let Some(slot) = dom.slots.get(&current) else {
            return false;
        };
        if !slot.node.visible
            || slot.node.attrs.contains_key("hidden")
            || flag(&slot.node.attrs, "aria-hidden")
        {
            return false;
        }
        cursor = slot.parent;
    }
    true
}

fn effective_role(node: &FixtureNode) -> Option<String> {
    if let Some(role) = node.attrs.get("role") {
        return Some(role.to_ascii_lowercase());
    }
    let role = match node.tag.as_str() {
        "button" => "button",
        "a" if node.attrs.contains_key("href") => "link",
        "input" => match node.attrs.get("type").map(|t| t.to_ascii_lowercase()).as_deref() {
            Some("checkbox") => "checkbox",
            Some("radio") => "radio",
            Some("submit") | Some("button") | Some("reset") | Some("image") => "button",
            Some("search") => "searchbox",
            Some("number") => "spinbutton",
            Some("hidden") => return None,
            _ => "textbox",
        },
        "textarea" => "textbox",
        "select" if node.attrs.contains_key("multiple") => "listbox",
        "select" => "combobox",
        "option" => "option",
        "dialog" => "dialog",
        "img" => "img",
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
        _ => return None,
    };
    Some(role.to_string())
}

fn is_interactive(node: &FixtureNode) -> bool {
    matches!(
        node.tag.as_str(),
        "input" | "select" | "textarea" | "button" | "a"
    ) || node.attrs.contains_key("contenteditable")
        || matches!(
            effective_role(node).as_deref(),
            Some(
                "button"
                    | "link"
                    | "textbox"
                    | "searchbox"
                    | "combobox"
                    | "listbox"
                    | "checkbox"
                    | "radio"
                    | "switch"
                    | "menuitem"
                    | "tab"
                    | "option"
            )
        )
}

/// Names contributed by label linkage only (no content, no placeholder).
fn label_names(dom: &FixtureDom, id: u64) -> Vec<String> {
    let Some(slot) = dom.slots.get(&id) else {
        return Vec::new();
    };
    let mut names = Vec::new();
    if let Some(label) = slot.node.attrs.get("aria-label") {
        names.push(label.clone());
    }
    if let Some(ids) = slot.node.attrs.get("aria-labelledby") {
        let joined = ids
            .split_whitespace()
            .filter_map(|ref_id| find_by_id(dom, ref_id))
            .map(|n| full_text(dom, n))
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            names.push(joined);
        }
    }
    if let Some(own_id) = slot.node.attrs.get("id") {
        for other in document_order(dom) {
            if let Some(o) = dom.slots.get(&other) {
                if o.node.tag == "label" && o.node.attrs.get("for") == Some(own_id) {
                    names.push(full_text(dom, other));
                }
            }
        }
    }
    let mut cursor = slot.parent;
    while let Some(pid) = cursor {
        let Some(p) = dom.slots.get(&pid) else { break };
        if p.node.tag == "label" && !p.node.attrs.contains_key("for") {
            names.push(full_text(dom, pid));
            break;
        }
        cursor = p.parent;
    }
    names
}

fn accessible_name(dom: &FixtureDom, id: u64) -> Option<String> {
    if let Some(name) = label_names(dom, id).into_iter().find(|n| !n.trim().is_empty()) {
        return Some(name);
    }
    let slot = dom.slots.get(&id)?;
    let from_content = matches!(
        effective_role(&slot.node).as_deref(),
        Some("button" | "link" | "menuitem" | "tab" | "option" | "heading" | "dialog")
    );
    if from_content {
        let text = full_text(dom, id);
        if !text.is_empty() {
            return Some(text);
        }
    }
    slot.node.attrs.get("title").cloned()
}

fn find_by_id(dom: &FixtureDom, wanted: &str) -> Option<u64> {
    document_order(dom).into_iter().find(|id| {
        dom.slots
            .get(id)
            .map_or(false, |s| s.node.attrs.get("id").map(String::as_str) == Some(wanted))
    })
}

fn previous_sibling(dom: &FixtureDom, id: u64) -> Option<u64> {
    let parent = dom.slots.get(&id)?.parent;
    let siblings = match parent {
        Some(pid) => &dom.slots.get(&pid)?.children,
        None => &dom.roots,
    };
    let pos = siblings.iter().position(|s| *s == id)?;
    pos.checked_sub(1).map(|p| siblings[p])
}

fn matches_query(dom: &FixtureDom, id: u64, query: &Query) -> bool {
    let Some(slot) = dom.slots.get(&id) else {
        return false;
    };
    let node = &slot.node;
    match query {
        Query::Label { text } => {
            let wanted = normalize_text(text);
            label_names(dom, id)
                .iter()
                .any(|name| normalize_text(name) == wanted)
        }
        Query::Placeholder { text } => node
            .attrs
            .get("placeholder")
            .map_or(false, |p| normalize_text(p) == normalize_text(text)),
        Query::NameOrId { value } => {
            let wanted = normalize_ident(value);
            !wanted.is_empty()
                && ["name", "id"].iter().any(|attr| {
                    node.attrs
                        .get(*attr)
                        .map_or(false, |v| normalize_ident(v) == wanted)
                })
        }
        Query::Role { roles, name } => {
            let Some(role) = effective_role(node) else {
                return false;
            };
            if !roles.iter().any(|r| r.eq_ignore_ascii_case(&role)) {
                return false;
            }
            match name {
                Some(name) => accessible_name(dom, id)
                    .map_or(false, |n| normalize_text(&n) == normalize_text(name)),
                None => true,
            }
        }
        Query::TestId { value } => {
            let wanted = normalize_ident(value);
            !wanted.is_empty()
                && TEST_ID_ATTRS.iter().any(|attr| {
                    node.attrs
                        .get(*attr)
                        .map_or(false, |v| normalize_ident(v) == wanted)
                })
        }
        Query::NearText { text } => {
            if !is_interactive(node) {
                return false;
            }
            let wanted = normalize_text(text);
            let sibling_match = previous_sibling(dom, id)
                .map_or(false, |s| normalize_text(&full_text(dom, s)) == wanted);
            let parent_match = slot
                .parent
                .and_then(|p| dom.slots.get(&p))
                .map_or(false, |p| normalize_text(&p.node.text) == wanted);
            sibling_match || parent_match
        }
        Query::Text { text } => {
            !node.text.trim().is_empty() && normalize_text(&node.text) == normalize_text(text)
        }
        Query::Heuristic { fragment } => {
            let wanted = normalize_ident(fragment);
            if wanted.is_empty() {
                return false;
            }
            let id_hit = node
                .attrs
                .get("id")
                .map_or(false, |v| normalize_ident(v).contains(&wanted));
            let class_hit = node.attrs.get("class").map_or(false, |classes| {
                classes
                    .split_whitespace()
                    .any(|c| normalize_ident(c).contains(&wanted))
            });
            id_hit || class_hit
        }
    }
}
