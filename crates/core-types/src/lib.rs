//! Shared primitives for the healkit element resolution kernel.
//!
//! Every other crate in the workspace speaks in these types: the planner hands us an
//! [`Intent`], discovery tags its matches with a [`StrategyId`] and a
//! [`StabilityClass`], and the runtime profile decides which timeout/TTL column applies.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

/// Shared error type for parsing and validating core primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown {kind}: {value}")]
    Unknown { kind: &'static str, value: String },

    #[error("invalid intent: {0}")]
    InvalidIntent(String),
}

impl CoreError {
    fn unknown(kind: &'static str, value: &str) -> Self {
        Self::Unknown {
            kind,
            value: value.to_string(),
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StepId(pub String);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the planner wants done with the element once it is found.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ActionKind {
    Fill,
    Click,
    Select,
    Check,
    Hover,
    Read,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Fill => "fill",
            ActionKind::Click => "click",
            ActionKind::Select => "select",
            ActionKind::Check => "check",
            ActionKind::Hover => "hover",
            ActionKind::Read => "read",
        }
    }

    /// Whether an element of `kind` can receive this action.
    pub fn accepts(&self, kind: ElementKind) -> bool {
        match self {
            ActionKind::Fill => matches!(
                kind,
                ElementKind::TextInput | ElementKind::TextArea | ElementKind::ContentEditable
            ),
            ActionKind::Select => matches!(kind, ElementKind::Select),
            ActionKind::Check => matches!(kind, ElementKind::Checkable),
            ActionKind::Click | ActionKind::Hover | ActionKind::Read => true,
        }
    }

    /// ARIA roles an element must carry to be a plausible target of this action.
    pub fn candidate_roles(&self) -> &'static [&'static str] {
        match self {
            ActionKind::Fill => &["textbox", "searchbox", "combobox", "spinbutton"],
            ActionKind::Click => &["button", "link", "menuitem", "tab", "option"],
            ActionKind::Select => &["combobox", "listbox"],
            ActionKind::Check => &["checkbox", "radio", "switch"],
            ActionKind::Hover | ActionKind::Read => &[
                "button", "link", "menuitem", "tab", "textbox", "heading", "img",
            ],
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fill" | "type" | "type_text" => Ok(ActionKind::Fill),
            "click" | "press" => Ok(ActionKind::Click),
            "select" | "select_option" => Ok(ActionKind::Select),
            "check" | "uncheck" | "toggle" => Ok(ActionKind::Check),
            "hover" => Ok(ActionKind::Hover),
            "read" | "assert" => Ok(ActionKind::Read),
            other => Err(CoreError::unknown("action kind", other)),
        }
    }
}

/// Coarse classification of an element for action compatibility.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ElementKind {
    TextInput,
    TextArea,
    ContentEditable,
    Select,
    Checkable,
    Button,
    Link,
    Other,
}

impl ElementKind {
    /// Classify from tag name, `type` attribute, explicit role and contenteditable flag.
    pub fn classify(
        tag: &str,
        input_type: Option<&str>,
        role: Option<&str>,
        content_editable: bool,
    ) -> Self {
        if content_editable {
            return ElementKind::ContentEditable;
        }
        let tag = tag.to_ascii_lowercase();
        match tag.as_str() {
            "input" => {
                let ty = input_type
                    .map(|t| t.trim().to_ascii_lowercase())
                    .unwrap_or_else(|| "text".to_string());
                match ty.as_str() {
                    "checkbox" | "radio" => ElementKind::Checkable,
                    "button" | "submit" | "reset" | "image" => ElementKind::Button,
                    "hidden" | "file" | "range" | "color" => ElementKind::Other,
                    _ => ElementKind::TextInput,
                }
            }
            "textarea" => ElementKind::TextArea,
            "select" => ElementKind::Select,
            "button" => ElementKind::Button,
            "a" => ElementKind::Link,
            _ => match role.map(|r| r.to_ascii_lowercase()).as_deref() {
                Some("textbox") | Some("searchbox") | Some("spinbutton") => {
                    ElementKind::TextInput
                }
                Some("combobox") | Some("listbox") => ElementKind::Select,
                Some("checkbox") | Some("radio") | Some("switch") => ElementKind::Checkable,
                Some("button") | Some("menuitem") | Some("tab") => ElementKind::Button,
                Some("link") => ElementKind::Link,
                _ => ElementKind::Other,
            },
        }
    }
}

/// Whether a discovered locator is trustworthy enough to be cached.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StabilityClass {
    Stable,
    Volatile,
}

impl StabilityClass {
    pub fn is_stable(&self) -> bool {
        matches!(self, StabilityClass::Stable)
    }
}

/// Page classification driving timeout and TTL policy.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RuntimeProfile {
    Static,
    Dynamic,
}

impl RuntimeProfile {
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeProfile::Static => "static",
            RuntimeProfile::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for RuntimeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RuntimeProfile {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(RuntimeProfile::Static),
            "dynamic" => Ok(RuntimeProfile::Dynamic),
            other => Err(CoreError::unknown("runtime profile", other)),
        }
    }
}

/// Discovery strategies, declared in canonical priority order.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum StrategyId {
    SemanticLabel,
    Placeholder,
    NameOrId,
    RoleName,
    TestId,
    NearbyText,
    VisibleText,
    GeneratedHeuristic,
}

impl StrategyId {
    pub const ALL: [StrategyId; 8] = [
        StrategyId::SemanticLabel,
        StrategyId::Placeholder,
        StrategyId::NameOrId,
        StrategyId::RoleName,
        StrategyId::TestId,
        StrategyId::NearbyText,
        StrategyId::VisibleText,
        StrategyId::GeneratedHeuristic,
    ];

    /// 1-based tier in the default ladder.
    pub fn tier(&self) -> u8 {
        match self {
            StrategyId::SemanticLabel => 1,
            StrategyId::Placeholder => 2,
            StrategyId::NameOrId => 3,
            StrategyId::RoleName => 4,
            StrategyId::TestId => 5,
            StrategyId::NearbyText => 6,
            StrategyId::VisibleText => 7,
            StrategyId::GeneratedHeuristic => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyId::SemanticLabel => "semantic_label",
            StrategyId::Placeholder => "placeholder",
            StrategyId::NameOrId => "name_or_id",
            StrategyId::RoleName => "role_name",
            StrategyId::TestId => "test_id",
            StrategyId::NearbyText => "nearby_text",
            StrategyId::VisibleText => "visible_text",
            StrategyId::GeneratedHeuristic => "generated_heuristic",
        }
    }

    pub fn from_tier(tier: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.tier() == tier)
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.name() == needle)
            .ok_or_else(|| CoreError::unknown("strategy", s))
    }
}

/// Where a successful resolution came from.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "kebab-case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ResolutionSource {
    CacheFast,
    CacheDurable,
    Discovery,
    Healed,
}

impl ResolutionSource {
    pub fn name(&self) -> &'static str {
        match self {
            ResolutionSource::CacheFast => "cache-fast",
            ResolutionSource::CacheDurable => "cache-durable",
            ResolutionSource::Discovery => "discovery",
            ResolutionSource::Healed => "healed",
        }
    }
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A planner-issued request to locate and act on one page element.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Intent {
    pub element_name: String,
    pub action: ActionKind,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub value: Option<String>,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub scope_hint: Option<String>,
    /// Alternate container tried when `scope_hint` is not open.
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub fallback_scope: Option<String>,
    /// 1-based position among equally plausible matches, in document order.
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub ordinal: Option<usize>,
}

impl Intent {
    pub fn new(element_name: impl Into<String>, action: ActionKind) -> Self {
        Self {
            element_name: element_name.into(),
            action,
            value: None,
            scope_hint: None,
            fallback_scope: None,
            ordinal: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_scope(mut self, hint: impl Into<String>) -> Self {
        self.scope_hint = Some(hint.into());
        self
    }

    pub fn with_fallback_scope(mut self, hint: impl Into<String>) -> Self {
        self.fallback_scope = Some(hint.into());
        self
    }

    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.element_name.trim().is_empty() {
            return Err(CoreError::InvalidIntent("empty element name".into()));
        }
        if self.ordinal == Some(0) {
            return Err(CoreError::InvalidIntent("ordinal is 1-based".into()));
        }
        Ok(())
    }
}
