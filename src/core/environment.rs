use crate::errors::EnvironmentError;
use crate::types::Point;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

pub type EnvResult<T> = std::result::Result<T, EnvironmentError>;

/// How a selector string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    #[default]
    #[serde(alias = "css_selector")]
    Css,
    Xpath,
    Id,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    pub value: String,
    #[serde(default)]
    pub kind: SelectorKind,
}

impl Selector {
    pub fn new(value: impl Into<String>, kind: SelectorKind) -> Self {
        Self {
            value: value.into(),
            kind,
        }
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(value, SelectorKind::Css)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(value, SelectorKind::Xpath)
    }

    /// Id and name selectors expressed as CSS attribute selectors; CSS and
    /// XPath selectors are returned as they are.
    pub fn normalized(&self) -> Selector {
        match self.kind {
            SelectorKind::Css | SelectorKind::Xpath => self.clone(),
            SelectorKind::Id => Selector::css(format!("[id={}]", quote_css(&self.value))),
            SelectorKind::Name => Selector::css(format!("[name={}]", quote_css(&self.value))),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.value)
    }
}

fn quote_css(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A resolved element. Holds a locator, never a live node, so it stays valid
/// only as long as the page does.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub selector: Selector,
    pub description: String,
}

impl ElementRef {
    pub fn new(selector: Selector, description: impl Into<String>) -> Self {
        Self {
            selector,
            description: description.into(),
        }
    }
}

/// How a select control picks its option, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectChoice {
    Value(String),
    VisibleText(String),
    Index(usize),
}

/// The live, mutable UI the executor acts on.
///
/// Each primitive fails with `ElementNotFound` when its target is gone and
/// with `Fault` when the session itself is unusable.
#[async_trait]
pub trait Environment: Send + Sync {
    async fn resolve_by_selector(&self, selector: &Selector) -> EnvResult<ElementRef>;

    /// Fuzzy visible-text match.
    async fn resolve_by_text(&self, text: &str) -> EnvResult<ElementRef>;

    /// The first input following a label with the given text.
    async fn resolve_input_by_label(&self, label: &str) -> EnvResult<ElementRef>;

    async fn click(&self, element: &ElementRef) -> EnvResult<()>;

    async fn click_at(&self, point: Point) -> EnvResult<()>;

    async fn clear(&self, element: &ElementRef) -> EnvResult<()>;

    async fn send_keys(&self, element: &ElementRef, text: &str) -> EnvResult<()>;

    async fn select_option(&self, element: &ElementRef, choice: &SelectChoice) -> EnvResult<()>;

    async fn scroll_by(&self, dy: i64) -> EnvResult<()>;

    async fn scroll_into_view(&self, element: &ElementRef) -> EnvResult<()>;

    async fn navigate_to(&self, url: &Url) -> EnvResult<()>;

    async fn current_location(&self) -> EnvResult<String>;

    async fn refresh(&self) -> EnvResult<()>;

    async fn go_back(&self) -> EnvResult<()>;
}
