use super::base::{Action, ActionKind, ClickTarget, ControlTarget, ScrollTarget};
use crate::core::environment::{SelectChoice, Selector, SelectorKind};
use crate::errors::{PilotError, Result};
use crate::types::Point;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

/// Wait applied when a policy asks to wait without saying for how long.
pub const DEFAULT_WAIT_SECONDS: f64 = 3.0;

/// `scroll_to_element` is either a flag paired with `selector`, or the selector itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrollToElement {
    Flag(bool),
    Selector(String),
}

/// The loose JSON shape a policy emits. Convert with `Action::try_from`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_type: Option<SelectorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_to_element: Option<ScrollToElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub completed_application: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ActionRequest {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            ..Default::default()
        }
    }

    fn declared_selector(&self) -> Option<Selector> {
        self.selector
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Selector::new(s, self.selector_type.unwrap_or_default()))
    }

    fn control_target(&self) -> Option<ControlTarget> {
        self.declared_selector().map(ControlTarget::Selector).or_else(|| {
            non_empty(&self.element_label).map(|label| ControlTarget::Label(label.to_string()))
        })
    }

    fn point(&self) -> Result<Option<Point>> {
        let Some(coords) = &self.coordinates else {
            return Ok(None);
        };
        match coords.as_slice() {
            [x, y] if x.is_finite() && y.is_finite() && *x >= 0.0 && *y >= 0.0 => {
                Ok(Some(Point::new(x.round() as u32, y.round() as u32)))
            }
            _ => Err(invalid(&self.action_type, "coordinates must be two non-negative numbers")),
        }
    }

    fn build_kind(&self) -> Result<ActionKind> {
        let kind = self.action_type.trim().to_ascii_lowercase();
        match kind.as_str() {
            "click" => {
                let target = if let Some(sel) = self.declared_selector() {
                    ClickTarget::Selector(sel)
                } else if let Some(point) = self.point()? {
                    ClickTarget::Coordinates(point)
                } else if let Some(text) = non_empty(&self.element_text) {
                    ClickTarget::Text(text.to_string())
                } else {
                    return Err(invalid(&kind, "needs a selector, coordinates or element_text"));
                };
                Ok(ActionKind::Click { target })
            }
            "type" => {
                let target = self
                    .control_target()
                    .ok_or_else(|| invalid(&kind, "needs a selector or element_label"))?;
                let text = self.text.clone().ok_or_else(|| invalid(&kind, "needs text"))?;
                Ok(ActionKind::Type { target, text })
            }
            "select" => {
                let target = self
                    .control_target()
                    .ok_or_else(|| invalid(&kind, "needs a selector or element_label"))?;
                let choice = if let Some(value) = non_empty(&self.value) {
                    SelectChoice::Value(value.to_string())
                } else if let Some(text) = non_empty(&self.visible_text) {
                    SelectChoice::VisibleText(text.to_string())
                } else if let Some(index) = self.index {
                    SelectChoice::Index(index)
                } else {
                    return Err(invalid(&kind, "needs a value, visible_text or index"));
                };
                Ok(ActionKind::Select { target, choice })
            }
            "scroll" => {
                let target = match (self.scroll_amount, &self.scroll_to_element) {
                    (Some(amount), _) if amount != 0 => ScrollTarget::By(amount),
                    (_, Some(ScrollToElement::Selector(sel))) if !sel.trim().is_empty() => ScrollTarget::IntoView(
                        Selector::new(sel.trim(), self.selector_type.unwrap_or_default()),
                    ),
                    (_, Some(ScrollToElement::Flag(true))) => ScrollTarget::IntoView(
                        self.declared_selector()
                            .ok_or_else(|| invalid(&kind, "scroll_to_element needs a selector"))?,
                    ),
                    _ => return Err(invalid(&kind, "needs scroll_amount or scroll_to_element")),
                };
                Ok(ActionKind::Scroll { target })
            }
            "wait" => {
                let seconds = self.wait_seconds.unwrap_or(DEFAULT_WAIT_SECONDS);
                if !seconds.is_finite() || seconds <= 0.0 {
                    return Err(invalid(&kind, "wait_seconds must be positive"));
                }
                Ok(ActionKind::Wait {
                    duration: Duration::from_secs_f64(seconds.min(u32::MAX as f64)),
                })
            }
            "navigate" => {
                let raw = non_empty(&self.url).ok_or_else(|| invalid(&kind, "needs a url"))?;
                let url = Url::parse(raw).map_err(|e| invalid(&kind, &format!("bad url '{}': {}", raw, e)))?;
                Ok(ActionKind::Navigate { url })
            }
            "next_job" => Ok(ActionKind::NextJob),
            "" => Err(PilotError::InvalidAction("missing action_type".to_string())),
            other => Err(PilotError::InvalidAction(format!("unknown action_type '{}'", other))),
        }
    }
}

impl TryFrom<ActionRequest> for Action {
    type Error = PilotError;

    fn try_from(request: ActionRequest) -> Result<Self> {
        let kind = request.build_kind()?;
        let action = Action {
            kind,
            reason: request.reason.filter(|r| !r.trim().is_empty()),
            completes_application: request.completed_application,
        };
        action.validate()?;
        Ok(action)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn invalid(action_type: &str, msg: &str) -> PilotError {
    PilotError::InvalidAction(format!("{}: {}", action_type, msg))
}

fn fenced_block() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").ok())
        .as_ref()
}

/// The first balanced `{...}` in `text`, honouring string literals.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a model's free-form reply into a request: a fenced JSON block wins,
/// otherwise the first JSON object in the text.
pub fn parse_request(reply: &str) -> Result<ActionRequest> {
    let body = fenced_block()
        .and_then(|re| re.captures(reply))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply);
    let json = first_object(body)
        .ok_or_else(|| PilotError::PolicyFailed("reply contains no JSON object".to_string()))?;
    serde_json::from_str(json).map_err(|e| PilotError::PolicyFailed(format!("unparseable reply: {}", e)))
}

/// Parse a model's reply straight into a validated action.
pub fn parse_policy_response(reply: &str) -> Result<Action> {
    let request = parse_request(reply)?;
    Action::try_from(request).map_err(|e| PilotError::PolicyFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_priority_prefers_selector() {
        let request = ActionRequest {
            selector: Some("#apply".into()),
            coordinates: Some(vec![10.0, 20.0]),
            element_text: Some("Apply".into()),
            ..ActionRequest::new("click")
        };
        let action = Action::try_from(request).unwrap();
        assert_eq!(
            action.kind,
            ActionKind::Click {
                target: ClickTarget::Selector(Selector::css("#apply"))
            }
        );

        let request = ActionRequest {
            coordinates: Some(vec![10.4, 19.6]),
            element_text: Some("Apply".into()),
            ..ActionRequest::new("click")
        };
        let action = Action::try_from(request).unwrap();
        assert_eq!(
            action.kind,
            ActionKind::Click {
                target: ClickTarget::Coordinates(Point::new(10, 20))
            }
        );
    }

    #[test]
    fn test_click_without_target_is_rejected() {
        let err = Action::try_from(ActionRequest::new("click")).unwrap_err();
        assert!(matches!(err, PilotError::InvalidAction(_)));

        let request = ActionRequest {
            coordinates: Some(vec![-4.0, 2.0]),
            ..ActionRequest::new("click")
        };
        assert!(Action::try_from(request).is_err());
    }

    #[test]
    fn test_select_priority() {
        let request = ActionRequest {
            element_label: Some("Notice period".into()),
            visible_text: Some("30 days".into()),
            index: Some(2),
            ..ActionRequest::new("select")
        };
        let action = Action::try_from(request).unwrap();
        assert_eq!(
            action.kind,
            ActionKind::Select {
                target: ControlTarget::Label("Notice period".into()),
                choice: SelectChoice::VisibleText("30 days".into()),
            }
        );

        let request = ActionRequest {
            selector: Some("notice".into()),
            selector_type: Some(SelectorKind::Name),
            ..ActionRequest::new("select")
        };
        assert!(Action::try_from(request).is_err());
    }

    #[test]
    fn test_wait_defaults_and_rejects_nonsense() {
        let action = Action::try_from(ActionRequest::new("wait")).unwrap();
        assert_eq!(
            action.kind,
            ActionKind::Wait {
                duration: Duration::from_secs(3)
            }
        );

        let request = ActionRequest {
            wait_seconds: Some(-1.0),
            ..ActionRequest::new("wait")
        };
        assert!(Action::try_from(request).is_err());
    }

    #[test]
    fn test_navigate_needs_absolute_url() {
        let request = ActionRequest {
            url: Some("/jobs/123".into()),
            ..ActionRequest::new("navigate")
        };
        assert!(Action::try_from(request).is_err());

        let request = ActionRequest {
            url: Some("https://example.com/jobs/123".into()),
            ..ActionRequest::new("navigate")
        };
        assert!(Action::try_from(request).is_ok());
    }

    #[test]
    fn test_scroll_forms() {
        let request = ActionRequest {
            scroll_amount: Some(400),
            ..ActionRequest::new("scroll")
        };
        assert_eq!(
            Action::try_from(request).unwrap().kind,
            ActionKind::Scroll {
                target: ScrollTarget::By(400)
            }
        );

        let request: ActionRequest =
            serde_json::from_str(r##"{"action_type": "scroll", "scroll_to_element": true, "selector": "#footer"}"##)
                .unwrap();
        assert_eq!(
            Action::try_from(request).unwrap().kind,
            ActionKind::Scroll {
                target: ScrollTarget::IntoView(Selector::css("#footer"))
            }
        );
    }

    #[test]
    fn test_parses_fenced_reply() {
        let reply = "Sure, here is the next step:\n```json\n{\"action_type\": \"type\", \"element_label\": \"Email\", \"text\": \"a@b.co\", \"reason\": \"fill email\"}\n```\nLet me know.";
        let action = parse_policy_response(reply).unwrap();
        assert_eq!(action.name(), "type");
        assert_eq!(action.reason.as_deref(), Some("fill email"));
    }

    #[test]
    fn test_parses_object_with_trailing_prose() {
        let reply = r#"{"action_type": "click", "element_text": "Apply {now}", "completed_application": true} I chose this because it submits."#;
        let action = parse_policy_response(reply).unwrap();
        assert!(action.completes_application);
        assert_eq!(
            action.kind,
            ActionKind::Click {
                target: ClickTarget::Text("Apply {now}".into())
            }
        );
    }

    #[test]
    fn test_unparseable_reply_is_a_policy_failure() {
        assert!(matches!(
            parse_policy_response("I am not sure what to do."),
            Err(PilotError::PolicyFailed(_))
        ));
        assert!(matches!(
            parse_policy_response(r#"{"reason": "no type"}"#),
            Err(PilotError::PolicyFailed(_))
        ));
    }
}
