use crate::core::environment::{SelectChoice, Selector};
use crate::errors::{EnvironmentError, PilotError, Result};
use crate::types::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Where a click lands, in resolution priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickTarget {
    Selector(Selector),
    Coordinates(Point),
    Text(String),
}

/// An input or select control, by selector or by its label text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlTarget {
    Selector(Selector),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollTarget {
    /// Relative vertical offset in pixels.
    By(i64),
    IntoView(Selector),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ActionKind {
    Click { target: ClickTarget },
    Type { target: ControlTarget, text: String },
    Select { target: ControlTarget, choice: SelectChoice },
    Scroll { target: ScrollTarget },
    Wait { duration: Duration },
    Navigate { url: Url },
    NextJob,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Click { .. } => "click",
            ActionKind::Type { .. } => "type",
            ActionKind::Select { .. } => "select",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Wait { .. } => "wait",
            ActionKind::Navigate { .. } => "navigate",
            ActionKind::NextJob => "next_job",
        }
    }
}

/// One proposed interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default)]
    pub reason: Option<String>,
    /// Set when a verified success of this action means an application went in.
    #[serde(default)]
    pub completes_application: bool,
}

impl Action {
    /// Build an action, rejecting one whose required parameters are empty.
    pub fn new(kind: ActionKind) -> Result<Self> {
        let action = Self {
            kind,
            reason: None,
            completes_application: false,
        };
        action.validate()?;
        Ok(action)
    }

    pub fn click(target: ClickTarget) -> Result<Self> {
        Self::new(ActionKind::Click { target })
    }

    pub fn type_text(target: ControlTarget, text: impl Into<String>) -> Result<Self> {
        Self::new(ActionKind::Type {
            target,
            text: text.into(),
        })
    }

    pub fn wait(duration: Duration) -> Result<Self> {
        Self::new(ActionKind::Wait { duration })
    }

    pub fn next_job() -> Self {
        Self {
            kind: ActionKind::NextJob,
            reason: None,
            completes_application: false,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn completing(mut self) -> Self {
        self.completes_application = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Check the parameter subset the action type requires.
    ///
    /// Variants make most invalid combinations unrepresentable; this catches
    /// the empty strings and values that serde or callers can still produce.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(PilotError::InvalidAction(format!("{}: {}", self.name(), msg)));
        match &self.kind {
            ActionKind::Click { target } => match target {
                ClickTarget::Selector(sel) if sel.value.trim().is_empty() => invalid("empty selector"),
                ClickTarget::Text(text) if text.trim().is_empty() => invalid("empty element text"),
                _ => Ok(()),
            },
            ActionKind::Type { target, .. } => validate_control(target).or_else(|m| invalid(m)),
            ActionKind::Select { target, choice } => {
                validate_control(target).or_else(|m| invalid(m))?;
                match choice {
                    SelectChoice::Value(v) | SelectChoice::VisibleText(v) if v.is_empty() => {
                        invalid("empty selection")
                    }
                    _ => Ok(()),
                }
            }
            ActionKind::Scroll { target } => match target {
                ScrollTarget::By(0) => invalid("zero scroll amount"),
                ScrollTarget::IntoView(sel) if sel.value.trim().is_empty() => invalid("empty selector"),
                _ => Ok(()),
            },
            ActionKind::Wait { duration } if duration.is_zero() => invalid("zero wait"),
            ActionKind::Navigate { url } if url.cannot_be_a_base() => invalid("url is not navigable"),
            _ => Ok(()),
        }
    }
}

fn validate_control(target: &ControlTarget) -> std::result::Result<(), &'static str> {
    match target {
        ControlTarget::Selector(sel) if sel.value.trim().is_empty() => Err("empty selector"),
        ControlTarget::Label(label) if label.trim().is_empty() => Err("empty label"),
        _ => Ok(()),
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::Click { target } => match target {
                ClickTarget::Selector(sel) => write!(f, "click {}", sel),
                ClickTarget::Coordinates(p) => write!(f, "click at ({}, {})", p.x, p.y),
                ClickTarget::Text(text) => write!(f, "click '{}'", text),
            },
            ActionKind::Type { target, .. } => write!(f, "type into {:?}", target),
            ActionKind::Select { target, choice } => write!(f, "select {:?} in {:?}", choice, target),
            ActionKind::Scroll { target } => write!(f, "scroll {:?}", target),
            ActionKind::Wait { duration } => write!(f, "wait {}ms", duration.as_millis()),
            ActionKind::Navigate { url } => write!(f, "navigate to {}", url),
            ActionKind::NextJob => write!(f, "next job"),
        }
    }
}

/// Why an action did not take effect.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionFailure {
    /// Required parameters missing; nothing was touched.
    #[error("Invalid action: {0}")]
    Invalid(String),

    /// The target could not be resolved; nothing was touched.
    #[error("Could not resolve target: {0}")]
    Unresolved(String),

    /// A primitive ran and failed; the page may be partially changed.
    #[error("Execution failed: {0}")]
    Execution(String),
}

/// Result of one executor call.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Succeeded { completes_application: bool },
    Failed(ActionFailure),
    /// The session itself is unusable.
    EnvironmentFault(EnvironmentError),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Succeeded { .. })
    }
}

/// An outcome plus how long the attempt took.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub action: Action,
    pub outcome: ActionOutcome,
    pub execution_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_parameters_are_rejected() {
        assert!(Action::click(ClickTarget::Text("  ".into())).is_err());
        assert!(Action::click(ClickTarget::Selector(Selector::css(""))).is_err());
        assert!(Action::type_text(ControlTarget::Label(String::new()), "x").is_err());
        assert!(Action::wait(Duration::ZERO).is_err());
        assert!(Action::new(ActionKind::Select {
            target: ControlTarget::Selector(Selector::css("#country")),
            choice: SelectChoice::Value(String::new()),
        })
        .is_err());
        assert!(Action::new(ActionKind::Scroll {
            target: ScrollTarget::By(0)
        })
        .is_err());
    }

    #[test]
    fn test_valid_actions_build() {
        let click = Action::click(ClickTarget::Coordinates(Point::new(10, 20)))
            .unwrap()
            .with_reason("apply button")
            .completing();
        assert_eq!(click.name(), "click");
        assert!(click.completes_application);
        assert_eq!(click.to_string(), "click at (10, 20)");

        let select = Action::new(ActionKind::Select {
            target: ControlTarget::Label("Experience".into()),
            choice: SelectChoice::Index(0),
        });
        assert!(select.is_ok());
    }

    #[test]
    fn test_action_serializes_with_type_tag() {
        let action = Action::next_job().with_reason("not a fit");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action_type"], "next_job");
        assert_eq!(json["reason"], "not a fit");
    }
}
