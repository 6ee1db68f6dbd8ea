use crate::actions::{Action, ActionKind, ActionRequest};
use crate::core::session::SessionState;
use crate::core::sources::{join_tokens, TextToken};
use crate::errors::{PilotError, Result};
use crate::vision::{FrameSummary, UiElement};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Characters of extracted text included in a rendered prompt.
pub const PROMPT_TEXT_LIMIT: usize = 3000;
/// Elements listed in a rendered prompt.
pub const PROMPT_ELEMENT_LIMIT: usize = 20;

/// What failed in the previous attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailedStep {
    Action { action: Action },
    Decision { reason: String },
}

/// Tells the policy that its previous proposal did not work out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAnnotation {
    pub failed: FailedStep,
    pub reason: String,
}

impl FailureAnnotation {
    pub fn action(action: Action, reason: impl Into<String>) -> Self {
        Self {
            failed: FailedStep::Action { action },
            reason: reason.into(),
        }
    }

    pub fn decision(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            failed: FailedStep::Decision {
                reason: reason.clone(),
            },
            reason,
        }
    }

    /// Human-readable note for the prompt.
    pub fn describe(&self) -> String {
        match &self.failed {
            FailedStep::Action { action } => {
                let hint = match action.kind {
                    ActionKind::Click { .. } => {
                        " The element might be obscured, not clickable, or not present."
                    }
                    ActionKind::Type { .. } => " The input field might not be editable or not present.",
                    _ => "",
                };
                format!(
                    "Previous action failed and we are attempting to recover. Failed action: {} ({}).{} Error: {}",
                    action.name(),
                    action,
                    hint,
                    self.reason
                )
            }
            FailedStep::Decision { .. } => format!(
                "The previous decision could not be made and we are attempting to recover. Error: {}",
                self.reason
            ),
        }
    }
}

/// Everything a policy sees for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub frame: FrameSummary,
    pub text: Vec<TextToken>,
    pub elements: Vec<UiElement>,
    pub session: SessionState,
    pub failure: Option<FailureAnnotation>,
}

/// Proposes the next interaction.
#[async_trait]
pub trait ActionPolicy: Send + Sync {
    /// Exactly one action, or `PilotError::PolicyFailed`.
    async fn decide(&self, context: &DecisionContext) -> Result<Action>;
}

/// Render a decision context as a model prompt.
pub fn render_prompt(context: &DecisionContext) -> String {
    let mut prompt = String::from(
        "You are helping automate job applications in a web browser. \
         Analyze the current state of the page and decide what action to take next. \
         You are given text recognized on the page and the interactive elements detected in a screenshot.\n\n",
    );

    let text = join_tokens(&context.text);
    prompt.push_str("Text extracted from the current page:\n\n");
    if text.chars().count() > PROMPT_TEXT_LIMIT {
        prompt.extend(text.chars().take(PROMPT_TEXT_LIMIT));
        prompt.push_str("...");
    } else {
        prompt.push_str(&text);
    }
    prompt.push_str("\n\n");

    prompt.push_str(&format!(
        "Detected UI elements (frame {}x{}):\n",
        context.frame.width, context.frame.height
    ));
    for (i, element) in context.elements.iter().take(PROMPT_ELEMENT_LIMIT).enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, element.describe()));
    }
    prompt.push('\n');

    prompt.push_str(&format!(
        "Applications submitted: {} of {}\n",
        context.session.applications_submitted(),
        context.session.max_applications()
    ));
    if let Some(failure) = &context.failure {
        prompt.push_str(&failure.describe());
        prompt.push('\n');
    }
    prompt.push('\n');

    prompt.push_str(
        "Respond with a JSON object containing:\n\
         1. action_type: one of click, type, select, scroll, wait, navigate, next_job\n\
         2. the parameters the action needs (selector, selector_type, coordinates, element_text, \
         element_label, text, value, visible_text, index, scroll_amount, scroll_to_element, wait_seconds, url)\n\
         3. completed_application: true only if this action submits the application\n\
         4. reason: a brief explanation\n\n\
         Examples:\n\
         {\"action_type\": \"click\", \"coordinates\": [x, y], \"reason\": \"Clicking apply button\"}\n\
         {\"action_type\": \"type\", \"element_label\": \"Email\", \"text\": \"user@example.com\", \"reason\": \"Filling email field\"}\n\
         {\"action_type\": \"wait\", \"wait_seconds\": 3, \"reason\": \"Waiting for page to load\"}\n\
         {\"action_type\": \"next_job\", \"reason\": \"Current job not suitable\"}\n",
    );
    prompt
}

/// One scripted policy answer.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyStep {
    Act(Action),
    Fail(String),
    /// Sleep, then fail. Used to exercise policy timeouts.
    Stall(Duration),
}

/// Replays prepared answers in order and records the contexts it was asked.
#[derive(Debug, Default)]
pub struct ScriptedPolicy {
    steps: Mutex<VecDeque<PolicyStep>>,
    seen: Mutex<Vec<DecisionContext>>,
}

impl ScriptedPolicy {
    pub fn new(steps: impl IntoIterator<Item = PolicyStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        Self::new(actions.into_iter().map(PolicyStep::Act))
    }

    /// Convert wire-level requests up front so a bad script fails before the run.
    pub fn from_requests(requests: Vec<ActionRequest>) -> Result<Self> {
        let actions = requests
            .into_iter()
            .enumerate()
            .map(|(i, request)| {
                Action::try_from(request).map_err(|e| PilotError::InvalidAction(format!("script step {}: {}", i + 1, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_actions(actions))
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn contexts(&self) -> Vec<DecisionContext> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ActionPolicy for ScriptedPolicy {
    async fn decide(&self, context: &DecisionContext) -> Result<Action> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(context.clone());
        }
        let step = self
            .steps
            .lock()
            .map_err(|_| PilotError::PolicyFailed("script lock poisoned".to_string()))?
            .pop_front();
        match step {
            Some(PolicyStep::Act(action)) => Ok(action),
            Some(PolicyStep::Fail(reason)) => Err(PilotError::PolicyFailed(reason)),
            Some(PolicyStep::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Err(PilotError::PolicyFailed("stalled".to_string()))
            }
            None => Err(PilotError::PolicyFailed("script exhausted".to_string())),
        }
    }
}
