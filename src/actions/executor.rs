use super::base::{
    Action, ActionFailure, ActionKind, ActionOutcome, ActionReport, ClickTarget, ControlTarget, ScrollTarget,
};
use crate::core::environment::{ElementRef, EnvResult, Environment};
use crate::core::sources::JobAdvancer;
use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink, TracingSink};
use crate::errors::EnvironmentError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Frame dimensions the last perception cycle saw, used to reject
/// coordinate clicks that cannot land on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBounds {
    pub width: u32,
    pub height: u32,
}

/// Resolves an `Action` against the live environment and performs it.
///
/// Holds no state between calls; the environment and advancer are lent per call.
#[derive(Clone)]
pub struct ActionExecutor {
    max_wait: Duration,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl ActionExecutor {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            max_wait,
            diagnostics: Arc::new(TracingSink),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub async fn execute(
        &self,
        action: &Action,
        env: &dyn Environment,
        advancer: &dyn JobAdvancer,
        bounds: Option<FrameBounds>,
    ) -> ActionReport {
        let start = Instant::now();
        let outcome = match self.check(action, bounds) {
            Err(failure) => ActionOutcome::Failed(failure),
            Ok(()) => match self.dispatch(action, env, advancer).await {
                Ok(()) => ActionOutcome::Succeeded {
                    completes_application: action.completes_application,
                },
                Err(Step::Failed(failure)) => ActionOutcome::Failed(failure),
                Err(Step::Fault(err)) => ActionOutcome::EnvironmentFault(err),
            },
        };
        let execution_time_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            ActionOutcome::Succeeded { completes_application } => {
                self.diagnostics.record(DiagnosticEvent::ActionSucceeded {
                    action: action.to_string(),
                    completes_application: *completes_application,
                    duration_ms: execution_time_ms,
                })
            }
            ActionOutcome::Failed(failure) => self.diagnostics.record(DiagnosticEvent::ActionFailed {
                action: action.to_string(),
                reason: failure.to_string(),
            }),
            ActionOutcome::EnvironmentFault(err) => self.diagnostics.record(DiagnosticEvent::ActionFailed {
                action: action.to_string(),
                reason: err.to_string(),
            }),
        }

        ActionReport {
            action: action.clone(),
            outcome,
            execution_time_ms,
        }
    }

    /// Checks that need no environment.
    fn check(&self, action: &Action, bounds: Option<FrameBounds>) -> Result<(), ActionFailure> {
        action
            .validate()
            .map_err(|e| ActionFailure::Invalid(e.to_string()))?;
        if let (ActionKind::Click {
            target: ClickTarget::Coordinates(p),
        }, Some(b)) = (&action.kind, bounds)
        {
            if b.width > 0 && b.height > 0 && (p.x >= b.width || p.y >= b.height) {
                return Err(ActionFailure::Invalid(format!(
                    "point ({}, {}) outside {}x{} frame",
                    p.x, p.y, b.width, b.height
                )));
            }
        }
        Ok(())
    }

    async fn dispatch(&self, action: &Action, env: &dyn Environment, advancer: &dyn JobAdvancer) -> Result<(), Step> {
        match &action.kind {
            ActionKind::Click { target } => match target {
                ClickTarget::Selector(sel) => {
                    let element = resolved(env.resolve_by_selector(sel).await)?;
                    executed(env.click(&element).await)
                }
                ClickTarget::Coordinates(point) => executed(env.click_at(*point).await),
                ClickTarget::Text(text) => {
                    let element = resolved(env.resolve_by_text(text).await)?;
                    executed(env.click(&element).await)
                }
            },
            ActionKind::Type { target, text } => {
                let element = resolve_control(env, target).await?;
                executed(env.clear(&element).await)?;
                executed(env.send_keys(&element, text).await)
            }
            ActionKind::Select { target, choice } => {
                let element = resolve_control(env, target).await?;
                executed(env.select_option(&element, choice).await)
            }
            ActionKind::Scroll { target } => match target {
                ScrollTarget::By(dy) => executed(env.scroll_by(*dy).await),
                ScrollTarget::IntoView(sel) => {
                    let element = resolved(env.resolve_by_selector(sel).await)?;
                    executed(env.scroll_into_view(&element).await)
                }
            },
            ActionKind::Wait { duration } => {
                tokio::time::sleep((*duration).min(self.max_wait)).await;
                Ok(())
            }
            ActionKind::Navigate { url } => executed(env.navigate_to(url).await),
            ActionKind::NextJob => advancer
                .advance()
                .await
                .map_err(|e| Step::Fault(EnvironmentError::Fault(e.to_string()))),
        }
    }
}

enum Step {
    Failed(ActionFailure),
    Fault(EnvironmentError),
}

async fn resolve_control(env: &dyn Environment, target: &ControlTarget) -> Result<ElementRef, Step> {
    match target {
        ControlTarget::Selector(sel) => resolved(env.resolve_by_selector(sel).await),
        ControlTarget::Label(label) => resolved(env.resolve_input_by_label(label).await),
    }
}

/// Resolution errors leave the page untouched.
fn resolved(result: EnvResult<ElementRef>) -> Result<ElementRef, Step> {
    result.map_err(|err| match err {
        EnvironmentError::Fault(_) => Step::Fault(err),
        EnvironmentError::ElementNotFound(msg) | EnvironmentError::Rejected(msg) => {
            Step::Failed(ActionFailure::Unresolved(msg))
        }
    })
}

fn executed(result: EnvResult<()>) -> Result<(), Step> {
    result.map_err(|err| {
        if err.is_fault() {
            Step::Fault(err)
        } else {
            Step::Failed(ActionFailure::Execution(err.to_string()))
        }
    })
}
