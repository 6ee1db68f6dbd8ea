use super::recovery::fallback_plan;
use super::state::{LoopState, RunReport, Termination};
use crate::actions::{ActionExecutor, ActionOutcome, FrameBounds};
use crate::core::config::{Config, SessionConfig, MIN_FAULT_CAP};
use crate::core::environment::Environment;
use crate::core::policy::{ActionPolicy, DecisionContext, FailureAnnotation};
use crate::core::session::SessionState;
use crate::core::sources::{FrameSource, JobAdvancer, TextExtractor};
use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink, TracingSink};
use crate::errors::{PilotError, Result};
use crate::vision::UiDetector;
use std::sync::Arc;
use std::time::Duration;

/// The external collaborators one controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub frames: Arc<dyn FrameSource>,
    pub text: Arc<dyn TextExtractor>,
    pub policy: Arc<dyn ActionPolicy>,
    pub environment: Arc<dyn Environment>,
    pub advancer: Arc<dyn JobAdvancer>,
}

/// How one capture-to-verify pass ended.
enum Attempt {
    Verified,
    /// The decision or the action failed; the page is still usable.
    Failed(FailureAnnotation),
    /// The session is unusable.
    Fault(String),
}

#[derive(Debug, Default)]
struct Counters {
    cycles: u64,
    action_attempts: u64,
    recoveries: u64,
    target_advances: u64,
    environment_faults: u64,
}

/// Owns the session quota and sequences perception, decision, action,
/// verification and bounded recovery until the quota is met or the
/// environment gives out. One action is in flight at a time.
pub struct FeedbackController {
    parts: Collaborators,
    detector: UiDetector,
    executor: ActionExecutor,
    settings: SessionConfig,
    diagnostics: Arc<dyn DiagnosticsSink>,
    session: SessionState,
    state: LoopState,
    known_good: Option<String>,
    last_bounds: Option<FrameBounds>,
    consecutive_faults: u32,
    counters: Counters,
}

impl FeedbackController {
    pub fn new(parts: Collaborators, config: &Config) -> Result<Self> {
        let settings = config.session.clone();
        if settings.max_consecutive_faults < MIN_FAULT_CAP {
            return Err(PilotError::ConfigurationError(format!(
                "max_consecutive_faults must be at least {}",
                MIN_FAULT_CAP
            )));
        }
        Ok(Self {
            parts,
            detector: UiDetector::new(config.detector.clone()),
            executor: ActionExecutor::new(Duration::from_millis(settings.max_wait_ms)),
            session: SessionState::new(settings.max_applications)?,
            settings,
            diagnostics: Arc::new(TracingSink),
            state: LoopState::Idle,
            known_good: None,
            last_bounds: None,
            consecutive_faults: 0,
            counters: Counters::default(),
        })
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.detector = self.detector.with_diagnostics(diagnostics.clone());
        self.executor = self.executor.with_diagnostics(diagnostics.clone());
        self.diagnostics = diagnostics;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Drive the loop to a terminal state. Never fails: whatever happens, the
    /// report carries the confirmed submission count.
    pub async fn run(mut self) -> RunReport {
        let termination = loop {
            if self.session.quota_reached() {
                self.transition(LoopState::Completed);
                break Termination::QuotaReached;
            }
            if let Some(budget) = self.settings.max_cycles {
                if self.counters.cycles >= budget {
                    self.transition(LoopState::Aborted);
                    break Termination::CycleBudget {
                        cycles: self.counters.cycles,
                    };
                }
            }
            self.counters.cycles += 1;

            let fault = match self.attempt(None).await {
                Attempt::Verified => {
                    self.after_verified().await;
                    continue;
                }
                Attempt::Failed(annotation) => match self.recover(annotation).await {
                    Ok(()) => continue,
                    Err(fault) => fault,
                },
                Attempt::Fault(fault) => fault,
            };

            if let Err(termination) = self.handle_fault(fault).await {
                self.transition(LoopState::Aborted);
                break termination;
            }
            self.transition(LoopState::Idle);
        };

        RunReport {
            final_state: self.state,
            termination,
            applications_submitted: self.session.applications_submitted(),
            max_applications: self.session.max_applications(),
            cycles: self.counters.cycles,
            action_attempts: self.counters.action_attempts,
            recoveries: self.counters.recoveries,
            target_advances: self.counters.target_advances,
            environment_faults: self.counters.environment_faults,
        }
    }

    /// Capture, perceive, decide, act and verify once. `failure` is set only
    /// for the single recovery attempt of a failed step.
    async fn attempt(&mut self, failure: Option<&FailureAnnotation>) -> Attempt {
        self.transition(LoopState::Capturing);
        let frame = match self.parts.frames.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                self.diagnostics.record(DiagnosticEvent::CaptureFailed { reason: e.to_string() });
                return Attempt::Fault(e.to_string());
            }
        };

        self.transition(LoopState::Perceiving);
        let text = match self.parts.text.extract(&frame).await {
            Ok(tokens) => tokens,
            Err(e) => {
                self.diagnostics
                    .record(DiagnosticEvent::TextExtractionFailed { reason: e.to_string() });
                Vec::new()
            }
        };
        let elements = self.detector.detect(&frame);
        self.last_bounds = Some(FrameBounds {
            width: frame.width(),
            height: frame.height(),
        });

        self.transition(LoopState::Deciding);
        let context = DecisionContext {
            frame: frame.summary(),
            text,
            elements,
            session: self.session,
            failure: failure.cloned(),
        };
        let timeout_ms = self.settings.policy_timeout_ms;
        let decided =
            match tokio::time::timeout(Duration::from_millis(timeout_ms), self.parts.policy.decide(&context)).await {
                Ok(decided) => decided,
                Err(_) => Err(PilotError::PolicyTimeout(timeout_ms)),
            };
        let action = match decided {
            Ok(action) => action,
            Err(e) => {
                self.diagnostics.record(DiagnosticEvent::DecisionFailed { reason: e.to_string() });
                return Attempt::Failed(FailureAnnotation::decision(e.to_string()));
            }
        };
        self.transition(LoopState::Acting);
        self.counters.action_attempts += 1;
        let report = self
            .executor
            .execute(
                &action,
                self.parts.environment.as_ref(),
                self.parts.advancer.as_ref(),
                self.last_bounds,
            )
            .await;

        self.transition(LoopState::Verifying);
        match report.outcome {
            ActionOutcome::Succeeded { completes_application } => {
                if completes_application {
                    let submitted = self.session.record_submission();
                    self.diagnostics.record(DiagnosticEvent::ApplicationSubmitted {
                        submitted,
                        max_applications: self.session.max_applications(),
                    });
                }
                Attempt::Verified
            }
            ActionOutcome::Failed(failure) => Attempt::Failed(FailureAnnotation::action(action, failure.to_string())),
            ActionOutcome::EnvironmentFault(err) => Attempt::Fault(err.to_string()),
        }
    }

    /// One recovery attempt; if that fails too, abandon the target.
    /// `Err` carries an environment fault for the fallback path.
    async fn recover(&mut self, annotation: FailureAnnotation) -> std::result::Result<(), String> {
        self.transition(LoopState::Recovering);
        self.counters.recoveries += 1;
        self.diagnostics.record(DiagnosticEvent::RecoveryStarted {
            failed: annotation.describe(),
        });

        match self.attempt(Some(&annotation)).await {
            Attempt::Verified => {
                self.after_verified().await;
                Ok(())
            }
            Attempt::Fault(fault) => Err(fault),
            Attempt::Failed(_) => {
                self.transition(LoopState::AdvancingTarget);
                match self.parts.advancer.advance().await {
                    Ok(()) => {
                        self.counters.target_advances += 1;
                        self.diagnostics.record(DiagnosticEvent::TargetAdvanced);
                        self.transition(LoopState::Idle);
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
        }
    }

    async fn after_verified(&mut self) {
        self.consecutive_faults = 0;
        if let Ok(location) = self.parts.environment.current_location().await {
            self.known_good = Some(location);
        }
        self.transition(LoopState::Idle);
        if !self.session.quota_reached() && self.settings.delay_between_actions_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.delay_between_actions_ms)).await;
        }
    }

    /// Refresh, then fall back to the known-good view. Every fault gets its
    /// fallback; the cap is checked once the view is restored. `Err` ends the
    /// run.
    async fn handle_fault(&mut self, fault: String) -> std::result::Result<(), Termination> {
        self.counters.environment_faults += 1;
        self.consecutive_faults += 1;
        self.diagnostics.record(DiagnosticEvent::EnvironmentFault { reason: fault.clone() });

        let mut restored = false;
        for step in fallback_plan(self.known_good.as_deref()) {
            let succeeded = step.apply(self.parts.environment.as_ref()).await.is_ok();
            self.diagnostics.record(DiagnosticEvent::FallbackStep {
                step: step.name(),
                succeeded,
            });
            if succeeded {
                restored = true;
                break;
            }
        }
        if !restored {
            return Err(Termination::FallbackExhausted { last_fault: fault });
        }

        if self.consecutive_faults >= self.settings.max_consecutive_faults {
            return Err(Termination::FaultLimit {
                consecutive: self.consecutive_faults,
                last_fault: fault,
            });
        }
        Ok(())
    }

    fn transition(&mut self, to: LoopState) {
        let from = self.state;
        self.state = to;
        self.diagnostics.record(DiagnosticEvent::Transition { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ClickTarget};
    use crate::core::environment::Selector;
    use crate::core::policy::{FailedStep, PolicyStep, ScriptedPolicy};
    use crate::core::sources::NullTextExtractor;
    use crate::diagnostics::MemorySink;
    use crate::errors::EnvironmentError;
    use crate::testing::{FrameBuilder, RecordingAdvancer, RecordingEnvironment, ScriptedFrames};

    struct Harness {
        frames: Arc<ScriptedFrames>,
        policy: Arc<ScriptedPolicy>,
        env: Arc<RecordingEnvironment>,
        advancer: Arc<RecordingAdvancer>,
        sink: Arc<MemorySink>,
    }

    impl Harness {
        fn new(steps: Vec<PolicyStep>) -> Self {
            Self {
                frames: Arc::new(ScriptedFrames::repeating(FrameBuilder::new(160, 120).button(20, 20, 80, 30).build())),
                policy: Arc::new(ScriptedPolicy::new(steps)),
                env: Arc::new(RecordingEnvironment::new()),
                advancer: Arc::new(RecordingAdvancer::new()),
                sink: Arc::new(MemorySink::new()),
            }
        }

        fn config(max_applications: u32) -> Config {
            let mut config = Config::default();
            config.session.max_applications = max_applications;
            config.session.delay_between_actions_ms = 0;
            config.session.policy_timeout_ms = 200;
            config.session.max_wait_ms = 10;
            config.session.max_cycles = Some(20);
            config
        }

        fn parts(&self) -> Collaborators {
            Collaborators {
                frames: self.frames.clone(),
                text: Arc::new(NullTextExtractor),
                policy: self.policy.clone(),
                environment: self.env.clone(),
                advancer: self.advancer.clone(),
            }
        }

        fn controller(&self, config: &Config) -> FeedbackController {
            FeedbackController::new(self.parts(), config)
                .unwrap()
                .with_diagnostics(self.sink.clone())
        }

        fn transitions(&self) -> Vec<(LoopState, LoopState)> {
            self.sink
                .events()
                .into_iter()
                .filter_map(|e| match e {
                    DiagnosticEvent::Transition { from, to } => Some((from, to)),
                    _ => None,
                })
                .collect()
        }
    }

    fn submit() -> Action {
        Action::click(ClickTarget::Text("Submit application".into()))
            .unwrap()
            .completing()
    }

    fn click(selector: &str) -> Action {
        Action::click(ClickTarget::Selector(Selector::css(selector))).unwrap()
    }

    #[tokio::test]
    async fn test_single_submission_completes() {
        let h = Harness::new(vec![PolicyStep::Act(submit())]);
        let report = h.controller(&Harness::config(1)).run().await;

        assert_eq!(report.final_state, LoopState::Completed);
        assert_eq!(report.termination, Termination::QuotaReached);
        assert_eq!(report.applications_submitted, 1);
        assert_eq!(report.cycles, 1);
        assert_eq!(report.action_attempts, 1);

        let acting = h.transitions().iter().filter(|(_, to)| *to == LoopState::Acting).count();
        assert_eq!(acting, 1);
    }

    #[tokio::test]
    async fn test_failed_recovery_advances_once() {
        let h = Harness::new(vec![
            PolicyStep::Act(click("#apply")),
            PolicyStep::Act(click("#apply-again")),
            PolicyStep::Act(submit()),
        ]);
        h.env.fail_selector("#apply", EnvironmentError::ElementNotFound("#apply".into()));
        h.env.fail_selector("#apply-again", EnvironmentError::ElementNotFound("#apply-again".into()));

        let report = h.controller(&Harness::config(1)).run().await;

        assert_eq!(h.advancer.advances(), 1);
        assert_eq!(report.target_advances, 1);
        assert_eq!(report.recoveries, 1);
        assert_eq!(report.applications_submitted, 1);
        assert_eq!(report.final_state, LoopState::Completed);
        // two attempts on the abandoned target, one on the next
        assert_eq!(report.action_attempts, 3);

        let contexts = h.policy.contexts();
        assert!(contexts[0].failure.is_none());
        assert!(matches!(
            contexts[1].failure.as_ref().map(|f| &f.failed),
            Some(FailedStep::Action { .. })
        ));
        assert!(contexts[2].failure.is_none());
    }

    #[tokio::test]
    async fn test_failed_advance_after_failed_recovery_takes_fault_path() {
        let mut h = Harness::new(vec![
            PolicyStep::Act(click("#apply")),
            PolicyStep::Act(click("#apply-again")),
            PolicyStep::Act(submit()),
        ]);
        h.advancer = Arc::new(RecordingAdvancer::failing());
        h.env.fail_selector("#apply", EnvironmentError::ElementNotFound("#apply".into()));
        h.env.fail_selector("#apply-again", EnvironmentError::ElementNotFound("#apply-again".into()));

        let report = h.controller(&Harness::config(1)).run().await;

        assert_eq!(h.advancer.advances(), 1);
        assert_eq!(report.target_advances, 0);
        assert_eq!(report.environment_faults, 1);
        assert_eq!(h.env.refreshes(), 1);
        assert_eq!(report.final_state, LoopState::Completed);
        assert_eq!(report.applications_submitted, 1);
        assert!(h
            .transitions()
            .contains(&(LoopState::AdvancingTarget, LoopState::Idle)));
    }

    #[tokio::test]
    async fn test_successful_recovery_returns_to_idle() {
        let h = Harness::new(vec![PolicyStep::Act(click("#gone")), PolicyStep::Act(submit())]);
        h.env.fail_selector("#gone", EnvironmentError::ElementNotFound("#gone".into()));

        let report = h.controller(&Harness::config(1)).run().await;

        assert_eq!(report.recoveries, 1);
        assert_eq!(report.target_advances, 0);
        assert_eq!(h.advancer.advances(), 0);
        assert_eq!(report.applications_submitted, 1);
    }

    #[tokio::test]
    async fn test_policy_timeout_goes_through_recovery() {
        let h = Harness::new(vec![PolicyStep::Stall(Duration::from_secs(5)), PolicyStep::Act(submit())]);

        let report = h.controller(&Harness::config(1)).run().await;

        assert_eq!(report.final_state, LoopState::Completed);
        assert_eq!(report.recoveries, 1);
        let contexts = h.policy.contexts();
        assert!(matches!(
            contexts[1].failure.as_ref().map(|f| &f.failed),
            Some(FailedStep::Decision { .. })
        ));
        assert!(contexts[1].failure.as_ref().map(|f| f.reason.contains("200 ms")).unwrap_or(false));
        assert!(h
            .transitions()
            .contains(&(LoopState::Deciding, LoopState::Recovering)));
    }

    #[tokio::test]
    async fn test_capture_fault_recovers_by_refresh() {
        let h = Harness::new(vec![PolicyStep::Act(submit())]);
        h.frames.fail_next(1);

        let report = h.controller(&Harness::config(1)).run().await;

        assert_eq!(report.final_state, LoopState::Completed);
        assert_eq!(report.environment_faults, 1);
        assert_eq!(h.env.refreshes(), 1);
        assert_eq!(h.env.go_backs(), 0);
    }

    #[tokio::test]
    async fn test_fault_falls_back_to_known_good_view() {
        let h = Harness::new(vec![
            PolicyStep::Act(Action::next_job()),
            PolicyStep::Act(submit()),
        ]);
        h.env.set_location("https://jobs.example.com/listing/7");
        h.frames.fail_at(2);
        h.env.fail_refresh(true);

        let report = h.controller(&Harness::config(1)).run().await;

        assert_eq!(report.final_state, LoopState::Completed);
        assert_eq!(h.env.navigations(), vec!["https://jobs.example.com/listing/7".to_string()]);
        assert_eq!(h.env.go_backs(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_fallback_aborts_with_count() {
        let h = Harness::new(vec![PolicyStep::Act(submit())]);
        h.frames.fail_at(2);
        h.env.fail_refresh(true);
        h.env.fail_navigation(true);
        h.env.fail_go_back(true);

        let report = h.controller(&Harness::config(3)).run().await;

        assert_eq!(report.final_state, LoopState::Aborted);
        assert!(matches!(report.termination, Termination::FallbackExhausted { .. }));
        assert_eq!(report.applications_submitted, 1);
        assert_eq!(report.max_applications, 3);
    }

    #[tokio::test]
    async fn test_consecutive_faults_are_capped() {
        let h = Harness::new(vec![]);
        h.frames.fail_next(100);

        let mut config = Harness::config(1);
        config.session.max_consecutive_faults = 3;
        let report = h.controller(&config).run().await;

        assert_eq!(report.final_state, LoopState::Aborted);
        assert!(matches!(report.termination, Termination::FaultLimit { consecutive: 3, .. }));
        assert_eq!(h.env.refreshes(), 3);
        assert_eq!(report.applications_submitted, 0);
    }

    #[test]
    fn test_fault_cap_below_two_is_rejected() {
        let h = Harness::new(vec![]);
        let mut config = Harness::config(1);
        config.session.max_consecutive_faults = 1;
        assert!(matches!(
            FeedbackController::new(h.parts(), &config),
            Err(PilotError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_smallest_fault_cap_still_refreshes() {
        let h = Harness::new(vec![PolicyStep::Act(submit())]);
        h.frames.fail_next(1);

        let mut config = Harness::config(1);
        config.session.max_consecutive_faults = MIN_FAULT_CAP;
        let report = h.controller(&config).run().await;

        assert_eq!(h.env.refreshes(), 1);
        assert_eq!(report.environment_faults, 1);
        assert_eq!(report.final_state, LoopState::Completed);
        assert_eq!(report.applications_submitted, 1);
    }

    #[tokio::test]
    async fn test_cycle_budget_stops_a_stuck_run() {
        let steps = (0..10).map(|_| PolicyStep::Act(Action::wait(Duration::from_millis(1)).unwrap()));
        let h = Harness::new(steps.collect());

        let mut config = Harness::config(1);
        config.session.max_cycles = Some(4);
        let report = h.controller(&config).run().await;

        assert_eq!(report.final_state, LoopState::Aborted);
        assert_eq!(report.termination, Termination::CycleBudget { cycles: 4 });
        assert_eq!(report.action_attempts, 4);
    }

    #[tokio::test]
    async fn test_submissions_never_exceed_quota() {
        let steps = (0..6).map(|_| PolicyStep::Act(submit()));
        let h = Harness::new(steps.collect());

        let report = h.controller(&Harness::config(2)).run().await;

        assert_eq!(report.applications_submitted, 2);
        assert_eq!(report.action_attempts, 2);
        let counts: Vec<u32> = h
            .sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::ApplicationSubmitted { submitted, .. } => Some(submitted),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2]);
    }
}
