use crate::controller::LoopState;
use crate::vision::ElementKind;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

/// Severity of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Domain events recorded by the detector, executor and controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    FrameUnreadable {
        frame_id: Uuid,
        reason: String,
    },
    FamilyFailed {
        family: ElementKind,
        reason: String,
    },
    ElementsDetected {
        frame_id: Uuid,
        count: usize,
    },
    Transition {
        from: LoopState,
        to: LoopState,
    },
    CaptureFailed {
        reason: String,
    },
    TextExtractionFailed {
        reason: String,
    },
    DecisionFailed {
        reason: String,
    },
    ActionSucceeded {
        action: String,
        completes_application: bool,
        duration_ms: u64,
    },
    ActionFailed {
        action: String,
        reason: String,
    },
    RecoveryStarted {
        failed: String,
    },
    ApplicationSubmitted {
        submitted: u32,
        max_applications: u32,
    },
    TargetAdvanced,
    EnvironmentFault {
        reason: String,
    },
    FallbackStep {
        step: String,
        succeeded: bool,
    },
}

impl DiagnosticEvent {
    pub fn level(&self) -> Level {
        match self {
            Self::Transition { .. } | Self::ElementsDetected { .. } => Level::Debug,
            Self::ActionSucceeded { .. }
            | Self::ApplicationSubmitted { .. }
            | Self::TargetAdvanced
            | Self::FallbackStep { succeeded: true, .. } => Level::Info,
            Self::FrameUnreadable { .. }
            | Self::FamilyFailed { .. }
            | Self::CaptureFailed { .. }
            | Self::TextExtractionFailed { .. }
            | Self::DecisionFailed { .. }
            | Self::ActionFailed { .. }
            | Self::RecoveryStarted { .. }
            | Self::FallbackStep { succeeded: false, .. } => Level::Warn,
            Self::EnvironmentFault { .. } => Level::Error,
        }
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameUnreadable { frame_id, reason } => {
                write!(f, "frame {} unreadable: {}", frame_id, reason)
            }
            Self::FamilyFailed { family, reason } => write!(f, "{} detection failed: {}", family, reason),
            Self::ElementsDetected { frame_id, count } => {
                write!(f, "detected {} elements in frame {}", count, frame_id)
            }
            Self::Transition { from, to } => write!(f, "{:?} -> {:?}", from, to),
            Self::CaptureFailed { reason } => write!(f, "capture failed: {}", reason),
            Self::TextExtractionFailed { reason } => write!(f, "text extraction failed: {}", reason),
            Self::DecisionFailed { reason } => write!(f, "decision failed: {}", reason),
            Self::ActionSucceeded {
                action,
                completes_application,
                duration_ms,
            } => write!(
                f,
                "{} succeeded in {}ms{}",
                action,
                duration_ms,
                if *completes_application { " (application complete)" } else { "" }
            ),
            Self::ActionFailed { action, reason } => write!(f, "{} failed: {}", action, reason),
            Self::RecoveryStarted { failed } => write!(f, "recovering from: {}", failed),
            Self::ApplicationSubmitted {
                submitted,
                max_applications,
            } => write!(f, "application submitted ({}/{})", submitted, max_applications),
            Self::TargetAdvanced => write!(f, "advanced to next target"),
            Self::EnvironmentFault { reason } => write!(f, "environment fault: {}", reason),
            Self::FallbackStep { step, succeeded } => write!(
                f,
                "fallback {} {}",
                step,
                if *succeeded { "succeeded" } else { "failed" }
            ),
        }
    }
}

/// Receiver for diagnostic events, injected into each component.
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);
}

/// Forwards events to `tracing` at their level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(&self, event: DiagnosticEvent) {
        match event.level() {
            Level::Debug => tracing::debug!(target: "ui_pilot", "{}", event),
            Level::Info => tracing::info!(target: "ui_pilot", "{}", event),
            Level::Warn => tracing::warn!(target: "ui_pilot", "{}", event),
            Level::Error => tracing::error!(target: "ui_pilot", "{}", event),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn count_where(&self, predicate: impl Fn(&DiagnosticEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl DiagnosticsSink for MemorySink {
    fn record(&self, event: DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
