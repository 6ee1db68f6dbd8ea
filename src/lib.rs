pub mod actions;
#[cfg(feature = "chrome")]
pub mod browser;
pub mod controller;
pub mod core;
pub mod diagnostics;
pub mod errors;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod vision;

pub use actions::{Action, ActionExecutor, ActionOutcome, ActionReport, ActionRequest};
#[cfg(feature = "chrome")]
pub use browser::{ChromeEnvironment, ListingAdvancer};
pub use controller::{Collaborators, FeedbackController, LoopState, RunReport, Termination};
pub use core::{ActionPolicy, Config, Environment, FrameSource, JobAdvancer, ScriptedPolicy, SessionState, TextExtractor};
pub use diagnostics::{DiagnosticEvent, DiagnosticsSink, MemorySink, TracingSink};
pub use errors::{EnvironmentError, PilotError, Result};
pub use types::*;
pub use vision::{ElementKind, Frame, UiDetector, UiElement};
