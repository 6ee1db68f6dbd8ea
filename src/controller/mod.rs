#[allow(clippy::module_inception)]
pub mod controller;
pub mod recovery;
pub mod state;

pub use controller::{Collaborators, FeedbackController};
pub use recovery::{fallback_plan, FallbackStep};
pub use state::{LoopState, RunReport, Termination};
