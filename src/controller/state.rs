use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Capturing,
    Perceiving,
    Deciding,
    Acting,
    Verifying,
    Recovering,
    AdvancingTarget,
    Completed,
    Aborted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Completed | LoopState::Aborted)
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    QuotaReached,
    /// Refresh and the known-good fallback both failed.
    FallbackExhausted { last_fault: String },
    /// Too many environment faults in a row, even though fallbacks succeeded.
    FaultLimit { consecutive: u32, last_fault: String },
    CycleBudget { cycles: u64 },
}

/// Summary of a finished run. The confirmed count is always reported, however
/// the run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub final_state: LoopState,
    pub termination: Termination,
    pub applications_submitted: u32,
    pub max_applications: u32,
    pub cycles: u64,
    pub action_attempts: u64,
    pub recoveries: u64,
    pub target_advances: u64,
    pub environment_faults: u64,
}

impl RunReport {
    pub fn completed(&self) -> bool {
        self.final_state == LoopState::Completed
    }
}
