use crate::errors::{PilotError, Result};
use serde::{Deserialize, Serialize};

/// Submission quota for one run. Only the controller mutates it, and only
/// after a verified action that signalled completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    applications_submitted: u32,
    max_applications: u32,
}

impl SessionState {
    pub fn new(max_applications: u32) -> Result<Self> {
        if max_applications == 0 {
            return Err(PilotError::ConfigurationError(
                "max_applications must be positive".to_string(),
            ));
        }
        Ok(Self {
            applications_submitted: 0,
            max_applications,
        })
    }

    pub fn applications_submitted(&self) -> u32 {
        self.applications_submitted
    }

    pub fn max_applications(&self) -> u32 {
        self.max_applications
    }

    pub fn remaining(&self) -> u32 {
        self.max_applications - self.applications_submitted
    }

    pub fn quota_reached(&self) -> bool {
        self.applications_submitted >= self.max_applications
    }

    /// Count one confirmed submission. Saturates at the ceiling.
    pub fn record_submission(&mut self) -> u32 {
        if !self.quota_reached() {
            self.applications_submitted += 1;
        }
        self.applications_submitted
    }
}
