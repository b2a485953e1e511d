//! Resolution state machine
//!
//! ```text
//! Pending -> Attempting -> Fixed -> RolledBack
//!    |            +-------> Suggested
//!    |            +-------> Failed
//!    +--> Skipped | Failed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use diagfix_storage::DiagnosticStatus;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    Pending,
    Attempting,
    /// A validated fix is on disk
    Fixed,
    /// A validated fix exists but was reverted (auto-apply disabled)
    Suggested,
    Failed,
    /// Fixed, then undone by a batch rollback
    RolledBack,
    /// Never attempted (batch limit)
    Skipped,
}

impl ResolutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionState::Pending => "pending",
            ResolutionState::Attempting => "attempting",
            ResolutionState::Fixed => "fixed",
            ResolutionState::Suggested => "suggested",
            ResolutionState::Failed => "failed",
            ResolutionState::RolledBack => "rolled_back",
            ResolutionState::Skipped => "skipped",
        }
    }

    pub fn can_transition_to(&self, next: ResolutionState) -> bool {
        use ResolutionState::*;
        matches!(
            (self, next),
            (Pending, Attempting)
                | (Pending, Failed)
                | (Pending, Skipped)
                | (Attempting, Fixed)
                | (Attempting, Suggested)
                | (Attempting, Failed)
                | (Fixed, RolledBack)
        )
    }

    pub fn transition(&mut self, next: ResolutionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(EngineError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, ResolutionState::Pending | ResolutionState::Attempting)
    }

    /// Persisted diagnostic status for this state
    pub fn diagnostic_status(&self) -> DiagnosticStatus {
        match self {
            ResolutionState::Pending | ResolutionState::Attempting | ResolutionState::Suggested => {
                DiagnosticStatus::Pending
            }
            ResolutionState::Fixed => DiagnosticStatus::Fixed,
            ResolutionState::Failed => DiagnosticStatus::Failed,
            ResolutionState::RolledBack => DiagnosticStatus::RolledBack,
            ResolutionState::Skipped => DiagnosticStatus::Detected,
        }
    }
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
