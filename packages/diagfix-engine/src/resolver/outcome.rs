//! Attempt trails and resolution outcomes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use diagfix_storage::{Diagnostic, Fix, TransactionAudit};

use super::state::ResolutionState;
use crate::error::{EngineError, ErrorCategory};

/// Which pass produced an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptSource {
    Pattern,
    Predictor,
    Ai,
}

impl AttemptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptSource::Pattern => "pattern",
            AttemptSource::Predictor => "predictor",
            AttemptSource::Ai => "ai",
        }
    }
}

/// One strategy attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: String,
    pub source: AttemptSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_id: Option<Uuid>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    /// Validation summary, when the fix got that far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<serde_json::Value>,
    pub duration_ms: u64,
}

impl AttemptRecord {
    pub fn succeeded(
        strategy: impl Into<String>,
        source: AttemptSource,
        fix_id: Uuid,
        validation: serde_json::Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            source,
            fix_id: Some(fix_id),
            success: true,
            error: None,
            error_category: None,
            validation: Some(validation),
            duration_ms,
        }
    }

    pub fn failed(strategy: impl Into<String>, source: AttemptSource, error: &EngineError, duration_ms: u64) -> Self {
        Self {
            strategy: strategy.into(),
            source,
            fix_id: None,
            success: false,
            error: Some(error.to_string()),
            error_category: Some(error.category()),
            validation: None,
            duration_ms,
        }
    }

    /// Fix applied and validated, but rejected by the validator
    pub fn rejected(
        strategy: impl Into<String>,
        source: AttemptSource,
        fix_id: Uuid,
        reason: impl Into<String>,
        validation: serde_json::Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            source,
            fix_id: Some(fix_id),
            success: false,
            error: Some(reason.into()),
            error_category: Some(ErrorCategory::ValidationFailure),
            validation: Some(validation),
            duration_ms,
        }
    }
}

/// Final result for one diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub diagnostic_id: Uuid,
    pub code: String,
    pub file: PathBuf,
    pub line: u32,
    pub state: ResolutionState,
    /// Strategy of the kept or suggested fix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<Fix>,
    pub attempts: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
}

impl ResolutionOutcome {
    pub fn new(diagnostic: &Diagnostic) -> Self {
        Self {
            diagnostic_id: diagnostic.id,
            code: diagnostic.code.clone(),
            file: diagnostic.file.clone(),
            line: diagnostic.line,
            state: ResolutionState::Pending,
            strategy: None,
            fix: None,
            attempts: Vec::new(),
            reason: None,
            duration_ms: 0,
        }
    }

    pub fn skipped(diagnostic: &Diagnostic, reason: impl Into<String>) -> Self {
        Self {
            state: ResolutionState::Skipped,
            reason: Some(reason.into()),
            ..Self::new(diagnostic)
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.state == ResolutionState::Fixed
    }
}

/// Outcomes of a batch plus the audits of its transactions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<ResolutionOutcome>,
    pub transactions: Vec<TransactionAudit>,
}

impl BatchReport {
    pub fn count(&self, state: ResolutionState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn fixed(&self) -> usize {
        self.count(ResolutionState::Fixed)
    }

    pub fn outcome(&self, diagnostic_id: Uuid) -> Option<&ResolutionOutcome> {
        self.outcomes.iter().find(|o| o.diagnostic_id == diagnostic_id)
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.outcomes.extend(other.outcomes);
        self.transactions.extend(other.transactions);
    }
}
