use diagfix_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Strategy '{strategy}' failed: {message}")]
    Strategy { strategy: String, message: String },

    #[error("Validation failed at {stage}: {message}")]
    Validation { stage: String, message: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("{service} call failed: {message}")]
    ExternalService { service: String, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Path escapes project root: {}", .0.display())]
    PathOutsideRoot(PathBuf),

    #[error("Edit out of bounds in {}: {start}..{end} (len {len})", file.display())]
    EditOutOfBounds {
        file: PathBuf,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Overlapping edits in {}: {first} and {second}", file.display())]
    OverlappingEdits {
        file: PathBuf,
        first: String,
        second: String,
    },

    #[error("Edit produces a syntax error in {}: {detail}", file.display())]
    SyntaxRejected { file: PathBuf, detail: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn strategy(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    pub fn validation(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn transaction<E: std::fmt::Display>(e: E) -> Self {
        Self::Transaction(e.to_string())
    }

    pub fn external(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::Parse(e.to_string())
    }

    /// Classify for the resolver's recovery rules
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Strategy { .. } | EngineError::Parse(_) => ErrorCategory::StrategyFailure,
            EngineError::Validation { .. }
            | EngineError::PathOutsideRoot(_)
            | EngineError::EditOutOfBounds { .. }
            | EngineError::OverlappingEdits { .. }
            | EngineError::SyntaxRejected { .. } => ErrorCategory::ValidationFailure,
            EngineError::Transaction(_) | EngineError::InvalidStateTransition { .. } => {
                ErrorCategory::TransactionFailure
            }
            EngineError::Persistence(_) | EngineError::Serialization(_) => {
                ErrorCategory::PersistenceFailure
            }
            EngineError::ExternalService { .. } | EngineError::Timeout(_) => {
                ErrorCategory::ExternalServiceFailure
            }
            EngineError::Config(_) | EngineError::Io(_) | EngineError::Other(_) => {
                ErrorCategory::Unexpected
            }
        }
    }

    /// Only unexpected errors abort a batch
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Unexpected
    }
}

/// Error category driving recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A strategy could not produce a fix; try the next one
    StrategyFailure,
    /// A fix was produced but rejected; revert and try the next one
    ValidationFailure,
    /// File locking / transaction bookkeeping failed for this diagnostic
    TransactionFailure,
    /// Store unavailable; the outcome is still reported
    PersistenceFailure,
    /// Type-checker, linter or completion service failed
    ExternalServiceFailure,
    /// Anything else; aborts the batch after rollback
    Unexpected,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::StrategyFailure => "strategy_failure",
            ErrorCategory::ValidationFailure => "validation_failure",
            ErrorCategory::TransactionFailure => "transaction_failure",
            ErrorCategory::PersistenceFailure => "persistence_failure",
            ErrorCategory::ExternalServiceFailure => "external_service_failure",
            ErrorCategory::Unexpected => "unexpected",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "strategy_failure" => Ok(ErrorCategory::StrategyFailure),
            "validation_failure" => Ok(ErrorCategory::ValidationFailure),
            "transaction_failure" => Ok(ErrorCategory::TransactionFailure),
            "persistence_failure" => Ok(ErrorCategory::PersistenceFailure),
            "external_service_failure" => Ok(ErrorCategory::ExternalServiceFailure),
            "unexpected" => Ok(ErrorCategory::Unexpected),
            _ => Err(EngineError::parse(format!("Invalid error category: {}", s))),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_roundtrip() {
        for category in &[
            ErrorCategory::StrategyFailure,
            ErrorCategory::ValidationFailure,
            ErrorCategory::TransactionFailure,
            ErrorCategory::PersistenceFailure,
            ErrorCategory::ExternalServiceFailure,
            ErrorCategory::Unexpected,
        ] {
            let s = category.as_str();
            let parsed = ErrorCategory::from_str(s).unwrap();
            assert_eq!(*category, parsed);
        }
    }

    #[test]
    fn test_error_category_invalid() {
        assert!(ErrorCategory::from_str("invalid").is_err());
    }

    #[test]
    fn test_edit_rejections_are_validation_failures() {
        let err = EngineError::PathOutsideRoot(PathBuf::from("../etc/passwd"));
        assert_eq!(err.category(), ErrorCategory::ValidationFailure);
        assert!(!err.is_fatal());

        let err = EngineError::SyntaxRejected {
            file: PathBuf::from("a.ts"),
            detail: "ERROR at 1:4".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::ValidationFailure);
    }

    #[test]
    fn test_only_unexpected_is_fatal() {
        let io = EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        assert!(io.is_fatal());

        assert!(!EngineError::external("tsc", "exit 2").is_fatal());
        assert!(!EngineError::transaction("locked").is_fatal());
        assert!(!EngineError::Persistence(StorageError::database("busy")).is_fatal());
    }

    #[test]
    fn test_display_includes_context() {
        let err = EngineError::strategy("missing_import", "no exporting file for 'Foo'");
        assert_eq!(
            err.to_string(),
            "Strategy 'missing_import' failed: no exporting file for 'Foo'"
        );
    }
}
