//! Diagnostic model and its status lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Result, StorageError};

/// Diagnostic severity as reported by the checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    /// Ranking weight used by prioritization (higher = more urgent)
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Error => 3,
            Severity::Warning => 2,
            Severity::Info => 1,
        }
    }
}

impl FromStr for Severity {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" | "message" | "suggestion" => Ok(Severity::Info),
            other => Err(StorageError::serialization(format!(
                "Unknown severity: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCategory {
    TypeMismatch,
    MissingType,
    UsesMissingType,
    UnresolvedReference,
    MissingImport,
    MissingProperty,
    NullSafety,
    UnusedSymbol,
    ImplicitAny,
    Syntax,
    Other,
}

impl DiagnosticCategory {
    pub const ALL: [DiagnosticCategory; 11] = [
        DiagnosticCategory::TypeMismatch,
        DiagnosticCategory::MissingType,
        DiagnosticCategory::UsesMissingType,
        DiagnosticCategory::UnresolvedReference,
        DiagnosticCategory::MissingImport,
        DiagnosticCategory::MissingProperty,
        DiagnosticCategory::NullSafety,
        DiagnosticCategory::UnusedSymbol,
        DiagnosticCategory::ImplicitAny,
        DiagnosticCategory::Syntax,
        DiagnosticCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCategory::TypeMismatch => "type_mismatch",
            DiagnosticCategory::MissingType => "missing_type",
            DiagnosticCategory::UsesMissingType => "uses_missing_type",
            DiagnosticCategory::UnresolvedReference => "unresolved_reference",
            DiagnosticCategory::MissingImport => "missing_import",
            DiagnosticCategory::MissingProperty => "missing_property",
            DiagnosticCategory::NullSafety => "null_safety",
            DiagnosticCategory::UnusedSymbol => "unused_symbol",
            DiagnosticCategory::ImplicitAny => "implicit_any",
            DiagnosticCategory::Syntax => "syntax",
            DiagnosticCategory::Other => "other",
        }
    }

    /// Categories whose fix usually has to introduce a name into scope
    pub fn is_reference_class(&self) -> bool {
        matches!(
            self,
            DiagnosticCategory::UnresolvedReference
                | DiagnosticCategory::MissingImport
                | DiagnosticCategory::MissingType
                | DiagnosticCategory::UsesMissingType
        )
    }
}

impl FromStr for DiagnosticCategory {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        DiagnosticCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StorageError::serialization(format!("Unknown category: {}", s)))
    }
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic lifecycle status
///
/// ```text
/// Detected -> Pending -> Fixed -> RolledBack
///     \          \
///      +----------+-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStatus {
    Detected,
    Pending,
    Fixed,
    Failed,
    RolledBack,
}

impl DiagnosticStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticStatus::Detected => "detected",
            DiagnosticStatus::Pending => "pending",
            DiagnosticStatus::Fixed => "fixed",
            DiagnosticStatus::Failed => "failed",
            DiagnosticStatus::RolledBack => "rolled_back",
        }
    }

    pub fn can_transition_to(&self, next: DiagnosticStatus) -> bool {
        use DiagnosticStatus::*;
        matches!(
            (self, next),
            (Detected, Pending)
                | (Pending, Fixed)
                | (Fixed, RolledBack)
                | (Detected, Failed)
                | (Pending, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DiagnosticStatus::Failed | DiagnosticStatus::RolledBack)
    }
}

impl FromStr for DiagnosticStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "detected" => Ok(DiagnosticStatus::Detected),
            "pending" => Ok(DiagnosticStatus::Pending),
            "fixed" => Ok(DiagnosticStatus::Fixed),
            "failed" => Ok(DiagnosticStatus::Failed),
            "rolled_back" => Ok(DiagnosticStatus::RolledBack),
            other => Err(StorageError::serialization(format!(
                "Unknown diagnostic status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for DiagnosticStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single problem reported by the type-checker
///
/// `line` and `column` are 1-based, as printed by the checker.
///
/// # Examples
///
/// ```rust
/// use diagfix_storage::domain::{Diagnostic, DiagnosticStatus};
///
/// let mut diagnostic = Diagnostic::new("TS2304", "Cannot find name 'Foo'.", "src/a.ts", 3, 14);
/// diagnostic.transition(DiagnosticStatus::Pending).unwrap();
/// diagnostic.transition(DiagnosticStatus::Fixed).unwrap();
/// assert!(diagnostic.resolved_at.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub id: Uuid,
    pub code: String,
    pub message: String,
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub category: DiagnosticCategory,
    pub status: DiagnosticStatus,
    pub pattern_id: Option<Uuid>,
    pub fix_id: Option<Uuid>,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Diagnostic {
    /// Create a freshly detected error-level diagnostic
    ///
    /// The category starts as `Other`; the engine's classifier assigns the
    /// real one.
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        file: impl Into<PathBuf>,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            message: message.into(),
            file: file.into(),
            line,
            column,
            severity: Severity::Error,
            category: DiagnosticCategory::Other,
            status: DiagnosticStatus::Detected,
            pattern_id: None,
            fix_id: None,
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: DiagnosticCategory) -> Self {
        self.category = category;
        self
    }

    /// Move to `next`, rejecting anything outside the lifecycle graph
    pub fn transition(&mut self, next: DiagnosticStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(StorageError::invalid_transition(self.status, next));
        }
        self.status = next;
        if next == DiagnosticStatus::Fixed {
            self.resolved_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Identity used when diffing checker output (file, code, message)
    pub fn identity_key(&self) -> (PathBuf, String, String) {
        (self.file.clone(), self.code.clone(), self.message.clone())
    }

    /// `file:line:column` for logs
    pub fn location(&self) -> String {
        format!("{}:{}:{}", self.file.display(), self.line, self.column)
    }
}
