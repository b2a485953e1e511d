//! Domain layer for FixStore
//!
//! # Domain Models
//!
//! - `Diagnostic`: A single problem reported by a type-checker, with a monotonic status
//! - `Pattern`: A recurring diagnostic shape (signature + frequency)
//! - `Fix`: A candidate set of source edits for one diagnostic
//! - `ApplicationLog`: Append-only record of one fix attempt
//! - `FeedbackRating`: Human rating of an applied fix
//! - `TransactionAudit`: What remains of a closed edit transaction
//!
//! # Port Trait
//!
//! - `FixStore`: Primary storage abstraction
//!
//! # Examples
//!
//! ```rust,ignore
//! use diagfix_storage::domain::{Diagnostic, FixStore};
//!
//! async fn example(store: impl FixStore) -> Result<()> {
//!     let diagnostic = Diagnostic::new("TS2322", "Type 'string' is not assignable to type 'number'.", "src/a.ts", 10, 7);
//!     store.save_diagnostic(&diagnostic).await?;
//!
//!     let loaded = store.get_diagnostic(diagnostic.id).await?;
//!     assert_eq!(loaded.code, "TS2322");
//!     Ok(())
//! }
//! ```

mod diagnostic;
mod fix;

pub use diagnostic::{Diagnostic, DiagnosticCategory, DiagnosticStatus, Severity};
pub use fix::{Fix, FixEdit, SUCCESS_RATE_ALPHA};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════
// Domain Models
// ═══════════════════════════════════════════════════════════════════════════

/// Recurring diagnostic shape
///
/// Created lazily the first time a novel signature is observed. `frequency`
/// is a running counter and never decreases.
///
/// # Examples
///
/// ```rust
/// use diagfix_storage::domain::{DiagnosticCategory, Pattern};
///
/// let mut pattern = Pattern::new("3f2a9c01", "type '<T>' is not assignable to type '<T>'", DiagnosticCategory::TypeMismatch);
/// pattern.record_occurrence();
/// assert_eq!(pattern.frequency, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Uuid,
    /// Short hash of the normalized message template (plus code)
    pub signature: String,
    /// Normalized message template the signature was derived from
    pub template: String,
    pub category: DiagnosticCategory,
    pub frequency: u64,
    /// True when at least one registered strategy covers this shape
    pub auto_fixable: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Pattern {
    /// Create a pattern for its first occurrence
    pub fn new(
        signature: impl Into<String>,
        template: impl Into<String>,
        category: DiagnosticCategory,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            signature: signature.into(),
            template: template.into(),
            category,
            frequency: 1,
            auto_fixable: false,
            created_at: now,
            last_seen: now,
        }
    }

    /// Count one more occurrence of this shape
    pub fn record_occurrence(&mut self) {
        self.frequency = self.frequency.saturating_add(1);
        self.last_seen = Utc::now();
    }
}

/// Append-only record of a single fix attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationLog {
    pub id: Uuid,
    pub diagnostic_id: Uuid,
    pub fix_id: Option<Uuid>,
    pub strategy_name: String,
    pub success: bool,
    /// Serialized validation summary (stage results, counts)
    #[serde(default)]
    pub validation_result: serde_json::Value,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ApplicationLog {
    pub fn new(
        diagnostic_id: Uuid,
        fix_id: Option<Uuid>,
        strategy_name: impl Into<String>,
        success: bool,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            diagnostic_id,
            fix_id,
            strategy_name: strategy_name.into(),
            success,
            validation_result: serde_json::Value::Null,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    /// Attach a serialized validation summary
    pub fn with_validation(mut self, validation_result: serde_json::Value) -> Self {
        self.validation_result = validation_result;
        self
    }
}

/// Human rating of an applied fix (1 = harmful, 5 = perfect)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRating {
    pub id: Uuid,
    pub fix_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FeedbackRating {
    /// Create a rating; values outside 1..=5 are clamped
    pub fn new(fix_id: Uuid, rating: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            fix_id,
            rating: rating.clamp(1, 5),
            comment: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Rating mapped onto [0, 1]
    pub fn normalized(&self) -> f64 {
        f64::from(self.rating - 1) / 4.0
    }
}

/// How an edit transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOutcome {
    Committed,
    RolledBack,
}

impl TransactionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionOutcome::Committed => "committed",
            TransactionOutcome::RolledBack => "rolled_back",
        }
    }
}

/// Audit record left behind once a transaction is closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAudit {
    pub transaction_id: Uuid,
    pub diagnostic_ids: Vec<Uuid>,
    pub files: Vec<PathBuf>,
    pub outcome: TransactionOutcome,
    pub reason: Option<String>,
    pub closed_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait: FixStore
// ═══════════════════════════════════════════════════════════════════════════

/// Persistence abstraction for the resolution engine
///
/// # Core Operations
///
/// 1. **Diagnostics**: `save_diagnostic` (upsert), `get_diagnostic`, `list_diagnostics`
/// 2. **Patterns**: `save_pattern` (upsert), `find_pattern`, `list_patterns`
/// 3. **Fixes**: `save_fix` (upsert), `get_fix`, `fixes_for_pattern`
/// 4. **Logs**: `append_log`, `list_logs` (append-only)
/// 5. **Feedback**: `save_feedback`, `feedback_for_fix`
/// 6. **Audit**: `save_audit`, `list_audits`
///
/// # Implementations
///
/// - `InMemoryFixStore`: process-local, used by tests and dry runs
/// - `SqliteFixStore`: durable SQLite adapter
#[async_trait]
pub trait FixStore: Send + Sync {
    // ═══════════════════════════════════════════════════════════════════════
    // Diagnostic Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert or replace a diagnostic
    async fn save_diagnostic(&self, diagnostic: &Diagnostic) -> Result<()>;

    /// Get diagnostic by ID
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::DiagnosticNotFound` if it does not exist
    async fn get_diagnostic(&self, id: Uuid) -> Result<Diagnostic>;

    /// List diagnostics, optionally filtered by status, oldest first
    async fn list_diagnostics(&self, status: Option<DiagnosticStatus>) -> Result<Vec<Diagnostic>>;

    // ═══════════════════════════════════════════════════════════════════════
    // Pattern Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert or replace a pattern (keyed by id, signature is unique)
    async fn save_pattern(&self, pattern: &Pattern) -> Result<()>;

    /// Look up a pattern by signature
    async fn find_pattern(&self, signature: &str) -> Result<Option<Pattern>>;

    /// All patterns, most frequent first
    async fn list_patterns(&self) -> Result<Vec<Pattern>>;

    // ═══════════════════════════════════════════════════════════════════════
    // Fix Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert or replace a fix
    async fn save_fix(&self, fix: &Fix) -> Result<()>;

    /// Get fix by ID
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::FixNotFound` if it does not exist
    async fn get_fix(&self, id: Uuid) -> Result<Fix>;

    /// Fixes previously generated for a pattern, best success rate first
    async fn fixes_for_pattern(&self, pattern_id: Uuid) -> Result<Vec<Fix>>;

    // ═══════════════════════════════════════════════════════════════════════
    // Application Log Operations (append-only)
    // ═══════════════════════════════════════════════════════════════════════

    /// Append a log entry
    async fn append_log(&self, log: &ApplicationLog) -> Result<()>;

    /// Most recent logs first (None = unlimited)
    async fn list_logs(&self, limit: Option<usize>) -> Result<Vec<ApplicationLog>>;

    // ═══════════════════════════════════════════════════════════════════════
    // Feedback & Audit Operations
    // ═══════════════════════════════════════════════════════════════════════

    async fn save_feedback(&self, feedback: &FeedbackRating) -> Result<()>;

    async fn feedback_for_fix(&self, fix_id: Uuid) -> Result<Vec<FeedbackRating>>;

    async fn save_audit(&self, audit: &TransactionAudit) -> Result<()>;

    async fn list_audits(&self) -> Result<Vec<TransactionAudit>>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
