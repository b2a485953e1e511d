//! SQLite FixStore
//!
//! File-based persistent storage using SQLite (bundled). The schema is
//! bootstrapped on open; every statement is idempotent so reopening an
//! existing database is safe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    ApplicationLog, Diagnostic, DiagnosticStatus, FeedbackRating, Fix, FixEdit, FixStore,
    Pattern, TransactionAudit, TransactionOutcome,
};
use crate::{Result, StorageError};

/// SQLite-based FixStore implementation
#[derive(Clone)]
pub struct SqliteFixStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFixStore {
    /// Open (or create) a store at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS diagnostics (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                message TEXT NOT NULL,
                file TEXT NOT NULL,
                line INTEGER NOT NULL,
                col INTEGER NOT NULL,
                severity TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL,
                pattern_id TEXT,
                fix_id TEXT,
                detected_at TEXT NOT NULL,
                resolved_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_diagnostics_status
             ON diagnostics(status, detected_at);

            CREATE TABLE IF NOT EXISTS patterns (
                id TEXT PRIMARY KEY,
                signature TEXT NOT NULL UNIQUE,
                template TEXT NOT NULL,
                category TEXT NOT NULL,
                frequency INTEGER NOT NULL DEFAULT 1,
                auto_fixable BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_seen TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fixes (
                id TEXT PRIMARY KEY,
                diagnostic_id TEXT NOT NULL,
                pattern_id TEXT,
                strategy TEXT NOT NULL,
                description TEXT NOT NULL,
                edits TEXT NOT NULL,
                is_generated BOOLEAN NOT NULL DEFAULT 0,
                confidence INTEGER NOT NULL,
                success_rate REAL NOT NULL DEFAULT 0.0,
                applications INTEGER NOT NULL DEFAULT 0,
                metadata TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_fixes_pattern
             ON fixes(pattern_id);

            CREATE TABLE IF NOT EXISTS application_logs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                diagnostic_id TEXT NOT NULL,
                fix_id TEXT,
                strategy_name TEXT NOT NULL,
                success BOOLEAN NOT NULL,
                validation_result TEXT,
                duration_ms INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                fix_id TEXT NOT NULL,
                rating INTEGER NOT NULL,
                comment TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_feedback_fix
             ON feedback(fix_id);

            CREATE TABLE IF NOT EXISTS transaction_audits (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_id TEXT NOT NULL,
                diagnostic_ids TEXT NOT NULL,
                files TEXT NOT NULL,
                outcome TEXT NOT NULL,
                reason TEXT,
                closed_at TEXT NOT NULL
            );",
        )?;

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Row mapping helpers
// ═══════════════════════════════════════════════════════════════════════════

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn parsed_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = StorageError>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn json_at<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn json_value_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null))
}

const DIAGNOSTIC_COLUMNS: &str = "id, code, message, file, line, col, severity, category, status,
     pattern_id, fix_id, detected_at, resolved_at";

fn diagnostic_from_row(row: &Row<'_>) -> rusqlite::Result<Diagnostic> {
    let file: String = row.get(3)?;
    Ok(Diagnostic {
        id: uuid_at(row, 0)?,
        code: row.get(1)?,
        message: row.get(2)?,
        file: PathBuf::from(file),
        line: row.get(4)?,
        column: row.get(5)?,
        severity: parsed_at(row, 6)?,
        category: parsed_at(row, 7)?,
        status: parsed_at(row, 8)?,
        pattern_id: opt_uuid_at(row, 9)?,
        fix_id: opt_uuid_at(row, 10)?,
        detected_at: row.get(11)?,
        resolved_at: row.get(12)?,
    })
}

const PATTERN_COLUMNS: &str =
    "id, signature, template, category, frequency, auto_fixable, created_at, last_seen";

fn pattern_from_row(row: &Row<'_>) -> rusqlite::Result<Pattern> {
    let frequency: i64 = row.get(4)?;
    Ok(Pattern {
        id: uuid_at(row, 0)?,
        signature: row.get(1)?,
        template: row.get(2)?,
        category: parsed_at(row, 3)?,
        frequency: frequency.max(0) as u64,
        auto_fixable: row.get(5)?,
        created_at: row.get(6)?,
        last_seen: row.get(7)?,
    })
}

const FIX_COLUMNS: &str = "id, diagnostic_id, pattern_id, strategy, description, edits,
     is_generated, confidence, success_rate, applications, metadata, created_at";

fn fix_from_row(row: &Row<'_>) -> rusqlite::Result<Fix> {
    let edits: Vec<FixEdit> = json_at(row, 5)?;
    let confidence: i32 = row.get(7)?;
    let success_rate: f64 = row.get(8)?;
    let applications: u32 = row.get(9)?;
    let created_at: DateTime<Utc> = row.get(11)?;

    let mut fix = Fix::new(uuid_at(row, 1)?, row.get::<_, String>(3)?, row.get::<_, String>(4)?, edits);
    fix.id = uuid_at(row, 0)?;
    fix.pattern_id = opt_uuid_at(row, 2)?;
    fix.is_generated = row.get(6)?;
    fix.metadata = json_value_at(row, 10)?;
    fix.created_at = created_at;
    fix.restore_stats(confidence, success_rate, applications);
    Ok(fix)
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<ApplicationLog> {
    let duration_ms: i64 = row.get(6)?;
    Ok(ApplicationLog {
        id: uuid_at(row, 0)?,
        diagnostic_id: uuid_at(row, 1)?,
        fix_id: opt_uuid_at(row, 2)?,
        strategy_name: row.get(3)?,
        success: row.get(4)?,
        validation_result: json_value_at(row, 5)?,
        duration_ms: duration_ms.max(0) as u64,
        timestamp: row.get(7)?,
    })
}

fn outcome_from_str(idx: usize, raw: &str) -> rusqlite::Result<TransactionOutcome> {
    match raw {
        "committed" => Ok(TransactionOutcome::Committed),
        "rolled_back" => Ok(TransactionOutcome::RolledBack),
        other => Err(conversion_error(
            idx,
            StorageError::serialization(format!("Unknown transaction outcome: {}", other)),
        )),
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl FixStore for SqliteFixStore {
    async fn save_diagnostic(&self, diagnostic: &Diagnostic) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO diagnostics
             (id, code, message, file, line, col, severity, category, status,
              pattern_id, fix_id, detected_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                diagnostic.id.to_string(),
                &diagnostic.code,
                &diagnostic.message,
                path_str(&diagnostic.file),
                diagnostic.line,
                diagnostic.column,
                diagnostic.severity.as_str(),
                diagnostic.category.as_str(),
                diagnostic.status.as_str(),
                diagnostic.pattern_id.map(|id| id.to_string()),
                diagnostic.fix_id.map(|id| id.to_string()),
                diagnostic.detected_at,
                diagnostic.resolved_at,
            ],
        )?;
        Ok(())
    }

    async fn get_diagnostic(&self, id: Uuid) -> Result<Diagnostic> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                &format!("SELECT {} FROM diagnostics WHERE id = ?1", DIAGNOSTIC_COLUMNS),
                params![id.to_string()],
                diagnostic_from_row,
            )
            .optional()?;
        result.ok_or_else(|| StorageError::diagnostic_not_found(id))
    }

    async fn list_diagnostics(&self, status: Option<DiagnosticStatus>) -> Result<Vec<Diagnostic>> {
        let conn = self.conn.lock();
        let diagnostics = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM diagnostics WHERE status = ?1 ORDER BY detected_at",
                    DIAGNOSTIC_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str()], diagnostic_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM diagnostics ORDER BY detected_at",
                    DIAGNOSTIC_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], diagnostic_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(diagnostics)
    }

    async fn save_pattern(&self, pattern: &Pattern) -> Result<()> {
        let conn = self.conn.lock();
        // Upsert keyed by id; the UNIQUE signature constraint rejects a second
        // pattern claiming an existing signature.
        conn.execute(
            "INSERT INTO patterns
             (id, signature, template, category, frequency, auto_fixable, created_at, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                template = excluded.template,
                category = excluded.category,
                frequency = excluded.frequency,
                auto_fixable = excluded.auto_fixable,
                last_seen = excluded.last_seen",
            params![
                pattern.id.to_string(),
                &pattern.signature,
                &pattern.template,
                pattern.category.as_str(),
                pattern.frequency as i64,
                pattern.auto_fixable,
                pattern.created_at,
                pattern.last_seen,
            ],
        )?;
        Ok(())
    }

    async fn find_pattern(&self, signature: &str) -> Result<Option<Pattern>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                &format!("SELECT {} FROM patterns WHERE signature = ?1", PATTERN_COLUMNS),
                params![signature],
                pattern_from_row,
            )
            .optional()?;
        Ok(result)
    }

    async fn list_patterns(&self) -> Result<Vec<Pattern>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM patterns ORDER BY frequency DESC, signature",
            PATTERN_COLUMNS
        ))?;
        let patterns = stmt
            .query_map([], pattern_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patterns)
    }

    async fn save_fix(&self, fix: &Fix) -> Result<()> {
        let edits = serde_json::to_string(&fix.edits)?;
        let metadata = serde_json::to_string(&fix.metadata)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO fixes
             (id, diagnostic_id, pattern_id, strategy, description, edits, is_generated,
              confidence, success_rate, applications, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                fix.id.to_string(),
                fix.diagnostic_id.to_string(),
                fix.pattern_id.map(|id| id.to_string()),
                &fix.strategy,
                &fix.description,
                edits,
                fix.is_generated,
                fix.confidence(),
                fix.success_rate(),
                fix.applications,
                metadata,
                fix.created_at,
            ],
        )?;
        Ok(())
    }

    async fn get_fix(&self, id: Uuid) -> Result<Fix> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                &format!("SELECT {} FROM fixes WHERE id = ?1", FIX_COLUMNS),
                params![id.to_string()],
                fix_from_row,
            )
            .optional()?;
        result.ok_or_else(|| StorageError::fix_not_found(id))
    }

    async fn fixes_for_pattern(&self, pattern_id: Uuid) -> Result<Vec<Fix>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM fixes WHERE pattern_id = ?1 ORDER BY success_rate DESC",
            FIX_COLUMNS
        ))?;
        let fixes = stmt
            .query_map(params![pattern_id.to_string()], fix_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fixes)
    }

    async fn append_log(&self, log: &ApplicationLog) -> Result<()> {
        let validation = serde_json::to_string(&log.validation_result)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO application_logs
             (id, diagnostic_id, fix_id, strategy_name, success, validation_result, duration_ms, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                log.id.to_string(),
                log.diagnostic_id.to_string(),
                log.fix_id.map(|id| id.to_string()),
                &log.strategy_name,
                log.success,
                validation,
                log.duration_ms as i64,
                log.timestamp,
            ],
        )?;
        Ok(())
    }

    async fn list_logs(&self, limit: Option<usize>) -> Result<Vec<ApplicationLog>> {
        let conn = self.conn.lock();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT id, diagnostic_id, fix_id, strategy_name, success, validation_result,
                    duration_ms, timestamp
             FROM application_logs ORDER BY seq DESC LIMIT ?1",
        )?;
        let logs = stmt
            .query_map(params![limit], log_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    async fn save_feedback(&self, feedback: &FeedbackRating) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO feedback (id, fix_id, rating, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                feedback.id.to_string(),
                feedback.fix_id.to_string(),
                feedback.rating,
                &feedback.comment,
                feedback.created_at,
            ],
        )?;
        Ok(())
    }

    async fn feedback_for_fix(&self, fix_id: Uuid) -> Result<Vec<FeedbackRating>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, fix_id, rating, comment, created_at
             FROM feedback WHERE fix_id = ?1 ORDER BY created_at",
        )?;
        let ratings = stmt
            .query_map(params![fix_id.to_string()], |row| {
                Ok(FeedbackRating {
                    id: uuid_at(row, 0)?,
                    fix_id: uuid_at(row, 1)?,
                    rating: row.get(2)?,
                    comment: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ratings)
    }

    async fn save_audit(&self, audit: &TransactionAudit) -> Result<()> {
        let diagnostic_ids = serde_json::to_string(&audit.diagnostic_ids)?;
        let files = serde_json::to_string(&audit.files)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO transaction_audits
             (transaction_id, diagnostic_ids, files, outcome, reason, closed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                audit.transaction_id.to_string(),
                diagnostic_ids,
                files,
                audit.outcome.as_str(),
                &audit.reason,
                audit.closed_at,
            ],
        )?;
        Ok(())
    }

    async fn list_audits(&self) -> Result<Vec<TransactionAudit>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT transaction_id, diagnostic_ids, files, outcome, reason, closed_at
             FROM transaction_audits ORDER BY seq",
        )?;
        let audits = stmt
            .query_map([], |row| {
                let outcome: String = row.get(3)?;
                Ok(TransactionAudit {
                    transaction_id: uuid_at(row, 0)?,
                    diagnostic_ids: json_at(row, 1)?,
                    files: json_at(row, 2)?,
                    outcome: outcome_from_str(3, &outcome)?,
                    reason: row.get(4)?,
                    closed_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(audits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DiagnosticCategory, Severity};
    use crate::ErrorKind;

    // ═══════════════════════════════════════════════════════════════════════
    // Diagnostic Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_diagnostic_round_trip() {
        let store = SqliteFixStore::in_memory().unwrap();
        let mut d = Diagnostic::new("TS2741", "Property 'x' is missing.", "src/a.ts", 4, 2)
            .with_severity(Severity::Warning)
            .with_category(DiagnosticCategory::MissingProperty);
        d.transition(DiagnosticStatus::Pending).unwrap();
        d.transition(DiagnosticStatus::Fixed).unwrap();
        store.save_diagnostic(&d).await.unwrap();

        let loaded = store.get_diagnostic(d.id).await.unwrap();
        assert_eq!(loaded.code, "TS2741");
        assert_eq!(loaded.file, PathBuf::from("src/a.ts"));
        assert_eq!(loaded.severity, Severity::Warning);
        assert_eq!(loaded.category, DiagnosticCategory::MissingProperty);
        assert_eq!(loaded.status, DiagnosticStatus::Fixed);
        assert!(loaded.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_get_missing_diagnostic() {
        let store = SqliteFixStore::in_memory().unwrap();
        let err = store.get_diagnostic(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::DiagnosticNotFound);
    }

    #[tokio::test]
    async fn test_list_diagnostics_by_status() {
        let store = SqliteFixStore::in_memory().unwrap();
        let a = Diagnostic::new("TS1", "a", "a.ts", 1, 1);
        let mut b = Diagnostic::new("TS2", "b", "a.ts", 2, 1);
        b.transition(DiagnosticStatus::Failed).unwrap();
        store.save_diagnostic(&a).await.unwrap();
        store.save_diagnostic(&b).await.unwrap();

        assert_eq!(store.list_diagnostics(None).await.unwrap().len(), 2);
        let failed = store
            .list_diagnostics(Some(DiagnosticStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, b.id);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Pattern & Fix Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_pattern_upsert_keeps_frequency() {
        let store = SqliteFixStore::in_memory().unwrap();
        let mut p = Pattern::new("abc123", "cannot find name '<N>'", DiagnosticCategory::UnresolvedReference);
        store.save_pattern(&p).await.unwrap();

        p.record_occurrence();
        p.auto_fixable = true;
        store.save_pattern(&p).await.unwrap();

        let loaded = store.find_pattern("abc123").await.unwrap().unwrap();
        assert_eq!(loaded.frequency, 2);
        assert!(loaded.auto_fixable);
        assert_eq!(store.list_patterns().await.unwrap().len(), 1);

        let dup = Pattern::new("abc123", "x", DiagnosticCategory::Other);
        assert!(store.save_pattern(&dup).await.is_err());
    }

    #[tokio::test]
    async fn test_fix_round_trip() {
        let store = SqliteFixStore::in_memory().unwrap();
        let pattern_id = Uuid::new_v4();
        let mut fix = Fix::new(
            Uuid::new_v4(),
            "type_coercion",
            "Wrap in Number()",
            vec![FixEdit::new("a.ts", 10, 15, "Number(input)")],
        )
        .with_confidence(90)
        .with_pattern(pattern_id)
        .with_metadata(serde_json::json!({"pair": "string->number"}));
        fix.record_application(true);
        store.save_fix(&fix).await.unwrap();

        let loaded = store.get_fix(fix.id).await.unwrap();
        assert_eq!(loaded.edits, fix.edits);
        assert_eq!(loaded.confidence(), 90);
        assert_eq!(loaded.success_rate(), 1.0);
        assert_eq!(loaded.applications, 1);
        assert_eq!(loaded.metadata["pair"], "string->number");

        let by_pattern = store.fixes_for_pattern(pattern_id).await.unwrap();
        assert_eq!(by_pattern.len(), 1);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Log, Feedback & Audit Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_logs_append_only_newest_first() {
        let store = SqliteFixStore::in_memory().unwrap();
        let diagnostic_id = Uuid::new_v4();
        for name in ["first", "second", "third"] {
            let log = ApplicationLog::new(diagnostic_id, None, name, true, 5);
            store.append_log(&log).await.unwrap();
        }

        let all = store.list_logs(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].strategy_name, "third");

        let limited = store.list_logs(Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_feedback_and_audit() {
        let store = SqliteFixStore::in_memory().unwrap();
        let fix_id = Uuid::new_v4();
        store
            .save_feedback(&FeedbackRating::new(fix_id, 4).with_comment("fine"))
            .await
            .unwrap();
        let ratings = store.feedback_for_fix(fix_id).await.unwrap();
        assert_eq!(ratings[0].rating, 4);
        assert_eq!(ratings[0].comment.as_deref(), Some("fine"));

        let audit = TransactionAudit {
            transaction_id: Uuid::new_v4(),
            diagnostic_ids: vec![Uuid::new_v4()],
            files: vec![PathBuf::from("a.ts")],
            outcome: TransactionOutcome::RolledBack,
            reason: Some("introduced regressions".to_string()),
            closed_at: Utc::now(),
        };
        store.save_audit(&audit).await.unwrap();
        let audits = store.list_audits().await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].outcome, TransactionOutcome::RolledBack);
        assert_eq!(audits[0].files, audit.files);
    }

    #[tokio::test]
    async fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagfix.db");

        let d = Diagnostic::new("TS7006", "Parameter 'x' implicitly has an 'any' type.", "b.ts", 1, 10);
        {
            let store = SqliteFixStore::new(&path).unwrap();
            store.save_diagnostic(&d).await.unwrap();
        }

        let store = SqliteFixStore::new(&path).unwrap();
        assert_eq!(store.get_diagnostic(d.id).await.unwrap().code, "TS7006");
    }
}
