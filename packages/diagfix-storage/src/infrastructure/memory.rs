//! In-memory FixStore
//!
//! HashMap-based implementation used by tests and `--dry-run` sessions.
//! Nothing survives the process.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    ApplicationLog, Diagnostic, DiagnosticStatus, FeedbackRating, Fix, FixStore, Pattern,
    TransactionAudit,
};
use crate::{Result, StorageError};

#[derive(Clone, Default)]
pub struct InMemoryFixStore {
    diagnostics: Arc<RwLock<HashMap<Uuid, Diagnostic>>>,
    patterns: Arc<RwLock<HashMap<Uuid, Pattern>>>,
    fixes: Arc<RwLock<HashMap<Uuid, Fix>>>,
    logs: Arc<RwLock<Vec<ApplicationLog>>>,
    feedback: Arc<RwLock<Vec<FeedbackRating>>>,
    audits: Arc<RwLock<Vec<TransactionAudit>>>,
}

impl InMemoryFixStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FixStore for InMemoryFixStore {
    async fn save_diagnostic(&self, diagnostic: &Diagnostic) -> Result<()> {
        self.diagnostics
            .write()
            .insert(diagnostic.id, diagnostic.clone());
        Ok(())
    }

    async fn get_diagnostic(&self, id: Uuid) -> Result<Diagnostic> {
        self.diagnostics
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::diagnostic_not_found(id))
    }

    async fn list_diagnostics(&self, status: Option<DiagnosticStatus>) -> Result<Vec<Diagnostic>> {
        let mut diagnostics: Vec<Diagnostic> = self
            .diagnostics
            .read()
            .values()
            .filter(|d| status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        diagnostics.sort_by_key(|d| d.detected_at);
        Ok(diagnostics)
    }

    async fn save_pattern(&self, pattern: &Pattern) -> Result<()> {
        let mut patterns = self.patterns.write();
        if patterns
            .values()
            .any(|p| p.signature == pattern.signature && p.id != pattern.id)
        {
            return Err(StorageError::database(format!(
                "Duplicate pattern signature: {}",
                pattern.signature
            )));
        }
        patterns.insert(pattern.id, pattern.clone());
        Ok(())
    }

    async fn find_pattern(&self, signature: &str) -> Result<Option<Pattern>> {
        Ok(self
            .patterns
            .read()
            .values()
            .find(|p| p.signature == signature)
            .cloned())
    }

    async fn list_patterns(&self) -> Result<Vec<Pattern>> {
        let mut patterns: Vec<Pattern> = self.patterns.read().values().cloned().collect();
        patterns.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.signature.cmp(&b.signature)));
        Ok(patterns)
    }

    async fn save_fix(&self, fix: &Fix) -> Result<()> {
        self.fixes.write().insert(fix.id, fix.clone());
        Ok(())
    }

    async fn get_fix(&self, id: Uuid) -> Result<Fix> {
        self.fixes
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::fix_not_found(id))
    }

    async fn fixes_for_pattern(&self, pattern_id: Uuid) -> Result<Vec<Fix>> {
        let mut fixes: Vec<Fix> = self
            .fixes
            .read()
            .values()
            .filter(|f| f.pattern_id == Some(pattern_id))
            .cloned()
            .collect();
        fixes.sort_by(|a, b| b.success_rate().total_cmp(&a.success_rate()));
        Ok(fixes)
    }

    async fn append_log(&self, log: &ApplicationLog) -> Result<()> {
        self.logs.write().push(log.clone());
        Ok(())
    }

    async fn list_logs(&self, limit: Option<usize>) -> Result<Vec<ApplicationLog>> {
        let logs = self.logs.read();
        let take = limit.unwrap_or(logs.len());
        Ok(logs.iter().rev().take(take).cloned().collect())
    }

    async fn save_feedback(&self, feedback: &FeedbackRating) -> Result<()> {
        self.feedback.write().push(feedback.clone());
        Ok(())
    }

    async fn feedback_for_fix(&self, fix_id: Uuid) -> Result<Vec<FeedbackRating>> {
        Ok(self
            .feedback
            .read()
            .iter()
            .filter(|f| f.fix_id == fix_id)
            .cloned()
            .collect())
    }

    async fn save_audit(&self, audit: &TransactionAudit) -> Result<()> {
        self.audits.write().push(audit.clone());
        Ok(())
    }

    async fn list_audits(&self) -> Result<Vec<TransactionAudit>> {
        Ok(self.audits.read().clone())
    }
}
