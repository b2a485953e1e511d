//! Edit transactions
//!
//! A transaction owns the original bytes of every file it touched. Restoring
//! them reproduces the pre-transaction state exactly. Savepoints snapshot
//! files lazily: the first time a file is touched after a savepoint, its
//! content at that moment is recorded into every open savepoint.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use diagfix_storage::{TransactionAudit, TransactionOutcome};

/// Handle returned by `CodeTransformer::savepoint`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SavepointId(pub(crate) usize);

#[derive(Debug, Default)]
pub(crate) struct Savepoint {
    pub(crate) snapshots: BTreeMap<PathBuf, Vec<u8>>,
}

/// Unit of rollback
#[derive(Debug)]
pub struct Transaction {
    pub id: Uuid,
    pub diagnostic_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Absolute path → content before the transaction first touched it
    backups: BTreeMap<PathBuf, Vec<u8>>,
    pub(crate) savepoints: Vec<Savepoint>,
    pub(crate) locked: Vec<PathBuf>,
}

impl Transaction {
    pub(crate) fn new(diagnostic_ids: Vec<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            diagnostic_ids,
            created_at: Utc::now(),
            backups: BTreeMap::new(),
            savepoints: Vec::new(),
            locked: Vec::new(),
        }
    }

    /// Remember a diagnostic as part of this transaction
    pub fn include(&mut self, diagnostic_id: Uuid) {
        if !self.diagnostic_ids.contains(&diagnostic_id) {
            self.diagnostic_ids.push(diagnostic_id);
        }
    }

    /// Record pre-edit content; only the first call per file sticks
    pub(crate) fn record_before_write(&mut self, absolute: &Path, current: &[u8]) {
        self.backups
            .entry(absolute.to_path_buf())
            .or_insert_with(|| current.to_vec());
        for savepoint in &mut self.savepoints {
            savepoint
                .snapshots
                .entry(absolute.to_path_buf())
                .or_insert_with(|| current.to_vec());
        }
    }

    pub fn backup_of(&self, absolute: &Path) -> Option<&[u8]> {
        self.backups.get(absolute).map(Vec::as_slice)
    }

    pub(crate) fn backups(&self) -> &BTreeMap<PathBuf, Vec<u8>> {
        &self.backups
    }

    /// Absolute paths of every backed-up file
    pub fn files(&self) -> Vec<PathBuf> {
        self.backups.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }

    pub fn open_savepoints(&self) -> usize {
        self.savepoints.len()
    }

    pub(crate) fn audit(&self, outcome: TransactionOutcome, reason: Option<String>) -> TransactionAudit {
        TransactionAudit {
            transaction_id: self.id,
            diagnostic_ids: self.diagnostic_ids.clone(),
            files: self.files(),
            outcome,
            reason,
            closed_at: Utc::now(),
        }
    }
}
