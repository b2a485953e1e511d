//! Code transformer: the only component that writes source files

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use diagfix_storage::{Fix, FixEdit, TransactionAudit, TransactionOutcome};

use super::edit::{apply_in_memory, validate_edits, AppliedChange};
use super::transaction::{Savepoint, SavepointId, Transaction};
use crate::error::{EngineError, Result};
use crate::syntax::check_syntax;

/// Applies and undoes edits under a project root
///
/// Every write goes through a `Transaction`. A file belongs to at most one
/// open transaction at a time (lock table shared by clones).
#[derive(Clone)]
pub struct CodeTransformer {
    root: PathBuf,
    locks: Arc<DashMap<PathBuf, Uuid>>,
}

impl CodeTransformer {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = fs::canonicalize(root.as_ref())?;
        Ok(Self {
            root,
            locks: Arc::new(DashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of `file`, rejecting anything outside the root
    pub fn resolve(&self, file: &Path) -> Result<PathBuf> {
        let joined = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(EngineError::PathOutsideRoot(file.to_path_buf()));
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other.as_os_str()),
            }
        }
        if !normalized.starts_with(&self.root) {
            return Err(EngineError::PathOutsideRoot(file.to_path_buf()));
        }

        // Symlinks may still point outside
        if normalized.exists() {
            let canonical = fs::canonicalize(&normalized)?;
            if !canonical.starts_with(&self.root) {
                return Err(EngineError::PathOutsideRoot(file.to_path_buf()));
            }
            return Ok(canonical);
        }
        Ok(normalized)
    }

    /// Root-relative form of an absolute path
    pub fn relative(&self, absolute: &Path) -> PathBuf {
        absolute
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| absolute.to_path_buf())
    }

    pub fn read_file(&self, file: &Path) -> Result<String> {
        let path = self.resolve(file)?;
        Ok(fs::read_to_string(path)?)
    }

    /// Open a transaction and lock `files` up front
    pub fn begin(&self, diagnostic_ids: Vec<Uuid>, files: &[PathBuf]) -> Result<Transaction> {
        let mut tx = Transaction::new(diagnostic_ids);
        for file in files {
            let absolute = self.resolve(file)?;
            if let Err(e) = self.lock(&mut tx, &absolute) {
                self.unlock_all(&mut tx);
                return Err(e);
            }
        }
        debug!(transaction = %tx.id, files = files.len(), "transaction opened");
        Ok(tx)
    }

    fn check_lock(&self, tx: &Transaction, absolute: &Path) -> Result<()> {
        match self.locks.get(absolute) {
            Some(owner) if *owner != tx.id => Err(EngineError::transaction(format!(
                "{} is locked by transaction {}",
                absolute.display(),
                *owner
            ))),
            _ => Ok(()),
        }
    }

    fn lock(&self, tx: &mut Transaction, absolute: &Path) -> Result<()> {
        let mut entry = self.locks.entry(absolute.to_path_buf()).or_insert(tx.id);
        if *entry != tx.id {
            return Err(EngineError::transaction(format!(
                "{} is locked by transaction {}",
                absolute.display(),
                *entry
            )));
        }
        *entry = tx.id;
        drop(entry);
        if !tx.locked.iter().any(|p| p == absolute) {
            tx.locked.push(absolute.to_path_buf());
        }
        Ok(())
    }

    fn unlock_all(&self, tx: &mut Transaction) {
        for path in tx.locked.drain(..) {
            self.locks.remove_if(&path, |_, owner| *owner == tx.id);
        }
    }

    /// Is `file` held by any open transaction
    pub fn is_locked(&self, file: &Path) -> bool {
        self.resolve(file)
            .map(|p| self.locks.contains_key(&p))
            .unwrap_or(false)
    }

    /// Validate and apply edits in memory without touching disk
    pub fn preview(&self, edits: &[FixEdit]) -> Result<Vec<AppliedChange>> {
        let mut by_file: BTreeMap<&Path, Vec<&FixEdit>> = BTreeMap::new();
        for edit in edits {
            by_file.entry(edit.file.as_path()).or_default().push(edit);
        }

        let mut changes = Vec::with_capacity(by_file.len());
        for (file, file_edits) in by_file {
            let absolute = self.resolve(file)?;
            let original = fs::read_to_string(&absolute)?;
            validate_edits(file, &original, &file_edits)?;
            let (updated, shifts, touched_lines) = apply_in_memory(&original, &file_edits);
            check_syntax(&absolute, &updated)?;
            changes.push(AppliedChange {
                file: file.to_path_buf(),
                absolute,
                original,
                updated,
                shifts,
                touched_lines,
            });
        }
        Ok(changes)
    }

    /// Apply edits inside `tx`
    ///
    /// All files are validated, re-parsed and backed up before any of them is
    /// written. On error nothing is written and the transaction keeps no new
    /// backups.
    pub fn apply_edits(&self, tx: &mut Transaction, edits: &[FixEdit]) -> Result<Vec<AppliedChange>> {
        let changes = self.preview(edits)?;
        for change in &changes {
            self.check_lock(tx, &change.absolute)?;
        }

        for change in &changes {
            self.lock(tx, &change.absolute)?;
            tx.record_before_write(&change.absolute, change.original.as_bytes());
        }

        for (i, change) in changes.iter().enumerate() {
            if let Err(e) = fs::write(&change.absolute, &change.updated) {
                warn!(file = %change.absolute.display(), error = %e, "write failed, restoring");
                for written in &changes[..i] {
                    if let Err(restore) = fs::write(&written.absolute, &written.original) {
                        warn!(file = %written.absolute.display(), error = %restore, "restore failed");
                    }
                }
                return Err(e.into());
            }
        }

        debug!(
            transaction = %tx.id,
            files = changes.len(),
            edits = edits.len(),
            "edits applied"
        );
        Ok(changes)
    }

    /// Apply every edit of `fix`
    pub fn apply_fix(&self, tx: &mut Transaction, fix: &Fix) -> Result<Vec<AppliedChange>> {
        if fix.edits.is_empty() {
            return Err(EngineError::strategy(&fix.strategy, "fix has no edits"));
        }
        if let Some((a, b)) = fix.find_overlap() {
            return Err(EngineError::OverlappingEdits {
                file: a.file.clone(),
                first: format!("{}..{}", a.start_offset, a.end_offset),
                second: format!("{}..{}", b.start_offset, b.end_offset),
            });
        }
        tx.include(fix.diagnostic_id);
        self.apply_edits(tx, &fix.edits)
    }

    pub fn savepoint(&self, tx: &mut Transaction) -> SavepointId {
        tx.savepoints.push(Savepoint::default());
        SavepointId(tx.savepoints.len() - 1)
    }

    /// Restore files to their content at `savepoint` and close it (and any
    /// later savepoint)
    pub fn rollback_to(&self, tx: &mut Transaction, savepoint: SavepointId) -> Result<Vec<PathBuf>> {
        if savepoint.0 >= tx.savepoints.len() {
            return Err(EngineError::transaction(format!(
                "savepoint {} is not open in transaction {}",
                savepoint.0, tx.id
            )));
        }
        let closed: Vec<Savepoint> = tx.savepoints.drain(savepoint.0..).collect();
        let Some(target) = closed.into_iter().next() else {
            return Ok(Vec::new());
        };

        let mut restored = Vec::with_capacity(target.snapshots.len());
        let mut first_error = None;
        for (path, bytes) in target.snapshots {
            match fs::write(&path, &bytes) {
                Ok(()) => restored.push(path),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "savepoint restore failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }
        debug!(transaction = %tx.id, files = restored.len(), "rolled back to savepoint");
        Ok(restored)
    }

    /// Keep changes made since `savepoint` and close it (and any later one)
    pub fn release(&self, tx: &mut Transaction, savepoint: SavepointId) {
        if savepoint.0 < tx.savepoints.len() {
            tx.savepoints.truncate(savepoint.0);
        }
    }

    /// Keep every change; the transaction becomes an audit record
    pub fn commit(&self, mut tx: Transaction) -> TransactionAudit {
        self.unlock_all(&mut tx);
        info!(
            transaction = %tx.id,
            files = tx.files().len(),
            diagnostics = tx.diagnostic_ids.len(),
            "transaction committed"
        );
        tx.audit(TransactionOutcome::Committed, None)
    }

    /// Restore every backed-up file verbatim
    ///
    /// All files are attempted even if one fails; locks are always released.
    pub fn rollback(&self, mut tx: Transaction, reason: impl Into<String>) -> Result<TransactionAudit> {
        let reason = reason.into();
        let mut failures = Vec::new();
        for (path, bytes) in tx.backups() {
            if let Err(e) = fs::write(path, bytes) {
                warn!(file = %path.display(), error = %e, "rollback restore failed");
                failures.push(format!("{}: {}", path.display(), e));
            }
        }
        self.unlock_all(&mut tx);

        if !failures.is_empty() {
            return Err(EngineError::transaction(format!(
                "rollback of {} incomplete: {}",
                tx.id,
                failures.join("; ")
            )));
        }
        info!(transaction = %tx.id, files = tx.files().len(), reason = %reason, "transaction rolled back");
        Ok(tx.audit(TransactionOutcome::RolledBack, Some(reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> (TempDir, CodeTransformer) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let transformer = CodeTransformer::new(dir.path()).unwrap();
        (dir, transformer)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Path Checks
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_path_traversal_rejected() {
        let (_dir, t) = project(&[("a.ts", "")]);
        assert!(matches!(
            t.resolve(Path::new("../outside.ts")),
            Err(EngineError::PathOutsideRoot(_))
        ));
        assert!(matches!(
            t.resolve(Path::new("src/../../x.ts")),
            Err(EngineError::PathOutsideRoot(_))
        ));
        assert!(t.resolve(Path::new("src/../a.ts")).is_ok());
        assert!(matches!(
            t.resolve(Path::new("/etc/passwd")),
            Err(EngineError::PathOutsideRoot(_))
        ));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Apply / Rollback
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_apply_and_rollback_exact() {
        let original = "const total: number = input;\n";
        let (dir, t) = project(&[("a.ts", original)]);
        let mut tx = t.begin(vec![], &[]).unwrap();

        let edits = vec![FixEdit::new("a.ts", 22, 27, "Number(input)")];
        let changes = t.apply_edits(&mut tx, &edits).unwrap();
        assert_eq!(changes[0].updated, "const total: number = Number(input);\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("a.ts")).unwrap(),
            "const total: number = Number(input);\n"
        );
        assert!(t.is_locked(Path::new("a.ts")));

        let audit = t.rollback(tx, "test").unwrap();
        assert_eq!(audit.outcome, TransactionOutcome::RolledBack);
        assert_eq!(fs::read_to_string(dir.path().join("a.ts")).unwrap(), original);
        assert!(!t.is_locked(Path::new("a.ts")));
    }

    #[test]
    fn test_syntax_error_writes_nothing() {
        let original = "const x = f(1);\n";
        let (dir, t) = project(&[("a.ts", original)]);
        let mut tx = t.begin(vec![], &[]).unwrap();

        let edits = vec![FixEdit::delete("a.ts", 13, 14)];
        let err = t.apply_edits(&mut tx, &edits).unwrap_err();
        assert!(matches!(err, EngineError::SyntaxRejected { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("a.ts")).unwrap(), original);
        assert!(tx.is_empty());
    }

    #[test]
    fn test_multi_file_all_or_nothing() {
        let (dir, t) = project(&[("a.ts", "let a = 1;\n"), ("b.ts", "let b = 2;\n")]);
        let mut tx = t.begin(vec![], &[]).unwrap();

        // Second file's edit is out of bounds: neither file changes
        let edits = vec![
            FixEdit::new("a.ts", 8, 9, "10"),
            FixEdit::new("b.ts", 8, 400, "20"),
        ];
        assert!(t.apply_edits(&mut tx, &edits).is_err());
        assert_eq!(fs::read_to_string(dir.path().join("a.ts")).unwrap(), "let a = 1;\n");
        assert!(tx.is_empty());
    }

    #[test]
    fn test_savepoint_reverts_one_fix_only() {
        let (dir, t) = project(&[("a.ts", "let a = 1;\nlet b = 2;\n")]);
        let mut tx = t.begin(vec![], &[]).unwrap();

        t.apply_edits(&mut tx, &[FixEdit::new("a.ts", 8, 9, "10")]).unwrap();
        let sp = t.savepoint(&mut tx);
        t.apply_edits(&mut tx, &[FixEdit::new("a.ts", 20, 21, "20")]).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("a.ts")).unwrap(),
            "let a = 10;\nlet b = 20;\n"
        );

        t.rollback_to(&mut tx, sp).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("a.ts")).unwrap(),
            "let a = 10;\nlet b = 2;\n"
        );
        assert_eq!(tx.open_savepoints(), 0);

        t.rollback(tx, "done").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("a.ts")).unwrap(),
            "let a = 1;\nlet b = 2;\n"
        );
    }

    #[test]
    fn test_lock_conflict_is_transaction_failure() {
        let (_dir, t) = project(&[("a.ts", "let a = 1;\n")]);
        let first = t.begin(vec![], &[PathBuf::from("a.ts")]).unwrap();

        let err = t.begin(vec![], &[PathBuf::from("a.ts")]).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::TransactionFailure);

        let mut other = t.begin(vec![], &[]).unwrap();
        assert!(t
            .apply_edits(&mut other, &[FixEdit::new("a.ts", 8, 9, "2")])
            .is_err());

        t.commit(first);
        assert!(t
            .apply_edits(&mut other, &[FixEdit::new("a.ts", 8, 9, "2")])
            .is_ok());
        t.commit(other);
    }
}
