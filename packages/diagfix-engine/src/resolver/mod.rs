//! Diagnostic resolution
//!
//! `Resolver::resolve` drives one diagnostic through the pattern, predictor
//! and AI passes. `Resolver::resolve_batch` walks a batch in dependency order
//! inside one transaction and handles fixes that introduce regressions.

mod batch;
mod outcome;
mod single;
mod state;

pub use batch::BatchPlan;
pub use outcome::{AttemptRecord, AttemptSource, BatchReport, ResolutionOutcome};
pub use state::ResolutionState;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use diagfix_storage::Diagnostic;

use crate::context::EngineContext;
use crate::error::Result;
use crate::external::TypeChecker;
use crate::symbols::relative_to_root;

pub struct Resolver {
    ctx: Arc<EngineContext>,
    auto_apply: bool,
    /// Concurrent file groups in a batch; 1 runs sequentially
    max_concurrency: usize,
}

impl Resolver {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let auto_apply = ctx.config.resolver.auto_apply;
        let max_concurrency = if ctx.config.concurrency.enabled {
            ctx.config.concurrency.max_concurrency
        } else {
            1
        };
        Self {
            ctx,
            auto_apply,
            max_concurrency,
        }
    }

    /// Override `resolver.auto_apply` for this resolver
    pub fn with_auto_apply(mut self, auto_apply: bool) -> Self {
        self.auto_apply = auto_apply;
        self
    }

    /// Override the concurrency section for this resolver
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }
}

/// Pre-fix diagnostics per root-relative file
///
/// Files are checked lazily the first time a fix touches them and refreshed
/// from the validator's post-fix run whenever a fix is kept.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    root: PathBuf,
    files: HashMap<PathBuf, Vec<Diagnostic>>,
}

impl Baseline {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: HashMap::new(),
        }
    }

    /// Seed from a full checker run over `checked`
    pub fn seeded(root: impl Into<PathBuf>, checked: &[PathBuf], diagnostics: &[Diagnostic]) -> Self {
        let mut baseline = Self::new(root);
        baseline.replace(checked, diagnostics);
        baseline
    }

    fn relative(&self, file: &Path) -> PathBuf {
        relative_to_root(&self.root, file)
    }

    pub fn contains(&self, file: &Path) -> bool {
        self.files.contains_key(&self.relative(file))
    }

    /// Check every file not yet known
    pub async fn ensure(&mut self, checker: &dyn TypeChecker, files: &[PathBuf]) -> Result<()> {
        let missing: Vec<PathBuf> = files
            .iter()
            .map(|f| self.relative(f))
            .filter(|f| !self.files.contains_key(f))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let found = checker.check(&missing).await?;
        self.replace(&missing, &found);
        Ok(())
    }

    pub fn diagnostics_for(&self, files: &[PathBuf]) -> Vec<Diagnostic> {
        files
            .iter()
            .filter_map(|f| self.files.get(&self.relative(f)))
            .flatten()
            .cloned()
            .collect()
    }

    /// Set the diagnostics of `files` from a checker run covering them
    pub fn replace(&mut self, files: &[PathBuf], diagnostics: &[Diagnostic]) {
        for file in files {
            let rel = self.relative(file);
            let in_file = diagnostics
                .iter()
                .filter(|d| self.relative(&d.file) == rel)
                .cloned()
                .collect();
            self.files.insert(rel, in_file);
        }
    }

    pub fn invalidate(&mut self, files: &[PathBuf]) {
        for file in files {
            let rel = self.relative(file);
            self.files.remove(&rel);
        }
    }
}
