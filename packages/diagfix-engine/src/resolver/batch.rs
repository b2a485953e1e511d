//! Batch resolution
//!
//! Diagnostics are resolved in dependency order inside one transaction per
//! sequence. The first fix in the batch that introduces new diagnostics rolls
//! its transaction back and every fix kept in it becomes `RolledBack`. After
//! that, in any sequence, a regressing fix is reverted alone and its
//! diagnostic fails.
//!
//! Kept fixes move lines. Each diagnostic is remapped through the shifts of
//! the fixes kept before it in the same transaction, and gets its original
//! line back when that transaction is rolled back.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use diagfix_storage::{Diagnostic, DiagnosticStatus};

use super::outcome::{BatchReport, ResolutionOutcome};
use super::single::{Attempted, Mode, ProvisionalFix};
use super::state::ResolutionState;
use super::{Baseline, Resolver};
use crate::config::BatchOrdering;
use crate::error::Result;
use crate::graph::{cluster_diagnostics, clustered_order, DiagnosticGraph};
use crate::symbols::relative_to_root;
use crate::transform::{LineMap, Transaction};

const REGRESSION_REASON: &str = "introduced regressions";

/// Resolution order and dependency counts of a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    pub order: Vec<Uuid>,
    /// Diagnostic → number of diagnostics depending on it
    pub dependents: HashMap<Uuid, usize>,
    pub root_causes: Vec<Uuid>,
}

impl BatchPlan {
    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.order.iter().position(|o| *o == id)
    }
}

/// State of one sequential run
struct Sequence<'a> {
    tx: Transaction,
    baseline: Baseline,
    /// Set once for the whole batch, by the first regression in any sequence
    rolled_back: &'a AtomicBool,
    report: BatchReport,
    /// Diagnostics by outcome index
    diagnostics: Vec<Diagnostic>,
    /// Line each diagnostic was detected at, by outcome index
    original_lines: Vec<u32>,
    /// Outcome indices fixed inside the open transaction
    fixed_in_tx: Vec<usize>,
    /// Shifts of the fixes kept inside the open transaction
    lines: LineMap,
}

impl Sequence<'_> {
    fn push(&mut self, outcome: ResolutionOutcome, diagnostic: Diagnostic, original_line: u32) {
        self.report.outcomes.push(outcome);
        self.diagnostics.push(diagnostic);
        self.original_lines.push(original_line);
    }
}

impl Resolver {
    /// Order the batch per the configured ordering
    pub fn plan(&self, diagnostics: &[Diagnostic]) -> BatchPlan {
        let root = self.ctx.root();
        let graph = {
            let symbols = self.ctx.symbols();
            DiagnosticGraph::build(diagnostics, &symbols, root)
        };
        let topological = graph.topological_order();
        let order = match self.ctx.config.resolver.ordering {
            BatchOrdering::Topological => topological,
            BatchOrdering::Clustered => {
                let clusters = cluster_diagnostics(diagnostics, root, self.ctx.config.graph.proximity_window);
                clustered_order(&topological, &clusters)
            }
        };
        BatchPlan {
            dependents: diagnostics.iter().map(|d| (d.id, graph.dependent_count(d.id))).collect(),
            root_causes: graph.root_causes(),
            order,
        }
    }

    /// Plan and resolve a batch, checking files lazily
    pub async fn resolve_batch(&self, diagnostics: Vec<Diagnostic>) -> Result<BatchReport> {
        let plan = self.plan(&diagnostics);
        let baseline = Baseline::new(self.ctx.root());
        self.execute(&plan, diagnostics, baseline).await
    }

    /// Resolve a planned batch
    ///
    /// With concurrency enabled, diagnostics are grouped by file and groups run
    /// concurrently, each in its own transaction. Only the first regression of
    /// the whole batch rolls a transaction back.
    pub async fn execute(&self, plan: &BatchPlan, diagnostics: Vec<Diagnostic>, baseline: Baseline) -> Result<BatchReport> {
        let mut by_id: HashMap<Uuid, Diagnostic> = diagnostics.into_iter().map(|d| (d.id, d)).collect();
        let ordered: Vec<Diagnostic> = plan.order.iter().filter_map(|id| by_id.remove(id)).collect();
        let rolled_back = AtomicBool::new(false);

        let mut report = if self.max_concurrency > 1 {
            let root = self.ctx.root();
            let mut groups: BTreeMap<PathBuf, Vec<Diagnostic>> = BTreeMap::new();
            for d in ordered {
                groups.entry(relative_to_root(root, &d.file)).or_default().push(d);
            }
            info!(groups = groups.len(), max_concurrency = self.max_concurrency, "resolving file groups concurrently");

            let results: Vec<Result<BatchReport>> = stream::iter(groups.into_values())
                .map(|group| self.run_sequence(group, plan, baseline.clone(), &rolled_back))
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;

            let mut merged = BatchReport::default();
            for result in results {
                merged.merge(result?);
            }
            merged
        } else {
            self.run_sequence(ordered, plan, baseline, &rolled_back).await?
        };

        report
            .outcomes
            .sort_by_key(|o| plan.position(o.diagnostic_id).unwrap_or(usize::MAX));
        info!(
            diagnostics = report.outcomes.len(),
            fixed = report.fixed(),
            failed = report.count(ResolutionState::Failed),
            rolled_back = report.count(ResolutionState::RolledBack),
            "batch resolved"
        );
        Ok(report)
    }

    async fn run_sequence(
        &self,
        diagnostics: Vec<Diagnostic>,
        plan: &BatchPlan,
        baseline: Baseline,
        rolled_back: &AtomicBool,
    ) -> Result<BatchReport> {
        let root = self.ctx.root();
        let ids: Vec<Uuid> = diagnostics.iter().map(|d| d.id).collect();
        let mut seq = Sequence {
            tx: self.ctx.transformer.begin(ids, &[])?,
            baseline,
            rolled_back,
            report: BatchReport::default(),
            diagnostics: Vec::with_capacity(diagnostics.len()),
            original_lines: Vec::with_capacity(diagnostics.len()),
            fixed_in_tx: Vec::new(),
            lines: LineMap::new(),
        };

        for mut diagnostic in diagnostics {
            let original_line = diagnostic.line;
            diagnostic.line = seq
                .lines
                .current_line(&relative_to_root(root, &diagnostic.file), original_line);
            if diagnostic.line != original_line {
                debug!(
                    diagnostic = %diagnostic.id,
                    from = original_line,
                    to = diagnostic.line,
                    "diagnostic moved by earlier fixes"
                );
            }

            let dependents = plan.dependents.get(&diagnostic.id).copied().unwrap_or(0);
            let attempted = self
                .attempt_in(&mut seq.tx, &mut diagnostic, &mut seq.baseline, Mode::Batch, dependents)
                .await;

            match attempted {
                Ok(Attempted {
                    outcome,
                    provisional: None,
                    shifts,
                }) => {
                    if outcome.is_fixed() {
                        seq.fixed_in_tx.push(seq.report.outcomes.len());
                    }
                    for (file, file_shifts) in shifts {
                        seq.lines.record(file, &file_shifts);
                    }
                    seq.push(outcome, diagnostic, original_line);
                }
                Ok(Attempted {
                    outcome,
                    provisional: Some(provisional),
                    ..
                }) => {
                    self.handle_regression(&mut seq, diagnostic, original_line, outcome, provisional)
                        .await?;
                }
                Err(e) if e.is_fatal() => {
                    error!(diagnostic = %diagnostic.id, error = %e, "unexpected error, rolling back batch");
                    match self.ctx.transformer.rollback(seq.tx, e.to_string()) {
                        Ok(audit) => self.save_audit(&audit).await,
                        Err(rollback) => warn!(error = %rollback, "rollback after unexpected error incomplete"),
                    }
                    return Err(e);
                }
                Err(e) => {
                    warn!(diagnostic = %diagnostic.id, error = %e, "diagnostic attempt aborted");
                    let mut outcome = ResolutionOutcome::new(&diagnostic);
                    outcome.state = if diagnostic.status == DiagnosticStatus::Pending
                        && diagnostic.transition(DiagnosticStatus::Failed).is_ok()
                    {
                        self.save_diagnostic(&diagnostic).await;
                        ResolutionState::Failed
                    } else {
                        ResolutionState::Skipped
                    };
                    outcome.reason = Some(e.to_string());
                    seq.push(outcome, diagnostic, original_line);
                }
            }
        }

        let audit = self.ctx.transformer.commit(seq.tx);
        self.save_audit(&audit).await;
        seq.report.transactions.push(audit);
        Ok(seq.report)
    }

    async fn handle_regression(
        &self,
        seq: &mut Sequence<'_>,
        mut diagnostic: Diagnostic,
        original_line: u32,
        mut outcome: ResolutionOutcome,
        provisional: ProvisionalFix,
    ) -> Result<()> {
        let first = seq
            .rolled_back
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if !first {
            // Revert this fix alone
            let restored = self.ctx.transformer.rollback_to(&mut seq.tx, provisional.savepoint)?;
            self.refresh_symbols(&restored);
            diagnostic.transition(DiagnosticStatus::Failed)?;
            self.save_diagnostic(&diagnostic).await;
            outcome.state.transition(ResolutionState::Failed)?;
            outcome.reason = Some(format!(
                "{} ({} new diagnostic(s)), fix reverted",
                REGRESSION_REASON, provisional.new_diagnostics
            ));
            warn!(
                diagnostic = %diagnostic.id,
                strategy = %provisional.strategy,
                new_diagnostics = provisional.new_diagnostics,
                "regressing fix reverted"
            );
            seq.push(outcome, diagnostic, original_line);
            return Ok(());
        }

        // First regression: undo the whole transaction
        let remaining: Vec<Uuid> = seq.tx.diagnostic_ids.clone();
        let fresh = self.ctx.transformer.begin(remaining, &[])?;
        let closed = std::mem::replace(&mut seq.tx, fresh);
        let files = closed.files();
        match self.ctx.transformer.rollback(closed, REGRESSION_REASON) {
            Ok(audit) => {
                self.save_audit(&audit).await;
                seq.report.transactions.push(audit);
            }
            Err(e) => error!(error = %e, "batch rollback incomplete"),
        }
        seq.baseline.invalidate(&files);
        self.refresh_symbols(&files);

        // Files are back to their detected content, and so are the lines
        seq.lines.clear();
        let fixed: Vec<usize> = std::mem::take(&mut seq.fixed_in_tx);
        for (index, earlier) in seq.diagnostics.iter_mut().enumerate() {
            let line = seq.original_lines[index];
            seq.report.outcomes[index].line = line;
            if earlier.line != line {
                earlier.line = line;
                if !fixed.contains(&index) {
                    if let Err(e) = self.ctx.store.save_diagnostic(earlier).await {
                        warn!(diagnostic = %earlier.id, error = %e, "diagnostic not persisted");
                    }
                }
            }
        }
        diagnostic.line = original_line;
        outcome.line = original_line;

        let reason = format!(
            "{}: rolled back after {} added {} new diagnostic(s)",
            REGRESSION_REASON, diagnostic.code, provisional.new_diagnostics
        );
        for index in fixed {
            let earlier = &mut seq.report.outcomes[index];
            earlier.state.transition(ResolutionState::RolledBack)?;
            earlier.reason = Some(reason.clone());
            let earlier_diag = &mut seq.diagnostics[index];
            earlier_diag.transition(DiagnosticStatus::RolledBack)?;
            if let Err(e) = self.ctx.store.save_diagnostic(earlier_diag).await {
                warn!(diagnostic = %earlier_diag.id, error = %e, "diagnostic not persisted");
            }
        }

        // The regressing fix was applied, then undone with the rest
        diagnostic.transition(DiagnosticStatus::Fixed)?;
        diagnostic.fix_id = Some(provisional.fix.id);
        diagnostic.transition(DiagnosticStatus::RolledBack)?;
        self.save_diagnostic(&diagnostic).await;
        outcome.state.transition(ResolutionState::Fixed)?;
        outcome.state.transition(ResolutionState::RolledBack)?;
        outcome.strategy = Some(provisional.strategy.clone());
        outcome.fix = Some(provisional.fix);
        outcome.reason = Some(format!(
            "{} ({} new diagnostic(s))",
            REGRESSION_REASON, provisional.new_diagnostics
        ));
        warn!(
            diagnostic = %diagnostic.id,
            strategy = %provisional.strategy,
            new_diagnostics = provisional.new_diagnostics,
            "fix introduced regressions, transaction rolled back"
        );
        seq.push(outcome, diagnostic, original_line);
        Ok(())
    }
}
