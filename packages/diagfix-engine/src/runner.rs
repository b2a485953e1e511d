//! Batch run entrypoint
//!
//! Discovers source files, runs the type-checker once over them, prioritizes
//! the detected diagnostics and resolves the selected ones as one batch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use diagfix_storage::{Diagnostic, DiagnosticCategory, TransactionAudit};

use crate::classify::classify_diagnostic;
use crate::context::EngineContext;
use crate::error::Result;
use crate::prioritize::{prioritize, BucketMetrics, PrioritizationOptions, PriorityAssignment, PrioritySignals};
use crate::resolver::{Baseline, ResolutionOutcome, Resolver};
use crate::symbols::discover_sources;

/// Options of one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Directories below the project root to scan; empty scans everything
    pub include_dirs: Vec<PathBuf>,
    pub exclude_dirs: Vec<PathBuf>,
    /// Resolve at most this many diagnostics, highest priority first
    pub max_diagnostics: Option<usize>,
    /// Keep validated fixes on disk; false only reports suggestions
    pub auto_fix: bool,
    pub prioritization: PrioritizationOptions,
    /// Concurrent file groups; None keeps the configured concurrency
    pub concurrency: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            include_dirs: Vec::new(),
            exclude_dirs: Vec::new(),
            max_diagnostics: None,
            auto_fix: true,
            prioritization: PrioritizationOptions::default(),
            concurrency: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub detected: usize,
    pub analyzed: usize,
    pub resolved: usize,
    pub elapsed_ms: u64,
    pub buckets: BucketMetrics,
    pub priorities: Vec<PriorityAssignment>,
    pub outcomes: Vec<ResolutionOutcome>,
    pub transactions: Vec<TransactionAudit>,
}

pub struct BatchRunner {
    ctx: Arc<EngineContext>,
}

impl BatchRunner {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, options: RunOptions) -> Result<RunSummary> {
        let started = Instant::now();
        let root = self.ctx.root().to_path_buf();

        let files: Vec<PathBuf> = discover_sources(&root, &options.include_dirs, &options.exclude_dirs)
            .iter()
            .map(|f| self.ctx.transformer.relative(f))
            .collect();
        info!(files = files.len(), root = %root.display(), "checking project");

        let mut detected = self.ctx.checker().check(&files).await?;
        for diagnostic in &mut detected {
            if diagnostic.category == DiagnosticCategory::Other {
                classify_diagnostic(diagnostic);
            }
        }
        let baseline = Baseline::seeded(&root, &files, &detected);

        let mut resolver = Resolver::new(Arc::clone(&self.ctx)).with_auto_apply(options.auto_fix);
        if let Some(n) = options.concurrency {
            resolver = resolver.with_max_concurrency(n);
        }

        // Prioritize the full detection, then keep the top of it
        let full_plan = resolver.plan(&detected);
        let signals = self.signals(&detected, &full_plan.dependents).await;
        let priorities = prioritize(&options.prioritization, &detected, &signals);
        let by_id: HashMap<Uuid, PriorityAssignment> = priorities.iter().map(|p| (p.diagnostic_id, *p)).collect();

        let limit = options.max_diagnostics.unwrap_or(detected.len()).min(detected.len());
        let mut ranked: Vec<(usize, f64)> = priorities.iter().enumerate().map(|(i, p)| (i, p.score)).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        let selected: std::collections::HashSet<usize> = ranked.iter().take(limit).map(|(i, _)| *i).collect();

        let mut analyzed = Vec::with_capacity(limit);
        let mut skipped = Vec::new();
        for (i, diagnostic) in detected.iter().enumerate() {
            if selected.contains(&i) {
                analyzed.push(diagnostic.clone());
            } else {
                skipped.push(ResolutionOutcome::skipped(diagnostic, "beyond max_diagnostics"));
            }
        }

        let plan = if analyzed.len() == detected.len() {
            full_plan
        } else {
            resolver.plan(&analyzed)
        };
        let analyzed_count = analyzed.len();
        let mut report = resolver.execute(&plan, analyzed, baseline).await?;

        let mut buckets = BucketMetrics::default();
        for outcome in &report.outcomes {
            if let Some(priority) = by_id.get(&outcome.diagnostic_id) {
                buckets.record(priority.bucket, outcome.is_fixed());
            }
        }
        report.outcomes.extend(skipped);

        if let Err(e) = self.ctx.flush() {
            warn!(error = %e, "predictor snapshot not persisted");
        }

        let summary = RunSummary {
            detected: detected.len(),
            analyzed: analyzed_count,
            resolved: report.fixed(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            buckets,
            priorities,
            outcomes: report.outcomes,
            transactions: report.transactions,
        };
        info!(
            detected = summary.detected,
            analyzed = summary.analyzed,
            resolved = summary.resolved,
            elapsed_ms = summary.elapsed_ms,
            "run finished"
        );
        Ok(summary)
    }

    /// Dependents, historical pattern frequency and best-candidate feedback
    async fn signals(&self, diagnostics: &[Diagnostic], dependents: &HashMap<Uuid, usize>) -> HashMap<Uuid, PrioritySignals> {
        let mut signals = HashMap::with_capacity(diagnostics.len());
        for diagnostic in diagnostics {
            let frequency = match self.ctx.patterns.frequency_of(diagnostic).await {
                Ok(frequency) => frequency,
                Err(e) => {
                    warn!(diagnostic = %diagnostic.id, error = %e, "pattern frequency unavailable");
                    0
                }
            };
            let feedback = {
                let metrics = self.ctx.metrics();
                self.ctx
                    .registry
                    .candidates(diagnostic)
                    .first()
                    .map(|c| metrics.feedback_weight(c.id()))
                    .unwrap_or(crate::metrics::NEUTRAL_FEEDBACK)
            };
            signals.insert(
                diagnostic.id,
                PrioritySignals {
                    dependents: dependents.get(&diagnostic.id).copied().unwrap_or(0),
                    frequency,
                    feedback,
                },
            );
        }
        signals
    }
}
