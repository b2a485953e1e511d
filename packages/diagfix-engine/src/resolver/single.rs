//! Single-diagnostic resolution loop

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use diagfix_storage::{ApplicationLog, Diagnostic, DiagnosticStatus, Fix};

use super::outcome::{AttemptRecord, AttemptSource, ResolutionOutcome};
use super::state::ResolutionState;
use super::{Baseline, Resolver};
use crate::error::{EngineError, Result};
use crate::external::{CompletionRequest, CompletionService, AI_STRATEGY_ID};
use crate::predictor::{extract, FeatureVector};
use crate::strategy::{FixContext, FixStrategy};
use crate::symbols::relative_to_root;
use crate::transform::{LineShift, SavepointId, Transaction};

/// Source lines on each side of the diagnostic used as predictor context
const FEATURE_CONTEXT_LINES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Own transaction; regressing fixes are simply rejected
    Single,
    /// Shared transaction; regression-only fixes are handed back to the batch
    Batch,
}

/// A fix left on disk that only failed the new-diagnostics gate
pub(crate) struct ProvisionalFix {
    pub savepoint: SavepointId,
    pub fix: Fix,
    pub strategy: String,
    pub new_diagnostics: usize,
}

pub(crate) struct Attempted {
    pub outcome: ResolutionOutcome,
    pub provisional: Option<ProvisionalFix>,
    /// Line shifts of a kept fix, by root-relative file
    pub shifts: Vec<(PathBuf, Vec<LineShift>)>,
}

impl Attempted {
    fn done(outcome: ResolutionOutcome) -> Self {
        Self {
            outcome,
            provisional: None,
            shifts: Vec::new(),
        }
    }
}

enum Generator {
    Strategy(Arc<dyn FixStrategy>),
    Ai(Arc<dyn CompletionService>),
}

impl Generator {
    fn id(&self) -> &str {
        match self {
            Generator::Strategy(s) => s.id(),
            Generator::Ai(_) => AI_STRATEGY_ID,
        }
    }
}

fn context_window(source: &str, line: u32) -> String {
    let first = line.saturating_sub(FEATURE_CONTEXT_LINES).max(1) as usize;
    let last = line.saturating_add(FEATURE_CONTEXT_LINES) as usize;
    source
        .lines()
        .enumerate()
        .filter(|(i, _)| (first..=last).contains(&(i + 1)))
        .map(|(_, l)| l)
        .collect::<Vec<_>>()
        .join("\n")
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

impl Resolver {
    /// Resolve one diagnostic in its own transaction
    ///
    /// The transaction is committed when a fix is kept and rolled back
    /// otherwise. Its audit record is persisted either way.
    pub async fn resolve(&self, diagnostic: &mut Diagnostic) -> Result<ResolutionOutcome> {
        let mut baseline = Baseline::new(self.ctx.root());
        let mut tx = self.ctx.transformer.begin(vec![diagnostic.id], &[])?;

        match self.attempt_in(&mut tx, diagnostic, &mut baseline, Mode::Single, 0).await {
            Ok(attempted) => {
                let outcome = attempted.outcome;
                let audit = if outcome.is_fixed() {
                    self.ctx.transformer.commit(tx)
                } else {
                    self.ctx
                        .transformer
                        .rollback(tx, format!("no fix kept ({})", outcome.state))?
                };
                self.save_audit(&audit).await;
                Ok(outcome)
            }
            Err(e) => {
                match self.ctx.transformer.rollback(tx, e.to_string()) {
                    Ok(audit) => self.save_audit(&audit).await,
                    Err(rollback) => warn!(error = %rollback, "rollback after failed resolution incomplete"),
                }
                Err(e)
            }
        }
    }

    /// Run every pass for `diagnostic` inside `tx`
    pub(crate) async fn attempt_in(
        &self,
        tx: &mut Transaction,
        diagnostic: &mut Diagnostic,
        baseline: &mut Baseline,
        mode: Mode,
        dependents: usize,
    ) -> Result<Attempted> {
        let started = Instant::now();
        let resolver_config = &self.ctx.config.resolver;
        let deadline = started + Duration::from_millis(resolver_config.timeout_ms);
        let mut outcome = ResolutionOutcome::new(diagnostic);

        if diagnostic.status == DiagnosticStatus::Detected {
            diagnostic.transition(DiagnosticStatus::Pending)?;
        }
        if diagnostic.status != DiagnosticStatus::Pending {
            outcome.state.transition(ResolutionState::Skipped)?;
            outcome.reason = Some(format!("diagnostic already {}", diagnostic.status.as_str()));
            return Ok(Attempted::done(outcome));
        }

        let covered = self.ctx.registry.covers(diagnostic);
        if let Err(e) = self.ctx.patterns.observe(diagnostic, covered).await {
            warn!(diagnostic = %diagnostic.id, error = %e, "pattern tracking failed");
        }
        self.save_diagnostic(diagnostic).await;
        outcome.state.transition(ResolutionState::Attempting)?;

        let source = match self.ctx.transformer.read_file(&diagnostic.file) {
            Ok(source) => source,
            Err(e) => {
                return self
                    .finish_failed(diagnostic, outcome, format!("cannot read source: {}", e), started)
                    .await
            }
        };
        let features = extract(diagnostic, Some(&context_window(&source, diagnostic.line)), dependents);
        let mut tried: Vec<String> = Vec::new();
        let mut timed_out = false;
        // Shared by the pattern and predictor passes
        let max_attempts = resolver_config.max_attempts as usize;

        // Pass 1: pattern-based candidates by confidence
        let candidates = self.ctx.registry.candidates(diagnostic);
        for candidate in candidates.into_iter().take(max_attempts) {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            tried.push(candidate.id().to_string());
            let generator = Generator::Strategy(Arc::clone(&candidate.strategy));
            if let Some(done) = self
                .try_fix(tx, diagnostic, baseline, mode, &generator, AttemptSource::Pattern, &features, &mut outcome, started)
                .await?
            {
                return Ok(done);
            }
        }

        // Pass 2: predictor-guided strategies not tried yet
        if resolver_config.use_predictor && !timed_out && tried.len() < max_attempts {
            let remaining: Vec<_> = self
                .ctx
                .registry
                .matching(diagnostic)
                .into_iter()
                .filter(|c| !tried.iter().any(|t| t == c.id()))
                .collect();
            if !remaining.is_empty() {
                let ids: Vec<&str> = remaining.iter().map(|c| c.id()).collect();
                let predictions = self.ctx.predictor().predict(&features, &ids);
                for prediction in predictions {
                    if tried.len() >= max_attempts {
                        debug!(diagnostic = %diagnostic.id, max_attempts, "attempt limit reached");
                        break;
                    }
                    if prediction.confidence < resolver_config.predictor_min_confidence {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        timed_out = true;
                        break;
                    }
                    let Some(strategy) = self.ctx.registry.get(&prediction.strategy) else {
                        continue;
                    };
                    debug!(
                        diagnostic = %diagnostic.id,
                        strategy = %prediction.strategy,
                        confidence = prediction.confidence,
                        rationale = %prediction.rationale,
                        "predictor-guided attempt"
                    );
                    tried.push(prediction.strategy.clone());
                    if let Some(done) = self
                        .try_fix(
                            tx,
                            diagnostic,
                            baseline,
                            mode,
                            &Generator::Strategy(strategy),
                            AttemptSource::Predictor,
                            &features,
                            &mut outcome,
                            started,
                        )
                        .await?
                    {
                        return Ok(done);
                    }
                }
            }
        }

        // Pass 3: one AI suggestion under the same validation contract
        if resolver_config.ai_fallback && !timed_out {
            if let Some(service) = &self.ctx.completion {
                if Instant::now() >= deadline {
                    timed_out = true;
                } else if let Some(done) = self
                    .try_fix(
                        tx,
                        diagnostic,
                        baseline,
                        mode,
                        &Generator::Ai(Arc::clone(service)),
                        AttemptSource::Ai,
                        &features,
                        &mut outcome,
                        started,
                    )
                    .await?
                {
                    return Ok(done);
                }
            }
        }

        let reason = if timed_out {
            format!(
                "timed out after {} attempt(s) ({}ms budget)",
                outcome.attempts.len(),
                resolver_config.timeout_ms
            )
        } else if outcome.attempts.is_empty() {
            "no applicable strategy".to_string()
        } else {
            format!("all {} attempt(s) failed", outcome.attempts.len())
        };
        self.finish_failed(diagnostic, outcome, reason, started).await
    }

    /// Generate, apply, validate and keep or revert one fix
    ///
    /// Returns `Some` when the diagnostic is settled (fixed, suggested or
    /// provisionally kept), `None` to move on to the next candidate.
    #[allow(clippy::too_many_arguments)]
    async fn try_fix(
        &self,
        tx: &mut Transaction,
        diagnostic: &mut Diagnostic,
        baseline: &mut Baseline,
        mode: Mode,
        generator: &Generator,
        source: AttemptSource,
        features: &FeatureVector,
        outcome: &mut ResolutionOutcome,
        started: Instant,
    ) -> Result<Option<Attempted>> {
        let attempt_started = Instant::now();
        let strategy = generator.id().to_string();

        let mut fix = match self.generate(generator, diagnostic).await {
            Ok(fix) => fix,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!(diagnostic = %diagnostic.id, strategy = %strategy, error = %e, "no fix generated");
                let record = AttemptRecord::failed(&strategy, source, &e, elapsed_ms(attempt_started));
                self.learn(diagnostic, &strategy, features, None, false, &record).await;
                outcome.attempts.push(record);
                return Ok(None);
            }
        };
        if let Some(pattern_id) = diagnostic.pattern_id {
            fix.pattern_id = Some(pattern_id);
        }

        // Baseline for every file the fix will touch, taken before writing
        let root = self.ctx.root();
        let mut files = vec![relative_to_root(root, &diagnostic.file)];
        let checked = match self.ctx.transformer.preview(&fix.edits) {
            Ok(changes) => {
                for change in changes {
                    let rel = relative_to_root(root, &change.file);
                    if !files.contains(&rel) {
                        files.push(rel);
                    }
                }
                baseline.ensure(self.ctx.checker().as_ref(), &files).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = checked {
            if e.is_fatal() {
                return Err(e);
            }
            let record = AttemptRecord::failed(&strategy, source, &e, elapsed_ms(attempt_started));
            self.learn(diagnostic, &strategy, features, Some(&mut fix), false, &record).await;
            outcome.attempts.push(record);
            return Ok(None);
        }
        let before = baseline.diagnostics_for(&files);

        let savepoint = self.ctx.transformer.savepoint(tx);
        let applied = self.ctx.transformer.apply_fix(tx, &fix);
        let changes = match applied {
            Ok(changes) => changes,
            Err(e) => {
                self.ctx.transformer.rollback_to(tx, savepoint)?;
                if e.is_fatal() {
                    return Err(e);
                }
                let record = AttemptRecord::failed(&strategy, source, &e, elapsed_ms(attempt_started));
                self.learn(diagnostic, &strategy, features, Some(&mut fix), false, &record).await;
                outcome.attempts.push(record);
                return Ok(None);
            }
        };

        let report = match self.ctx.validator.validate(diagnostic, &fix, &changes, &before).await {
            Ok(report) => report,
            Err(e) => {
                let restored = self.ctx.transformer.rollback_to(tx, savepoint)?;
                self.refresh_symbols(&restored);
                if e.is_fatal() {
                    return Err(e);
                }
                let record = AttemptRecord::failed(&strategy, source, &e, elapsed_ms(attempt_started));
                self.learn(diagnostic, &strategy, features, Some(&mut fix), false, &record).await;
                outcome.attempts.push(record);
                return Ok(None);
            }
        };
        let summary = report.summary();
        let auto_apply = self.auto_apply;

        if report.is_valid {
            let record = AttemptRecord::succeeded(&strategy, source, fix.id, summary, elapsed_ms(attempt_started));
            self.learn(diagnostic, &strategy, features, Some(&mut fix), true, &record).await;
            outcome.attempts.push(record);

            let mut shifts = Vec::new();
            let state = if auto_apply {
                self.ctx.transformer.release(tx, savepoint);
                let touched: Vec<PathBuf> = changes.iter().map(|c| c.file.clone()).collect();
                baseline.replace(&files, &report.post_diagnostics);
                {
                    let mut symbols = self.ctx.symbols_mut();
                    for change in &changes {
                        let relative = self.ctx.transformer.relative(&change.absolute);
                        symbols.update_file(&relative, &change.updated);
                        shifts.push((relative, change.shifts.clone()));
                    }
                }
                diagnostic.transition(DiagnosticStatus::Fixed)?;
                info!(
                    diagnostic = %diagnostic.id,
                    code = %diagnostic.code,
                    strategy = %strategy,
                    files = touched.len(),
                    "diagnostic fixed"
                );
                ResolutionState::Fixed
            } else {
                self.ctx.transformer.rollback_to(tx, savepoint)?;
                info!(diagnostic = %diagnostic.id, strategy = %strategy, "validated fix returned as suggestion");
                ResolutionState::Suggested
            };

            diagnostic.fix_id = Some(fix.id);
            self.save_diagnostic(diagnostic).await;
            outcome.state.transition(state)?;
            outcome.strategy = Some(strategy);
            outcome.fix = Some(fix);
            outcome.duration_ms = elapsed_ms(started);
            return Ok(Some(Attempted {
                outcome: outcome.clone(),
                provisional: None,
                shifts,
            }));
        }

        let reason = match report.first_failure() {
            Some(stage) => format!("validation failed at {}", stage.as_str()),
            None => "validation failed".to_string(),
        };
        let record = AttemptRecord::rejected(&strategy, source, fix.id, &reason, summary, elapsed_ms(attempt_started));
        self.learn(diagnostic, &strategy, features, Some(&mut fix), false, &record).await;
        outcome.attempts.push(record);

        if mode == Mode::Batch && auto_apply && report.only_regressions() {
            debug!(
                diagnostic = %diagnostic.id,
                strategy = %strategy,
                new_diagnostics = report.new_diagnostics.len(),
                "fix kept provisionally"
            );
            outcome.duration_ms = elapsed_ms(started);
            return Ok(Some(Attempted {
                outcome: outcome.clone(),
                provisional: Some(ProvisionalFix {
                    savepoint,
                    strategy,
                    new_diagnostics: report.new_diagnostics.len(),
                    fix,
                }),
                shifts: Vec::new(),
            }));
        }

        let restored = self.ctx.transformer.rollback_to(tx, savepoint)?;
        self.refresh_symbols(&restored);
        debug!(diagnostic = %diagnostic.id, strategy = %strategy, reason = %reason, "fix reverted");
        Ok(None)
    }

    async fn generate(&self, generator: &Generator, diagnostic: &Diagnostic) -> Result<Fix> {
        let source = self.ctx.transformer.read_file(&diagnostic.file).map_err(|e| match e {
            EngineError::Io(io) => EngineError::strategy(generator.id(), format!("cannot read source: {}", io)),
            other => other,
        })?;
        let root = self.ctx.root();

        match generator {
            Generator::Strategy(strategy) => {
                let symbols = self.ctx.symbols();
                strategy.generate_fix(&FixContext::new(diagnostic, &source, &symbols, root))
            }
            Generator::Ai(service) => {
                let request = {
                    let symbols = self.ctx.symbols();
                    CompletionRequest::from_context(&FixContext::new(diagnostic, &source, &symbols, root))
                };
                self.ctx.throttle_ai().await;

                let timeout_ms = self.ctx.config.ai.timeout_ms;
                let suggestion = tokio::time::timeout(Duration::from_millis(timeout_ms), service.suggest(&request))
                    .await
                    .map_err(|_| EngineError::Timeout(format!("{} after {}ms", service.name(), timeout_ms)))??;

                let symbols = self.ctx.symbols();
                suggestion.into_fix(&FixContext::new(diagnostic, &source, &symbols, root))
            }
        }
    }

    /// Feed one attempt into the predictor, metrics, fix statistics and logs
    ///
    /// Persistence problems are logged and never fail the attempt.
    async fn learn(
        &self,
        diagnostic: &Diagnostic,
        strategy: &str,
        features: &FeatureVector,
        fix: Option<&mut Fix>,
        success: bool,
        record: &AttemptRecord,
    ) {
        if let Err(e) = self.ctx.predictor().record_outcome(strategy, features.clone(), success) {
            warn!(strategy, error = %e, "predictor snapshot not persisted");
        }
        {
            let mut metrics = self.ctx.metrics();
            metrics.record_outcome(strategy, diagnostic.category, success, record.duration_ms);
            if let Some(fix) = fix.as_deref() {
                metrics.register_fix(fix.id, strategy);
            }
        }

        let fix_id = match fix {
            Some(fix) => {
                fix.record_application(success);
                if let Err(e) = self.ctx.store.save_fix(fix).await {
                    warn!(fix = %fix.id, error = %e, "fix not persisted");
                }
                Some(fix.id)
            }
            None => None,
        };

        let validation = record.validation.clone().unwrap_or_else(|| {
            serde_json::json!({
                "error": record.error,
                "category": record.error_category.map(|c| c.as_str()),
            })
        });
        let log = ApplicationLog::new(diagnostic.id, fix_id, strategy, success, record.duration_ms)
            .with_validation(validation);
        if let Err(e) = self.ctx.store.append_log(&log).await {
            warn!(diagnostic = %diagnostic.id, error = %e, "application log not persisted");
        }
    }

    pub(crate) async fn finish_failed(
        &self,
        diagnostic: &mut Diagnostic,
        mut outcome: ResolutionOutcome,
        reason: String,
        started: Instant,
    ) -> Result<Attempted> {
        diagnostic.transition(DiagnosticStatus::Failed)?;
        self.save_diagnostic(diagnostic).await;
        outcome.state.transition(ResolutionState::Failed)?;
        info!(diagnostic = %diagnostic.id, code = %diagnostic.code, reason = %reason, "diagnostic not resolved");
        outcome.reason = Some(reason);
        outcome.duration_ms = elapsed_ms(started);
        Ok(Attempted::done(outcome))
    }

    /// Re-index files after their content was restored from a snapshot
    pub(crate) fn refresh_symbols(&self, absolute: &[PathBuf]) {
        if absolute.is_empty() {
            return;
        }
        let mut symbols = self.ctx.symbols_mut();
        for path in absolute {
            match std::fs::read_to_string(path) {
                Ok(content) => symbols.update_file(&self.ctx.transformer.relative(path), &content),
                Err(e) => debug!(file = %path.display(), error = %e, "cannot re-index restored file"),
            }
        }
    }

    pub(crate) async fn save_diagnostic(&self, diagnostic: &Diagnostic) {
        if let Err(e) = self.ctx.store.save_diagnostic(diagnostic).await {
            warn!(diagnostic = %diagnostic.id, error = %e, "diagnostic not persisted");
        }
    }

    pub(crate) async fn save_audit(&self, audit: &diagfix_storage::TransactionAudit) {
        if let Err(e) = self.ctx.store.save_audit(audit).await {
            warn!(transaction = %audit.transaction_id, error = %e, "transaction audit not persisted");
        }
    }
}
