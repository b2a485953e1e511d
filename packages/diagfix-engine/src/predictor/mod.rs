//! Strategy predictor
//!
//! Learns from outcomes which strategy is most likely to fix a diagnostic.
//!
//! ```text
//! base       = 0.3·code + 0.3·category + 0.15·severity + 0.25·aggregate   (Laplace-smoothed)
//! history    = code ratio when the code was seen more than twice, else 0.1
//! similarity = cosine(diagnostic terms, strategy term weights)
//! score      = 0.5·base + 0.3·history + 0.2·similarity
//! ```
//!
//! Scores are normalized across the candidates to give a confidence.

pub mod evaluation;
pub mod features;
pub mod model;

pub use evaluation::{evaluate, ConfusionMatrix, EvaluationReport, StrategyMetrics};
pub use features::{cosine, extract, FeatureVector};
pub use model::{Counter, OutcomeRecord, PredictorModel, StrategyStats, MODEL_VERSION};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;

const HISTORY_MIN_SAMPLES: u64 = 2;
const HISTORY_PRIOR: f64 = 0.1;

/// Weighted parts of a strategy score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub history: f64,
    pub similarity: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub strategy: String,
    /// Normalized across the candidates, in [0, 1]
    pub confidence: f64,
    pub breakdown: ScoreBreakdown,
    pub rationale: String,
}

/// Unnormalized score of one strategy
pub fn score(model: &PredictorModel, strategy: &str, features: &FeatureVector) -> ScoreBreakdown {
    let default = StrategyStats::default();
    let stats = model.stats(strategy).unwrap_or(&default);

    let code = stats.code(&features.code);
    let base = 0.3 * code.smoothed()
        + 0.3 * stats.category(&features.category).smoothed()
        + 0.15 * stats.severity(&features.severity).smoothed()
        + 0.25 * stats.aggregate.smoothed();
    let history = if code.total > HISTORY_MIN_SAMPLES {
        code.ratio()
    } else {
        HISTORY_PRIOR
    };
    let similarity = cosine(&features.terms, &stats.term_weights);

    ScoreBreakdown {
        base,
        history,
        similarity,
        score: 0.5 * base + 0.3 * history + 0.2 * similarity,
    }
}

fn describe(label: &str, counter: Counter) -> String {
    format!(
        "{} success rate {:.0}% over {} attempts",
        label,
        counter.ratio() * 100.0,
        counter.total
    )
}

/// Explain a score by its largest counted contribution
///
/// Term similarity is appended when strong, never cited alone.
fn rationale(model: &PredictorModel, strategy: &str, features: &FeatureVector, breakdown: &ScoreBreakdown) -> String {
    let Some(stats) = model.stats(strategy) else {
        return "no history for this strategy".to_string();
    };

    let code = stats.code(&features.code);
    let category = stats.category(&features.category);
    let severity = stats.severity(&features.severity);

    let mut factors: Vec<(f64, String)> = Vec::new();
    if code.total > 0 {
        let history = if code.total > HISTORY_MIN_SAMPLES { 0.3 * breakdown.history } else { 0.0 };
        factors.push((0.15 * code.ratio() + history, describe(&format!("code {}", features.code), code)));
    }
    if category.total > 0 {
        factors.push((0.15 * category.ratio(), describe(&format!("category {}", features.category), category)));
    }
    if severity.total > 0 {
        factors.push((0.075 * severity.ratio(), describe(&format!("severity {}", features.severity), severity)));
    }
    if stats.aggregate.total > 0 {
        factors.push((0.125 * stats.aggregate.ratio(), describe("overall", stats.aggregate)));
    }

    let mut text = factors
        .into_iter()
        .fold(None::<(f64, String)>, |best, next| match best {
            Some(b) if b.0 >= next.0 => Some(b),
            _ => Some(next),
        })
        .map(|(_, text)| text)
        .unwrap_or_else(|| "no history for this strategy".to_string());
    if breakdown.similarity >= 0.5 {
        text.push_str(&format!("; message similarity {:.2} with past successes", breakdown.similarity));
    }
    text
}

/// Online-learning predictor with periodic JSON persistence
pub struct StrategyPredictor {
    model: PredictorModel,
    path: Option<PathBuf>,
    persist_every: u32,
    since_persist: u32,
}

impl StrategyPredictor {
    /// In-memory predictor
    pub fn new(persist_every: u32) -> Self {
        Self {
            model: PredictorModel::new(),
            path: None,
            persist_every: persist_every.max(1),
            since_persist: 0,
        }
    }

    /// Load a snapshot, rebuilding it when the schema version changed
    ///
    /// A missing file starts an empty model; an unreadable one is replaced.
    pub fn load_or_new(path: impl Into<PathBuf>, persist_every: u32) -> Result<Self> {
        let path = path.into();
        let model = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<PredictorModel>(&content) {
                Ok(mut model) => {
                    if model.version != MODEL_VERSION {
                        info!(
                            from = model.version,
                            to = MODEL_VERSION,
                            outcomes = model.outcomes.len(),
                            "predictor model version changed, rebuilding"
                        );
                        model.rebuild();
                    }
                    model
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "predictor snapshot unreadable, starting fresh");
                    PredictorModel::new()
                }
            }
        } else {
            PredictorModel::new()
        };

        Ok(Self {
            model,
            path: Some(path),
            persist_every: persist_every.max(1),
            since_persist: 0,
        })
    }

    pub fn model(&self) -> &PredictorModel {
        &self.model
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rank `candidates`, best first; ties keep the candidate order
    pub fn predict(&self, features: &FeatureVector, candidates: &[&str]) -> Vec<Prediction> {
        let scored: Vec<(usize, &str, ScoreBreakdown)> = candidates
            .iter()
            .enumerate()
            .map(|(i, s)| (i, *s, score(&self.model, s, features)))
            .collect();
        let total: f64 = scored.iter().map(|(_, _, b)| b.score).sum();

        let mut predictions: Vec<(usize, Prediction)> = scored
            .into_iter()
            .map(|(i, strategy, breakdown)| {
                let confidence = if total > 0.0 {
                    (breakdown.score / total).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let rationale = rationale(&self.model, strategy, features, &breakdown);
                (
                    i,
                    Prediction {
                        strategy: strategy.to_string(),
                        confidence,
                        breakdown,
                        rationale,
                    },
                )
            })
            .collect();

        predictions.sort_by(|(ia, a), (ib, b)| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ia.cmp(ib))
        });
        predictions.into_iter().map(|(_, p)| p).collect()
    }

    /// Fold one outcome in; persists every `persist_every` outcomes
    ///
    /// The in-memory model is always updated, even when persisting fails.
    pub fn record_outcome(&mut self, strategy: &str, features: FeatureVector, success: bool) -> Result<()> {
        self.model.record(OutcomeRecord::new(strategy, features, success));
        self.since_persist += 1;
        debug!(strategy, success, iterations = self.model.training_iterations, "predictor updated");

        if self.since_persist >= self.persist_every {
            self.since_persist = 0;
            self.persist()?;
        }
        Ok(())
    }

    /// Write the snapshot (temp file, then rename)
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.model)?)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), outcomes = self.model.outcomes.len(), "predictor persisted");
        Ok(())
    }

    /// Rebuild from the outcome log, reporting prequential accuracy
    pub fn retrain(&mut self) -> EvaluationReport {
        let report = evaluate(&self.model.outcomes);
        self.model.rebuild();
        info!(
            samples = report.samples,
            accuracy = report.accuracy,
            macro_f1 = report.macro_f1,
            "predictor retrained"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagfix_storage::{Diagnostic, DiagnosticCategory};
    use tempfile::TempDir;

    fn missing_type(code: &str) -> FeatureVector {
        let d = Diagnostic::new(code, "Cannot find name 'Widget'.", "src/a.ts", 1, 1)
            .with_category(DiagnosticCategory::MissingType);
        extract(&d, None, 0)
    }

    #[test]
    fn test_untrained_predictions_are_uniform() {
        let predictor = StrategyPredictor::new(10);
        let ranked = predictor.predict(&missing_type("TS2304"), &["a", "b"]);
        assert_eq!(ranked[0].strategy, "a");
        assert!((ranked[0].confidence - 0.5).abs() < 1e-9);
        assert_eq!(ranked[0].rationale, "no history for this strategy");
    }

    #[test]
    fn test_category_history_ranks_first() {
        let mut predictor = StrategyPredictor::new(100);
        for i in 0..10 {
            let code = if i % 2 == 0 { "TS2304" } else { "TS2503" };
            predictor.record_outcome("missing_type", missing_type(code), true).unwrap();
        }

        let ranked = predictor.predict(&missing_type("TS2694"), &["missing_import", "missing_type"]);
        assert_eq!(ranked[0].strategy, "missing_type");
        assert!(ranked[0].confidence > ranked[1].confidence);
        assert!(ranked[0]
            .rationale
            .starts_with("category missing_type success rate 100% over 10 attempts"));
        let sum: f64 = ranked.iter().map(|p| p.confidence).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_needs_samples() {
        let mut predictor = StrategyPredictor::new(100);
        predictor.record_outcome("s", missing_type("TS2304"), true).unwrap();
        let b = score(predictor.model(), "s", &missing_type("TS2304"));
        assert_eq!(b.history, HISTORY_PRIOR);

        for _ in 0..2 {
            predictor.record_outcome("s", missing_type("TS2304"), false).unwrap();
        }
        let b = score(predictor.model(), "s", &missing_type("TS2304"));
        assert!((b.history - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model").join("predictor.json");

        let mut predictor = StrategyPredictor::load_or_new(&path, 2).unwrap();
        predictor.record_outcome("s", missing_type("TS2304"), true).unwrap();
        assert!(!path.exists());
        predictor.record_outcome("s", missing_type("TS2304"), true).unwrap();
        assert!(path.exists());

        let reloaded = StrategyPredictor::load_or_new(&path, 2).unwrap();
        assert_eq!(reloaded.model().outcomes.len(), 2);
        assert_eq!(reloaded.model().per_strategy, predictor.model().per_strategy);
    }

    #[test]
    fn test_version_mismatch_rebuilds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("predictor.json");

        let mut model = PredictorModel::new();
        model.record(OutcomeRecord::new("s", missing_type("TS2304"), true));
        model.version = 0;
        model.per_strategy.clear();
        fs::write(&path, serde_json::to_string(&model).unwrap()).unwrap();

        let predictor = StrategyPredictor::load_or_new(&path, 10).unwrap();
        assert_eq!(predictor.model().version, MODEL_VERSION);
        assert_eq!(predictor.model().stats("s").unwrap().aggregate.total, 1);
    }
}
