//! Prequential evaluation
//!
//! The log is replayed in order with a model trained only on the outcomes
//! before the current one. Every successful outcome is a sample: the strategy
//! that actually fixed the diagnostic is compared with the strategy the model
//! ranks first among every strategy in the log. Failed outcomes only train.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::features::FeatureVector;
use super::model::{OutcomeRecord, PredictorModel};
use super::score;

/// Counts keyed by actual strategy, then predicted strategy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: BTreeMap<String, BTreeMap<String, u64>>,
}

impl ConfusionMatrix {
    fn with_labels(labels: Vec<String>) -> Self {
        Self {
            labels,
            counts: BTreeMap::new(),
        }
    }

    fn record(&mut self, actual: &str, predicted: &str) {
        *self
            .counts
            .entry(actual.to_string())
            .or_default()
            .entry(predicted.to_string())
            .or_default() += 1;
    }

    pub fn get(&self, actual: &str, predicted: &str) -> u64 {
        self.counts
            .get(actual)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    /// Samples whose fixing strategy was `strategy`
    pub fn actual_total(&self, strategy: &str) -> u64 {
        self.counts.get(strategy).map(|row| row.values().sum()).unwrap_or(0)
    }

    /// Samples for which `strategy` was ranked first
    pub fn predicted_total(&self, strategy: &str) -> u64 {
        self.counts.values().filter_map(|row| row.get(strategy)).sum()
    }

    pub fn correct(&self) -> u64 {
        self.labels.iter().map(|l| self.get(l, l)).sum()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().flat_map(|row| row.values()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub strategy: String,
    /// Samples actually fixed by this strategy
    pub support: u64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub accuracy: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub per_strategy: Vec<StrategyMetrics>,
    pub confusion: ConfusionMatrix,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Highest scoring label; ties go to the earlier label
fn top_ranked<'a>(model: &PredictorModel, labels: &'a [String], features: &FeatureVector) -> Option<&'a str> {
    labels
        .iter()
        .map(|label| (label.as_str(), score(model, label, features).score))
        .fold(None, |best: Option<(&str, f64)>, next| match best {
            Some(b) if b.1 >= next.1 => Some(b),
            _ => Some(next),
        })
        .map(|(label, _)| label)
}

pub fn evaluate(outcomes: &[OutcomeRecord]) -> EvaluationReport {
    let labels: Vec<String> = outcomes
        .iter()
        .map(|o| o.strategy.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut model = PredictorModel::new();
    let mut confusion = ConfusionMatrix::with_labels(labels);

    for outcome in outcomes {
        if outcome.success {
            if let Some(predicted) = top_ranked(&model, &confusion.labels, &outcome.features) {
                let predicted = predicted.to_string();
                confusion.record(&outcome.strategy, &predicted);
            }
        }
        model.fold(outcome);
    }

    // Strategies never fixing nor ranked first carry no signal
    let per_strategy: Vec<StrategyMetrics> = confusion
        .labels
        .iter()
        .filter(|l| confusion.actual_total(l) + confusion.predicted_total(l) > 0)
        .map(|label| {
            let hits = confusion.get(label, label);
            let precision = ratio(hits, confusion.predicted_total(label));
            let recall = ratio(hits, confusion.actual_total(label));
            StrategyMetrics {
                strategy: label.clone(),
                support: confusion.actual_total(label),
                precision,
                recall,
                f1: f1(precision, recall),
            }
        })
        .collect();

    let mean = |f: fn(&StrategyMetrics) -> f64| {
        if per_strategy.is_empty() {
            0.0
        } else {
            per_strategy.iter().map(f).sum::<f64>() / per_strategy.len() as f64
        }
    };

    EvaluationReport {
        samples: confusion.total() as usize,
        accuracy: ratio(confusion.correct(), confusion.total()),
        macro_precision: mean(|m| m.precision),
        macro_recall: mean(|m| m.recall),
        macro_f1: mean(|m| m.f1),
        per_strategy,
        confusion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(strategy: &str, code: &str, category: &str, success: bool) -> OutcomeRecord {
        OutcomeRecord::new(
            strategy,
            FeatureVector {
                code: code.to_string(),
                category: category.to_string(),
                severity: "error".to_string(),
                ..Default::default()
            },
            success,
        )
    }

    /// Imports fix TS2307, coercions fix TS2322; each fails on the other's code
    fn two_strategy_log(rounds: usize) -> Vec<OutcomeRecord> {
        let mut log = Vec::new();
        for _ in 0..rounds {
            log.push(outcome("missing_import", "TS2307", "missing_import", true));
            log.push(outcome("type_coercion", "TS2307", "missing_import", false));
            log.push(outcome("type_coercion", "TS2322", "type_mismatch", true));
            log.push(outcome("missing_import", "TS2322", "type_mismatch", false));
        }
        log
    }

    fn metrics<'a>(report: &'a EvaluationReport, strategy: &str) -> &'a StrategyMetrics {
        report.per_strategy.iter().find(|m| m.strategy == strategy).unwrap()
    }

    #[test]
    fn test_empty_log() {
        let report = evaluate(&[]);
        assert_eq!(report.samples, 0);
        assert_eq!(report.accuracy, 0.0);
        assert!(report.per_strategy.is_empty());
        assert!(report.confusion.labels.is_empty());
    }

    #[test]
    fn test_failures_train_but_are_not_samples() {
        let log = vec![
            outcome("type_coercion", "TS2322", "type_mismatch", false),
            outcome("missing_import", "TS2322", "type_mismatch", true),
        ];
        let report = evaluate(&log);
        assert_eq!(report.samples, 1);
        assert_eq!(report.confusion.labels, vec!["missing_import", "type_coercion"]);
        // The earlier failure ranks type_coercion below missing_import
        assert_eq!(report.confusion.get("missing_import", "missing_import"), 1);
        assert_eq!(report.accuracy, 1.0);
    }

    #[test]
    fn test_strategy_matrix_is_learned() {
        let report = evaluate(&two_strategy_log(10));

        assert_eq!(report.samples, 20);
        assert_eq!(report.confusion.total(), 20);
        assert_eq!(report.confusion.actual_total("missing_import"), 10);
        assert_eq!(report.confusion.actual_total("type_coercion"), 10);
        assert_eq!(report.confusion.get("missing_import", "missing_import"), 10);

        // Only the first coercion is ranked below the import that just succeeded
        assert_eq!(report.confusion.get("type_coercion", "missing_import"), 1);
        assert_eq!(report.confusion.get("type_coercion", "type_coercion"), 9);
        assert!((report.accuracy - 0.95).abs() < 1e-9);

        let import = metrics(&report, "missing_import");
        assert_eq!(import.support, 10);
        assert_eq!(import.recall, 1.0);
        assert!((import.precision - 10.0 / 11.0).abs() < 1e-9);

        let coercion = metrics(&report, "type_coercion");
        assert_eq!(coercion.precision, 1.0);
        assert!((coercion.recall - 0.9).abs() < 1e-9);

        let macro_recall = (import.recall + coercion.recall) / 2.0;
        assert!((report.macro_recall - macro_recall).abs() < 1e-9);
        let macro_f1 = (import.f1 + coercion.f1) / 2.0;
        assert!((report.macro_f1 - macro_f1).abs() < 1e-9);
    }

    #[test]
    fn test_never_successful_strategy_is_ranked_but_never_actual() {
        let mut log = two_strategy_log(3);
        log.insert(0, outcome("aaa_broken", "TS2307", "missing_import", false));
        let report = evaluate(&log);

        assert_eq!(report.confusion.labels.len(), 3);
        assert_eq!(report.confusion.actual_total("aaa_broken"), 0);
        assert!(report.per_strategy.iter().all(|m| m.strategy != "aaa_broken"));
    }
}
