//! Versioned predictor model
//!
//! The outcome log is the source of truth; every aggregate can be rebuilt
//! from it. Incremental updates append one record and fold it in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::features::FeatureVector;

pub const MODEL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub success: u64,
    pub total: u64,
}

impl Counter {
    pub fn record(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.success += 1;
        }
    }

    /// Raw success ratio (0 when empty)
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }

    /// Laplace-smoothed ratio; 0.5 when empty
    pub fn smoothed(&self) -> f64 {
        (self.success as f64 + 1.0) / (self.total as f64 + 2.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub per_code: BTreeMap<String, Counter>,
    pub per_category: BTreeMap<String, Counter>,
    pub per_severity: BTreeMap<String, Counter>,
    /// Accumulated from successful outcomes only
    pub term_weights: BTreeMap<String, f64>,
    pub aggregate: Counter,
}

impl StrategyStats {
    fn fold(&mut self, outcome: &OutcomeRecord) {
        self.per_code
            .entry(outcome.features.code.clone())
            .or_default()
            .record(outcome.success);
        self.per_category
            .entry(outcome.features.category.clone())
            .or_default()
            .record(outcome.success);
        self.per_severity
            .entry(outcome.features.severity.clone())
            .or_default()
            .record(outcome.success);
        self.aggregate.record(outcome.success);
        if outcome.success {
            for (term, weight) in &outcome.features.terms {
                *self.term_weights.entry(term.clone()).or_default() += weight;
            }
        }
    }

    pub fn code(&self, code: &str) -> Counter {
        self.per_code.get(code).copied().unwrap_or_default()
    }

    pub fn category(&self, category: &str) -> Counter {
        self.per_category.get(category).copied().unwrap_or_default()
    }

    pub fn severity(&self, severity: &str) -> Counter {
        self.per_severity.get(severity).copied().unwrap_or_default()
    }
}

/// One observed strategy outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub strategy: String,
    pub features: FeatureVector,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn new(strategy: impl Into<String>, features: FeatureVector, success: bool) -> Self {
        Self {
            strategy: strategy.into(),
            features,
            success,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorModel {
    pub version: u32,
    pub per_strategy: BTreeMap<String, StrategyStats>,
    pub training_iterations: u64,
    pub last_updated: DateTime<Utc>,
    pub outcomes: Vec<OutcomeRecord>,
}

impl Default for PredictorModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictorModel {
    pub fn new() -> Self {
        Self {
            version: MODEL_VERSION,
            per_strategy: BTreeMap::new(),
            training_iterations: 0,
            last_updated: Utc::now(),
            outcomes: Vec::new(),
        }
    }

    /// Append to the log and update the affected aggregates
    pub fn record(&mut self, outcome: OutcomeRecord) {
        self.fold(&outcome);
        self.outcomes.push(outcome);
        self.last_updated = Utc::now();
    }

    pub(crate) fn fold(&mut self, outcome: &OutcomeRecord) {
        self.per_strategy
            .entry(outcome.strategy.clone())
            .or_default()
            .fold(outcome);
        self.training_iterations += 1;
    }

    /// Recompute every aggregate from the outcome log
    pub fn rebuild(&mut self) {
        let outcomes = std::mem::take(&mut self.outcomes);
        self.per_strategy.clear();
        self.training_iterations = 0;
        for outcome in &outcomes {
            self.fold(outcome);
        }
        self.outcomes = outcomes;
        self.version = MODEL_VERSION;
        self.last_updated = Utc::now();
    }

    pub fn stats(&self, strategy: &str) -> Option<&StrategyStats> {
        self.per_strategy.get(strategy)
    }

    pub fn strategies(&self) -> impl Iterator<Item = &str> {
        self.per_strategy.keys().map(String::as_str)
    }
}
