//! Diagnostic prioritization
//!
//! Every diagnostic of a batch gets a score in [0, 1] under the selected
//! strategy and lands in a high / medium / low bucket. Bucket metrics track
//! how many of each bucket were fixed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use diagfix_storage::Diagnostic;

use crate::graph::category_priority;

/// How priority scores are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrioritizationStrategy {
    /// Checker severity
    #[default]
    Severity,
    /// Category priority combined with how many diagnostics depend on this one
    Impact,
    /// Pattern frequency relative to the batch
    Frequency,
    /// Dependent count relative to the batch
    Dependencies,
    /// Human feedback on the best candidate strategy
    Feedback,
}

impl PrioritizationStrategy {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "severity" => Ok(Self::Severity),
            "impact" => Ok(Self::Impact),
            "frequency" => Ok(Self::Frequency),
            "dependencies" => Ok(Self::Dependencies),
            "feedback" => Ok(Self::Feedback),
            _ => Err(format!(
                "Unknown prioritization strategy '{}'. Valid: severity, impact, frequency, dependencies, feedback",
                s
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Severity => "severity",
            Self::Impact => "impact",
            Self::Frequency => "frequency",
            Self::Dependencies => "dependencies",
            Self::Feedback => "feedback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityThresholds {
    /// Scores at or above go to the high bucket
    pub high: f64,
    /// Scores at or above (and below `high`) go to the medium bucket
    pub medium: f64,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self { high: 0.7, medium: 0.4 }
    }
}

impl PriorityThresholds {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.high) || !(0.0..=1.0).contains(&self.medium) {
            return Err(format!(
                "priority thresholds must be within [0, 1], got high={} medium={}",
                self.high, self.medium
            ));
        }
        if self.medium > self.high {
            return Err(format!(
                "medium threshold {} exceeds high threshold {}",
                self.medium, self.high
            ));
        }
        Ok(())
    }

    pub fn bucket(&self, score: f64) -> PriorityBucket {
        if score >= self.high {
            PriorityBucket::High
        } else if score >= self.medium {
            PriorityBucket::Medium
        } else {
            PriorityBucket::Low
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrioritizationOptions {
    pub strategy: PrioritizationStrategy,
    pub thresholds: PriorityThresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityBucket {
    High,
    Medium,
    Low,
}

impl PriorityBucket {
    pub const ALL: [PriorityBucket; 3] = [PriorityBucket::High, PriorityBucket::Medium, PriorityBucket::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityBucket::High => "high",
            PriorityBucket::Medium => "medium",
            PriorityBucket::Low => "low",
        }
    }
}

/// Per-diagnostic inputs gathered before scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrioritySignals {
    pub dependents: usize,
    pub frequency: u64,
    /// Feedback weight in [0, 1]
    pub feedback: f64,
}

impl Default for PrioritySignals {
    fn default() -> Self {
        Self {
            dependents: 0,
            frequency: 0,
            feedback: crate::metrics::NEUTRAL_FEEDBACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityAssignment {
    pub diagnostic_id: Uuid,
    pub score: f64,
    pub bucket: PriorityBucket,
}

fn relative(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        0.0
    } else {
        (value / max).clamp(0.0, 1.0)
    }
}

/// Score a batch; signals missing for a diagnostic count as defaults
pub fn prioritize(
    options: &PrioritizationOptions,
    diagnostics: &[Diagnostic],
    signals: &HashMap<Uuid, PrioritySignals>,
) -> Vec<PriorityAssignment> {
    let signal = |d: &Diagnostic| signals.get(&d.id).copied().unwrap_or_default();
    let max_dependents = diagnostics.iter().map(|d| signal(d).dependents).max().unwrap_or(0) as f64;
    let max_frequency = diagnostics.iter().map(|d| signal(d).frequency).max().unwrap_or(0) as f64;

    diagnostics
        .iter()
        .map(|d| {
            let s = signal(d);
            let dependents = relative(s.dependents as f64, max_dependents);
            let score = match options.strategy {
                PrioritizationStrategy::Severity => d.severity.weight() as f64 / 3.0,
                PrioritizationStrategy::Impact => 0.6 * category_priority(d.category) / 10.0 + 0.4 * dependents,
                PrioritizationStrategy::Frequency => relative(s.frequency as f64, max_frequency),
                PrioritizationStrategy::Dependencies => dependents,
                PrioritizationStrategy::Feedback => s.feedback,
            }
            .clamp(0.0, 1.0);
            PriorityAssignment {
                diagnostic_id: d.id,
                score,
                bucket: options.thresholds.bucket(score),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCount {
    pub fixed: usize,
    pub total: usize,
}

impl BucketCount {
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.fixed as f64 / self.total as f64
        }
    }
}

/// Fixed / total per bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketMetrics {
    pub buckets: BTreeMap<PriorityBucket, BucketCount>,
}

impl BucketMetrics {
    pub fn record(&mut self, bucket: PriorityBucket, fixed: bool) {
        let count = self.buckets.entry(bucket).or_default();
        count.total += 1;
        if fixed {
            count.fixed += 1;
        }
    }

    pub fn get(&self, bucket: PriorityBucket) -> BucketCount {
        self.buckets.get(&bucket).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagfix_storage::{DiagnosticCategory, Severity};

    fn diag(severity: Severity, category: DiagnosticCategory) -> Diagnostic {
        Diagnostic::new("TS0000", "message", "a.ts", 1, 1)
            .with_severity(severity)
            .with_category(category)
    }

    #[test]
    fn test_severity_buckets() {
        let batch = vec![
            diag(Severity::Error, DiagnosticCategory::Other),
            diag(Severity::Warning, DiagnosticCategory::Other),
            diag(Severity::Info, DiagnosticCategory::Other),
        ];
        let assigned = prioritize(&PrioritizationOptions::default(), &batch, &HashMap::new());
        let buckets: Vec<_> = assigned.iter().map(|a| a.bucket).collect();
        assert_eq!(buckets, vec![PriorityBucket::High, PriorityBucket::Medium, PriorityBucket::Low]);
    }

    #[test]
    fn test_dependencies_relative_to_batch() {
        let batch = vec![
            diag(Severity::Error, DiagnosticCategory::MissingImport),
            diag(Severity::Error, DiagnosticCategory::TypeMismatch),
        ];
        let mut signals = HashMap::new();
        signals.insert(batch[0].id, PrioritySignals { dependents: 4, ..Default::default() });
        signals.insert(batch[1].id, PrioritySignals { dependents: 1, ..Default::default() });

        let options = PrioritizationOptions {
            strategy: PrioritizationStrategy::Dependencies,
            ..Default::default()
        };
        let assigned = prioritize(&options, &batch, &signals);
        assert_eq!(assigned[0].score, 1.0);
        assert_eq!(assigned[1].score, 0.25);
        assert_eq!(assigned[1].bucket, PriorityBucket::Low);
    }

    #[test]
    fn test_frequency_without_history_is_low() {
        let batch = vec![diag(Severity::Error, DiagnosticCategory::Other)];
        let options = PrioritizationOptions {
            strategy: PrioritizationStrategy::Frequency,
            ..Default::default()
        };
        assert_eq!(prioritize(&options, &batch, &HashMap::new())[0].score, 0.0);
    }

    #[test]
    fn test_feedback_defaults_to_neutral() {
        let batch = vec![diag(Severity::Error, DiagnosticCategory::Other)];
        let options = PrioritizationOptions {
            strategy: PrioritizationStrategy::Feedback,
            ..Default::default()
        };
        let assigned = prioritize(&options, &batch, &HashMap::new());
        assert_eq!(assigned[0].score, 0.5);
        assert_eq!(assigned[0].bucket, PriorityBucket::Medium);
    }

    #[test]
    fn test_thresholds_validate() {
        assert!(PriorityThresholds::default().validate().is_ok());
        assert!(PriorityThresholds { high: 0.3, medium: 0.6 }.validate().is_err());
        assert!(PriorityThresholds { high: 1.5, medium: 0.2 }.validate().is_err());
    }

    #[test]
    fn test_bucket_metrics() {
        let mut metrics = BucketMetrics::default();
        metrics.record(PriorityBucket::High, true);
        metrics.record(PriorityBucket::High, false);
        assert_eq!(metrics.get(PriorityBucket::High), BucketCount { fixed: 1, total: 2 });
        assert_eq!(metrics.get(PriorityBucket::High).rate(), 0.5);
        assert_eq!(metrics.get(PriorityBucket::Low).total, 0);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(PrioritizationStrategy::from_str("Impact").unwrap(), PrioritizationStrategy::Impact);
        assert!(PrioritizationStrategy::from_str("random").is_err());
    }
}
