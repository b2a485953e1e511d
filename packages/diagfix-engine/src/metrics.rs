//! Outcome metrics and feedback
//!
//! Success rates per strategy and per category, a rolling trend over the most
//! recent outcomes, and feedback weights derived from human ratings. With the
//! `metrics` feature the same events also feed Prometheus counters.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use diagfix_storage::{ApplicationLog, DiagnosticCategory, FeedbackRating, FixStore};

use crate::predictor::Counter;

/// Outcomes per trend window
pub const TREND_WINDOW: usize = 10;
/// Rate change needed to call a trend
pub const TREND_THRESHOLD: f64 = 0.1;
/// Feedback weight of a strategy nobody rated yet
pub const NEUTRAL_FEEDBACK: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Declining => "declining",
            Trend::Stable => "stable",
        }
    }
}

/// Last window against the one before it
fn trend_of(recent: &VecDeque<bool>) -> Trend {
    if recent.len() < 2 * TREND_WINDOW {
        return Trend::Stable;
    }
    let rate = |window: &[bool]| window.iter().filter(|s| **s).count() as f64 / window.len() as f64;
    let all: Vec<bool> = recent.iter().copied().collect();
    let split = all.len() - TREND_WINDOW;
    let previous = rate(&all[split - TREND_WINDOW..split]);
    let last = rate(&all[split..]);
    if last - previous > TREND_THRESHOLD {
        Trend::Improving
    } else if previous - last > TREND_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

fn push_recent(recent: &mut VecDeque<bool>, success: bool) {
    recent.push_back(success);
    while recent.len() > 2 * TREND_WINDOW {
        recent.pop_front();
    }
}

#[derive(Debug, Clone, Default)]
struct StrategyMetrics {
    counter: Counter,
    recent: VecDeque<bool>,
    ratings: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    pub success: u64,
    pub total: u64,
    pub rate: f64,
}

impl From<Counter> for RateSummary {
    fn from(c: Counter) -> Self {
        Self {
            success: c.success,
            total: c.total,
            rate: c.ratio(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub strategy: String,
    #[serde(flatten)]
    pub rate: RateSummary,
    pub trend: Trend,
    pub feedback_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub overall: RateSummary,
    pub trend: Trend,
    pub strategies: Vec<StrategySnapshot>,
    pub categories: BTreeMap<String, RateSummary>,
}

#[derive(Default)]
pub struct MetricsService {
    strategies: BTreeMap<String, StrategyMetrics>,
    categories: BTreeMap<DiagnosticCategory, Counter>,
    overall: Counter,
    recent: VecDeque<bool>,
    /// fix id → strategy, for attributing feedback
    fix_strategy: HashMap<uuid::Uuid, String>,
    #[cfg(feature = "metrics")]
    prometheus: Option<prom::ResolutionMetrics>,
}

impl MetricsService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also export to a Prometheus registry
    #[cfg(feature = "metrics")]
    pub fn with_registry(registry: &prometheus::Registry) -> prometheus::Result<Self> {
        Ok(Self {
            prometheus: Some(prom::ResolutionMetrics::new(registry)?),
            ..Self::default()
        })
    }

    /// Seed from persisted application logs (oldest first)
    pub fn from_logs(logs: &[ApplicationLog]) -> Self {
        let mut service = Self::new();
        for log in logs {
            service.record_strategy(&log.strategy_name, log.success);
            if let Some(fix_id) = log.fix_id {
                service.fix_strategy.insert(fix_id, log.strategy_name.clone());
            }
        }
        service
    }

    /// Seed from every persisted log and the feedback on the logged fixes
    pub async fn from_store(store: &dyn FixStore) -> diagfix_storage::Result<Self> {
        let mut logs = store.list_logs(None).await?;
        logs.sort_by_key(|l| l.timestamp);
        let mut service = Self::from_logs(&logs);

        let mut fix_ids: Vec<uuid::Uuid> = logs.iter().filter_map(|l| l.fix_id).collect();
        fix_ids.sort();
        fix_ids.dedup();
        for fix_id in fix_ids {
            for rating in store.feedback_for_fix(fix_id).await? {
                service.record_feedback(&rating);
            }
        }
        Ok(service)
    }

    fn record_strategy(&mut self, strategy: &str, success: bool) {
        let entry = self.strategies.entry(strategy.to_string()).or_default();
        entry.counter.record(success);
        push_recent(&mut entry.recent, success);
        self.overall.record(success);
        push_recent(&mut self.recent, success);
    }

    pub fn record_outcome(&mut self, strategy: &str, category: DiagnosticCategory, success: bool, duration_ms: u64) {
        self.record_strategy(strategy, success);
        self.categories.entry(category).or_default().record(success);

        #[cfg(feature = "metrics")]
        if let Some(prom) = &self.prometheus {
            prom.observe(strategy, category, success, duration_ms);
        }
        #[cfg(not(feature = "metrics"))]
        let _ = duration_ms;
    }

    /// Remember which strategy produced a fix, for later feedback
    pub fn register_fix(&mut self, fix_id: uuid::Uuid, strategy: &str) {
        self.fix_strategy.insert(fix_id, strategy.to_string());
    }

    /// Fold a rating into its strategy's feedback weight; unknown fixes are ignored
    pub fn record_feedback(&mut self, rating: &FeedbackRating) -> bool {
        let Some(strategy) = self.fix_strategy.get(&rating.fix_id).cloned() else {
            return false;
        };
        self.strategies
            .entry(strategy)
            .or_default()
            .ratings
            .push(rating.normalized());
        true
    }

    /// Mean normalized rating in [0, 1]; neutral without ratings
    pub fn feedback_weight(&self, strategy: &str) -> f64 {
        match self.strategies.get(strategy) {
            Some(m) if !m.ratings.is_empty() => m.ratings.iter().sum::<f64>() / m.ratings.len() as f64,
            _ => NEUTRAL_FEEDBACK,
        }
    }

    pub fn strategy_rate(&self, strategy: &str) -> Option<RateSummary> {
        self.strategies.get(strategy).map(|m| m.counter.into())
    }

    pub fn category_rate(&self, category: DiagnosticCategory) -> Option<RateSummary> {
        self.categories.get(&category).map(|c| (*c).into())
    }

    pub fn overall_rate(&self) -> RateSummary {
        self.overall.into()
    }

    pub fn trend(&self) -> Trend {
        trend_of(&self.recent)
    }

    pub fn strategy_trend(&self, strategy: &str) -> Trend {
        self.strategies
            .get(strategy)
            .map(|m| trend_of(&m.recent))
            .unwrap_or(Trend::Stable)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            overall: self.overall_rate(),
            trend: self.trend(),
            strategies: self
                .strategies
                .iter()
                .map(|(name, m)| StrategySnapshot {
                    strategy: name.clone(),
                    rate: m.counter.into(),
                    trend: trend_of(&m.recent),
                    feedback_weight: self.feedback_weight(name),
                })
                .collect(),
            categories: self
                .categories
                .iter()
                .map(|(c, counter)| (c.as_str().to_string(), (*counter).into()))
                .collect(),
        }
    }
}

#[cfg(feature = "metrics")]
mod prom {
    use prometheus::{
        register_histogram_vec_with_registry, register_int_counter_vec_with_registry, HistogramOpts,
        HistogramVec, IntCounterVec, Opts, Registry,
    };

    use diagfix_storage::DiagnosticCategory;

    #[derive(Clone)]
    pub struct ResolutionMetrics {
        pub attempts: IntCounterVec,
        pub by_category: IntCounterVec,
        pub duration: HistogramVec,
    }

    impl ResolutionMetrics {
        pub fn new(registry: &Registry) -> prometheus::Result<Self> {
            Ok(Self {
                attempts: register_int_counter_vec_with_registry!(
                    Opts::new("diagfix_attempts_total", "Fix attempts by strategy and outcome"),
                    &["strategy", "outcome"],
                    registry
                )?,
                by_category: register_int_counter_vec_with_registry!(
                    Opts::new("diagfix_category_attempts_total", "Fix attempts by diagnostic category and outcome"),
                    &["category", "outcome"],
                    registry
                )?,
                duration: register_histogram_vec_with_registry!(
                    HistogramOpts::new("diagfix_attempt_duration_seconds", "Fix attempt duration")
                        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
                    &["strategy"],
                    registry
                )?,
            })
        }

        pub fn observe(&self, strategy: &str, category: DiagnosticCategory, success: bool, duration_ms: u64) {
            let outcome = if success { "success" } else { "failure" };
            self.attempts.with_label_values(&[strategy, outcome]).inc();
            self.by_category
                .with_label_values(&[category.as_str(), outcome])
                .inc();
            self.duration
                .with_label_values(&[strategy])
                .observe(duration_ms as f64 / 1000.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_rates() {
        let mut metrics = MetricsService::new();
        metrics.record_outcome("type_coercion", DiagnosticCategory::TypeMismatch, true, 5);
        metrics.record_outcome("type_coercion", DiagnosticCategory::TypeMismatch, false, 5);
        metrics.record_outcome("null_safety", DiagnosticCategory::NullSafety, true, 5);

        assert_eq!(metrics.strategy_rate("type_coercion").unwrap().rate, 0.5);
        assert_eq!(metrics.category_rate(DiagnosticCategory::NullSafety).unwrap().rate, 1.0);
        assert!(metrics.category_rate(DiagnosticCategory::Syntax).is_none());
        assert_eq!(metrics.overall_rate().total, 3);
    }

    #[test]
    fn test_trend_windows() {
        let mut metrics = MetricsService::new();
        for _ in 0..10 {
            metrics.record_outcome("s", DiagnosticCategory::Other, false, 1);
        }
        assert_eq!(metrics.trend(), Trend::Stable);
        for _ in 0..10 {
            metrics.record_outcome("s", DiagnosticCategory::Other, true, 1);
        }
        assert_eq!(metrics.trend(), Trend::Improving);
        assert_eq!(metrics.strategy_trend("s"), Trend::Improving);

        for _ in 0..10 {
            metrics.record_outcome("s", DiagnosticCategory::Other, false, 1);
        }
        assert_eq!(metrics.trend(), Trend::Declining);
    }

    #[test]
    fn test_feedback_weight() {
        let mut metrics = MetricsService::new();
        let fix_id = Uuid::new_v4();
        assert_eq!(metrics.feedback_weight("missing_import"), NEUTRAL_FEEDBACK);

        assert!(!metrics.record_feedback(&FeedbackRating::new(fix_id, 5)));
        metrics.register_fix(fix_id, "missing_import");
        assert!(metrics.record_feedback(&FeedbackRating::new(fix_id, 5)));
        assert!(metrics.record_feedback(&FeedbackRating::new(fix_id, 3)));
        assert!((metrics.feedback_weight("missing_import") - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_from_store_includes_feedback() {
        use diagfix_storage::InMemoryFixStore;

        let store = InMemoryFixStore::new();
        let fix_id = Uuid::new_v4();
        store
            .append_log(&ApplicationLog::new(Uuid::new_v4(), Some(fix_id), "null_safety", true, 4))
            .await
            .unwrap();
        store.save_feedback(&FeedbackRating::new(fix_id, 1)).await.unwrap();

        let metrics = MetricsService::from_store(&store).await.unwrap();
        assert_eq!(metrics.strategy_rate("null_safety").unwrap().total, 1);
        assert_eq!(metrics.feedback_weight("null_safety"), 0.0);
    }

    #[test]
    fn test_snapshot_from_logs() {
        let logs: Vec<ApplicationLog> = (0..4)
            .map(|i| ApplicationLog::new(Uuid::new_v4(), None, "unused_symbol", i % 2 == 0, 3))
            .collect();
        let snapshot = MetricsService::from_logs(&logs).snapshot();
        assert_eq!(snapshot.overall.total, 4);
        assert_eq!(snapshot.strategies.len(), 1);
        assert_eq!(snapshot.strategies[0].rate.rate, 0.5);
        assert_eq!(snapshot.strategies[0].feedback_weight, NEUTRAL_FEEDBACK);
    }
}
