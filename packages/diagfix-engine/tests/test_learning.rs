//! Outcomes of resolution runs feed the predictor, metrics and pattern tracker

mod common;

use std::sync::Arc;
use tempfile::TempDir;

use common::{engine, mismatches, write, ScriptedChecker};
use diagfix_engine::config::{EngineConfig, Preset};
use diagfix_engine::{EngineContext, FixStore, MetricsService, Resolver, Trend, TypeChecker};
use diagfix_storage::{DiagnosticCategory, FeedbackRating, InMemoryFixStore};

const SOURCE: &str = "declare function read(): string;
const input = read();
const total: number = input;
const second: number = input;
";

#[tokio::test]
async fn test_batch_outcomes_are_learned() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.ts", SOURCE);
    let checker = ScriptedChecker::new(dir.path(), |c| mismatches(c, &["= input;"]));
    let store = Arc::new(InMemoryFixStore::new());
    let ctx = engine(dir.path(), checker.clone(), store.clone());

    let detected = checker.check(&[]).await.unwrap();
    assert_eq!(detected.len(), 2);
    let report = Resolver::new(Arc::clone(&ctx)).resolve_batch(detected).await.unwrap();
    assert_eq!(report.fixed(), 2);

    {
        let metrics = ctx.metrics();
        let rate = metrics.strategy_rate("type_coercion").unwrap();
        assert_eq!((rate.success, rate.total), (2, 2));
        assert_eq!(metrics.category_rate(DiagnosticCategory::TypeMismatch).unwrap().total, 2);
        assert_eq!(metrics.trend(), Trend::Stable);
    }
    assert_eq!(ctx.predictor().model().outcomes.len(), 2);

    // Both lines share one message shape
    let patterns = ctx.patterns.top(5).await.unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].frequency, 2);
    assert!(patterns[0].auto_fixable);
}

#[tokio::test]
async fn test_metrics_rebuilt_from_store_with_feedback() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.ts", SOURCE);
    let checker = ScriptedChecker::new(dir.path(), |c| mismatches(c, &["= input;"]));
    let store = Arc::new(InMemoryFixStore::new());
    let ctx = engine(dir.path(), checker.clone(), store.clone());

    let detected = checker.check(&[]).await.unwrap();
    let report = Resolver::new(ctx).resolve_batch(detected).await.unwrap();
    let fix_ids: Vec<_> = report.outcomes.iter().filter_map(|o| o.fix.as_ref().map(|f| f.id)).collect();
    assert_eq!(fix_ids.len(), 2);

    store.save_feedback(&FeedbackRating::new(fix_ids[0], 5)).await.unwrap();
    store.save_feedback(&FeedbackRating::new(fix_ids[1], 3)).await.unwrap();

    let metrics = MetricsService::from_store(store.as_ref()).await.unwrap();
    let rate = metrics.strategy_rate("type_coercion").unwrap();
    assert_eq!((rate.success, rate.total), (2, 2));
    assert!((metrics.feedback_weight("type_coercion") - 0.75).abs() < 1e-9);
    assert_eq!(metrics.feedback_weight("missing_import"), 0.5);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.overall.total, 2);
    assert_eq!(snapshot.strategies.len(), 1);
}

#[tokio::test]
async fn test_predictor_snapshot_persisted_under_root() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.ts", SOURCE);
    let checker = ScriptedChecker::new(dir.path(), |c| mismatches(c, &["= input;"]));

    let config = EngineConfig::preset(Preset::Balanced)
        .project_root(dir.path())
        .resolver(|r| r.ai_fallback(false))
        .predictor(|mut p| {
            p.model_path = Some(".diagfix/predictor.json".into());
            p
        });
    let ctx = Arc::new(
        EngineContext::builder(config)
            .checker(checker.clone())
            .store(Arc::new(InMemoryFixStore::new()))
            .build()
            .unwrap(),
    );

    let detected = checker.check(&[]).await.unwrap();
    Resolver::new(Arc::clone(&ctx)).resolve_batch(detected).await.unwrap();
    ctx.flush().unwrap();

    let path = dir.path().join(".diagfix/predictor.json");
    assert!(path.exists());
    let reloaded = diagfix_engine::StrategyPredictor::load_or_new(&path, 10).unwrap();
    assert_eq!(reloaded.model().outcomes.len(), 2);
}
