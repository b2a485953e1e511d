//! Both adapters must behave identically behind the `FixStore` port.

use diagfix_storage::{
    ApplicationLog, Diagnostic, DiagnosticCategory, DiagnosticStatus, ErrorKind, Fix, FixEdit,
    FixStore, InMemoryFixStore, Pattern, SqliteFixStore,
};
use uuid::Uuid;

async fn exercise_lifecycle(store: &dyn FixStore) {
    let mut diagnostic = Diagnostic::new(
        "TS2322",
        "Type 'string' is not assignable to type 'number'.",
        "src/a.ts",
        10,
        7,
    )
    .with_category(DiagnosticCategory::TypeMismatch);
    store.save_diagnostic(&diagnostic).await.unwrap();

    let mut pattern = Pattern::new("4f1c", "type '<T>' is not assignable to type '<T>'", DiagnosticCategory::TypeMismatch);
    store.save_pattern(&pattern).await.unwrap();
    pattern.record_occurrence();
    store.save_pattern(&pattern).await.unwrap();

    let mut fix = Fix::new(
        diagnostic.id,
        "type_coercion",
        "Wrap in Number()",
        vec![FixEdit::new("src/a.ts", 120, 125, "Number(input)")],
    )
    .with_pattern(pattern.id)
    .with_confidence(90);
    fix.record_application(true);
    store.save_fix(&fix).await.unwrap();

    diagnostic.transition(DiagnosticStatus::Pending).unwrap();
    diagnostic.transition(DiagnosticStatus::Fixed).unwrap();
    diagnostic.pattern_id = Some(pattern.id);
    diagnostic.fix_id = Some(fix.id);
    store.save_diagnostic(&diagnostic).await.unwrap();

    store
        .append_log(&ApplicationLog::new(diagnostic.id, Some(fix.id), "type_coercion", true, 42))
        .await
        .unwrap();

    let loaded = store.get_diagnostic(diagnostic.id).await.unwrap();
    assert_eq!(loaded.status, DiagnosticStatus::Fixed);
    assert_eq!(loaded.fix_id, Some(fix.id));

    let fixed = store
        .list_diagnostics(Some(DiagnosticStatus::Fixed))
        .await
        .unwrap();
    assert_eq!(fixed.len(), 1);

    assert_eq!(store.find_pattern("4f1c").await.unwrap().unwrap().frequency, 2);
    assert_eq!(store.fixes_for_pattern(pattern.id).await.unwrap().len(), 1);
    assert_eq!(store.list_logs(None).await.unwrap().len(), 1);

    let err = store.get_fix(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::FixNotFound);
}

#[tokio::test]
async fn test_in_memory_store_contract() {
    let store = InMemoryFixStore::new();
    exercise_lifecycle(&store).await;
}

#[tokio::test]
async fn test_sqlite_store_contract() {
    let store = SqliteFixStore::in_memory().unwrap();
    exercise_lifecycle(&store).await;
}
