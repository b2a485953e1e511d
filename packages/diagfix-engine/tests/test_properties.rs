//! Property tests for edits, rollback, ordering and scoring

use proptest::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use diagfix_engine::graph::DiagnosticGraph;
use diagfix_engine::predictor::{extract, StrategyPredictor};
use diagfix_engine::strategy::{FixStrategy, StrategyRegistry};
use diagfix_engine::symbols::SymbolIndex;
use diagfix_engine::transform::{apply_in_memory, validate_edits, CodeTransformer};
use diagfix_storage::{Diagnostic, DiagnosticCategory, Fix, FixEdit};

const CATEGORIES: &[DiagnosticCategory] = &[
    DiagnosticCategory::TypeMismatch,
    DiagnosticCategory::MissingType,
    DiagnosticCategory::UsesMissingType,
    DiagnosticCategory::UnresolvedReference,
    DiagnosticCategory::MissingImport,
    DiagnosticCategory::MissingProperty,
    DiagnosticCategory::NullSafety,
    DiagnosticCategory::UnusedSymbol,
    DiagnosticCategory::ImplicitAny,
    DiagnosticCategory::Syntax,
    DiagnosticCategory::Other,
];

const CODES: &[&str] = &[
    "TS2322", "TS2345", "TS2304", "TS2307", "TS2339", "TS2532", "TS6133", "TS7006", "TS1005",
    "TYPE_MISMATCH_STR_NUM", "TS9999",
];

/// Non-overlapping edits over `content`, in ascending offset order
fn non_overlapping(content: &str, raw: Vec<(usize, usize, String)>) -> Vec<FixEdit> {
    let len = content.len();
    let mut spans: Vec<(usize, usize, String)> = raw
        .into_iter()
        .map(|(start, width, text)| {
            let start = if len == 0 { 0 } else { start % (len + 1) };
            (start, (start + width).min(len), text)
        })
        .collect();
    spans.sort_by_key(|(s, e, _)| (*s, *e));

    let mut edits: Vec<FixEdit> = Vec::new();
    for (start, end, text) in spans {
        let fits = match edits.last() {
            Some(prev) => start >= prev.end_offset && start > prev.start_offset,
            None => true,
        };
        if fits {
            edits.push(FixEdit::new("a.txt", start, end, text));
        }
    }
    edits
}

fn diagnostic_strategy() -> impl Strategy<Value = Diagnostic> {
    (
        prop::sample::select(CODES),
        "[A-Za-z' ]{0,40}",
        prop::sample::select(vec!["a.ts", "b.ts", "c.ts"]),
        1u32..40,
        prop::sample::select(CATEGORIES),
    )
        .prop_map(|(code, message, file, line, category)| {
            Diagnostic::new(code, message, file, line, 1).with_category(category)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_edit_application_is_order_independent(
        content in "[a-z \n]{0,120}",
        raw in prop::collection::vec((0usize..200, 0usize..6, "[A-Z]{0,4}"), 0..6),
        rotate in 0usize..6,
    ) {
        let edits = non_overlapping(&content, raw);
        let ascending: Vec<&FixEdit> = edits.iter().collect();
        prop_assert!(validate_edits(Path::new("a.txt"), &content, &ascending).is_ok());

        let mut reversed = ascending.clone();
        reversed.reverse();
        let mut rotated = ascending.clone();
        if !rotated.is_empty() {
            let k = rotate % rotated.len();
            rotated.rotate_left(k);
        }

        let (expected, _, _) = apply_in_memory(&content, &ascending);
        prop_assert_eq!(&apply_in_memory(&content, &reversed).0, &expected);
        prop_assert_eq!(&apply_in_memory(&content, &rotated).0, &expected);
    }

    #[test]
    fn prop_rollback_is_byte_exact(
        original in "\\PC{0,80}(\r\n\\PC{0,40}){0,3}",
        first in "[a-z\n]{0,20}",
        second in "\\PC{0,20}",
    ) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, &original).unwrap();
        let transformer = CodeTransformer::new(dir.path()).unwrap();

        let mut tx = transformer.begin(vec![], &[]).unwrap();
        transformer
            .apply_edits(&mut tx, &[FixEdit::new("notes.txt", 0, original.len(), first.clone())])
            .unwrap();
        let savepoint = transformer.savepoint(&mut tx);
        transformer
            .apply_edits(&mut tx, &[FixEdit::insert("notes.txt", first.len(), second.clone())])
            .unwrap();
        transformer.rollback_to(&mut tx, savepoint).unwrap();
        prop_assert_eq!(fs::read_to_string(&path).unwrap(), first);

        transformer.rollback(tx, "property").unwrap();
        prop_assert_eq!(fs::read(&path).unwrap(), original.into_bytes());
        prop_assert!(!transformer.is_locked(Path::new("notes.txt")));
    }

    #[test]
    fn prop_topological_order_is_a_permutation(
        diagnostics in prop::collection::vec(diagnostic_strategy(), 0..30),
    ) {
        let graph = DiagnosticGraph::build(&diagnostics, &SymbolIndex::new(), Path::new(""));
        let mut order = graph.topological_order();
        let mut ids: Vec<_> = diagnostics.iter().map(|d| d.id).collect();
        prop_assert_eq!(order.len(), ids.len());
        order.sort();
        ids.sort();
        prop_assert_eq!(order, ids);
    }

    #[test]
    fn prop_confidences_stay_in_range(
        diagnostic in diagnostic_strategy(),
        history in prop::collection::vec(any::<bool>(), 0..30),
    ) {
        let registry = StrategyRegistry::builtin();
        for id in registry.ids() {
            let strategy = registry.get(id).unwrap();
            prop_assert!(strategy.confidence(&diagnostic) <= 100);
        }

        // Descending confidence, registration order on ties, same result twice
        let candidates = registry.candidates(&diagnostic);
        for pair in candidates.windows(2) {
            prop_assert!(
                pair[0].confidence > pair[1].confidence
                    || (pair[0].confidence == pair[1].confidence && pair[0].order < pair[1].order)
            );
        }
        let again: Vec<_> = registry.candidates(&diagnostic).iter().map(|c| c.id()).collect();
        prop_assert_eq!(candidates.iter().map(|c| c.id()).collect::<Vec<_>>(), again);

        let mut fix = Fix::new(diagnostic.id, "type_coercion", "x", vec![]).with_confidence(i32::MAX);
        prop_assert_eq!(fix.confidence(), 100);
        let mut predictor = StrategyPredictor::new(1_000);
        let features = extract(&diagnostic, None, 0);
        for success in &history {
            fix.record_application(*success);
            prop_assert!((0.0..=1.0).contains(&fix.success_rate()));
            predictor.record_outcome("type_coercion", features.clone(), *success).unwrap();
        }

        let predictions = predictor.predict(&features, &registry.ids());
        for p in &predictions {
            prop_assert!((0.0..=1.0).contains(&p.confidence));
        }
        let total: f64 = predictions.iter().map(|p| p.confidence).sum();
        prop_assert!((total - 1.0).abs() < 1e-6);
    }
}
