//! Fix strategies
//!
//! A strategy declares which diagnostics it applies to, scores its own
//! confidence and generates a `Fix`. The built-in set is a closed enum
//! (`BuiltinStrategy`); the registry keeps registration order so ties in
//! confidence always resolve the same way.

mod builtins;
mod context;

pub use builtins::{
    ImplicitAny, MissingImport, MissingProperty, MissingType, NullSafety, TypeCoercion,
    UnusedSymbol,
};
pub use context::FixContext;

use std::sync::Arc;

use diagfix_storage::{Diagnostic, DiagnosticCategory, Fix};

use crate::error::Result;

/// Base confidence before any match bonus
pub const BASE_CONFIDENCE: i32 = 50;
pub const CODE_MATCH_BONUS: i32 = 20;
pub const CATEGORY_MATCH_BONUS: i32 = 20;

/// Default minimum confidence for `can_apply`
pub const DEFAULT_MIN_CONFIDENCE: u8 = 60;

/// Diagnostics a strategy declares itself responsible for
#[derive(Debug, Clone, Copy)]
pub struct Applicability {
    /// Exact codes, or symbolic prefixes matched on a `_` boundary
    pub codes: &'static [&'static str],
    pub categories: &'static [DiagnosticCategory],
    pub wildcard: bool,
}

impl Applicability {
    pub const fn new(
        codes: &'static [&'static str],
        categories: &'static [DiagnosticCategory],
    ) -> Self {
        Self {
            codes,
            categories,
            wildcard: false,
        }
    }

    pub const fn any() -> Self {
        Self {
            codes: &[],
            categories: &[],
            wildcard: true,
        }
    }

    pub fn matches_code(&self, code: &str) -> bool {
        self.codes.iter().any(|c| code_matches(c, code))
    }

    pub fn matches_category(&self, category: DiagnosticCategory) -> bool {
        self.categories.contains(&category)
    }

    pub fn matches(&self, diagnostic: &Diagnostic) -> bool {
        self.wildcard
            || self.matches_code(&diagnostic.code)
            || self.matches_category(diagnostic.category)
    }
}

/// `TYPE_MISMATCH` matches `TYPE_MISMATCH` and `TYPE_MISMATCH_STR_NUM`
fn code_matches(declared: &str, code: &str) -> bool {
    if declared.eq_ignore_ascii_case(code) {
        return true;
    }
    code.len() > declared.len()
        && code.is_char_boundary(declared.len())
        && code[..declared.len()].eq_ignore_ascii_case(declared)
        && code.as_bytes()[declared.len()] == b'_'
}

/// One fix generator
pub trait FixStrategy: Send + Sync {
    /// Stable identifier, used in logs, metrics and the predictor
    fn id(&self) -> &'static str;

    fn applicability(&self) -> Applicability;

    fn min_confidence(&self) -> u8 {
        DEFAULT_MIN_CONFIDENCE
    }

    /// Strategy-specific adjustment on top of the match bonuses
    fn heuristics(&self, _diagnostic: &Diagnostic) -> i32 {
        0
    }

    /// 50 + 20 (code) + 20 (category) + heuristics, clamped to [0, 100]
    fn confidence(&self, diagnostic: &Diagnostic) -> u8 {
        let applicability = self.applicability();
        let mut score = BASE_CONFIDENCE;
        if applicability.matches_code(&diagnostic.code) {
            score += CODE_MATCH_BONUS;
        }
        if applicability.matches_category(diagnostic.category) {
            score += CATEGORY_MATCH_BONUS;
        }
        score += self.heuristics(diagnostic);
        score.clamp(0, 100) as u8
    }

    fn can_apply(&self, diagnostic: &Diagnostic) -> bool {
        self.applicability().matches(diagnostic)
            && self.confidence(diagnostic) >= self.min_confidence()
    }

    fn generate_fix(&self, ctx: &FixContext<'_>) -> Result<Fix>;
}

/// The closed set of shipped strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinStrategy {
    TypeCoercion(TypeCoercion),
    MissingImport(MissingImport),
    MissingType(MissingType),
    NullSafety(NullSafety),
    MissingProperty(MissingProperty),
    UnusedSymbol(UnusedSymbol),
    ImplicitAny(ImplicitAny),
}

impl BuiltinStrategy {
    /// Registration order
    pub fn all() -> Vec<BuiltinStrategy> {
        vec![
            BuiltinStrategy::TypeCoercion(TypeCoercion),
            BuiltinStrategy::MissingImport(MissingImport),
            BuiltinStrategy::MissingType(MissingType),
            BuiltinStrategy::NullSafety(NullSafety),
            BuiltinStrategy::MissingProperty(MissingProperty),
            BuiltinStrategy::UnusedSymbol(UnusedSymbol),
            BuiltinStrategy::ImplicitAny(ImplicitAny),
        ]
    }

    fn inner(&self) -> &dyn FixStrategy {
        match self {
            BuiltinStrategy::TypeCoercion(s) => s,
            BuiltinStrategy::MissingImport(s) => s,
            BuiltinStrategy::MissingType(s) => s,
            BuiltinStrategy::NullSafety(s) => s,
            BuiltinStrategy::MissingProperty(s) => s,
            BuiltinStrategy::UnusedSymbol(s) => s,
            BuiltinStrategy::ImplicitAny(s) => s,
        }
    }
}

impl FixStrategy for BuiltinStrategy {
    fn id(&self) -> &'static str {
        self.inner().id()
    }

    fn applicability(&self) -> Applicability {
        self.inner().applicability()
    }

    fn min_confidence(&self) -> u8 {
        self.inner().min_confidence()
    }

    fn heuristics(&self, diagnostic: &Diagnostic) -> i32 {
        self.inner().heuristics(diagnostic)
    }

    fn generate_fix(&self, ctx: &FixContext<'_>) -> Result<Fix> {
        self.inner().generate_fix(ctx)
    }
}

/// A strategy selected for one diagnostic
#[derive(Clone)]
pub struct Candidate {
    pub strategy: Arc<dyn FixStrategy>,
    pub confidence: u8,
    /// Position in the registry
    pub order: usize,
}

impl Candidate {
    pub fn id(&self) -> &'static str {
        self.strategy.id()
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("id", &self.id())
            .field("confidence", &self.confidence)
            .field("order", &self.order)
            .finish()
    }
}

/// Ordered strategy registry
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn FixStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in strategy
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for strategy in BuiltinStrategy::all() {
            registry.register(Arc::new(strategy));
        }
        registry
    }

    pub fn with_strategies(strategies: Vec<Arc<dyn FixStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn register(&mut self, strategy: Arc<dyn FixStrategy>) {
        self.strategies.push(strategy);
    }

    /// Strategies whose `can_apply` holds, by descending confidence then
    /// registration order
    pub fn candidates(&self, diagnostic: &Diagnostic) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .strategies
            .iter()
            .enumerate()
            .filter(|(_, s)| s.can_apply(diagnostic))
            .map(|(order, s)| Candidate {
                strategy: Arc::clone(s),
                confidence: s.confidence(diagnostic),
                order,
            })
            .collect();
        candidates.sort_by(|a, b| b.confidence.cmp(&a.confidence).then(a.order.cmp(&b.order)));
        candidates
    }

    /// Strategies whose applicability set matches, ignoring thresholds
    pub fn matching(&self, diagnostic: &Diagnostic) -> Vec<Candidate> {
        self.strategies
            .iter()
            .enumerate()
            .filter(|(_, s)| s.applicability().matches(diagnostic))
            .map(|(order, s)| Candidate {
                strategy: Arc::clone(s),
                confidence: s.confidence(diagnostic),
                order,
            })
            .collect()
    }

    /// Some strategy can apply to this diagnostic
    pub fn covers(&self, diagnostic: &Diagnostic) -> bool {
        self.strategies.iter().any(|s| s.can_apply(diagnostic))
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn FixStrategy>> {
        self.strategies.iter().find(|s| s.id() == id).cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    struct Fixed {
        id: &'static str,
        heuristics: i32,
    }

    impl FixStrategy for Fixed {
        fn id(&self) -> &'static str {
            self.id
        }

        fn applicability(&self) -> Applicability {
            Applicability::new(&["E1"], &[DiagnosticCategory::TypeMismatch])
        }

        fn heuristics(&self, _d: &Diagnostic) -> i32 {
            self.heuristics
        }

        fn generate_fix(&self, _ctx: &FixContext<'_>) -> Result<Fix> {
            Err(EngineError::strategy(self.id, "not implemented"))
        }
    }

    fn diag() -> Diagnostic {
        Diagnostic::new("E1", "Type 'string' is not assignable to type 'number'.", "a.ts", 1, 1)
            .with_category(DiagnosticCategory::TypeMismatch)
    }

    #[test]
    fn test_confidence_formula_and_clamp() {
        let d = diag();
        let plain = Fixed { id: "plain", heuristics: 0 };
        assert_eq!(plain.confidence(&d), 90);

        let boosted = Fixed { id: "boosted", heuristics: 500 };
        assert_eq!(boosted.confidence(&d), 100);

        let crushed = Fixed { id: "crushed", heuristics: -500 };
        assert_eq!(crushed.confidence(&d), 0);
        assert!(!crushed.can_apply(&d));
    }

    #[test]
    fn test_ties_resolve_by_registration_order() {
        let registry = StrategyRegistry::with_strategies(vec![
            Arc::new(Fixed { id: "first", heuristics: 0 }),
            Arc::new(Fixed { id: "low", heuristics: -20 }),
            Arc::new(Fixed { id: "second", heuristics: 0 }),
        ]);
        let d = diag();
        for _ in 0..5 {
            let ids: Vec<&str> = registry.candidates(&d).iter().map(|c| c.id()).collect();
            assert_eq!(ids, vec!["first", "second", "low"]);
        }
    }

    #[test]
    fn test_code_prefix_matching() {
        assert!(code_matches("TYPE_MISMATCH", "TYPE_MISMATCH_STR_NUM"));
        assert!(code_matches("TS2322", "ts2322"));
        assert!(!code_matches("TYPE_MISMATCH", "TYPE_MISMATCHED"));
        assert!(!code_matches("TS232", "TS2322"));
    }

    #[test]
    fn test_builtin_registry() {
        let registry = StrategyRegistry::builtin();
        assert_eq!(
            registry.ids(),
            vec![
                "type_coercion",
                "missing_import",
                "missing_type",
                "null_safety",
                "missing_property",
                "unused_symbol",
                "implicit_any"
            ]
        );

        let d = Diagnostic::new(
            "TYPE_MISMATCH_STR_NUM",
            "Type 'string' is not assignable to type 'number'",
            "a.ts",
            10,
            7,
        )
        .with_category(DiagnosticCategory::TypeMismatch);
        let candidates = registry.candidates(&d);
        assert_eq!(candidates[0].id(), "type_coercion");
        assert_eq!(candidates[0].confidence, 100);
        assert!(registry.covers(&d));

        let other = Diagnostic::new("E0", "something odd", "a.ts", 1, 1);
        assert!(!registry.covers(&other));
        assert!(registry.get("null_safety").is_some());
    }
}
