//! Multi-stage fix validation
//!
//! Stages run in order on an already-applied fix:
//! 1. recheck: the original diagnostic must not reproduce at its (shifted) line
//! 2. new diagnostics: post-fix diagnostics not present before (multiset diff)
//! 3. security: denylist scan over the inserted text
//! 4. style: external linter, or built-in heuristics when none is usable
//! 5. performance: heuristic impact of the inserted text
//!
//! A failed recheck stops the pipeline. The other stages always run so the
//! report says exactly which gates failed.

pub mod performance;
pub mod security;
pub mod style;

pub use performance::{PerformanceImpact, PerformanceReport};
pub use security::{SecurityFlag, SecurityRisk};
pub use style::{StyleReport, StyleSource};

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use diagfix_storage::{Diagnostic, Fix};

use crate::error::Result;
use crate::external::{StyleLinter, StyleViolation, TypeChecker};
use crate::symbols::relative_to_root;
use crate::transform::AppliedChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Recheck,
    NewDiagnostics,
    Security,
    Style,
    Performance,
}

impl ValidationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStage::Recheck => "recheck",
            ValidationStage::NewDiagnostics => "new_diagnostics",
            ValidationStage::Security => "security",
            ValidationStage::Style => "style",
            ValidationStage::Performance => "performance",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub original_resolved: bool,
    pub new_diagnostics: Vec<Diagnostic>,
    pub security_flags: Vec<SecurityFlag>,
    pub style: StyleReport,
    pub performance: PerformanceReport,
    pub failed_stages: Vec<ValidationStage>,
    pub is_valid: bool,
    /// Checker output for the rechecked files
    #[serde(skip)]
    pub post_diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    /// Apply the composite rule to finished stage results
    pub fn compose(
        new_diagnostics: Vec<Diagnostic>,
        security_flags: Vec<SecurityFlag>,
        style: StyleReport,
        performance: PerformanceReport,
        post_diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let mut failed_stages = Vec::new();
        if !new_diagnostics.is_empty() {
            failed_stages.push(ValidationStage::NewDiagnostics);
        }
        if !security_flags.is_empty() {
            failed_stages.push(ValidationStage::Security);
        }
        if !style.passed {
            failed_stages.push(ValidationStage::Style);
        }
        if performance.impact == PerformanceImpact::High {
            failed_stages.push(ValidationStage::Performance);
        }
        Self {
            original_resolved: true,
            new_diagnostics,
            security_flags,
            style,
            performance,
            is_valid: failed_stages.is_empty(),
            failed_stages,
            post_diagnostics,
        }
    }

    /// The original diagnostic still reproduces
    pub fn reproduced(post_diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            original_resolved: false,
            new_diagnostics: Vec::new(),
            security_flags: Vec::new(),
            style: StyleReport::from_violations(StyleSource::Builtin, Vec::new()),
            performance: PerformanceReport::default(),
            failed_stages: vec![ValidationStage::Recheck],
            is_valid: false,
            post_diagnostics,
        }
    }

    /// Every gate except the new-diagnostics count passed
    pub fn only_regressions(&self) -> bool {
        self.failed_stages == [ValidationStage::NewDiagnostics]
    }

    pub fn first_failure(&self) -> Option<ValidationStage> {
        self.failed_stages.first().copied()
    }

    /// Compact form stored in application logs
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "valid": self.is_valid,
            "original_resolved": self.original_resolved,
            "failed_stages": self.failed_stages.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            "new_diagnostics": self.new_diagnostics.len(),
            "security_flags": self.security_flags.iter().map(|f| f.rule.as_str()).collect::<Vec<_>>(),
            "style_passed": self.style.passed,
            "style_source": self.style.source,
            "impact": self.performance.impact.as_str(),
        })
    }
}

/// Post-fix diagnostics that exceed their pre-fix count
///
/// Diagnostics are keyed by (root-relative file, code, message), so a shifted
/// line does not make an old diagnostic look new.
pub fn new_diagnostics(root: &Path, baseline: &[Diagnostic], post: &[Diagnostic]) -> Vec<Diagnostic> {
    let key = |d: &Diagnostic| (relative_to_root(root, &d.file), d.code.clone(), d.message.clone());

    let mut remaining: HashMap<(PathBuf, String, String), usize> = HashMap::new();
    for d in baseline {
        *remaining.entry(key(d)).or_default() += 1;
    }

    post.iter()
        .filter(|d| match remaining.get_mut(&key(d)) {
            Some(count) if *count > 0 => {
                *count -= 1;
                false
            }
            _ => true,
        })
        .cloned()
        .collect()
}

pub struct Validator {
    root: PathBuf,
    checker: Arc<dyn TypeChecker>,
    linter: Option<Arc<dyn StyleLinter>>,
    max_line_length: usize,
}

impl Validator {
    pub fn new(
        root: impl Into<PathBuf>,
        checker: Arc<dyn TypeChecker>,
        linter: Option<Arc<dyn StyleLinter>>,
        max_line_length: usize,
    ) -> Self {
        Self {
            root: root.into(),
            checker,
            linter,
            max_line_length,
        }
    }

    pub fn checker(&self) -> &Arc<dyn TypeChecker> {
        &self.checker
    }

    /// Validate an applied fix against the pre-fix `baseline` of the same files
    pub async fn validate(
        &self,
        diagnostic: &Diagnostic,
        fix: &Fix,
        changes: &[AppliedChange],
        baseline: &[Diagnostic],
    ) -> Result<ValidationReport> {
        let target = relative_to_root(&self.root, &diagnostic.file);
        let mut files: Vec<PathBuf> = changes
            .iter()
            .map(|c| relative_to_root(&self.root, &c.file))
            .collect();
        if !files.contains(&target) {
            files.push(target.clone());
        }

        // Stage 1
        let post = self.checker.check(&files).await?;
        let line = changes
            .iter()
            .find(|c| relative_to_root(&self.root, &c.file) == target)
            .map(|c| c.adjust_line(diagnostic.line))
            .unwrap_or(diagnostic.line);
        let reproduced = post.iter().any(|p| {
            p.code == diagnostic.code && p.line == line && relative_to_root(&self.root, &p.file) == target
        });
        if reproduced {
            debug!(diagnostic = %diagnostic.id, strategy = %fix.strategy, "diagnostic reproduced after fix");
            return Ok(ValidationReport::reproduced(post));
        }

        // Stage 2
        let introduced = new_diagnostics(&self.root, baseline, &post);

        // Stage 3
        let inserted = fix.inserted_text();
        let security_flags = security::scan(&inserted);

        // Stage 4
        let style = self.check_style(fix, changes).await;

        // Stage 5
        let performance = performance::analyze(&inserted);

        let report = ValidationReport::compose(introduced, security_flags, style, performance, post);
        debug!(
            diagnostic = %diagnostic.id,
            strategy = %fix.strategy,
            valid = report.is_valid,
            new_diagnostics = report.new_diagnostics.len(),
            impact = report.performance.impact.as_str(),
            "fix validated"
        );
        Ok(report)
    }

    async fn check_style(&self, fix: &Fix, changes: &[AppliedChange]) -> StyleReport {
        if let Some(linter) = &self.linter {
            match self.lint_changes(linter.as_ref(), changes).await {
                Ok(violations) => return StyleReport::from_violations(StyleSource::Linter, violations),
                Err(e) => {
                    warn!(linter = linter.name(), error = %e, "linter unavailable, using built-in style checks");
                }
            }
        }

        let violations = changes
            .iter()
            .flat_map(|change| {
                let inserted: String = fix
                    .edits
                    .iter()
                    .filter(|e| e.file == change.file)
                    .map(|e| e.new_text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                style::builtin_check(change, &inserted, self.max_line_length)
            })
            .collect();
        StyleReport::from_violations(StyleSource::Builtin, violations)
    }

    /// Linter violations on touched lines (or without a position)
    async fn lint_changes(&self, linter: &dyn StyleLinter, changes: &[AppliedChange]) -> Result<Vec<StyleViolation>> {
        let mut violations = Vec::new();
        for change in changes {
            let report = linter.lint(&change.absolute).await?;
            if report.passed {
                continue;
            }
            violations.extend(report.violations.into_iter().filter(|v| match v.line {
                Some(line) => change.touched_lines.contains(&line),
                None => true,
            }));
        }
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use diagfix_storage::FixEdit;
    use pretty_assertions::assert_eq;

    struct FixedChecker(Vec<Diagnostic>);

    #[async_trait]
    impl TypeChecker for FixedChecker {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn check(&self, _files: &[PathBuf]) -> Result<Vec<Diagnostic>> {
            Ok(self.0.clone())
        }
    }

    fn change(updated: &str, touched: Vec<u32>) -> AppliedChange {
        AppliedChange {
            file: PathBuf::from("a.ts"),
            absolute: PathBuf::from("/p/a.ts"),
            original: String::new(),
            updated: updated.to_string(),
            shifts: vec![],
            touched_lines: touched,
        }
    }

    fn mismatch(line: u32) -> Diagnostic {
        Diagnostic::new("TS2322", "Type 'string' is not assignable to type 'number'.", "a.ts", line, 7)
    }

    fn fix_with(text: &str) -> Fix {
        Fix::new(uuid::Uuid::new_v4(), "type_coercion", "wrap", vec![FixEdit::insert("a.ts", 0, text)])
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Composite rule
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_impact_boundary() {
        let style = StyleReport::from_violations(StyleSource::Builtin, vec![]);
        let medium = PerformanceReport {
            impact: PerformanceImpact::Medium,
            score: 3,
            findings: vec![],
        };
        let valid = ValidationReport::compose(vec![], vec![], style.clone(), medium, vec![]);
        assert!(valid.is_valid);

        let high = PerformanceReport {
            impact: PerformanceImpact::High,
            score: 4,
            findings: vec![],
        };
        let invalid = ValidationReport::compose(vec![], vec![], style, high, vec![]);
        assert!(!invalid.is_valid);
        assert_eq!(invalid.failed_stages, vec![ValidationStage::Performance]);
        assert!(!invalid.only_regressions());
    }

    #[test]
    fn test_new_diagnostics_multiset() {
        let root = Path::new("/p");
        let a = Diagnostic::new("TS2304", "Cannot find name 'X'.", "a.ts", 1, 1);
        let mut a_shifted = a.clone();
        a_shifted.line = 3;
        let b = Diagnostic::new("TS2304", "Cannot find name 'X'.", "/p/a.ts", 9, 1);

        let introduced = new_diagnostics(root, &[a.clone()], &[a_shifted, b]);
        assert_eq!(introduced.len(), 1);
        assert_eq!(introduced[0].line, 9);

        assert!(new_diagnostics(root, &[a.clone(), a.clone()], &[a]).is_empty());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Pipeline
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_reproduced_diagnostic_fails_recheck() {
        let validator = Validator::new("/p", Arc::new(FixedChecker(vec![mismatch(10)])), None, 120);
        let report = validator
            .validate(&mismatch(10), &fix_with("Number(x)"), &[change("x\n", vec![1])], &[mismatch(10)])
            .await
            .unwrap();
        assert!(!report.original_resolved);
        assert_eq!(report.failed_stages, vec![ValidationStage::Recheck]);
    }

    #[tokio::test]
    async fn test_clean_fix_is_valid() {
        let validator = Validator::new("/p", Arc::new(FixedChecker(vec![])), None, 120);
        let report = validator
            .validate(&mismatch(1), &fix_with("Number(x)"), &[change("const t: number = Number(x);\n", vec![1])], &[mismatch(1)])
            .await
            .unwrap();
        assert!(report.is_valid);
        assert_eq!(report.summary()["impact"], "none");
    }

    #[tokio::test]
    async fn test_regression_only_and_security() {
        let extra = Diagnostic::new("TS2345", "Argument mismatch.", "a.ts", 4, 1);
        let validator = Validator::new("/p", Arc::new(FixedChecker(vec![extra])), None, 120);

        let report = validator
            .validate(&mismatch(1), &fix_with("Number(x)"), &[change("a\n", vec![1])], &[mismatch(1)])
            .await
            .unwrap();
        assert!(report.only_regressions());

        let risky = validator
            .validate(&mismatch(1), &fix_with("eval(x)"), &[change("a\n", vec![1])], &[mismatch(1)])
            .await
            .unwrap();
        assert_eq!(
            risky.failed_stages,
            vec![ValidationStage::NewDiagnostics, ValidationStage::Security]
        );
        assert!(!risky.only_regressions());
    }
}
