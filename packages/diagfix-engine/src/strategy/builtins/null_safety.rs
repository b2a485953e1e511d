use serde_json::json;

use diagfix_storage::{Diagnostic, DiagnosticCategory, Fix, FixEdit};

use crate::error::{EngineError, Result};
use crate::strategy::{Applicability, FixContext, FixStrategy};

const ID: &str = "null_safety";

/// Optional chaining on the possibly-null expression, or a non-null assertion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullSafety;

impl FixStrategy for NullSafety {
    fn id(&self) -> &'static str {
        ID
    }

    fn applicability(&self) -> Applicability {
        Applicability::new(
            &["TS2531", "TS2532", "TS2533", "TS2722", "TS18047", "TS18048", "TS18049", "NULL_SAFETY"],
            &[DiagnosticCategory::NullSafety],
        )
    }

    fn heuristics(&self, diagnostic: &Diagnostic) -> i32 {
        let message = diagnostic.message.to_ascii_lowercase();
        if message.contains("possibly") || message.contains("object is") {
            10
        } else {
            0
        }
    }

    fn generate_fix(&self, ctx: &FixContext<'_>) -> Result<Fix> {
        let diagnostic = ctx.diagnostic;
        let offset = ctx
            .diagnostic_offset()
            .ok_or_else(|| EngineError::strategy(ID, format!("no position {}", diagnostic.location())))?;
        let (start, mut end) = ctx
            .expression_span_at(offset)
            .ok_or_else(|| EngineError::strategy(ID, "no expression under the diagnostic column"))?;

        // The diagnostic points at the head of a chain; guard right after it
        if let Some((_, ident_end)) = ctx.identifier_at(offset) {
            if ident_end < end {
                end = ident_end;
            }
        }
        let expr = &ctx.source[start..end];
        let bytes = ctx.source.as_bytes();

        let (edit, description) = match bytes.get(end) {
            Some(b'?') if bytes.get(end + 1) == Some(&b'.') => {
                return Err(EngineError::strategy(ID, format!("`{}` is already optionally chained", expr)));
            }
            Some(b'!') if bytes.get(end + 1) != Some(&b'=') => {
                return Err(EngineError::strategy(ID, format!("`{}` already has a non-null assertion", expr)));
            }
            Some(b'.') => (
                FixEdit::new(diagnostic.file.clone(), end, end + 1, "?."),
                format!("Use optional chaining after `{}`", expr),
            ),
            Some(b'[') | Some(b'(') => (
                FixEdit::insert(diagnostic.file.clone(), end, "?."),
                format!("Use optional chaining after `{}`", expr),
            ),
            _ => {
                if is_assignment_target(ctx.source, end) {
                    return Err(EngineError::strategy(ID, "cannot guard an assignment target"));
                }
                (
                    FixEdit::insert(diagnostic.file.clone(), end, "!"),
                    format!("Assert `{}` is non-null", expr),
                )
            }
        };

        Ok(Fix::new(diagnostic.id, ID, description, vec![edit])
            .with_confidence(self.confidence(diagnostic).into())
            .with_metadata(json!({ "expression": expr })))
    }
}

fn is_assignment_target(source: &str, end: usize) -> bool {
    let rest = source[end..].trim_start_matches(&[' ', '\t'][..]);
    rest.starts_with('=') && !rest.starts_with("==") && !rest.starts_with("=>")
}
