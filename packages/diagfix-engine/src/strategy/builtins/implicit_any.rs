use serde_json::json;

use diagfix_storage::{Diagnostic, DiagnosticCategory, Fix, FixEdit};

use crate::classify::primary_symbol;
use crate::error::{EngineError, Result};
use crate::strategy::context::is_ident_byte;
use crate::strategy::{Applicability, FixContext, FixStrategy};

const ID: &str = "implicit_any";

/// Annotate an implicitly-`any` binding with `: unknown`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImplicitAny;

impl FixStrategy for ImplicitAny {
    fn id(&self) -> &'static str {
        ID
    }

    fn applicability(&self) -> Applicability {
        Applicability::new(
            &["TS7005", "TS7006", "TS7031", "TS7034", "IMPLICIT_ANY"],
            &[DiagnosticCategory::ImplicitAny],
        )
    }

    fn heuristics(&self, diagnostic: &Diagnostic) -> i32 {
        if primary_symbol(&diagnostic.message).is_some() {
            10
        } else {
            -40
        }
    }

    fn generate_fix(&self, ctx: &FixContext<'_>) -> Result<Fix> {
        let diagnostic = ctx.diagnostic;
        let name = primary_symbol(&diagnostic.message)
            .ok_or_else(|| EngineError::strategy(ID, "no binding named in message"))?;

        let (start, end) = locate_binding(ctx, &name)
            .ok_or_else(|| EngineError::strategy(ID, format!("'{}' not found at {}", name, diagnostic.location())))?;

        let bytes = ctx.source.as_bytes();
        let mut after = end;
        if bytes.get(after) == Some(&b'?') {
            after += 1;
        }
        let rest = ctx.source[after..].trim_start_matches(&[' ', '\t'][..]);
        if rest.starts_with(':') {
            return Err(EngineError::strategy(ID, format!("'{}' is already annotated", name)));
        }

        let bare_arrow_param = rest.starts_with("=>") && {
            let before = ctx.source[..start].trim_end_matches(&[' ', '\t'][..]);
            !(before.ends_with('(') || before.ends_with(','))
        };

        let edit = if bare_arrow_param {
            FixEdit::new(diagnostic.file.clone(), start, end, format!("({}: unknown)", name))
        } else {
            FixEdit::insert(diagnostic.file.clone(), after, ": unknown")
        };

        Ok(Fix::new(
            diagnostic.id,
            ID,
            format!("Annotate `{}` as `unknown`", name),
            vec![edit],
        )
        .with_confidence(self.confidence(diagnostic).into())
        .with_metadata(json!({ "binding": name, "arrow": bare_arrow_param })))
    }
}

/// The identifier at the diagnostic column, else its first occurrence on the line
fn locate_binding(ctx: &FixContext<'_>, name: &str) -> Option<(usize, usize)> {
    if let Some(offset) = ctx.diagnostic_offset() {
        if let Some((s, e)) = ctx.identifier_at(offset) {
            if &ctx.source[s..e] == name {
                return Some((s, e));
            }
        }
    }

    let (line_start, line_end) = ctx.line_span(ctx.diagnostic.line)?;
    let line = &ctx.source[line_start..line_end];
    let bytes = line.as_bytes();
    line.match_indices(name)
        .map(|(i, _)| i)
        .find(|&i| {
            (i == 0 || !is_ident_byte(bytes[i - 1]))
                && bytes.get(i + name.len()).map(|b| !is_ident_byte(*b)).unwrap_or(true)
        })
        .map(|i| (line_start + i, line_start + i + name.len()))
}
