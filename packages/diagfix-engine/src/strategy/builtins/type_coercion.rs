use serde_json::json;

use diagfix_storage::{Diagnostic, DiagnosticCategory, Fix, FixEdit};

use crate::classify::quoted_names;
use crate::error::{EngineError, Result};
use crate::strategy::{Applicability, FixContext, FixStrategy};

const ID: &str = "type_coercion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    String,
    Number,
    Boolean,
}

impl Primitive {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Some(Primitive::String),
            "number" | "num" | "int" | "float" => Some(Primitive::Number),
            "boolean" | "bool" => Some(Primitive::Boolean),
            _ => None,
        }
    }

    fn wrapper(&self) -> &'static str {
        match self {
            Primitive::String => "String",
            Primitive::Number => "Number",
            Primitive::Boolean => "Boolean",
        }
    }

    fn fallback_literal(&self) -> &'static str {
        match self {
            Primitive::String => "''",
            Primitive::Number => "0",
            Primitive::Boolean => "false",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TypePair {
    source: Option<Primitive>,
    nullable: bool,
    target: Primitive,
}

impl TypePair {
    fn from_diagnostic(diagnostic: &Diagnostic) -> Option<Self> {
        Self::from_message(&diagnostic.message).or_else(|| Self::from_code(&diagnostic.code))
    }

    /// `Type 'string | undefined' is not assignable to type 'string'`
    fn from_message(message: &str) -> Option<Self> {
        let names = quoted_names(message);
        if names.len() < 2 {
            return None;
        }
        let target = Primitive::parse(&names[1])?;
        let source_text = names[0].to_ascii_lowercase();
        let nullable = source_text
            .split('|')
            .any(|part| matches!(part.trim(), "undefined" | "null"));
        let source = source_text.split('|').find_map(Primitive::parse);
        if source.is_none() && !nullable {
            return None;
        }
        Some(Self {
            source,
            nullable,
            target,
        })
    }

    /// `TYPE_MISMATCH_STR_NUM`, `TYPE_MISMATCH_NULL_STR`
    fn from_code(code: &str) -> Option<Self> {
        let upper = code.to_ascii_uppercase();
        let mut parts = upper.rsplit('_');
        let target = Primitive::parse(parts.next()?)?;
        let source_part = parts.next()?;
        let nullable = matches!(source_part, "NULL" | "UNDEF" | "UNDEFINED" | "OPT");
        let source = Primitive::parse(source_part);
        if source.is_none() && !nullable {
            return None;
        }
        Some(Self {
            source,
            nullable,
            target,
        })
    }

    fn wrap(&self, expr: &str) -> String {
        let defaults_to_target = self.source.is_none() || self.source == Some(self.target);
        if self.nullable && defaults_to_target {
            format!("({} ?? {})", expr, self.target.fallback_literal())
        } else {
            format!("{}({})", self.target.wrapper(), expr)
        }
    }
}

/// Coerce the offending expression to the expected primitive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeCoercion;

impl FixStrategy for TypeCoercion {
    fn id(&self) -> &'static str {
        ID
    }

    fn applicability(&self) -> Applicability {
        Applicability::new(
            &["TS2322", "TS2345", "TYPE_MISMATCH"],
            &[DiagnosticCategory::TypeMismatch],
        )
    }

    fn heuristics(&self, diagnostic: &Diagnostic) -> i32 {
        if TypePair::from_diagnostic(diagnostic).is_some() {
            10
        } else {
            -40
        }
    }

    fn generate_fix(&self, ctx: &FixContext<'_>) -> Result<Fix> {
        let diagnostic = ctx.diagnostic;
        let pair = TypePair::from_diagnostic(diagnostic)
            .ok_or_else(|| EngineError::strategy(ID, "no recognised primitive type pair"))?;

        let (start, end) = offending_expression(ctx)
            .ok_or_else(|| EngineError::strategy(ID, format!("no expression at {}", diagnostic.location())))?;
        let expr = &ctx.source[start..end];

        let wrapped = pair.wrap(expr);
        if expr.starts_with(&format!("{}(", pair.target.wrapper())) || expr.ends_with(&format!("?? {})", pair.target.fallback_literal())) {
            return Err(EngineError::strategy(ID, format!("'{}' is already coerced", expr)));
        }

        let edit = FixEdit::new(diagnostic.file.clone(), start, end, wrapped.clone());
        Ok(Fix::new(
            diagnostic.id,
            ID,
            format!("Coerce `{}` to `{}`", expr, wrapped),
            vec![edit],
        )
        .with_confidence(self.confidence(diagnostic).into())
        .with_metadata(json!({
            "target": pair.target.wrapper(),
            "nullable_source": pair.nullable,
        })))
    }
}

/// Initializer of an assignment on the diagnostic line, the operand of a
/// `return`, or the expression under the diagnostic column
fn offending_expression(ctx: &FixContext<'_>) -> Option<(usize, usize)> {
    let (line_start, line_end) = ctx.line_span(ctx.diagnostic.line)?;
    let line = &ctx.source[line_start..line_end];

    let argument_position = ctx.diagnostic.code.eq_ignore_ascii_case("TS2345");
    if !argument_position {
        if let Some(eq) = assignment_operator(line) {
            if let Some(span) = trimmed_operand(line, eq + 1) {
                return Some((line_start + span.0, line_start + span.1));
            }
        }
        let indent = line.len() - line.trim_start().len();
        if line.trim_start().starts_with("return ") {
            if let Some(span) = trimmed_operand(line, indent + "return ".len()) {
                return Some((line_start + span.0, line_start + span.1));
            }
        }
    }

    let offset = ctx.diagnostic_offset()?;
    ctx.expression_span_at(offset)
}

/// Byte index of a plain `=` (not `==`, `!=`, `<=`, `>=`, `=>`)
fn assignment_operator(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    (0..bytes.len()).find(|&i| {
        bytes[i] == b'='
            && !matches!(i.checked_sub(1).map(|p| bytes[p]), Some(b'=' | b'!' | b'<' | b'>' | b'+' | b'-' | b'*' | b'/' | b'?'))
            && !matches!(bytes.get(i + 1), Some(b'=' | b'>'))
    })
}

/// `[from, ;)` trimmed of whitespace, stopping at a top-level `;` or `//`
fn trimmed_operand(line: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = line.as_bytes();
    let mut depth = 0i32;
    let mut end = bytes.len();
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b';' | b',' if depth <= 0 => {
                    end = i;
                    break;
                }
                b'/' if depth <= 0 && bytes.get(i + 1) == Some(&b'/') => {
                    end = i;
                    break;
                }
                _ => {}
            },
        }
        i += 1;
    }

    let slice = line.get(from..end)?;
    let lead = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some((from + lead, from + lead + trimmed.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::builtins::test_support::{apply, context};
    use crate::symbols::SymbolIndex;

    fn diag(code: &str, message: &str, line: u32, column: u32) -> Diagnostic {
        Diagnostic::new(code, message, "a.ts", line, column)
            .with_category(DiagnosticCategory::TypeMismatch)
    }

    #[test]
    fn test_wraps_initializer_with_number() {
        let source = "let input = read();\nconst total: number = input;\n";
        let d = diag("TYPE_MISMATCH_STR_NUM", "Type 'string' is not assignable to type 'number'", 2, 7);
        let symbols = SymbolIndex::new();
        let fix = TypeCoercion.generate_fix(&context(&d, source, &symbols)).unwrap();

        assert_eq!(fix.strategy, "type_coercion");
        assert_eq!(apply(source, &fix), "let input = read();\nconst total: number = Number(input);\n");
        assert_eq!(fix.confidence(), 100);
    }

    #[test]
    fn test_pair_from_code_only() {
        let source = "const label: string = count;\n";
        let d = diag("TYPE_MISMATCH_NUM_STR", "mismatch", 1, 7);
        let symbols = SymbolIndex::new();
        let fix = TypeCoercion.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert_eq!(apply(source, &fix), "const label: string = String(count);\n");
    }

    #[test]
    fn test_nullable_source_gets_default() {
        let source = "  name = user.name;\n";
        let d = diag("TS2322", "Type 'string | undefined' is not assignable to type 'string'.", 1, 3);
        let symbols = SymbolIndex::new();
        let fix = TypeCoercion.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert_eq!(apply(source, &fix), "  name = (user.name ?? '');\n");
    }

    #[test]
    fn test_argument_position_uses_column() {
        let source = "compute(a, raw.value, c);\n";
        let col = source.find("raw").unwrap() as u32 + 1;
        let d = diag(
            "TS2345",
            "Argument of type 'string' is not assignable to parameter of type 'number'.",
            1,
            col,
        );
        let symbols = SymbolIndex::new();
        let fix = TypeCoercion.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert_eq!(apply(source, &fix), "compute(a, Number(raw.value), c);\n");
    }

    #[test]
    fn test_return_operand() {
        let source = "function f(): number {\n  return text;\n}\n";
        let d = diag("TS2322", "Type 'string' is not assignable to type 'number'.", 2, 3);
        let symbols = SymbolIndex::new();
        let fix = TypeCoercion.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert!(apply(source, &fix).contains("return Number(text);"));
    }

    #[test]
    fn test_unrecognised_pair_lowers_confidence() {
        let d = diag("TS2322", "Type 'Foo' is not assignable to type 'Bar'.", 1, 1);
        assert_eq!(TypeCoercion.confidence(&d), 50);
        assert!(!TypeCoercion.can_apply(&d));
    }

    #[test]
    fn test_already_coerced_is_rejected() {
        let source = "const total: number = Number(input);\n";
        let d = diag("TYPE_MISMATCH_STR_NUM", "Type 'string' is not assignable to type 'number'", 1, 7);
        let symbols = SymbolIndex::new();
        assert!(TypeCoercion.generate_fix(&context(&d, source, &symbols)).is_err());
    }
}
