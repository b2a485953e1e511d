use serde_json::json;

use diagfix_storage::{Diagnostic, DiagnosticCategory, Fix, FixEdit};

use crate::classify::primary_symbol;
use crate::error::{EngineError, Result};
use crate::strategy::context::is_ident_byte;
use crate::strategy::{Applicability, FixContext, FixStrategy};

const ID: &str = "unused_symbol";

/// Drop an unused import, or mark an unused local with a leading underscore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnusedSymbol;

impl FixStrategy for UnusedSymbol {
    fn id(&self) -> &'static str {
        ID
    }

    fn applicability(&self) -> Applicability {
        Applicability::new(
            &["TS6133", "TS6192", "TS6196", "UNUSED_SYMBOL", "UNUSED"],
            &[DiagnosticCategory::UnusedSymbol],
        )
    }

    fn heuristics(&self, diagnostic: &Diagnostic) -> i32 {
        if primary_symbol(&diagnostic.message).is_some() || diagnostic.code == "TS6192" {
            10
        } else {
            -40
        }
    }

    fn generate_fix(&self, ctx: &FixContext<'_>) -> Result<Fix> {
        let diagnostic = ctx.diagnostic;
        let (line_start, line_end) = ctx
            .line_span(diagnostic.line)
            .ok_or_else(|| EngineError::strategy(ID, format!("no line {}", diagnostic.location())))?;
        let line = &ctx.source[line_start..line_end];

        if line.trim_start().starts_with("import ") {
            return remove_from_import(self, ctx, line_start, line);
        }

        let name = primary_symbol(&diagnostic.message)
            .ok_or_else(|| EngineError::strategy(ID, "no symbol named in message"))?;
        if name.starts_with('_') {
            return Err(EngineError::strategy(ID, format!("'{}' is already marked unused", name)));
        }
        let at = find_word(line, &name)
            .ok_or_else(|| EngineError::strategy(ID, format!("'{}' not found on line {}", name, diagnostic.line)))?;

        Ok(Fix::new(
            diagnostic.id,
            ID,
            format!("Rename unused `{}` to `_{}`", name, name),
            vec![FixEdit::insert(diagnostic.file.clone(), line_start + at, "_")],
        )
        .with_confidence(self.confidence(diagnostic).into())
        .with_metadata(json!({ "symbol": name, "action": "prefix" })))
    }
}

fn remove_from_import(
    strategy: &UnusedSymbol,
    ctx: &FixContext<'_>,
    line_start: usize,
    line: &str,
) -> Result<Fix> {
    let diagnostic = ctx.diagnostic;
    let name = primary_symbol(&diagnostic.message);

    let braces = line.find('{').zip(line.find('}'));
    let has_default = braces
        .map(|(open, _)| line[..open].trim_start().trim_start_matches("import").trim().trim_end_matches(',').trim() != "")
        .unwrap_or(false);

    let keep: Option<Vec<&str>> = match (&name, braces) {
        (Some(name), Some((open, close))) if open < close => {
            let specifiers: Vec<&str> = line[open + 1..close]
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            let remaining: Vec<&str> = specifiers
                .iter()
                .copied()
                .filter(|s| local_name(s) != name.as_str())
                .collect();
            if remaining.len() == specifiers.len() {
                return Err(EngineError::strategy(ID, format!("'{}' is not in this import", name)));
            }
            Some(remaining)
        }
        _ => None,
    };

    let (edit, description) = match (keep, braces) {
        (Some(remaining), Some((open, close))) if !remaining.is_empty() => (
            FixEdit::new(
                diagnostic.file.clone(),
                line_start + open,
                line_start + close + 1,
                format!("{{ {} }}", remaining.join(", ")),
            ),
            format!("Remove `{}` from import", name.clone().unwrap_or_default()),
        ),
        (Some(_), Some((open, close))) if has_default => {
            // `import D, { x } from ...` → `import D from ...`
            let comma = line[..open].rfind(',').unwrap_or(open);
            (
                FixEdit::delete(diagnostic.file.clone(), line_start + comma, line_start + close + 1),
                format!("Remove `{}` from import", name.clone().unwrap_or_default()),
            )
        }
        _ => {
            let end = ctx
                .line_end_inclusive(diagnostic.line)
                .unwrap_or(line_start + line.len());
            (
                FixEdit::delete(diagnostic.file.clone(), line_start, end),
                "Remove unused import".to_string(),
            )
        }
    };

    Ok(Fix::new(diagnostic.id, ID, description, vec![edit])
        .with_confidence(strategy.confidence(diagnostic).into())
        .with_metadata(json!({ "symbol": name, "action": "remove_import" })))
}

/// `A as B` binds `B`; `type A` binds `A`
fn local_name(specifier: &str) -> &str {
    let s = specifier.trim_start_matches("type ").trim();
    match s.rsplit_once(" as ") {
        Some((_, alias)) => alias.trim(),
        None => s,
    }
}

/// Byte index of `word` as a whole identifier
fn find_word(line: &str, word: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    line.match_indices(word).map(|(i, _)| i).find(|&i| {
        let before_ok = i == 0 || !is_ident_byte(bytes[i - 1]);
        let after = i + word.len();
        let after_ok = after >= bytes.len() || !is_ident_byte(bytes[after]);
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::builtins::test_support::{apply, context};
    use crate::symbols::SymbolIndex;

    fn diag(message: &str, line: u32) -> Diagnostic {
        Diagnostic::new("TS6133", message, "a.ts", line, 10)
            .with_category(DiagnosticCategory::UnusedSymbol)
    }

    #[test]
    fn test_drop_one_specifier() {
        let source = "import { a, b as bee, c } from './m';\nuse(a, c);\n";
        let d = diag("'bee' is declared but its value is never read.", 1);
        let symbols = SymbolIndex::new();
        let fix = UnusedSymbol.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert_eq!(apply(source, &fix), "import { a, c } from './m';\nuse(a, c);\n");
    }

    #[test]
    fn test_drop_whole_import_line() {
        let source = "import { only } from './m';\nconst x = 1;\n";
        let d = diag("'only' is declared but its value is never read.", 1);
        let symbols = SymbolIndex::new();
        let fix = UnusedSymbol.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert_eq!(apply(source, &fix), "const x = 1;\n");
    }

    #[test]
    fn test_keep_default_import() {
        let source = "import React, { useState } from 'react';\n";
        let d = diag("'useState' is declared but its value is never read.", 1);
        let symbols = SymbolIndex::new();
        let fix = UnusedSymbol.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert_eq!(apply(source, &fix), "import React from 'react';\n");
    }

    #[test]
    fn test_prefix_local() {
        let source = "function f(count: number, total: number) {\n  return count;\n}\n";
        let d = diag("'total' is declared but its value is never read.", 1);
        let symbols = SymbolIndex::new();
        let fix = UnusedSymbol.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert!(apply(source, &fix).starts_with("function f(count: number, _total: number)"));
    }

    #[test]
    fn test_find_word_respects_boundaries() {
        assert_eq!(find_word("let totals = total;", "total"), Some(13));
        assert_eq!(find_word("subtotal", "total"), None);
    }
}
