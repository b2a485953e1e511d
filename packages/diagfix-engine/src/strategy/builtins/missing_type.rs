use serde_json::json;

use diagfix_storage::{Diagnostic, DiagnosticCategory, Fix, FixEdit};

use crate::classify::primary_symbol;
use crate::error::{EngineError, Result};
use crate::strategy::{Applicability, FixContext, FixStrategy};
use crate::syntax::SourceLanguage;

const ID: &str = "missing_type";

/// Declare a placeholder type after the import block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissingType;

impl FixStrategy for MissingType {
    fn id(&self) -> &'static str {
        ID
    }

    fn applicability(&self) -> Applicability {
        Applicability::new(
            &["TS2503", "TS2694", "TS2749", "TS4060", "TS4063", "TS4078", "MISSING_TYPE", "USES_MISSING_TYPE"],
            &[DiagnosticCategory::MissingType, DiagnosticCategory::UsesMissingType],
        )
    }

    fn heuristics(&self, diagnostic: &Diagnostic) -> i32 {
        match primary_symbol(&diagnostic.message) {
            Some(name) if name.starts_with(|c: char| c.is_ascii_uppercase()) => 5,
            Some(_) => -20,
            None => -40,
        }
    }

    fn generate_fix(&self, ctx: &FixContext<'_>) -> Result<Fix> {
        let diagnostic = ctx.diagnostic;
        if !SourceLanguage::from_path(&diagnostic.file)
            .map(|l| l.is_typescript_family())
            .unwrap_or(false)
        {
            return Err(EngineError::strategy(ID, "type placeholders are only generated for TypeScript sources"));
        }

        let name = primary_symbol(&diagnostic.message)
            .ok_or_else(|| EngineError::strategy(ID, "no type named in message"))?;

        let here = ctx.relative_file();
        if ctx
            .symbols
            .type_declarations(&name)
            .iter()
            .any(|entry| entry.file == here)
        {
            return Err(EngineError::strategy(ID, format!("'{}' is already declared in this file", name)));
        }

        let offset = ctx.import_block_end();
        let export = if diagnostic.category == DiagnosticCategory::UsesMissingType {
            "export "
        } else {
            ""
        };
        let text = format!(
            "{}{}type {} = unknown;\n",
            ctx.line_prefix_at(offset),
            export,
            name
        );

        Ok(Fix::new(
            diagnostic.id,
            ID,
            format!("Declare placeholder type `{}`", name),
            vec![FixEdit::insert(diagnostic.file.clone(), offset, text)],
        )
        .with_confidence(self.confidence(diagnostic).into())
        .with_metadata(json!({ "type": name })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::builtins::test_support::{apply, context};
    use crate::symbols::SymbolIndex;

    #[test]
    fn test_declares_placeholder_after_imports() {
        let symbols = SymbolIndex::new();
        let source = "import { x } from './x';\nlet o: Order;\n";
        let d = Diagnostic::new("TS2304", "Cannot find name 'Order'.", "a.ts", 2, 8)
            .with_category(DiagnosticCategory::MissingType);

        let fix = MissingType.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert_eq!(
            apply(source, &fix),
            "import { x } from './x';\ntype Order = unknown;\nlet o: Order;\n"
        );
        assert_eq!(fix.confidence(), 75);
    }

    #[test]
    fn test_uses_missing_type_exports_placeholder() {
        let symbols = SymbolIndex::new();
        let source = "export function f(): Shape { return null as any; }\n";
        let d = Diagnostic::new(
            "TS4060",
            "Return type of exported function has or is using private name 'Shape'.",
            "a.ts",
            1,
            22,
        )
        .with_category(DiagnosticCategory::UsesMissingType);

        let fix = MissingType.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert!(apply(source, &fix).starts_with("export type Shape = unknown;\n"));
    }

    #[test]
    fn test_existing_declaration_rejected() {
        let symbols = SymbolIndex::from_sources(&[("a.ts", "interface Order {}\n")]);
        let d = Diagnostic::new("MISSING_TYPE", "Cannot find name 'Order'.", "a.ts", 1, 1)
            .with_category(DiagnosticCategory::MissingType);
        assert!(MissingType
            .generate_fix(&context(&d, "interface Order {}\n", &symbols))
            .is_err());
    }

    #[test]
    fn test_lowercase_name_scores_low() {
        let d = Diagnostic::new("E1", "Cannot find name 'order'.", "a.ts", 1, 1)
            .with_category(DiagnosticCategory::MissingType);
        assert_eq!(MissingType.confidence(&d), 50);
        assert!(!MissingType.can_apply(&d));
    }
}
