use regex::Regex;
use serde_json::json;

use diagfix_storage::{Diagnostic, DiagnosticCategory, Fix, FixEdit};

use crate::classify::{is_identifier, quoted_names};
use crate::error::{EngineError, Result};
use crate::strategy::{Applicability, FixContext, FixStrategy};

const ID: &str = "missing_property";

/// Add an optional member to the interface declared in the same file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissingProperty;

/// `Property 'x' does not exist on type 'T'` → ("x", "T")
fn property_and_owner(diagnostic: &Diagnostic) -> Option<(String, String)> {
    if !diagnostic.message.contains("does not exist") {
        return None;
    }
    let names = quoted_names(&diagnostic.message);
    let property = names.first().filter(|n| is_identifier(n))?.clone();
    let owner = names.get(1).filter(|n| is_identifier(n))?.clone();
    Some((property, owner))
}

impl FixStrategy for MissingProperty {
    fn id(&self) -> &'static str {
        ID
    }

    fn applicability(&self) -> Applicability {
        Applicability::new(
            &["TS2339", "TS2551", "MISSING_PROPERTY"],
            &[DiagnosticCategory::MissingProperty],
        )
    }

    fn heuristics(&self, diagnostic: &Diagnostic) -> i32 {
        if property_and_owner(diagnostic).is_some() {
            10
        } else {
            -40
        }
    }

    fn generate_fix(&self, ctx: &FixContext<'_>) -> Result<Fix> {
        let diagnostic = ctx.diagnostic;
        let (property, owner) = property_and_owner(diagnostic)
            .ok_or_else(|| EngineError::strategy(ID, "message does not name a property and its type"))?;

        let pattern = format!(
            r"(?m)^[ \t]*(?:export\s+)?(?:interface\s+{0}\b[^{{]*|type\s+{0}\s*=\s*)\{{",
            regex::escape(&owner)
        );
        let re = Regex::new(&pattern).map_err(|e| EngineError::strategy(ID, e.to_string()))?;
        let open = re
            .find(ctx.source)
            .map(|m| m.end())
            .ok_or_else(|| EngineError::strategy(ID, format!("interface '{}' is not declared in this file", owner)))?;

        let body_line = ctx.line_of(open);
        let indent = ctx
            .line_text(body_line + 1)
            .map(|next| {
                let ws: String = next.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
                if ws.is_empty() { "  ".to_string() } else { ws }
            })
            .unwrap_or_else(|| "  ".to_string());

        let declared = ctx.source[open..]
            .split('}')
            .next()
            .map(|body| {
                body.split(|c: char| c == ';' || c == ',' || c == '\n')
                    .any(|member| {
                        let m = member.trim();
                        m.starts_with(&format!("{}:", property)) || m.starts_with(&format!("{}?:", property))
                    })
            })
            .unwrap_or(false);
        if declared {
            return Err(EngineError::strategy(ID, format!("'{}' is already a member of '{}'", property, owner)));
        }

        let text = format!("\n{}{}?: unknown;", indent, property);
        Ok(Fix::new(
            diagnostic.id,
            ID,
            format!("Add optional `{}` to `{}`", property, owner),
            vec![FixEdit::insert(diagnostic.file.clone(), open, text)],
        )
        .with_confidence(self.confidence(diagnostic).into())
        .with_metadata(json!({ "property": property, "owner": owner })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::builtins::test_support::{apply, context};
    use crate::symbols::SymbolIndex;

    fn diag(message: &str) -> Diagnostic {
        Diagnostic::new("TS2339", message, "a.ts", 5, 3)
            .with_category(DiagnosticCategory::MissingProperty)
    }

    #[test]
    fn test_adds_optional_member() {
        let source = "export interface Config {\n    port: number;\n}\n";
        let d = diag("Property 'host' does not exist on type 'Config'.");
        let symbols = SymbolIndex::new();

        let fix = MissingProperty.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert_eq!(
            apply(source, &fix),
            "export interface Config {\n    host?: unknown;\n    port: number;\n}\n"
        );
    }

    #[test]
    fn test_type_literal_alias() {
        let source = "type Point = { x: number };\n";
        let d = diag("Property 'y' does not exist on type 'Point'.");
        let symbols = SymbolIndex::new();

        let fix = MissingProperty.generate_fix(&context(&d, source, &symbols)).unwrap();
        assert_eq!(apply(source, &fix), "type Point = {\n  y?: unknown; x: number };\n");
    }

    #[test]
    fn test_owner_elsewhere_fails() {
        let d = diag("Property 'host' does not exist on type 'Remote'.");
        let symbols = SymbolIndex::new();
        assert!(MissingProperty
            .generate_fix(&context(&d, "const a = 1;\n", &symbols))
            .is_err());
    }

    #[test]
    fn test_missing_in_type_message_is_not_ours() {
        let d = Diagnostic::new(
            "TS2741",
            "Property 'id' is missing in type '{}' but required in type 'User'.",
            "a.ts",
            1,
            1,
        )
        .with_category(DiagnosticCategory::MissingProperty);
        assert!(!MissingProperty.can_apply(&d));
    }
}
