use serde_json::json;
use std::path::{Component, Path};

use diagfix_storage::{Diagnostic, DiagnosticCategory, Fix, FixEdit};

use crate::classify::primary_symbol;
use crate::error::{EngineError, Result};
use crate::strategy::{Applicability, FixContext, FixStrategy};
use crate::syntax::SourceLanguage;

const ID: &str = "missing_import";

/// Import an unresolved name from the file that exports it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissingImport;

impl FixStrategy for MissingImport {
    fn id(&self) -> &'static str {
        ID
    }

    fn applicability(&self) -> Applicability {
        Applicability::new(
            &["TS2304", "TS2552", "TS2503", "MISSING_IMPORT", "UNRESOLVED_REFERENCE"],
            &[
                DiagnosticCategory::UnresolvedReference,
                DiagnosticCategory::MissingImport,
                DiagnosticCategory::MissingType,
            ],
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
        let language = SourceLanguage::from_path(&diagnostic.file);
        if !language.map(|l| l.is_typescript_family()).unwrap_or(false) {
            return Err(EngineError::strategy(ID, "imports are only generated for TypeScript sources"));
        }

        let symbol = primary_symbol(&diagnostic.message)
            .ok_or_else(|| EngineError::strategy(ID, "no symbol named in message"))?;

        let here = ctx.relative_file();
        let exporter = ctx
            .symbols
            .exporters(&symbol)
            .into_iter()
            .find(|entry| entry.file != here)
            .ok_or_else(|| EngineError::strategy(ID, format!("no file exports '{}'", symbol)))?;

        if already_imported(ctx.source, &symbol) {
            return Err(EngineError::strategy(ID, format!("'{}' is already imported", symbol)));
        }

        let specifier = import_specifier(&here, &exporter.file);
        let offset = ctx.import_block_end();
        let keyword = if exporter.is_type { "import type" } else { "import" };
        let text = format!(
            "{}{} {{ {} }} from '{}';\n",
            ctx.line_prefix_at(offset),
            keyword,
            symbol,
            specifier
        );

        Ok(Fix::new(
            diagnostic.id,
            ID,
            format!("Import `{}` from '{}'", symbol, specifier),
            vec![FixEdit::insert(diagnostic.file.clone(), offset, text)],
        )
        .with_confidence(self.confidence(diagnostic).into())
        .with_metadata(json!({
            "symbol": symbol,
            "from": exporter.file.to_string_lossy(),
        })))
    }
}

fn already_imported(source: &str, symbol: &str) -> bool {
    source.lines().any(|line| {
        let t = line.trim_start();
        t.starts_with("import")
            && t.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                .any(|word| word == symbol)
    })
}

/// Module specifier of `target` as seen from `from_file` (both root-relative)
///
/// `src/app/main.ts` → `src/models/user.ts` gives `../models/user`.
pub(crate) fn import_specifier(from_file: &Path, target: &Path) -> String {
    let from_dir: Vec<String> = from_file
        .parent()
        .map(normal_components)
        .unwrap_or_default();

    let mut target_parts = normal_components(target);
    if let Some(last) = target_parts.last_mut() {
        if let Some((stem, _ext)) = last.rsplit_once('.') {
            *last = stem.to_string();
        }
    }
    if target_parts.len() > 1 && target_parts.last().map(|s| s == "index").unwrap_or(false) {
        target_parts.pop();
    }

    let common = from_dir
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(from_dir.len() - common)
        .collect();
    parts.extend(target_parts[common..].iter().cloned());

    let joined = parts.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}

fn normal_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}
