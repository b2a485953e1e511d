//! Built-in style heuristics
//!
//! Used when no linter is configured or the linter is unavailable.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::external::StyleViolation;
use crate::transform::AppliedChange;

lazy_static! {
    static ref DEBUG_STATEMENTS: Vec<Regex> = [
        r"\bconsole\.(log|debug|trace)\s*\(",
        r"\bdebugger\b",
        r"^\s*print\s*\(",
        r"\bbreakpoint\s*\(\s*\)",
        r"\bdbg!\s*\(",
        r"\bfmt\.Print(ln|f)?\s*\(",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect();
}

/// Where the style verdict came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleSource {
    Linter,
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleReport {
    pub passed: bool,
    pub source: StyleSource,
    pub violations: Vec<StyleViolation>,
}

impl StyleReport {
    pub fn from_violations(source: StyleSource, violations: Vec<StyleViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            source,
            violations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Indent {
    Tabs,
    Spaces,
}

fn dominant_indent(content: &str) -> Option<Indent> {
    let (mut tabs, mut spaces) = (0usize, 0usize);
    for line in content.lines() {
        if line.starts_with('\t') {
            tabs += 1;
        } else if line.starts_with("  ") {
            spaces += 1;
        }
    }
    match (tabs, spaces) {
        (0, 0) => None,
        (t, s) if t > s => Some(Indent::Tabs),
        _ => Some(Indent::Spaces),
    }
}

/// Heuristic violations on the lines a change touched
///
/// `inserted` is the edit text; debug statements are only looked for there so
/// pre-existing ones on a touched line do not count.
pub fn builtin_check(change: &AppliedChange, inserted: &str, max_line_length: usize) -> Vec<StyleViolation> {
    let mut violations = Vec::new();
    let dominant = dominant_indent(&change.original);
    let lines: Vec<&str> = change.updated.lines().collect();

    for &line_no in &change.touched_lines {
        let Some(text) = lines.get(line_no as usize - 1) else {
            continue;
        };
        let mut violation = |rule: &str, message: String| {
            violations.push(StyleViolation {
                file: change.file.clone(),
                line: Some(line_no),
                rule: rule.to_string(),
                message,
            });
        };

        let leading: &str = &text[..text.len() - text.trim_start().len()];
        let has_tab = leading.contains('\t');
        let has_space = leading.contains(' ');
        if has_tab && has_space {
            violation("indentation", "mixed tabs and spaces".to_string());
        } else if (dominant == Some(Indent::Tabs) && leading.starts_with("  "))
            || (dominant == Some(Indent::Spaces) && has_tab)
        {
            violation("indentation", "indentation differs from the rest of the file".to_string());
        }

        let width = text.chars().count();
        if width > max_line_length {
            violation(
                "line_length",
                format!("line is {} characters (max {})", width, max_line_length),
            );
        }
    }

    for line in inserted.lines() {
        if DEBUG_STATEMENTS.iter().any(|re| re.is_match(line)) {
            violations.push(StyleViolation {
                file: change.file.clone(),
                line: None,
                rule: "debug_statement".to_string(),
                message: format!("debug statement left in fix: {}", line.trim()),
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn change(original: &str, updated: &str, touched: Vec<u32>) -> AppliedChange {
        AppliedChange {
            file: PathBuf::from("a.ts"),
            absolute: PathBuf::from("/p/a.ts"),
            original: original.to_string(),
            updated: updated.to_string(),
            shifts: vec![],
            touched_lines: touched,
        }
    }

    #[test]
    fn test_clean_change_passes() {
        let c = change(
            "function f() {\n  return x;\n}\n",
            "function f() {\n  return Number(x);\n}\n",
            vec![2],
        );
        assert!(builtin_check(&c, "Number(x)", 120).is_empty());
    }

    #[test]
    fn test_indentation_mismatch() {
        let c = change(
            "function f() {\n  a();\n  b();\n}\n",
            "function f() {\n  a();\n\tc();\n  b();\n}\n",
            vec![3],
        );
        let v = builtin_check(&c, "\tc();\n", 120);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].rule, "indentation");
        assert_eq!(v[0].line, Some(3));
    }

    #[test]
    fn test_line_length_and_debug() {
        let long = format!("const x = {};", "1 + ".repeat(40));
        let c = change("\n", &format!("{}\n", long), vec![1]);
        let v = builtin_check(&c, "console.log(x);", 80);
        let rules: Vec<&str> = v.iter().map(|v| v.rule.as_str()).collect();
        assert_eq!(rules, vec!["line_length", "debug_statement"]);
    }
}
