//! Diagnostic classification and pattern signatures
//!
//! A diagnostic's category comes from, in order:
//! 1. the checker code table (TypeScript `TSxxxx` codes)
//! 2. a symbolic code prefix (`TYPE_MISMATCH_STR_NUM` → `type_mismatch`)
//! 3. message regexes
//!
//! The signature identifies a diagnostic *shape*: the message with quoted
//! names and numbers blanked out, hashed together with the code.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use diagfix_storage::{Diagnostic, DiagnosticCategory};

lazy_static! {
    static ref CODE_TABLE: HashMap<&'static str, DiagnosticCategory> = {
        use DiagnosticCategory::*;
        let mut m = HashMap::new();

        // Assignability
        m.insert("TS2322", TypeMismatch);
        m.insert("TS2345", TypeMismatch);
        m.insert("TS2362", TypeMismatch);
        m.insert("TS2363", TypeMismatch);
        m.insert("TS2367", TypeMismatch);

        // Names and modules
        m.insert("TS2304", UnresolvedReference);
        m.insert("TS2552", UnresolvedReference);
        m.insert("TS2307", MissingImport);
        m.insert("TS2305", MissingImport);
        m.insert("TS2614", MissingImport);
        m.insert("TS2503", MissingType);
        m.insert("TS2694", MissingType);
        m.insert("TS2749", MissingType);
        m.insert("TS4060", UsesMissingType);
        m.insert("TS4063", UsesMissingType);
        m.insert("TS4078", UsesMissingType);

        // Members
        m.insert("TS2339", MissingProperty);
        m.insert("TS2551", MissingProperty);
        m.insert("TS2741", MissingProperty);

        // Null checks
        m.insert("TS2531", NullSafety);
        m.insert("TS2532", NullSafety);
        m.insert("TS2533", NullSafety);
        m.insert("TS2722", NullSafety);
        m.insert("TS18047", NullSafety);
        m.insert("TS18048", NullSafety);
        m.insert("TS18049", NullSafety);

        // Unused
        m.insert("TS6133", UnusedSymbol);
        m.insert("TS6192", UnusedSymbol);
        m.insert("TS6196", UnusedSymbol);

        // Implicit any
        m.insert("TS7005", ImplicitAny);
        m.insert("TS7006", ImplicitAny);
        m.insert("TS7031", ImplicitAny);
        m.insert("TS7034", ImplicitAny);

        // Syntax
        m.insert("TS1002", Syntax);
        m.insert("TS1003", Syntax);
        m.insert("TS1005", Syntax);
        m.insert("TS1109", Syntax);
        m.insert("TS1128", Syntax);

        m
    };

    static ref MESSAGE_RULES: Vec<(Regex, DiagnosticCategory)> = {
        use DiagnosticCategory::*;
        let rules: &[(&str, DiagnosticCategory)] = &[
            (r"(?i)has or is using private name", UsesMissingType),
            (r"(?i)cannot find (module|namespace)", MissingImport),
            (r"(?i)has no exported member", MissingImport),
            (r"(?i:cannot find (type|name)) '[A-Z]", MissingType),
            (r"(?i)cannot find name|is not defined|unresolved (reference|import)", UnresolvedReference),
            (r"(?i)is not assignable to|type mismatch|expected type", TypeMismatch),
            (r"(?i)property '[^']+' (does not exist|is missing)", MissingProperty),
            (r"(?i)possibly '?(null|undefined)'?|is (null|undefined)", NullSafety),
            (r"(?i)declared but (its value is )?never (read|used)|unused", UnusedSymbol),
            (r"(?i)implicitly has an? '?any'? type", ImplicitAny),
            (r"(?i)expected\.?$|unexpected token|syntax error", Syntax),
        ];
        rules
            .iter()
            .filter_map(|(pattern, category)| Regex::new(pattern).ok().map(|re| (re, *category)))
            .collect()
    };

    static ref QUOTED: Regex = Regex::new(r#"'([^']*)'|"([^"]*)""#).unwrap();
    static ref NUMBER: Regex = Regex::new(r"\b\d+(\.\d+)?\b").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Category for a code/message pair
pub fn classify(code: &str, message: &str) -> DiagnosticCategory {
    if let Some(category) = CODE_TABLE.get(code) {
        return *category;
    }

    let upper = code.to_ascii_uppercase();
    // Longest name first so USES_MISSING_TYPE never matches MISSING_TYPE
    let mut by_len: Vec<DiagnosticCategory> = DiagnosticCategory::ALL.to_vec();
    by_len.sort_by_key(|c| std::cmp::Reverse(c.as_str().len()));
    for category in by_len {
        if category == DiagnosticCategory::Other {
            continue;
        }
        if upper.starts_with(&category.as_str().to_ascii_uppercase()) {
            return category;
        }
    }

    MESSAGE_RULES
        .iter()
        .find(|(re, _)| re.is_match(message))
        .map(|(_, category)| *category)
        .unwrap_or(DiagnosticCategory::Other)
}

/// Assign `diagnostic.category` in place
pub fn classify_diagnostic(diagnostic: &mut Diagnostic) {
    diagnostic.category = classify(&diagnostic.code, &diagnostic.message);
}

/// Normalized message template and its short hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSignature {
    pub signature: String,
    pub template: String,
}

/// Blank out quoted names and numbers, lowercase, collapse whitespace
pub fn message_template(message: &str) -> String {
    let quoted = QUOTED.replace_all(message, "'<_>'");
    let numbered = NUMBER.replace_all(&quoted, "<n>");
    WHITESPACE
        .replace_all(numbered.trim(), " ")
        .to_lowercase()
}

pub fn signature_for(code: &str, message: &str) -> PatternSignature {
    let template = message_template(message);

    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.update(b"\n");
    hasher.update(template.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    PatternSignature {
        signature: hash[..16].to_string(),
        template,
    }
}

/// Names quoted in a message, in order of appearance
///
/// `Cannot find name 'Foo'.` → `["Foo"]`
pub fn quoted_names(message: &str) -> Vec<String> {
    QUOTED
        .captures_iter(message)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// First quoted name that looks like an identifier
pub fn primary_symbol(message: &str) -> Option<String> {
    quoted_names(message).into_iter().find(|name| is_identifier(name))
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use DiagnosticCategory::*;

    // ═══════════════════════════════════════════════════════════════════════
    // Classification Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_code_table_wins() {
        assert_eq!(classify("TS2322", "anything"), TypeMismatch);
        assert_eq!(classify("TS6133", "'x' is declared but its value is never read."), UnusedSymbol);
        assert_eq!(classify("TS18048", "'a' is possibly 'undefined'."), NullSafety);
    }

    #[test]
    fn test_symbolic_code_prefix() {
        assert_eq!(classify("TYPE_MISMATCH_STR_NUM", ""), TypeMismatch);
        assert_eq!(classify("USES_MISSING_TYPE", ""), UsesMissingType);
        assert_eq!(classify("missing_type_decl", ""), MissingType);
        assert_eq!(classify("MISSING_IMPORT", ""), MissingImport);
    }

    #[test]
    fn test_message_fallback() {
        assert_eq!(classify("E999", "Cannot find name 'Widget'."), MissingType);
        assert_eq!(classify("E999", "Cannot find name 'widget'."), UnresolvedReference);
        assert_eq!(
            classify("E1", "Parameter 'x' implicitly has an 'any' type."),
            ImplicitAny
        );
        assert_eq!(classify("E2", "something odd happened"), Other);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Signature Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_same_shape_same_signature() {
        let a = signature_for("TS2304", "Cannot find name 'Foo'.");
        let b = signature_for("TS2304", "Cannot find name 'Bar'.");
        assert_eq!(a, b);
        assert_eq!(a.template, "cannot find name '<_>'.");
        assert_eq!(a.signature.len(), 16);
    }

    #[test]
    fn test_code_changes_signature() {
        let a = signature_for("TS2304", "Cannot find name 'Foo'.");
        let b = signature_for("TS2552", "Cannot find name 'Foo'.");
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn test_numbers_blanked() {
        assert_eq!(
            message_template("Expected 2 arguments,   but got 3."),
            "expected <n> arguments, but got <n>."
        );
    }

    #[test]
    fn test_quoted_names() {
        assert_eq!(
            quoted_names("Type 'string' is not assignable to type \"number\"."),
            vec!["string".to_string(), "number".to_string()]
        );
        assert_eq!(primary_symbol("Cannot find name 'Foo'."), Some("Foo".to_string()));
        assert_eq!(primary_symbol("Module '\"./x\"' has no exported member"), None);
    }
}
