//! Feature extraction for the strategy predictor

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Component;

use diagfix_storage::Diagnostic;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap();
    static ref STOPWORDS: HashSet<&'static str> = [
        "the", "and", "for", "not", "but", "its", "has", "have", "was", "are", "with", "this",
        "that", "from", "type", "types", "can", "cannot", "does", "value", "const", "let", "var",
        "return", "function",
    ]
    .into_iter()
    .collect();
}

/// Features of one diagnostic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub code: String,
    pub category: String,
    pub severity: String,
    /// Term → occurrence weight. Context terms are prefixed `ctx:`, structural
    /// ones `path:`, `ext:` and `deps:`.
    pub terms: BTreeMap<String, f64>,
    pub dependency_count: usize,
}

fn push_words(terms: &mut BTreeMap<String, f64>, text: &str, prefix: &str) {
    for word in WORD.find_iter(text) {
        let lower = word.as_str().to_ascii_lowercase();
        if lower.len() < 3 || STOPWORDS.contains(lower.as_str()) {
            continue;
        }
        *terms.entry(format!("{}{}", prefix, lower)).or_default() += 1.0;
    }
}

fn dependency_bucket(count: usize) -> &'static str {
    match count {
        0 => "deps:0",
        1 => "deps:1",
        2..=4 => "deps:few",
        _ => "deps:many",
    }
}

/// Extract features; `context` is the source around the diagnostic, if known
pub fn extract(diagnostic: &Diagnostic, context: Option<&str>, dependency_count: usize) -> FeatureVector {
    let mut terms = BTreeMap::new();
    push_words(&mut terms, &diagnostic.message, "");
    if let Some(context) = context {
        push_words(&mut terms, context, "ctx:");
    }

    for component in diagnostic.file.components() {
        if let Component::Normal(part) = component {
            let part = part.to_string_lossy();
            if part.contains('.') {
                continue;
            }
            *terms.entry(format!("path:{}", part.to_ascii_lowercase())).or_default() += 1.0;
        }
    }
    if let Some(ext) = diagnostic.file.extension() {
        terms.insert(format!("ext:{}", ext.to_string_lossy().to_ascii_lowercase()), 1.0);
    }
    terms.insert(dependency_bucket(dependency_count).to_string(), 1.0);

    FeatureVector {
        code: diagnostic.code.clone(),
        category: diagnostic.category.as_str().to_string(),
        severity: diagnostic.severity.as_str().to_string(),
        terms,
        dependency_count,
    }
}

/// Cosine similarity of two sparse vectors, in [0, 1] for non-negative weights
pub fn cosine(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(k, v)| large.get(k).map(|w| v * w))
        .sum();
    let norm_a: f64 = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}
