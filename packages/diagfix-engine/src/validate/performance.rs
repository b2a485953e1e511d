//! Performance heuristic over inserted text
//!
//! Score: +1 per loop, +2 when loops nest, +1 per chained iteration, +2 for
//! recursion, +4 per synchronous heavy call. Impact: 0 none, 1 low, 2-3
//! medium, 4+ high.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref LOOP: Regex =
        Regex::new(r"^\s*(for\b|while\b|loop\s*\{|do\s*\{)|\.forEach\s*\(").unwrap();
    static ref ITERATION_CALL: Regex =
        Regex::new(r"\.(map|filter|reduce|flatMap|forEach|some|every|find|iter|into_iter)\s*\(").unwrap();
    static ref FUNCTION_NAME: Regex =
        Regex::new(r"\b(?:function\s*\*?|def|fn|func)\s+([A-Za-z_$][\w$]*)").unwrap();
    static ref SYNC_HEAVY: Regex = Regex::new(
        r"\b\w+Sync\s*\(|JSON\.parse\s*\(\s*JSON\.stringify|\btime\.sleep\s*\(|\bthread::sleep\s*\(|\bAtomics\.wait\s*\(|\bstd::fs::read(_to_string)?\s*\("
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceImpact {
    None,
    Low,
    Medium,
    High,
}

impl PerformanceImpact {
    pub fn from_score(score: u32) -> Self {
        match score {
            0 => PerformanceImpact::None,
            1 => PerformanceImpact::Low,
            2 | 3 => PerformanceImpact::Medium,
            _ => PerformanceImpact::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceImpact::None => "none",
            PerformanceImpact::Low => "low",
            PerformanceImpact::Medium => "medium",
            PerformanceImpact::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub impact: PerformanceImpact,
    pub score: u32,
    pub findings: Vec<String>,
}

impl Default for PerformanceReport {
    fn default() -> Self {
        Self {
            impact: PerformanceImpact::None,
            score: 0,
            findings: Vec::new(),
        }
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

pub fn analyze(text: &str) -> PerformanceReport {
    let mut score = 0u32;
    let mut findings = Vec::new();

    // Indentation of enclosing loop headers
    let mut open_loops: Vec<usize> = Vec::new();
    let mut nested = false;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indent = indent_of(line);
        let closes_block = line.trim_start().starts_with('}');
        while open_loops
            .last()
            .map(|&top| indent < top || (indent == top && (closes_block || !LOOP.is_match(line))))
            .unwrap_or(false)
        {
            open_loops.pop();
        }

        if LOOP.is_match(line) {
            score += 1;
            findings.push(format!("loop: {}", line.trim()));
            if open_loops.last().map(|&top| indent > top).unwrap_or(false) {
                nested = true;
            }
            open_loops.push(indent);
        }

        let chain = ITERATION_CALL.find_iter(line).count();
        if chain >= 2 {
            score += 1;
            findings.push(format!("chained iteration ({} calls)", chain));
        }

        if SYNC_HEAVY.is_match(line) {
            score += 4;
            findings.push(format!("synchronous heavy call: {}", line.trim()));
        }
    }

    if nested {
        score += 2;
        findings.push("nested loops".to_string());
    }

    for caps in FUNCTION_NAME.captures_iter(text) {
        let name = &caps[1];
        let Ok(call) = Regex::new(&format!(r"\b{}\s*\(", regex::escape(name))) else {
            continue;
        };
        // The declaration itself is one match
        if call.find_iter(text).count() > 1 {
            score += 2;
            findings.push(format!("recursion: {}", name));
        }
    }

    PerformanceReport {
        impact: PerformanceImpact::from_score(score),
        score,
        findings,
    }
}
