//! Shared doubles for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use diagfix_engine::classify::classify_diagnostic;
use diagfix_engine::config::{EngineConfig, Preset};
use diagfix_engine::external::{CompletionRequest, CompletionService, CompletionSuggestion, TypeChecker};
use diagfix_engine::symbols::relative_to_root;
use diagfix_engine::{EngineContext, Result};
use diagfix_storage::{Diagnostic, InMemoryFixStore};

pub const MISMATCH_CODE: &str = "TYPE_MISMATCH_STR_NUM";
pub const MISMATCH_MESSAGE: &str = "Type 'string' is not assignable to type 'number'.";

/// One diagnostic produced by a rule
#[derive(Debug, Clone)]
pub struct Finding {
    pub line: u32,
    pub column: u32,
    pub code: &'static str,
    pub message: String,
}

impl Finding {
    pub fn new(line: u32, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            line,
            column: 7,
            code,
            message: message.into(),
        }
    }
}

type Rule = Box<dyn Fn(&str) -> Vec<Finding> + Send + Sync>;

/// Type-checker that derives diagnostics from file content
///
/// Honors the `files` argument; an empty slice checks every `.ts` file
/// directly under the root.
pub struct ScriptedChecker {
    root: PathBuf,
    rule: Rule,
    calls: AtomicUsize,
}

impl ScriptedChecker {
    pub fn new(root: &Path, rule: impl Fn(&str) -> Vec<Finding> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            root: fs::canonicalize(root).unwrap(),
            rule: Box::new(rule),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn project_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map_or(false, |ext| ext == "ts"))
            .map(|p| relative_to_root(&self.root, &p))
            .collect();
        files.sort();
        files
    }
}

#[async_trait]
impl TypeChecker for ScriptedChecker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn check(&self, files: &[PathBuf]) -> Result<Vec<Diagnostic>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let files = if files.is_empty() {
            self.project_files()
        } else {
            files.iter().map(|f| relative_to_root(&self.root, f)).collect()
        };

        let mut out = Vec::new();
        for file in files {
            let Ok(content) = fs::read_to_string(self.root.join(&file)) else {
                continue;
            };
            for finding in (self.rule)(&content) {
                let mut d = Diagnostic::new(finding.code, finding.message, file.clone(), finding.line, finding.column);
                classify_diagnostic(&mut d);
                out.push(d);
            }
        }
        Ok(out)
    }
}

/// String-to-number mismatch on every line holding one of `needles`, unless
/// the line already converts with `Number(`
pub fn mismatches(content: &str, needles: &[&str]) -> Vec<Finding> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| needles.iter().any(|n| line.contains(n)) && !line.contains("Number("))
        .map(|(i, _)| Finding::new(i as u32 + 1, MISMATCH_CODE, MISMATCH_MESSAGE))
        .collect()
}

/// Completion double returning one canned line
pub struct ScriptedCompletion {
    pub replacement: String,
    pub calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(replacement: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            replacement: replacement.into(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted_completion"
    }

    async fn suggest(&self, _request: &CompletionRequest) -> Result<CompletionSuggestion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionSuggestion {
            explanation: "use the builder".to_string(),
            replacement: self.replacement.clone(),
            confidence: 0.8,
            alternatives: Vec::new(),
        })
    }
}

pub fn write(root: &Path, file: &str, content: &str) {
    fs::write(root.join(file), content).unwrap();
}

pub fn read(root: &Path, file: &str) -> String {
    fs::read_to_string(root.join(file)).unwrap()
}

/// Balanced preset without AI, wired to the given doubles
pub fn engine(root: &Path, checker: Arc<ScriptedChecker>, store: Arc<InMemoryFixStore>) -> Arc<EngineContext> {
    let config = EngineConfig::preset(Preset::Balanced)
        .project_root(root)
        .resolver(|r| r.ai_fallback(false));
    Arc::new(
        EngineContext::builder(config)
            .checker(checker)
            .store(store)
            .completion(None)
            .build()
            .unwrap(),
    )
}
