//! Type-checker port and the `tsc` adapter

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use diagfix_storage::{Diagnostic, Severity};

use super::run_command;
use crate::classify::classify_diagnostic;
use crate::error::{EngineError, Result};
use crate::symbols::relative_to_root;

lazy_static! {
    static ref TSC_LINE: Regex =
        Regex::new(r"^(.+)\((\d+),(\d+)\): (error|warning) (TS\d+): (.*)$").unwrap();
}

/// Produces diagnostics for source files
#[async_trait]
pub trait TypeChecker: Send + Sync {
    fn name(&self) -> &str;

    /// Diagnostics for `files` (root-relative); an empty slice checks the project
    ///
    /// Returned diagnostics carry root-relative paths and a category.
    async fn check(&self, files: &[PathBuf]) -> Result<Vec<Diagnostic>>;
}

/// Runs `tsc --noEmit --pretty false`
pub struct TscTypeChecker {
    root: PathBuf,
    program: String,
    timeout: Duration,
}

impl TscTypeChecker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            program: "tsc".to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Use another executable (e.g. `node_modules/.bin/tsc`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn arguments(&self, files: &[PathBuf]) -> (Vec<String>, bool) {
        let mut args = vec![
            "--noEmit".to_string(),
            "--pretty".to_string(),
            "false".to_string(),
        ];
        // With a tsconfig the project is checked whole and filtered afterwards
        let project_mode = files.is_empty() || self.root.join("tsconfig.json").exists();
        if project_mode {
            args.push("-p".to_string());
            args.push(self.root.display().to_string());
        } else {
            args.extend(files.iter().map(|f| f.display().to_string()));
        }
        (args, project_mode)
    }
}

#[async_trait]
impl TypeChecker for TscTypeChecker {
    fn name(&self) -> &str {
        "tsc"
    }

    async fn check(&self, files: &[PathBuf]) -> Result<Vec<Diagnostic>> {
        let (args, project_mode) = self.arguments(files);
        let output = run_command("tsc", &self.program, &args, &self.root, self.timeout).await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut diagnostics = parse_tsc_output(&self.root, &stdout);

        // Exit codes 1 and 2 mean "diagnostics reported"
        let code = output.status.code();
        if diagnostics.is_empty() && !matches!(code, Some(0) | Some(1) | Some(2)) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::external(
                "tsc",
                format!("exit status {:?}: {}", code, stderr.trim()),
            ));
        }

        if project_mode && !files.is_empty() {
            let wanted: HashSet<PathBuf> = files
                .iter()
                .map(|f| relative_to_root(&self.root, f))
                .collect();
            diagnostics.retain(|d| wanted.contains(&d.file));
        }

        debug!(files = files.len(), diagnostics = diagnostics.len(), "tsc finished");
        Ok(diagnostics)
    }
}

/// Parse `file(line,col): error TSxxxx: message` lines
///
/// Continuation lines (indented elaborations) are ignored.
pub fn parse_tsc_output(root: &Path, output: &str) -> Vec<Diagnostic> {
    output
        .lines()
        .filter_map(|line| TSC_LINE.captures(line.trim_end()))
        .filter_map(|caps| {
            let file = relative_to_root(root, Path::new(caps.get(1)?.as_str().trim()));
            let line: u32 = caps.get(2)?.as_str().parse().ok()?;
            let column: u32 = caps.get(3)?.as_str().parse().ok()?;
            let severity = if &caps[4] == "warning" {
                Severity::Warning
            } else {
                Severity::Error
            };
            let mut diagnostic = Diagnostic::new(&caps[5], &caps[6], file, line, column)
                .with_severity(severity);
            classify_diagnostic(&mut diagnostic);
            Some(diagnostic)
        })
        .collect()
}
