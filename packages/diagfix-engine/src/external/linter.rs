//! Style linter port and a command-line adapter

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::run_command;
use crate::error::{EngineError, Result};

lazy_static! {
    // path:line[:col]: message
    static ref UNIX_STYLE: Regex = Regex::new(r"^(.+?):(\d+)(?::\d+)?:?\s+(.*)$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleViolation {
    pub file: PathBuf,
    /// None when the linter did not report a position
    pub line: Option<u32>,
    pub rule: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintReport {
    pub passed: bool,
    pub violations: Vec<StyleViolation>,
}

#[async_trait]
pub trait StyleLinter: Send + Sync {
    fn name(&self) -> &str;

    async fn lint(&self, file: &Path) -> Result<LintReport>;
}

/// Runs `command... <file>`; exit status 0 passes
pub struct CommandLinter {
    command: Vec<String>,
    cwd: PathBuf,
    timeout: Duration,
}

impl CommandLinter {
    pub fn new(command: Vec<String>, cwd: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        if command.is_empty() {
            return Err(EngineError::external("linter", "empty linter command"));
        }
        Ok(Self {
            command,
            cwd: cwd.into(),
            timeout,
        })
    }
}

#[async_trait]
impl StyleLinter for CommandLinter {
    fn name(&self) -> &str {
        &self.command[0]
    }

    async fn lint(&self, file: &Path) -> Result<LintReport> {
        let mut args: Vec<String> = self.command[1..].to_vec();
        args.push(file.display().to_string());
        let output = run_command("linter", &self.command[0], &args, &self.cwd, self.timeout).await?;

        if output.status.success() {
            return Ok(LintReport {
                passed: true,
                violations: Vec::new(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let text = if stdout.trim().is_empty() { stderr } else { stdout };
        Ok(LintReport {
            passed: false,
            violations: parse_violations(file, &text),
        })
    }
}

fn parse_violations(file: &Path, output: &str) -> Vec<StyleViolation> {
    let mut violations: Vec<StyleViolation> = output
        .lines()
        .filter_map(|line| UNIX_STYLE.captures(line.trim()))
        .map(|caps| StyleViolation {
            file: file.to_path_buf(),
            line: caps[2].parse().ok(),
            rule: "linter".to_string(),
            message: caps[3].to_string(),
        })
        .collect();

    if violations.is_empty() {
        violations.push(StyleViolation {
            file: file.to_path_buf(),
            line: None,
            rule: "linter".to_string(),
            message: output.lines().next().unwrap_or("linter failed").trim().to_string(),
        });
    }
    violations
}
