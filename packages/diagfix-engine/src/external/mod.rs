//! Adapters for collaborators outside the engine
//!
//! - `TypeChecker`: produces diagnostics for files (`TscTypeChecker`)
//! - `CompletionService`: AI-assisted suggestions (`HttpCompletionClient`)
//! - `StyleLinter`: optional style gate (`CommandLinter`)

mod checker;
mod completion;
mod linter;

pub use checker::{parse_tsc_output, TscTypeChecker, TypeChecker};
pub use completion::{
    CompletionRequest, CompletionService, CompletionSuggestion, HttpCompletionClient,
    AI_STRATEGY_ID,
};
pub use linter::{CommandLinter, LintReport, StyleLinter, StyleViolation};

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

use crate::error::{EngineError, Result};

/// Run a program to completion with a deadline; the child is killed on timeout
pub(crate) async fn run_command(
    service: &str,
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<Output> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| EngineError::external(service, format!("failed to spawn '{}': {}", program, e)))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(EngineError::external(service, e)),
        Err(_) => Err(EngineError::Timeout(format!(
            "{} did not finish within {}ms",
            service,
            timeout.as_millis()
        ))),
    }
}
