/*
 * diagfix - Automated Diagnostic Resolution Engine
 *
 * Takes type-checker diagnostics, orders them by dependency, tries ranked
 * fix strategies and keeps only fixes that validate.
 *
 * Architecture:
 * - Strategy registry (closed set of built-in fixers)
 * - Diagnostic dependency graph (petgraph)
 * - Code transformer with transactions and savepoints
 * - Validator (syntax, type-check, regressions, style, security, performance)
 * - Strategy predictor learning from logged outcomes
 * - Resolver for single diagnostics and batches
 */

// Public modules
pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod external;
pub mod graph;
pub mod metrics;
pub mod patterns;
pub mod predictor;
pub mod prioritize;
pub mod resolver;
pub mod runner;
pub mod strategy;
pub mod symbols;
pub mod syntax;
pub mod telemetry;
pub mod transform;
pub mod validate;

// Re-exports
pub use config::{EngineConfig, Preset};
pub use context::{EngineContext, EngineContextBuilder};
pub use error::{EngineError, ErrorCategory, Result};
pub use external::{CompletionService, StyleLinter, TypeChecker};
pub use graph::DiagnosticGraph;
pub use metrics::{MetricsService, MetricsSnapshot, Trend};
pub use predictor::{Prediction, StrategyPredictor};
pub use prioritize::{prioritize, PrioritizationOptions, PrioritizationStrategy, PriorityBucket};
pub use resolver::{BatchPlan, BatchReport, ResolutionOutcome, ResolutionState, Resolver};
pub use runner::{BatchRunner, RunOptions, RunSummary};
pub use strategy::{BuiltinStrategy, FixStrategy, StrategyRegistry};
pub use transform::{CodeTransformer, Transaction};
pub use validate::{ValidationReport, Validator};

pub use diagfix_storage::{Diagnostic, DiagnosticCategory, DiagnosticStatus, Fix, FixEdit, FixStore};
