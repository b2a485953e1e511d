//! Engine context
//!
//! Built once per process and passed to the resolver and runner. Holds the
//! configuration, every collaborator and the shared learning state.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use diagfix_storage::{FixStore, InMemoryFixStore};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::external::{
    CommandLinter, CompletionService, HttpCompletionClient, StyleLinter, TscTypeChecker, TypeChecker,
};
use crate::metrics::MetricsService;
use crate::patterns::PatternTracker;
use crate::predictor::StrategyPredictor;
use crate::strategy::StrategyRegistry;
use crate::symbols::SymbolIndex;
use crate::transform::CodeTransformer;
use crate::validate::Validator;

pub struct EngineContext {
    pub config: EngineConfig,
    pub registry: StrategyRegistry,
    pub store: Arc<dyn FixStore>,
    pub patterns: PatternTracker,
    pub validator: Validator,
    pub transformer: CodeTransformer,
    pub completion: Option<Arc<dyn CompletionService>>,
    predictor: Mutex<StrategyPredictor>,
    metrics: Mutex<MetricsService>,
    symbols: RwLock<SymbolIndex>,
    last_ai_call: tokio::sync::Mutex<Option<Instant>>,
}

impl EngineContext {
    pub fn builder(config: EngineConfig) -> EngineContextBuilder {
        EngineContextBuilder::new(config)
    }

    pub fn root(&self) -> &Path {
        self.transformer.root()
    }

    pub fn checker(&self) -> &Arc<dyn TypeChecker> {
        self.validator.checker()
    }

    pub fn predictor(&self) -> MutexGuard<'_, StrategyPredictor> {
        self.predictor.lock()
    }

    pub fn metrics(&self) -> MutexGuard<'_, MetricsService> {
        self.metrics.lock()
    }

    pub fn symbols(&self) -> RwLockReadGuard<'_, SymbolIndex> {
        self.symbols.read()
    }

    pub fn symbols_mut(&self) -> RwLockWriteGuard<'_, SymbolIndex> {
        self.symbols.write()
    }

    /// Wait until the minimum delay since the previous completion call has passed
    pub async fn throttle_ai(&self) {
        let min_delay = Duration::from_millis(self.config.ai.min_delay_ms);
        let mut last = self.last_ai_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_delay {
                let wait = min_delay - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "throttling completion call");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Persist the predictor snapshot, if it has a location
    pub fn flush(&self) -> Result<()> {
        self.predictor.lock().persist()
    }
}

/// Builder for `EngineContext`
///
/// Unset collaborators fall back to: in-memory store, `tsc` checker, the
/// configured command linter, the HTTP completion client when AI fallback is
/// enabled, a symbol index scanned from the project root, and a predictor
/// loaded from the configured model path.
pub struct EngineContextBuilder {
    config: EngineConfig,
    registry: Option<StrategyRegistry>,
    store: Option<Arc<dyn FixStore>>,
    checker: Option<Arc<dyn TypeChecker>>,
    linter: Option<Option<Arc<dyn StyleLinter>>>,
    completion: Option<Option<Arc<dyn CompletionService>>>,
    symbols: Option<SymbolIndex>,
    predictor: Option<StrategyPredictor>,
    metrics: Option<MetricsService>,
}

impl EngineContextBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
            store: None,
            checker: None,
            linter: None,
            completion: None,
            symbols: None,
            predictor: None,
            metrics: None,
        }
    }

    pub fn registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn FixStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn checker(mut self, checker: Arc<dyn TypeChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn linter(mut self, linter: Option<Arc<dyn StyleLinter>>) -> Self {
        self.linter = Some(linter);
        self
    }

    pub fn completion(mut self, completion: Option<Arc<dyn CompletionService>>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn symbols(mut self, symbols: SymbolIndex) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn predictor(mut self, predictor: StrategyPredictor) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn metrics(mut self, metrics: MetricsService) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<EngineContext> {
        let config = self.config.build()?;
        let transformer = CodeTransformer::new(&config.project_root)?;
        let root = transformer.root().to_path_buf();

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryFixStore::new()) as Arc<dyn FixStore>);
        let checker = self
            .checker
            .unwrap_or_else(|| Arc::new(TscTypeChecker::new(&root)) as Arc<dyn TypeChecker>);

        let linter = match self.linter {
            Some(linter) => linter,
            None => match &config.validation.linter_command {
                Some(command) => Some(Arc::new(CommandLinter::new(
                    command.clone(),
                    &root,
                    Duration::from_millis(config.validation.linter_timeout_ms),
                )?) as Arc<dyn StyleLinter>),
                None => None,
            },
        };

        let completion = match self.completion {
            Some(completion) => completion,
            None if config.resolver.ai_fallback => {
                Some(Arc::new(HttpCompletionClient::new(&config.ai)?) as Arc<dyn CompletionService>)
            }
            None => None,
        };

        let predictor = match self.predictor {
            Some(predictor) => predictor,
            None => match &config.predictor.model_path {
                Some(path) => StrategyPredictor::load_or_new(root.join(path), config.predictor.persist_every)?,
                None => StrategyPredictor::new(config.predictor.persist_every),
            },
        };

        let symbols = self.symbols.unwrap_or_else(|| SymbolIndex::scan(&root));
        let validator = Validator::new(&root, checker, linter, config.validation.max_line_length);

        info!(
            root = %root.display(),
            preset = config.preset.as_str(),
            symbols = symbols.len(),
            ai = completion.is_some(),
            "engine context ready"
        );

        Ok(EngineContext {
            registry: self.registry.unwrap_or_else(StrategyRegistry::builtin),
            patterns: PatternTracker::new(Arc::clone(&store)),
            store,
            validator,
            transformer,
            completion,
            predictor: Mutex::new(predictor),
            metrics: Mutex::new(self.metrics.unwrap_or_default()),
            symbols: RwLock::new(symbols),
            last_ai_call: tokio::sync::Mutex::new(None),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use tempfile::TempDir;

    #[test]
    fn test_builder_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export interface Widget {}\n").unwrap();
        let config = EngineConfig::preset(Preset::Conservative).project_root(dir.path());

        let ctx = EngineContext::builder(config).build().unwrap();
        assert!(ctx.completion.is_none());
        assert_eq!(ctx.registry.len(), 7);
        assert_eq!(ctx.symbols().exporters("Widget").len(), 1);
        assert_eq!(ctx.root(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::preset(Preset::Balanced)
            .project_root(dir.path())
            .resolver(|r| r.max_attempts(0));
        assert!(EngineContext::builder(config).build().is_err());
    }

    #[tokio::test]
    async fn test_ai_throttle_waits() {
        let dir = TempDir::new().unwrap();
        let mut config = EngineConfig::preset(Preset::Conservative).project_root(dir.path());
        config.ai.min_delay_ms = 50;
        let ctx = EngineContext::builder(config)
            .symbols(SymbolIndex::new())
            .build()
            .unwrap();

        let start = Instant::now();
        ctx.throttle_ai().await;
        ctx.throttle_ai().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
