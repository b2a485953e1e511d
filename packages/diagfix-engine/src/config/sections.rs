//! Per-concern configuration sections

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;

/// Trait for validatable configuration objects
pub trait Validatable {
    /// Returns `Ok(())` if valid, `Err(ConfigError)` with details if invalid.
    fn validate(&self) -> ConfigResult<()>;

    /// Get the configuration name for error messages
    fn config_name(&self) -> &'static str {
        "Config"
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Order in which a batch is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOrdering {
    /// Dependencies first (root causes before cascades)
    #[default]
    Topological,
    /// Highest-priority cluster first, topological inside each cluster
    Clustered,
}

/// Resolution loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Strategy attempts per diagnostic over the pattern and predictor passes (1..=20)
    ///
    /// The AI fallback is one further attempt outside this limit.
    pub max_attempts: u32,

    /// Wall-clock budget per diagnostic, checked between attempts (100..=600000)
    pub timeout_ms: u64,

    /// Keep validated fixes on disk; false returns them as suggestions
    pub auto_apply: bool,

    /// Consult the predictor for strategies the pattern pass did not try
    pub use_predictor: bool,

    /// Minimum predicted confidence for predictor-guided attempts (0.0..=1.0)
    pub predictor_min_confidence: f64,

    /// Ask the completion service once when every strategy failed
    pub ai_fallback: bool,

    pub ordering: BatchOrdering,
}

impl ResolverConfig {
    pub fn for_preset(preset: Preset) -> Self {
        match preset {
            Preset::Conservative => Self {
                max_attempts: 2,
                timeout_ms: 30_000,
                auto_apply: false,
                use_predictor: true,
                predictor_min_confidence: 0.6,
                ai_fallback: false,
                ordering: BatchOrdering::Topological,
            },
            Preset::Balanced => Self {
                max_attempts: 3,
                timeout_ms: 60_000,
                auto_apply: true,
                use_predictor: true,
                predictor_min_confidence: 0.4,
                ai_fallback: true,
                ordering: BatchOrdering::Topological,
            },
            Preset::Aggressive => Self {
                max_attempts: 5,
                timeout_ms: 120_000,
                auto_apply: true,
                use_predictor: true,
                predictor_min_confidence: 0.2,
                ai_fallback: true,
                ordering: BatchOrdering::Clustered,
            },
        }
    }

    /// Builder: Set max_attempts
    pub fn max_attempts(mut self, v: u32) -> Self {
        self.max_attempts = v;
        self
    }

    /// Builder: Set timeout_ms
    pub fn timeout_ms(mut self, v: u64) -> Self {
        self.timeout_ms = v;
        self
    }

    /// Builder: Set auto_apply
    pub fn auto_apply(mut self, v: bool) -> Self {
        self.auto_apply = v;
        self
    }

    /// Builder: Set ai_fallback
    pub fn ai_fallback(mut self, v: bool) -> Self {
        self.ai_fallback = v;
        self
    }

    /// Builder: Set use_predictor
    pub fn use_predictor(mut self, v: bool) -> Self {
        self.use_predictor = v;
        self
    }

    /// Builder: Set predictor_min_confidence
    pub fn predictor_min_confidence(mut self, v: f64) -> Self {
        self.predictor_min_confidence = v;
        self
    }

    /// Builder: Set ordering
    pub fn ordering(mut self, v: BatchOrdering) -> Self {
        self.ordering = v;
        self
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::for_preset(Preset::Balanced)
    }
}

impl Validatable for ResolverConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 || self.max_attempts > 20 {
            return Err(ConfigError::range_with_hint(
                "resolver.max_attempts",
                self.max_attempts,
                1,
                20,
                "At least one attempt is required",
            ));
        }

        if self.timeout_ms < 100 || self.timeout_ms > 600_000 {
            return Err(ConfigError::range_with_hint(
                "resolver.timeout_ms",
                self.timeout_ms,
                100,
                600_000,
                "Per-diagnostic budget should be between 100ms and 10 minutes",
            ));
        }

        if !(0.0..=1.0).contains(&self.predictor_min_confidence) {
            return Err(ConfigError::Validation(format!(
                "resolver.predictor_min_confidence must be between 0.0 and 1.0, got {}",
                self.predictor_min_confidence
            )));
        }

        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "ResolverConfig"
    }
}

// ============================================================================
// Concurrency
// ============================================================================

/// Batch concurrency (per-file groups)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcurrencyConfig {
    pub enabled: bool,

    /// Concurrent file groups (1..=256)
    pub max_concurrency: usize,
}

impl ConcurrencyConfig {
    pub fn for_preset(preset: Preset) -> Self {
        Self {
            enabled: preset == Preset::Aggressive,
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self::for_preset(Preset::Balanced)
    }
}

fn default_max_concurrency() -> usize {
    (num_cpus::get() * 3 / 4).max(1)
}

impl Validatable for ConcurrencyConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrency == 0 || self.max_concurrency > 256 {
            return Err(ConfigError::range_with_hint(
                "concurrency.max_concurrency",
                self.max_concurrency,
                1,
                256,
                "Use enabled: false instead of zero workers",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "ConcurrencyConfig"
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Post-fix validation pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// Built-in style check line limit (40..=400)
    pub max_line_length: usize,

    /// External linter argv; `{file}` is replaced by the file path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linter_command: Option<Vec<String>>,

    /// Linter timeout (100..=120000)
    pub linter_timeout_ms: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_line_length: 120,
            linter_command: None,
            linter_timeout_ms: 15_000,
        }
    }
}

impl Validatable for ValidationConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_line_length < 40 || self.max_line_length > 400 {
            return Err(ConfigError::range_with_hint(
                "validation.max_line_length",
                self.max_line_length,
                40,
                400,
                "Typical values are 80, 100 or 120",
            ));
        }

        if self.linter_timeout_ms < 100 || self.linter_timeout_ms > 120_000 {
            return Err(ConfigError::range_with_hint(
                "validation.linter_timeout_ms",
                self.linter_timeout_ms,
                100,
                120_000,
                "Linters slower than two minutes should be run outside the fix loop",
            ));
        }

        if let Some(cmd) = &self.linter_command {
            if cmd.is_empty() || cmd[0].trim().is_empty() {
                return Err(ConfigError::Validation(
                    "validation.linter_command must name a program".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "ValidationConfig"
    }
}

// ============================================================================
// Predictor
// ============================================================================

/// Strategy predictor persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictorConfig {
    /// JSON snapshot location; None keeps the model in memory only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// Persist after this many recorded outcomes (1..=10000)
    pub persist_every: u32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            persist_every: 10,
        }
    }
}

impl Validatable for PredictorConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.persist_every == 0 || self.persist_every > 10_000 {
            return Err(ConfigError::range_with_hint(
                "predictor.persist_every",
                self.persist_every,
                1,
                10_000,
                "Persist at least every 10000 outcomes",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "PredictorConfig"
    }
}

// ============================================================================
// AI completion
// ============================================================================

/// Chat-completion fallback client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiConfig {
    /// Chat-completions URL
    pub endpoint: String,

    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Minimum delay between two calls (0..=60000)
    pub min_delay_ms: u64,

    /// Per-call timeout (500..=300000)
    pub timeout_ms: u64,

    /// Sampling temperature (0.0..=2.0)
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "DIAGFIX_API_KEY".to_string(),
            min_delay_ms: 1_000,
            timeout_ms: 30_000,
            temperature: 0.1,
        }
    }
}

impl Validatable for AiConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "ai.endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }

        if self.min_delay_ms > 60_000 {
            return Err(ConfigError::range_with_hint(
                "ai.min_delay_ms",
                self.min_delay_ms,
                0,
                60_000,
                "Throttle delay above one minute stalls batches",
            ));
        }

        if self.timeout_ms < 500 || self.timeout_ms > 300_000 {
            return Err(ConfigError::range_with_hint(
                "ai.timeout_ms",
                self.timeout_ms,
                500,
                300_000,
                "Completion calls need between 0.5s and 5 minutes",
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(format!(
                "ai.temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }

        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "AiConfig"
    }
}

// ============================================================================
// Dependency graph
// ============================================================================

/// Diagnostic graph and clustering settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphConfig {
    /// Line window for proximity clustering (0..=500)
    pub proximity_window: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            proximity_window: 5,
        }
    }
}

impl Validatable for GraphConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.proximity_window > 500 {
            return Err(ConfigError::range_with_hint(
                "graph.proximity_window",
                self.proximity_window,
                0,
                500,
                "Large windows merge unrelated diagnostics",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "GraphConfig"
    }
}
