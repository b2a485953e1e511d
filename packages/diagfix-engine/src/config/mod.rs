//! Engine configuration
//!
//! Presets provide the defaults; a versioned YAML file (schema v1) overrides
//! individual fields section by section:
//!
//! ```yaml
//! version: 1
//! preset: balanced
//! project_root: .
//! resolver:
//!   max_attempts: 4
//!   auto_apply: false
//! graph:
//!   proximity_window: 8
//! ```
//!
//! Omitted fields inside a section keep the preset's value.

mod error;
mod preset;
mod sections;

pub use error::{ConfigError, ConfigResult};
pub use preset::Preset;
pub use sections::{
    AiConfig, BatchOrdering, ConcurrencyConfig, GraphConfig, PredictorConfig, ResolverConfig,
    Validatable, ValidationConfig,
};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// Supported YAML schema versions
const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub preset: Preset,
    /// Every edit must stay below this directory
    pub project_root: PathBuf,
    pub resolver: ResolverConfig,
    pub concurrency: ConcurrencyConfig,
    pub validation: ValidationConfig,
    pub predictor: PredictorConfig,
    pub ai: AiConfig,
    pub graph: GraphConfig,
}

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigExportV1 {
    /// Schema version (always 1 for v1)
    #[serde(default)]
    version: Option<u32>,

    /// Base preset
    #[serde(default)]
    preset: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    project_root: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolver: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    concurrency: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    validation: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    predictor: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    ai: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    graph: Option<Value>,
}

impl EngineConfig {
    /// Start from a preset
    pub fn preset(preset: Preset) -> Self {
        Self {
            preset,
            project_root: PathBuf::from("."),
            resolver: ResolverConfig::for_preset(preset),
            concurrency: ConcurrencyConfig::for_preset(preset),
            validation: ValidationConfig::default(),
            predictor: PredictorConfig::default(),
            ai: AiConfig::default(),
            graph: GraphConfig::default(),
        }
    }

    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// Configure the resolver section (closure-based)
    pub fn resolver<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ResolverConfig) -> ResolverConfig,
    {
        self.resolver = f(self.resolver);
        self
    }

    /// Configure the concurrency section (closure-based)
    pub fn concurrency<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ConcurrencyConfig) -> ConcurrencyConfig,
    {
        self.concurrency = f(self.concurrency);
        self
    }

    /// Configure the validation section (closure-based)
    pub fn validation<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ValidationConfig) -> ValidationConfig,
    {
        self.validation = f(self.validation);
        self
    }

    /// Configure the predictor section (closure-based)
    pub fn predictor<F>(mut self, f: F) -> Self
    where
        F: FnOnce(PredictorConfig) -> PredictorConfig,
    {
        self.predictor = f(self.predictor);
        self
    }

    /// Validate every section and cross-section rules
    pub fn build(self) -> ConfigResult<Self> {
        self.resolver.validate()?;
        self.concurrency.validate()?;
        self.validation.validate()?;
        self.predictor.validate()?;
        self.graph.validate()?;
        if self.resolver.ai_fallback {
            self.ai.validate()?;
        }

        if self.resolver.ai_fallback && self.ai.timeout_ms > self.resolver.timeout_ms {
            return Err(ConfigError::conflict(
                format!(
                    "ai.timeout_ms ({}) exceeds resolver.timeout_ms ({})",
                    self.ai.timeout_ms, self.resolver.timeout_ms
                ),
                "raise resolver.timeout_ms or lower ai.timeout_ms",
            ));
        }

        if self.project_root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "project_root must not be empty".to_string(),
            ));
        }

        Ok(self)
    }

    /// Load and validate a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate YAML text
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let export: ConfigExportV1 = serde_yaml::from_str(content)?;

        let version = export.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let preset = match export.preset.as_deref() {
            Some(name) => {
                Preset::from_str(name).map_err(|_| ConfigError::UnknownPreset(name.to_string()))?
            }
            None => Preset::default(),
        };

        let base = Self::preset(preset);
        let config = Self {
            preset,
            project_root: export.project_root.unwrap_or(base.project_root),
            resolver: overlay(base.resolver, export.resolver)?,
            concurrency: overlay(base.concurrency, export.concurrency)?,
            validation: overlay(base.validation, export.validation)?,
            predictor: overlay(base.predictor, export.predictor)?,
            ai: overlay(base.ai, export.ai)?,
            graph: overlay(base.graph, export.graph)?,
        };

        config.build()
    }

    /// Export as YAML (schema v1); `from_yaml_str(to_yaml())` is lossless
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let export = ConfigExportV1 {
            version: Some(1),
            preset: Some(self.preset.to_string()),
            project_root: Some(self.project_root.clone()),
            resolver: Some(serde_yaml::to_value(&self.resolver)?),
            concurrency: Some(serde_yaml::to_value(&self.concurrency)?),
            validation: Some(serde_yaml::to_value(&self.validation)?),
            predictor: Some(serde_yaml::to_value(&self.predictor)?),
            ai: Some(serde_yaml::to_value(&self.ai)?),
            graph: Some(serde_yaml::to_value(&self.graph)?),
        };

        serde_yaml::to_string(&export).map_err(ConfigError::Yaml)
    }

    /// One-line summary for logs
    pub fn describe(&self) -> String {
        format!(
            "preset={} attempts={} auto_apply={} predictor={} ai={} ordering={:?} concurrency={}",
            self.preset,
            self.resolver.max_attempts,
            self.resolver.auto_apply,
            self.resolver.use_predictor,
            self.resolver.ai_fallback,
            self.resolver.ordering,
            if self.concurrency.enabled {
                self.concurrency.max_concurrency
            } else {
                1
            }
        )
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::preset(Preset::default())
    }
}

/// Apply a partial YAML mapping on top of a fully populated section
fn overlay<T>(base: T, patch: Option<Value>) -> ConfigResult<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let Some(patch) = patch else {
        return Ok(base);
    };
    let mut merged = serde_yaml::to_value(&base)?;
    merge_values(&mut merged, patch);
    Ok(serde_yaml::from_value(merged)?)
}

fn merge_values(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Mapping(base_map), Value::Mapping(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
