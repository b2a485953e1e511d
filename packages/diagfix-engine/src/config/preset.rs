//! Preset configurations
//!
//! Presets provide complete default configurations for common use cases.

use serde::{Deserialize, Serialize};

/// Configuration preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Review first: suggestions only, no AI, few attempts
    ///
    /// - Resolver: max_attempts=2, auto_apply=false, predictor threshold 0.6
    /// - Concurrency: off
    Conservative,

    /// Day-to-day use
    ///
    /// - Resolver: max_attempts=3, auto_apply=true, AI fallback on
    /// - Concurrency: off
    #[default]
    Balanced,

    /// Large cleanups
    ///
    /// - Resolver: max_attempts=5, clustered ordering, predictor threshold 0.2
    /// - Concurrency: on
    Aggressive,
}

impl Preset {
    /// Parse preset from string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            _ => Err(format!(
                "Unknown preset '{}'. Valid presets: conservative, balanced, aggressive",
                s
            )),
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_parsing() {
        assert_eq!(Preset::from_str("conservative").unwrap(), Preset::Conservative);
        assert_eq!(Preset::from_str("BALANCED").unwrap(), Preset::Balanced);
        assert_eq!(Preset::from_str("aggressive").unwrap(), Preset::Aggressive);
        assert!(Preset::from_str("reckless").is_err());
    }

    #[test]
    fn test_preset_display() {
        assert_eq!(Preset::Conservative.to_string(), "conservative");
        assert_eq!(Preset::Aggressive.to_string(), "aggressive");
    }

    #[test]
    fn test_default_preset() {
        assert_eq!(Preset::default(), Preset::Balanced);
    }
}
