//! Mind configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Tunable timers and limits for one mind. All times are in simulated
/// seconds (the tick counter).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MindConfig {
    /// Run the perception pass every this many ticks.
    pub perception_frequency: u64,
    /// Phase offset of the perception pass within the frequency window.
    pub perception_frequency_offset: u64,
    /// Ticks a perceived fact survives in short-term memory without renewal.
    pub perception_memory_time: i64,
    /// How long to wait for an answer before re-asking a question.
    pub question_patience_timer: u64,
    /// A conversation with no performatives for this long is considered over.
    pub conversation_timeout: u64,
    /// Answers given per `perf.moreresults` page.
    pub max_answers_per_query: usize,
    /// How many recent performatives mention-lookups consider.
    pub mention_memory_size: usize,
    /// Depth bound on a single resolution process.
    pub max_resolution_depth: usize,
}

impl Default for MindConfig {
    fn default() -> Self {
        Self {
            perception_frequency: 10,
            perception_frequency_offset: 0,
            perception_memory_time: 120,
            question_patience_timer: 1200,
            conversation_timeout: 3600,
            max_answers_per_query: 3,
            mention_memory_size: 10,
            max_resolution_depth: 32,
        }
    }
}

impl MindConfig {
    /// Load from a TOML document; missing keys fall back to defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(src)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = MindConfig::default();
        assert_eq!(c.question_patience_timer, 1200);
        assert_eq!(c.conversation_timeout, 3600);
        assert_eq!(c.max_answers_per_query, 3);
        assert_eq!(c.perception_memory_time, 120);
    }

    #[test]
    fn test_partial_toml() {
        let c = MindConfig::from_toml_str("question_patience_timer = 60\n").unwrap();
        assert_eq!(c.question_patience_timer, 60);
        assert_eq!(c.max_answers_per_query, 3);
    }

    #[test]
    fn test_bad_toml() {
        assert!(MindConfig::from_toml_str("question_patience_timer = \"soon\"").is_err());
    }
}
