//! Per-agent LLM configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Default output token cap
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 3000;

/// Sampling and prompt configuration shared by every vendor
///
/// # Example
///
/// ```
/// use genllm_core::LLMConfig;
///
/// let config = LLMConfig::default()
///     .with_temperature(0.2)
///     .with_system_instruction("Answer tersely.");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Sampling temperature, 0.0 to 2.0
    pub temperature: f32,
    /// Maximum output tokens per model call
    pub max_output_tokens: u32,
    /// Optional system instruction prepended to every conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            system_instruction: None,
        }
    }
}

impl LLMConfig {
    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the output token cap
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Set the system instruction
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Configuration(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(Error::Configuration(
                "max_output_tokens must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LLMConfig::default();
        assert!((config.temperature - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.max_output_tokens, 3000);
        assert!(config.system_instruction.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(LLMConfig::default().with_temperature(2.5).validate().is_err());
        assert!(LLMConfig::default().with_temperature(-0.1).validate().is_err());
        assert!(LLMConfig::default().with_max_output_tokens(0).validate().is_err());
    }
}
