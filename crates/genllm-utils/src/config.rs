//! Environment-driven settings
//!
//! Every value has a default. A variable that is set but malformed is an
//! error rather than silently replaced by the default.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use genllm_core::LLMConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable names
pub mod keys {
    /// `openai`, `anthropic` or `gemini`
    pub const PROVIDER: &str = "GENLLM_PROVIDER";
    /// Model identifier
    pub const MODEL: &str = "GENLLM_MODEL";
    /// Tool round limit
    pub const MAX_FUNCTION_LOOPS: &str = "GENLLM_MAX_FUNCTION_LOOPS";
    /// Per-call tool timeout in seconds
    pub const TOOL_TIMEOUT_SECS: &str = "GENLLM_TOOL_TIMEOUT_SECS";
    /// Sampling temperature
    pub const TEMPERATURE: &str = "GENLLM_TEMPERATURE";
    /// Output token cap
    pub const MAX_TOKENS: &str = "GENLLM_MAX_TOKENS";
    /// System instruction
    pub const SYSTEM_PROMPT: &str = "GENLLM_SYSTEM_PROMPT";
}

/// Errors raised while reading settings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// A variable is set to a value that does not parse
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Vendor API flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI chat completions and compatible servers
    #[default]
    OpenAI,
    /// Anthropic messages API
    Anthropic,
    /// Google Gemini generateContent API
    Gemini,
}

impl Provider {
    /// Model used when none is configured
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Anthropic => "claude-sonnet-4-5-20250929",
            Self::Gemini => "gemini-2.5-flash",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        })
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown provider '{other}', expected openai, anthropic or gemini")),
        }
    }
}

/// Agent settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Vendor to talk to
    pub provider: Provider,
    /// Model identifier
    pub model: String,
    /// Tool round limit
    pub max_function_loops: usize,
    /// Per-call tool timeout
    pub tool_timeout: Duration,
    /// Sampling temperature
    pub temperature: f32,
    /// Output token cap
    pub max_output_tokens: u32,
    /// Optional system instruction
    pub system_prompt: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let llm = LLMConfig::default();
        Self {
            provider: Provider::default(),
            model: Provider::default().default_model().to_string(),
            max_function_loops: 5,
            tool_timeout: Duration::from_secs(180),
            temperature: llm.temperature,
            max_output_tokens: llm.max_output_tokens,
            system_prompt: None,
        }
    }
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let provider: Provider = parse(&lookup, keys::PROVIDER)?.unwrap_or(defaults.provider);
        let model = lookup(keys::MODEL)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());
        let tool_timeout = parse::<u64, _>(&lookup, keys::TOOL_TIMEOUT_SECS)?
            .map_or(defaults.tool_timeout, Duration::from_secs);

        Ok(Self {
            provider,
            model,
            max_function_loops: parse(&lookup, keys::MAX_FUNCTION_LOOPS)?.unwrap_or(defaults.max_function_loops),
            tool_timeout,
            temperature: parse(&lookup, keys::TEMPERATURE)?.unwrap_or(defaults.temperature),
            max_output_tokens: parse(&lookup, keys::MAX_TOKENS)?.unwrap_or(defaults.max_output_tokens),
            system_prompt: lookup(keys::SYSTEM_PROMPT).filter(|s| !s.trim().is_empty()),
        })
    }

    /// LLM configuration carried by these settings
    pub fn llm_config(&self) -> LLMConfig {
        let config = LLMConfig::default()
            .with_temperature(self.temperature)
            .with_max_output_tokens(self.max_output_tokens);
        match &self.system_prompt {
            Some(prompt) => config.with_system_instruction(prompt.clone()),
            None => config,
        }
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, SettingsError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| SettingsError::InvalidValue {
            key,
            value,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.model, "gpt-4o-mini");
        assert_eq!(settings.max_function_loops, 5);
        assert_eq!(settings.tool_timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            (keys::PROVIDER, "Anthropic"),
            (keys::MAX_FUNCTION_LOOPS, "2"),
            (keys::TOOL_TIMEOUT_SECS, " 30 "),
            (keys::TEMPERATURE, "0.2"),
            (keys::SYSTEM_PROMPT, "Be brief"),
        ]))
        .unwrap();
        assert_eq!(settings.provider, Provider::Anthropic);
        assert_eq!(settings.model, "claude-sonnet-4-5-20250929");
        assert_eq!(settings.max_function_loops, 2);
        assert_eq!(settings.tool_timeout, Duration::from_secs(30));

        let config = settings.llm_config();
        assert_eq!(config.system_instruction.as_deref(), Some("Be brief"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let err = Settings::from_lookup(lookup(&[(keys::MAX_FUNCTION_LOOPS, "five")])).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue { key: keys::MAX_FUNCTION_LOOPS, .. }
        ));

        let err = Settings::from_lookup(lookup(&[(keys::PROVIDER, "palm")])).unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn test_gemini_provider() {
        let settings = Settings::from_lookup(lookup(&[(keys::PROVIDER, "gemini")])).unwrap();
        assert_eq!(settings.provider, Provider::Gemini);
        assert_eq!(settings.model, "gemini-2.5-flash");
        assert_eq!(Provider::Gemini.to_string(), "gemini");
    }
}
