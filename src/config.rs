//! Deployment configuration for the finalizer.
//!
//! A deployment supplies the system prompt and the LLM settings. It can be
//! loaded from a JSON or YAML file, overlaid with environment variables, or
//! built in code.
//!
//! Both a flat document and the `{ "name": ..., "config": { ... } }` wrapper
//! (optionally inside a list, first entry wins) are accepted:
//!
//! ```json
//! [{
//!   "name": "task_finalizer_deployment",
//!   "config": {
//!     "system_prompt": "You are a helpful assistant.",
//!     "llm_config": { "model": "gpt-4o-mini", "temperature": 0.0, "max_tokens": 2000 }
//!   }
//! }]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Default model for finalization.
pub const DEFAULT_MODEL: &str = crate::llm::DEFAULT_MODEL;

/// Default output cap. Reports are long, so this is generous.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

/// Whether the schema constraint is sent to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredOutput {
    /// Attach a `json_schema` response format.
    #[default]
    JsonSchema,
    /// Rely on the prompt alone, for backends that reject `response_format`.
    PromptOnly,
}

/// Model settings passed through to the inference backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which backend model to target.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature; 0.0 is deterministic.
    #[serde(default)]
    pub temperature: f64,
    /// Output length cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// A resolved finalizer deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Deployment name, informational only.
    #[serde(default)]
    pub name: String,
    /// System prompt override; the built-in prompt is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub llm_config: LlmConfig,
    #[serde(default)]
    pub structured_output: StructuredOutput,
}

/// Accepted on-disk layouts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeploymentDocument {
    List(Vec<WrappedDeployment>),
    Wrapped(WrappedDeployment),
    Flat(DeploymentConfig),
}

#[derive(Debug, Deserialize)]
struct WrappedDeployment {
    #[serde(default)]
    name: Option<String>,
    config: DeploymentConfig,
}

impl WrappedDeployment {
    fn into_config(self) -> DeploymentConfig {
        let mut config = self.config;
        if config.name.is_empty() {
            config.name = self.name.unwrap_or_default();
        }
        config
    }
}

impl DeploymentDocument {
    fn into_config(self) -> Result<DeploymentConfig, ConfigError> {
        match self {
            DeploymentDocument::List(entries) => entries
                .into_iter()
                .next()
                .map(WrappedDeployment::into_config)
                .ok_or_else(|| {
                    ConfigError::ValidationFailed("deployment list is empty".to_string())
                }),
            DeploymentDocument::Wrapped(wrapped) => Ok(wrapped.into_config()),
            DeploymentDocument::Flat(config) => Ok(config),
        }
    }
}

impl DeploymentConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON deployment document.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let document: DeploymentDocument = serde_json::from_str(content)?;
        document.into_config()
    }

    /// Parses a YAML deployment document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let document: DeploymentDocument = serde_yaml::from_str(content)?;
        document.into_config()
    }

    /// Loads a deployment file, choosing the parser from its extension.
    ///
    /// # Errors
    ///
    /// `ConfigError::UnsupportedFormat` for extensions other than `.json`,
    /// `.yaml` and `.yml`; parse and validation errors otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let content = std::fs::read_to_string(path)?;
        let config = match extension.as_str() {
            "json" => Self::from_json_str(&content)?,
            "yaml" | "yml" => Self::from_yaml_str(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        config.validate()?;
        tracing::debug!(path = %path.display(), name = %config.name, "Loaded deployment config");
        Ok(config)
    }

    /// Creates configuration from defaults plus environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FINALIZER_MODEL`: Model identifier
    /// - `FINALIZER_TEMPERATURE`: Sampling temperature (0.0 - 2.0)
    /// - `FINALIZER_MAX_TOKENS`: Output token cap
    /// - `FINALIZER_SYSTEM_PROMPT`: System prompt override
    /// - `FINALIZER_STRUCTURED_OUTPUT`: `json_schema` or `prompt_only`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Overlays `FINALIZER_*` environment variables onto this configuration.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(val) = lookup("FINALIZER_MODEL") {
            self.llm_config.model = val;
        }

        if let Some(val) = lookup("FINALIZER_TEMPERATURE") {
            self.llm_config.temperature = parse_env_value(&val, "FINALIZER_TEMPERATURE")?;
        }

        if let Some(val) = lookup("FINALIZER_MAX_TOKENS") {
            self.llm_config.max_tokens = parse_env_value(&val, "FINALIZER_MAX_TOKENS")?;
        }

        if let Some(val) = lookup("FINALIZER_SYSTEM_PROMPT") {
            self.system_prompt = Some(val);
        }

        if let Some(val) = lookup("FINALIZER_STRUCTURED_OUTPUT") {
            self.structured_output = match val.to_lowercase().as_str() {
                "json_schema" | "schema" => StructuredOutput::JsonSchema,
                "prompt_only" | "prompt" | "none" => StructuredOutput::PromptOnly,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "FINALIZER_STRUCTURED_OUTPUT".to_string(),
                        message: format!("expected json_schema or prompt_only, got '{}'", other),
                    })
                }
            };
        }

        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm_config.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "llm_config.model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm_config.temperature) {
            return Err(ConfigError::ValidationFailed(
                "llm_config.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.llm_config.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "llm_config.max_tokens must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.llm_config.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.llm_config.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.llm_config.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_structured_output(mut self, mode: StructuredOutput) -> Self {
        self.structured_output = mode;
        self
    }
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DeploymentConfig::default();
        assert_eq!(config.llm_config.model, DEFAULT_MODEL);
        assert!(config.llm_config.temperature.abs() < f64::EPSILON);
        assert_eq!(config.llm_config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.system_prompt, None);
        assert_eq!(config.structured_output, StructuredOutput::JsonSchema);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_flat_json() {
        let config = DeploymentConfig::from_json_str(
            r#"{"system_prompt": "Be brief.", "llm_config": {"model": "gpt-4o-mini", "temperature": 0.3}}"#,
        )
        .expect("should parse");

        assert_eq!(config.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(config.llm_config.model, "gpt-4o-mini");
        assert!((config.llm_config.temperature - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.llm_config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_parse_wrapped_list_json() {
        let config = DeploymentConfig::from_json_str(
            r#"[{
                "name": "task_finalizer_deployment",
                "module": {"name": "task_finalizer"},
                "config": {
                    "system_prompt": "You are a helpful assistant.",
                    "llm_config": {"config_name": "model_1", "model": "gpt-4o-mini", "temperature": 0.0, "max_tokens": 2000}
                }
            }]"#,
        )
        .expect("should parse");

        assert_eq!(config.name, "task_finalizer_deployment");
        assert_eq!(config.llm_config.max_tokens, 2000);
    }

    #[test]
    fn test_parse_empty_list_fails() {
        assert!(matches!(
            DeploymentConfig::from_json_str("[]"),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = "name: finalizer\nstructured_output: prompt_only\nllm_config:\n  model: local/llama\n  max_tokens: 512\n";
        let config = DeploymentConfig::from_yaml_str(yaml).expect("should parse");
        assert_eq!(config.name, "finalizer");
        assert_eq!(config.structured_output, StructuredOutput::PromptOnly);
        assert_eq!(config.llm_config.model, "local/llama");
        assert_eq!(config.llm_config.max_tokens, 512);
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");

        let json_path = dir.path().join("deployment.json");
        std::fs::write(&json_path, r#"{"llm_config": {"model": "json-model"}}"#).expect("write");
        assert_eq!(
            DeploymentConfig::from_file(&json_path)
                .expect("json")
                .llm_config
                .model,
            "json-model"
        );

        let yaml_path = dir.path().join("deployment.yml");
        let mut file = std::fs::File::create(&yaml_path).expect("create");
        writeln!(file, "llm_config:\n  model: yaml-model").expect("write");
        assert_eq!(
            DeploymentConfig::from_file(&yaml_path)
                .expect("yaml")
                .llm_config
                .model,
            "yaml-model"
        );

        let toml_path = dir.path().join("deployment.toml");
        std::fs::write(&toml_path, "model = 'x'").expect("write");
        assert!(matches!(
            DeploymentConfig::from_file(&toml_path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_from_file_validates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("deployment.json");
        std::fs::write(&path, r#"{"llm_config": {"temperature": 3.5}}"#).expect("write");

        assert!(matches!(
            DeploymentConfig::from_file(&path),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = DeploymentConfig::default()
            .with_overrides(lookup_from(&[
                ("FINALIZER_MODEL", "openai/gpt-4o"),
                ("FINALIZER_TEMPERATURE", "0.2"),
                ("FINALIZER_MAX_TOKENS", " 1500 "),
                ("FINALIZER_SYSTEM_PROMPT", "Custom"),
                ("FINALIZER_STRUCTURED_OUTPUT", "prompt_only"),
            ]))
            .expect("overrides apply");

        assert_eq!(config.llm_config.model, "openai/gpt-4o");
        assert!((config.llm_config.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.llm_config.max_tokens, 1500);
        assert_eq!(config.system_prompt.as_deref(), Some("Custom"));
        assert_eq!(config.structured_output, StructuredOutput::PromptOnly);
    }

    #[test]
    fn test_env_override_invalid_value() {
        let result = DeploymentConfig::default()
            .with_overrides(lookup_from(&[("FINALIZER_MAX_TOKENS", "lots")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key, .. }) if key == "FINALIZER_MAX_TOKENS"
        ));

        let result = DeploymentConfig::default()
            .with_overrides(lookup_from(&[("FINALIZER_STRUCTURED_OUTPUT", "xml")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validate() {
        assert!(DeploymentConfig::new().with_model("").validate().is_err());
        assert!(DeploymentConfig::new().with_temperature(-0.1).validate().is_err());
        assert!(DeploymentConfig::new().with_max_tokens(0).validate().is_err());
        assert!(DeploymentConfig::new()
            .with_temperature(2.0)
            .with_system_prompt("x")
            .with_structured_output(StructuredOutput::PromptOnly)
            .validate()
            .is_ok());
    }
}
