//! Configuration parsing and validation for modelmux.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8080")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

/// Backend call settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound for a single generation or for opening a stream.
    /// Unset means backend calls are not bounded.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// TCP connect timeout for HTTP backends.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ExecutionConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// The raw value is only reachable through [`ApiKey::expose_secret`], so every
/// place a credential leaves the process can be found with a grep.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// How a provider's API key was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Key was a literal string in config (no ${} references)
    Literal,
    /// Key contained ${VAR} references expanded from environment
    EnvExpanded,
    /// Key was auto-discovered from convention env var (holds var name)
    Convention(String),
    /// No key available
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Convention(var) => write!(f, "convention ({})", var),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// Provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Unique identifier for this provider
    pub id: String,
    /// Backend type tag, resolved through the backend registry
    #[serde(rename = "type")]
    pub provider_type: String,
    /// Optional API key
    pub api_key: Option<ApiKey>,
    /// Base URL override (e.g., "https://openrouter.ai/api/v1")
    pub base_url: Option<String>,
    /// Models served by this provider, in routing order
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

/// A model offered by a provider.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Name sent to the backend
    pub canonical_slug: String,
    /// Name clients request; falls back to `canonical_slug`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposed_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}

impl ModelConfig {
    /// The identifier clients use to request this model.
    pub fn exposed_id(&self) -> &str {
        self.exposed_slug.as_deref().unwrap_or(&self.canonical_slug)
    }
}

/// Per-model pricing in USD. A missing field means "unknown", not zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Pricing {
    #[serde(
        default,
        alias = "inputCostPerMillionTokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_cost_per_million_tokens: Option<f64>,
    #[serde(
        default,
        alias = "outputCostPerMillionTokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_cost_per_million_tokens: Option<f64>,
    #[serde(
        default,
        alias = "costPerRequest",
        skip_serializing_if = "Option::is_none"
    )]
    pub cost_per_request: Option<f64>,
}

impl Pricing {
    /// Every field that is set, in declaration order.
    pub fn defined_fields(&self) -> impl Iterator<Item = f64> {
        [
            self.input_cost_per_million_tokens,
            self.output_cost_per_million_tokens,
            self.cost_per_request,
        ]
        .into_iter()
        .flatten()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level, used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Parse configuration from a TOML string (no environment expansion).
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_ids = HashSet::new();

        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Provider with empty id".to_string(),
                ));
            }
            if !seen_ids.insert(provider.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate provider id '{}'",
                    provider.id
                )));
            }
            if provider.provider_type.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Provider '{}' has empty type",
                    provider.id
                )));
            }
            if provider.base_url.as_deref().is_some_and(|u| u.is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "Provider '{}' has empty base_url",
                    provider.id
                )));
            }

            let mut seen_slugs = HashSet::new();
            for model in &provider.models {
                if model.canonical_slug.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "Provider '{}' has a model with empty canonical_slug",
                        provider.id
                    )));
                }
                if !seen_slugs.insert(model.canonical_slug.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "Provider '{}' lists model '{}' twice",
                        provider.id, model.canonical_slug
                    )));
                }
                if let Some(pricing) = &model.pricing {
                    if pricing.defined_fields().any(|v| !v.is_finite() || v < 0.0) {
                        return Err(ConfigError::Validation(format!(
                            "Provider '{}' model '{}' has negative or non-finite pricing",
                            provider.id, model.canonical_slug
                        )));
                    }
                }
            }

            if provider.models.is_empty() {
                tracing::warn!(provider = %provider.id, "Provider has no models and will never be selected");
            }
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for provider '{provider}': {message}")]
    EnvVar {
        var: String,
        provider: String,
        message: String,
    },
}

/// Raw provider config deserialized directly from TOML.
/// `api_key` and `base_url` may contain `${VAR}` references not yet expanded.
#[derive(Deserialize)]
pub struct RawProviderConfig {
    id: String,
    #[serde(rename = "type")]
    provider_type: String,
    api_key: Option<String>,
    base_url: Option<String>,
    #[serde(default)]
    models: Vec<ModelConfig>,
}

/// Raw configuration deserialized directly from TOML.
#[derive(Deserialize)]
pub struct RawConfig {
    server: ServerConfig,
    #[serde(default)]
    execution: ExecutionConfig,
    #[serde(default)]
    providers: Vec<RawProviderConfig>,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${SCHEME}://${HOST}/v1`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(
    input: &str,
    provider_id: &str,
    lookup: F,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            provider: provider_id.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                provider: provider_id.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            provider: provider_id.to_string(),
            message: format!(
                "Environment variable '{}' is not set (referenced in provider '{}')",
                var_name, provider_id
            ),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

fn expand_env_vars(input: &str, provider_id: &str) -> Result<String, ConfigError> {
    expand_env_vars_with(input, provider_id, |name| std::env::var(name).ok())
}

/// Derive the convention-based env var name for a provider.
///
/// - "openai" -> "MODELMUX_OPENAI_API_KEY"
/// - "openrouter-free" -> "MODELMUX_OPENROUTER_FREE_API_KEY"
pub fn convention_env_var_name(provider_id: &str) -> String {
    let upper_snake = provider_id.to_uppercase().replace(['-', ' ', '.'], "_");
    format!("MODELMUX_{}_API_KEY", upper_snake)
}

fn convention_key_lookup(provider_id: &str) -> Option<(String, String)> {
    let var_name = convention_env_var_name(provider_id);
    std::env::var(&var_name).ok().map(|value| (var_name, value))
}

impl Config {
    /// Convert raw (deserialized) config to final config with env var expansion.
    ///
    /// For each provider:
    /// - `api_key` containing `${VAR}` is expanded, source = `EnvExpanded`
    /// - a literal `api_key` is wrapped directly, source = `Literal`
    /// - an absent `api_key` falls back to `MODELMUX_<ID>_API_KEY`,
    ///   source = `Convention(var_name)` or `KeySource::None`
    /// - `base_url` is expanded the same way but has no convention fallback
    pub fn from_raw(raw: RawConfig) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        let mut providers = Vec::with_capacity(raw.providers.len());
        let mut key_sources = Vec::with_capacity(raw.providers.len());

        for rp in raw.providers {
            let (api_key, source) = match rp.api_key {
                Some(ref raw_key) if raw_key.contains("${") => {
                    let expanded = expand_env_vars(raw_key, &rp.id)?;
                    (Some(ApiKey::from(expanded)), KeySource::EnvExpanded)
                }
                Some(ref raw_key) => (Some(ApiKey::from(raw_key.as_str())), KeySource::Literal),
                None => match convention_key_lookup(&rp.id) {
                    Some((var_name, value)) => {
                        (Some(ApiKey::from(value)), KeySource::Convention(var_name))
                    }
                    None => (None, KeySource::None),
                },
            };

            let base_url = rp
                .base_url
                .as_deref()
                .map(|url| expand_env_vars(url, &rp.id))
                .transpose()?;

            key_sources.push((rp.id.clone(), source));

            providers.push(ProviderConfig {
                id: rp.id,
                provider_type: rp.provider_type,
                api_key,
                base_url,
                models: rp.models,
            });
        }

        let config = Config {
            server: raw.server,
            execution: raw.execution,
            providers,
            logging: raw.logging,
        };

        Ok((config, key_sources))
    }

    /// Load configuration from a TOML file with environment variable expansion.
    ///
    /// Returns the config and per-provider key source information.
    pub fn from_file_with_env(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        let raw: RawConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;
        let (config, key_sources) = Self::from_raw(raw)?;
        config.validate()?;

        Ok((config, key_sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [server]
            listen = "127.0.0.1:9000"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert!(config.providers.is_empty());
        assert!(config.execution.request_timeout().is_none());
        assert_eq!(config.execution.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            listen = "0.0.0.0:8080"

            [execution]
            request_timeout_secs = 45

            [[providers]]
            id = "openrouter-free"
            type = "openrouter"
            base_url = "https://openrouter.ai/api/v1"

            [[providers.models]]
            canonical_slug = "meta-llama/llama-3.1-8b-instruct:free"
            exposed_slug = "llama-3.1-8b"
            display_name = "Llama 3.1 8B"
            pricing = { input_cost_per_million_tokens = 0, output_cost_per_million_tokens = 0 }

            [[providers.models]]
            canonical_slug = "gpt-4o"

            [logging]
            level = "debug"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.providers.len(), 1);
        let provider = &config.providers[0];
        assert_eq!(provider.id, "openrouter-free");
        assert_eq!(provider.provider_type, "openrouter");
        assert_eq!(provider.models.len(), 2);
        assert_eq!(provider.models[0].exposed_id(), "llama-3.1-8b");
        assert_eq!(provider.models[1].exposed_id(), "gpt-4o");
        assert_eq!(
            provider.models[0].pricing,
            Some(Pricing {
                input_cost_per_million_tokens: Some(0.0),
                output_cost_per_million_tokens: Some(0.0),
                cost_per_request: None,
            })
        );
        assert!(provider.models[1].pricing.is_none());
        assert_eq!(
            config.execution.request_timeout(),
            Some(Duration::from_secs(45))
        );
    }

    #[test]
    fn test_pricing_accepts_camel_case() {
        let toml = r#"
            [server]

            [[providers]]
            id = "p"
            type = "openai"

            [[providers.models]]
            canonical_slug = "m"
            pricing = { inputCostPerMillionTokens = 1.5, outputCostPerMillionTokens = 3, costPerRequest = 0.01 }
        "#;

        let config = Config::parse_str(toml).unwrap();
        let pricing = config.providers[0].models[0].pricing.clone().unwrap();
        assert_eq!(pricing.input_cost_per_million_tokens, Some(1.5));
        assert_eq!(pricing.output_cost_per_million_tokens, Some(3.0));
        assert_eq!(pricing.cost_per_request, Some(0.01));
    }

    #[test]
    fn test_duplicate_provider_id_rejected() {
        let toml = r#"
            [server]

            [[providers]]
            id = "dup"
            type = "openai"

            [[providers]]
            id = "dup"
            type = "groq"
        "#;

        let err = Config::parse_str(toml).unwrap_err().to_string();
        assert!(err.contains("Duplicate provider id 'dup'"), "{}", err);
    }

    #[test]
    fn test_duplicate_canonical_slug_rejected() {
        let toml = r#"
            [server]

            [[providers]]
            id = "p"
            type = "openai"
            models = [{ canonical_slug = "gpt-4o" }, { canonical_slug = "gpt-4o", exposed_slug = "other" }]
        "#;

        let err = Config::parse_str(toml).unwrap_err().to_string();
        assert!(err.contains("twice"), "{}", err);
    }

    #[test]
    fn test_shared_exposed_slug_across_providers_allowed() {
        let toml = r#"
            [server]

            [[providers]]
            id = "a"
            type = "openai"
            models = [{ canonical_slug = "gpt-4o-mini", exposed_slug = "mini" }]

            [[providers]]
            id = "b"
            type = "openrouter"
            models = [{ canonical_slug = "openai/gpt-4o-mini", exposed_slug = "mini" }]
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.providers.len(), 2);
    }

    #[test]
    fn test_negative_pricing_rejected() {
        let toml = r#"
            [server]

            [[providers]]
            id = "p"
            type = "openai"
            models = [{ canonical_slug = "m", pricing = { input_cost_per_million_tokens = -1 } }]
        "#;

        let err = Config::parse_str(toml).unwrap_err().to_string();
        assert!(err.contains("negative"), "{}", err);
    }

    #[test]
    fn test_empty_type_rejected() {
        let toml = r#"
            [server]

            [[providers]]
            id = "p"
            type = ""
        "#;

        assert!(matches!(
            Config::parse_str(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_api_key_debug_redaction() {
        let key = ApiKey::from("sk-super-secret");
        let debug_output = format!("{:?}", key);
        assert_eq!(debug_output, "[REDACTED]");
        assert!(!debug_output.contains("super-secret"));
    }

    #[test]
    fn test_api_key_display_redaction() {
        let key = ApiKey::from("sk-super-secret");
        assert_eq!(format!("{}", key), "[REDACTED]");
    }

    #[test]
    fn test_api_key_serialize_redaction() {
        let key = ApiKey::from("real-secret-value");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    #[test]
    fn test_provider_config_debug_redaction() {
        let config = ProviderConfig {
            id: "test".to_string(),
            provider_type: "openai".to_string(),
            api_key: Some(ApiKey::from("sk-ABCD1234secret")),
            base_url: None,
            models: vec![],
        };
        let debug_output = format!("{:?}", config);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk-ABCD1234secret"));
    }

    #[test]
    fn test_api_key_toml_deserialization() {
        let toml = r#"
            [server]

            [[providers]]
            id = "test-provider"
            type = "openai"
            api_key = "sk-ABCD1234secret"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(
            config.providers[0]
                .api_key
                .as_ref()
                .unwrap()
                .expose_secret(),
            "sk-ABCD1234secret"
        );
    }

    // ── Expansion tests (using expand_env_vars_with, no global env state) ──

    #[test]
    fn test_expand_single_var() {
        let lookup = |name: &str| match name {
            "MY_KEY" => Some("sk-abcd".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("${MY_KEY}", "test", lookup).unwrap();
        assert_eq!(result, "sk-abcd");
    }

    #[test]
    fn test_expand_multiple_vars() {
        let lookup = |name: &str| match name {
            "SCHEME" => Some("https".to_string()),
            "HOST" => Some("example.com".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("${SCHEME}://${HOST}/v1", "test", lookup).unwrap();
        assert_eq!(result, "https://example.com/v1");
    }

    #[test]
    fn test_expand_no_vars_passthrough() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let result = expand_env_vars_with("literal-value", "test", lookup).unwrap();
        assert_eq!(result, "literal-value");
    }

    #[test]
    fn test_expand_missing_var_fails() {
        let lookup = |_: &str| None;
        let err = expand_env_vars_with("${MISSING}", "provider-alpha", lookup)
            .unwrap_err()
            .to_string();
        assert!(err.contains("MISSING"));
        assert!(err.contains("provider-alpha"));
    }

    #[test]
    fn test_expand_unclosed_brace_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${UNCLOSED", "test", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("unclosed"));
    }

    #[test]
    fn test_expand_empty_var_name_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${}", "test", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("empty"));
    }

    #[test]
    fn test_convention_env_var_name() {
        assert_eq!(convention_env_var_name("openai"), "MODELMUX_OPENAI_API_KEY");
        assert_eq!(
            convention_env_var_name("openrouter-free"),
            "MODELMUX_OPENROUTER_FREE_API_KEY"
        );
        assert_eq!(
            convention_env_var_name("my_service"),
            "MODELMUX_MY_SERVICE_API_KEY"
        );
    }

    fn make_raw_config(provider_id: &str, api_key: Option<String>) -> RawConfig {
        RawConfig {
            server: ServerConfig {
                listen: "127.0.0.1:9000".to_string(),
            },
            execution: ExecutionConfig::default(),
            providers: vec![RawProviderConfig {
                id: provider_id.to_string(),
                provider_type: "openai".to_string(),
                api_key,
                base_url: None,
                models: vec![],
            }],
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_from_raw_literal_key() {
        let raw = make_raw_config("test-literal", Some("literal-key-value".to_string()));
        let (config, key_sources) = Config::from_raw(raw).unwrap();

        assert_eq!(key_sources[0], ("test-literal".to_string(), KeySource::Literal));
        assert_eq!(
            config.providers[0]
                .api_key
                .as_ref()
                .unwrap()
                .expose_secret(),
            "literal-key-value"
        );
    }

    #[test]
    fn test_from_raw_convention_key() {
        let provider_id = "test-conv-mux-unit";
        let var_name = convention_env_var_name(provider_id);
        unsafe { std::env::set_var(&var_name, "sk-convention") };

        let raw = make_raw_config(provider_id, None);
        let (config, key_sources) = Config::from_raw(raw).unwrap();

        assert_eq!(key_sources[0].1, KeySource::Convention(var_name.clone()));
        assert_eq!(
            config.providers[0]
                .api_key
                .as_ref()
                .unwrap()
                .expose_secret(),
            "sk-convention"
        );

        unsafe { std::env::remove_var(&var_name) };
    }

    #[test]
    fn test_from_raw_no_key() {
        let provider_id = "test-nokey-mux-unique";
        unsafe { std::env::remove_var(convention_env_var_name(provider_id)) };

        let raw = make_raw_config(provider_id, None);
        let (config, key_sources) = Config::from_raw(raw).unwrap();

        assert_eq!(key_sources[0].1, KeySource::None);
        assert!(config.providers[0].api_key.is_none());
    }

    #[test]
    fn test_from_raw_expands_base_url() {
        let var_name = "MODELMUX_TEST_BASE_HOST";
        unsafe { std::env::set_var(var_name, "llm.internal:8000") };

        let mut raw = make_raw_config("test-base-url", Some("k".to_string()));
        raw.providers[0].base_url = Some(format!("http://${{{}}}/v1", var_name));
        let (config, _) = Config::from_raw(raw).unwrap();

        assert_eq!(
            config.providers[0].base_url.as_deref(),
            Some("http://llm.internal:8000/v1")
        );

        unsafe { std::env::remove_var(var_name) };
    }
}
