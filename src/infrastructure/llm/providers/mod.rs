//! # LLM Providers
//!
//! Wire implementations for each provider family:
//! - OpenAI-compatible chat completions (OpenAI, Groq, Ollama)
//! - Anthropic messages
//! - Gemini generateContent

mod anthropic;
mod gemini;
mod openai;

use crate::domain::config::AgentConfig;
use crate::domain::error::ConfigError;
use crate::infrastructure::llm::{Context, Error, Provider, Response};
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// HTTP client reused across requests
fn http_client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to a default HTTP client: {}", e);
                Client::new()
            })
    })
}

/// Configuration for a provider
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key. Empty for providers that do not need one.
    pub api_key: String,
    /// Base URL (for non-default endpoints)
    pub base_url: Option<String>,
    /// Default model
    pub default_model: String,
    /// Timeout in seconds
    pub timeout: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ProviderConfig {
    pub fn from_agent_config(
        agent: &str,
        provider: Provider,
        config: &AgentConfig,
    ) -> Result<Self, ConfigError> {
        let api_key = match (&config.api_key, &config.api_key_env) {
            (Some(key), _) if !key.is_empty() => key.clone(),
            (_, Some(env_var)) => match std::env::var(env_var) {
                Ok(key) if !key.is_empty() => key,
                _ if !provider.needs_api_key() => String::new(),
                _ => {
                    return Err(ConfigError::MissingApiKey {
                        agent: agent.to_string(),
                        env: env_var.clone(),
                    });
                }
            },
            _ if !provider.needs_api_key() => String::new(),
            _ => {
                return Err(ConfigError::MissingApiKey {
                    agent: agent.to_string(),
                    env: format!("{}_API_KEY", provider.as_str().to_uppercase()),
                });
            }
        };

        Ok(Self {
            api_key,
            base_url: config.endpoint.clone().filter(|url| !url.trim().is_empty()),
            default_model: config.model.clone(),
            timeout: config.timeout,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn with_default_base(self, url: &str) -> Self {
        Self {
            base_url: Some(self.base_url.unwrap_or_else(|| url.to_string())),
            ..self
        }
    }
}

/// Execute a chat request with the specified provider
pub async fn chat(
    provider: Provider,
    config: ProviderConfig,
    context: Context,
) -> Result<Response, Error> {
    match provider {
        Provider::OpenAI => openai::chat(provider, config, context).await,
        Provider::Groq => {
            openai::chat(provider, config.with_default_base(GROQ_BASE_URL), context).await
        }
        Provider::Ollama => {
            openai::chat(provider, config.with_default_base(OLLAMA_BASE_URL), context).await
        }
        Provider::Anthropic => anthropic::chat(config, context).await,
        Provider::Gemini => gemini::chat(config, context).await,
    }
}

/// Reads the error body of a failed request, preferring the provider's own message.
async fn error_from_response(provider: &str, response: reqwest::Response) -> Error {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    let message = serde_json::from_str::<serde_json::Value>(&error_text)
        .ok()
        .and_then(|json| {
            let error = json.get("error")?;
            match error.get("message") {
                Some(msg) => msg.as_str().map(str::to_string),
                None => error.as_str().map(str::to_string),
            }
        });

    match message {
        Some(msg) => Error::new(provider, format!("HTTP {}: {}", status, msg)),
        None => Error::new(provider, format!("HTTP {}: {}", status, error_text)),
    }
}
