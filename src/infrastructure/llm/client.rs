//! # LLM Client
//!
//! Provides the `Client` struct, the entry point for LLM interactions.
//! It routes requests to the appropriate provider based on the agent configuration.

use crate::domain::config::{AgentConfig, AgentsConfig, AppConfig, builtin_agents};
use crate::domain::error::{ConfigError, GatewayError};
use crate::domain::traits::ModelGateway;
use crate::infrastructure::llm::providers::{self, ProviderConfig};
use crate::infrastructure::llm::{Context, Error, Provider, Response};
use async_trait::async_trait;
use std::sync::Arc;

/// Simple LLM client over the configured agents.
pub struct Client {
    agents: AgentsConfig,
}

impl Client {
    /// Uses the agents from the config file, or the built-in set when it defines none.
    pub fn new(app_config: &AppConfig) -> Self {
        let agents = if app_config.agents.is_empty() {
            builtin_agents()
        } else {
            app_config.agents.clone()
        };
        Self { agents }
    }

    pub fn agent_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolves an agent to its provider and request settings.
    pub fn resolve(&self, agent_name: &str) -> Result<(Provider, ProviderConfig), ConfigError> {
        let agent_config: &AgentConfig = self
            .agents
            .get(agent_name)
            .ok_or_else(|| ConfigError::UnknownAgent(agent_name.to_string()))?;

        let provider = Provider::from_str(&agent_config.provider)
            .ok_or_else(|| ConfigError::UnknownProvider(agent_config.provider.clone()))?;

        let provider_config =
            ProviderConfig::from_agent_config(agent_name, provider, agent_config)?;
        Ok((provider, provider_config))
    }

    /// Send a simple prompt to an agent
    pub async fn prompt(&self, agent_name: &str, prompt: &str) -> Result<Response, Error> {
        let (provider, provider_config) = self
            .resolve(agent_name)
            .map_err(|e| Error::new(agent_name, e.to_string()))?;
        let context = request_context(prompt, &provider_config);
        providers::chat(provider, provider_config, context).await
    }

    /// Binds one agent as a [`ModelGateway`]. Fails early on an unknown agent or a missing key.
    pub fn gateway(self: &Arc<Self>, agent_name: &str) -> Result<LlmGateway, ConfigError> {
        let (provider, config) = self.resolve(agent_name)?;
        tracing::info!(
            "Using agent '{}' ({}, model {})",
            agent_name,
            provider.as_str(),
            if config.default_model.is_empty() {
                "default"
            } else {
                config.default_model.as_str()
            }
        );
        Ok(LlmGateway {
            client: Arc::clone(self),
            agent: agent_name.to_string(),
        })
    }
}

/// A single-message request carrying the agent's sampling settings.
fn request_context(prompt: &str, config: &ProviderConfig) -> Context {
    let mut context = Context::prompt(prompt);
    if let Some(temperature) = config.temperature {
        context = context.with_temperature(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        context = context.with_max_tokens(max_tokens);
    }
    context
}

/// One named agent of a [`Client`], seen as a text-in/text-out gateway.
pub struct LlmGateway {
    client: Arc<Client>,
    agent: String,
}

impl LlmGateway {
    pub fn agent(&self) -> &str {
        &self.agent
    }
}

#[async_trait]
impl ModelGateway for LlmGateway {
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let response = self.client.prompt(&self.agent, prompt).await?;
        tracing::debug!(
            "{} replied with {} chars ({} prompt / {} completion tokens)",
            response.model,
            response.content.len(),
            response.usage.prompt_tokens,
            response.usage.completion_tokens
        );
        Ok(response.content)
    }
}
