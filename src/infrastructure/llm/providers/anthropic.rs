//! Anthropic (Claude) messages API provider

use serde::{Deserialize, Serialize};

use super::{ProviderConfig, error_from_response, http_client};
use crate::infrastructure::llm::{Context, Error, MessageRole, Response, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicResponseContent>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Builds the request body. System messages move to the top-level `system` field.
fn build_request(model: String, context: Context) -> AnthropicRequest {
    let mut system: Option<String> = None;
    let mut messages = Vec::new();

    for msg in context.messages {
        match msg.role {
            MessageRole::System => {
                system = Some(match system {
                    Some(existing) => format!("{}\n\n{}", existing, msg.content),
                    None => msg.content,
                });
            }
            MessageRole::User | MessageRole::Assistant => messages.push(AnthropicMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content,
            }),
        }
    }

    AnthropicRequest {
        model,
        max_tokens: context.max_tokens.unwrap_or(1024),
        messages,
        system,
        temperature: context.temperature,
    }
}

/// Execute a chat request using Anthropic's API
pub async fn chat(config: ProviderConfig, context: Context) -> Result<Response, Error> {
    let base_url = config
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let model = if config.default_model.is_empty() {
        "claude-3-haiku-20240307".to_string()
    } else {
        config.default_model.clone()
    };

    let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));
    let request = build_request(model, context);

    let mut request_builder = http_client()
        .post(&url)
        .header("x-api-key", &config.api_key)
        .header("anthropic-version", API_VERSION)
        .header("Content-Type", "application/json")
        .json(&request);

    if let Some(timeout_secs) = config.timeout {
        request_builder = request_builder.timeout(std::time::Duration::from_secs(timeout_secs));
    }

    let response = request_builder
        .send()
        .await
        .map_err(|e| Error::new("anthropic", format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(error_from_response("anthropic", response).await);
    }

    let anthropic_response: AnthropicResponse = response
        .json()
        .await
        .map_err(|e| Error::new("anthropic", format!("Failed to parse response: {}", e)))?;

    let content: String = anthropic_response
        .content
        .into_iter()
        .filter(|block| block.content_type == "text")
        .map(|block| block.text)
        .collect();

    Ok(Response {
        content,
        model: anthropic_response.model,
        usage: TokenUsage {
            prompt_tokens: anthropic_response.usage.input_tokens,
            completion_tokens: anthropic_response.usage.output_tokens,
            total_tokens: anthropic_response.usage.input_tokens
                + anthropic_response.usage.output_tokens,
        },
    })
}
