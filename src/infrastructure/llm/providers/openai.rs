//! OpenAI-compatible API provider
//!
//! Serves OpenAI itself plus Groq and local Ollama through their `/v1` endpoints.

use serde::{Deserialize, Serialize};

use super::{ProviderConfig, error_from_response, http_client};
use crate::infrastructure::llm::{Context, Error, Provider, Response, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API request format
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

/// OpenAI API response format
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Execute a chat request using OpenAI-compatible API
pub async fn chat(
    provider: Provider,
    config: ProviderConfig,
    context: Context,
) -> Result<Response, Error> {
    let name = provider.as_str();
    let base_url = config
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let model = if config.default_model.is_empty() {
        "gpt-4o-mini".to_string()
    } else {
        config.default_model.clone()
    };

    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let request = OpenAIRequest {
        model: model.clone(),
        messages: context
            .messages
            .into_iter()
            .map(|msg| OpenAIMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content,
            })
            .collect(),
        temperature: context.temperature,
        max_tokens: context.max_tokens,
    };

    let mut request_builder = http_client()
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&request);

    if !config.api_key.is_empty() {
        request_builder = request_builder.bearer_auth(&config.api_key);
    }
    if let Some(timeout_secs) = config.timeout {
        request_builder = request_builder.timeout(std::time::Duration::from_secs(timeout_secs));
    }

    let response = request_builder
        .send()
        .await
        .map_err(|e| Error::new(name, format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(error_from_response(name, response).await);
    }

    let openai_response: OpenAIResponse = response
        .json()
        .await
        .map_err(|e| Error::new(name, format!("Failed to parse response: {}", e)))?;

    let content = openai_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::new(name, "No choices in response"))?
        .message
        .content
        .unwrap_or_default();

    let usage = openai_response
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    Ok(Response {
        content,
        model: if openai_response.model.is_empty() {
            model
        } else {
            openai_response.model
        },
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_without_usage_parses() {
        let body = r#"{"model": "llama2", "choices": [{"message": {"role": "assistant", "content": "hi"}}]}"#;
        let parsed: OpenAIResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
    }

    #[test]
    fn test_request_omits_unset_options() {
        let request = OpenAIRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![OpenAIMessage {
                role: "user".into(),
                content: "hello".into(),
            }],
            temperature: None,
            max_tokens: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
