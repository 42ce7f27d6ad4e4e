//! Gemini generateContent provider

use serde::{Deserialize, Serialize};

use super::{ProviderConfig, error_from_response, http_client};
use crate::infrastructure::llm::{Context, Error, MessageRole, Response, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

fn text_content(role: Option<&str>, text: String) -> GeminiContent {
    GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart { text }],
    }
}

fn build_request(context: Context) -> GeminiRequest {
    let mut system = Vec::new();
    let mut contents = Vec::new();

    for msg in context.messages {
        match msg.role {
            MessageRole::System => system.push(msg.content),
            MessageRole::User => contents.push(text_content(Some("user"), msg.content)),
            MessageRole::Assistant => contents.push(text_content(Some("model"), msg.content)),
        }
    }

    let generation_config = if context.temperature.is_some() || context.max_tokens.is_some() {
        Some(GenerationConfig {
            temperature: context.temperature,
            max_output_tokens: context.max_tokens,
        })
    } else {
        None
    };

    GeminiRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| text_content(None, system.join("\n\n"))),
        generation_config,
    }
}

/// Execute a chat request using Gemini's API
pub async fn chat(config: ProviderConfig, context: Context) -> Result<Response, Error> {
    let base_url = config
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let model = if config.default_model.is_empty() {
        "gemini-2.0-flash-001".to_string()
    } else {
        config.default_model.clone()
    };

    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model
    );
    let request = build_request(context);

    let mut request_builder = http_client()
        .post(&url)
        .header("x-goog-api-key", &config.api_key)
        .header("Content-Type", "application/json")
        .json(&request);

    if let Some(timeout_secs) = config.timeout {
        request_builder = request_builder.timeout(std::time::Duration::from_secs(timeout_secs));
    }

    let response = request_builder
        .send()
        .await
        .map_err(|e| Error::new("gemini", format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(error_from_response("gemini", response).await);
    }

    let gemini_response: GeminiResponse = response
        .json()
        .await
        .map_err(|e| Error::new("gemini", format!("Failed to parse response: {}", e)))?;

    let content = gemini_response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::new("gemini", "No candidates in response"))?
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .map(|part| part.text)
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    let usage = gemini_response
        .usage_metadata
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        })
        .unwrap_or_default();

    Ok(Response {
        content,
        model,
        usage,
    })
}
