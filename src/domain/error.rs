//! # Error Types
//!
//! Failures that cross layer boundaries. Execution failures are not here:
//! they are data carried inside an `ExecutionResult`, never control flow.

use thiserror::Error;

/// Failure of the model transport. The only error a retry-with-hint cannot fix.
#[derive(Debug, Clone, Error)]
#[error("[{provider}] {message}")]
pub struct GatewayError {
    pub provider: String,
    pub message: String,
}

impl GatewayError {
    pub fn new(provider: &str, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Why a model reply could not be turned into a usable `ParsedReply`.
#[derive(Debug, Error)]
pub enum InterpretError {
    /// The reply does not have the required `{response, action?}` shape.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// The action kind is valid but the intent is not specific enough to act on.
    #[error("ambiguous action: {0}")]
    AmbiguousAction(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Turn-level failures surfaced to the caller of the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The model could not be reached. History is untouched; the turn may be retried.
    #[error("model gateway failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("session has ended")]
    SessionEnded,
}

/// Configuration problems detected while building the runtime components.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid deny pattern `{label}`: {source}")]
    InvalidPattern {
        label: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown agent `{0}`")]
    UnknownAgent(String),

    #[error("unknown provider `{0}`")]
    UnknownProvider(String),

    #[error("no API key for agent `{agent}`: set `api_key` or the `{env}` environment variable")]
    MissingApiKey { agent: String, env: String },
}
