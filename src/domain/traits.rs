//! # Domain Traits
//!
//! Abstract interfaces for external collaborators.
//! Allows for pluggable implementations in the Infrastructure layer.

use crate::domain::error::GatewayError;
use async_trait::async_trait;

/// Abstract interface for a language model: one prompt in, one text out.
///
/// Provider selection, HTTP and network-level timeouts live behind this trait.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError>;
}
