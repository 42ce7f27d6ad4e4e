//! # Infrastructure Layer
//!
//! Handles interactions with external systems: model providers, the host
//! shell and filesystem, and the session log.
//! Implements the traits defined in the Domain layer (e.g., `ModelGateway`).

pub mod llm;
pub mod logging;
pub mod tools;
