//! # Steward
//!
//! A wrapper controller that sits between a language model and the host:
//! the model interprets each user turn into a structured action, the
//! controller validates it against a safety policy, gates it behind
//! confirmation and runs it, keeping a bounded conversation history.
//!
//! Layers:
//! - Domain: actions, configuration, errors and the `ModelGateway` trait
//! - Application: controller state machine, interpretation, safety, execution
//! - Infrastructure: LLM providers, host executor, logging
//! - Interface: CLI, scenes, console session

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod strings;
