//! # Application Layer
//!
//! The wrapper controller and the pieces it sequences each turn:
//! interpretation, safety validation, confirmation and execution, and the
//! bounded conversation history.

pub mod controller;
pub mod execution;
pub mod history;
pub mod interpretation;
pub mod safety;

#[cfg(test)]
pub(crate) mod testing;
