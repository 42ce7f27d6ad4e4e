//! # Interface Layer
//!
//! Entry points for the user: command-line flags, scene files and the
//! interactive console session.

pub mod cli;
pub mod console;
pub mod scene;
