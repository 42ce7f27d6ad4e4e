//! # Tools Module
//!
//! Host process and filesystem calls used by the execution mode, and the
//! host description used when building prompts.

pub mod executor;
pub mod system_info;
