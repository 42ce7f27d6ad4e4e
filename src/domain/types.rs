//! # Domain Types
//!
//! Common data structures and enums used across the application logic.

use crate::domain::action::Action;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How sure the model says it is about the proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    #[default]
    Clear,
    Ambiguous,
}

/// One decoded model reply. Built once per gateway call and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub response_text: String,
    pub action: Option<Action>,
    pub raw_confidence: Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    SystemAction,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::SystemAction => "System",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Local::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system_action(content: impl Into<String>) -> Self {
        Self::new(Role::SystemAction, content)
    }
}

/// Why an executed action did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFailure {
    /// The process exceeded its time budget and was killed.
    TimedOut { after: Duration },
    /// The process ran and exited unsuccessfully. `None` when killed by a signal.
    ExitStatus(Option<i32>),
    NotFound(String),
    Io(String),
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionFailure::TimedOut { after } => {
                write!(f, "timed out after {:.1}s", after.as_secs_f64())
            }
            ExecutionFailure::ExitStatus(Some(code)) => write!(f, "exited with status {code}"),
            ExecutionFailure::ExitStatus(None) => write!(f, "terminated by signal"),
            ExecutionFailure::NotFound(path) => write!(f, "not found: {path}"),
            ExecutionFailure::Io(msg) => write!(f, "i/o error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Succeeded,
    Failed(ExecutionFailure),
    /// Dry-run: nothing was performed, `stdout` holds the echoed would-be action.
    Simulated,
}

/// Outcome of running one action against the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub action: Action,
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    /// `None` for simulated results, which neither succeeded nor failed.
    pub fn succeeded(&self) -> Option<bool> {
        match self.status {
            ExecutionStatus::Succeeded => Some(true),
            ExecutionStatus::Failed(_) => Some(false),
            ExecutionStatus::Simulated => None,
        }
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        match &self.status {
            ExecutionStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.status == ExecutionStatus::Simulated
    }
}
