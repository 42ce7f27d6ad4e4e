//! # Messages
//!
//! Constant strings and format functions for user-facing messages,
//! plus the text recorded in history for executed and declined actions.

use crate::domain::action::Action;
use crate::domain::types::{ExecutionResult, ExecutionStatus};

pub const DEFAULT_GREETING: &str = "Hello! What can I help you with today?";

pub const FALLBACK_CLARIFY: &str =
    "I'm not sure what you want me to do. Could you rephrase that, or tell me exactly which file, folder or program you mean?";

pub const SESSION_ENDED: &str = "Goodbye!";

pub const CANCEL_HINT: &str =
    "Approved actions run automatically after a short delay. Type `cancel` while one is pending to stop it.";

pub fn retrying(reason: &str, attempt: u32, cap: u32) -> String {
    format!("Model reply not usable ({reason}), asking again [{attempt}/{cap}]")
}

pub fn giving_up(attempts: u32) -> String {
    format!("No usable reply after {attempts} attempt(s), asking you to clarify instead")
}

pub fn action_refused(reason: &str) -> String {
    format!(
        "the proposed action was refused: {reason}. Propose a safer alternative or ask the user to clarify"
    )
}

pub fn confirm_prompt(action: &Action) -> String {
    format!("About to {}. Proceed? (yes/no)", action.describe())
}

pub fn pending_discarded(action: &Action) -> String {
    format!("Dropped the pending action ({}).", action.describe())
}

pub fn declined_record(action: &Action) -> String {
    format!("[declined] {}", action.describe())
}

/// History text for an executed action. Output beyond `max_chars` is cut.
pub fn action_record(result: &ExecutionResult, max_chars: usize) -> String {
    let outcome = match &result.status {
        ExecutionStatus::Succeeded => "succeeded".to_string(),
        ExecutionStatus::Failed(failure) => format!("failed: {failure}"),
        ExecutionStatus::Simulated => "simulated (dry run)".to_string(),
    };

    let mut record = format!("[{}] {} {}", result.action.kind(), result.action.describe(), outcome);
    if !result.stdout.trim().is_empty() {
        record.push_str("\nOutput:\n");
        record.push_str(&truncate(result.stdout.trim_end(), max_chars));
    }
    if !result.stderr.trim().is_empty() {
        record.push_str("\nErrors:\n");
        record.push_str(&truncate(result.stderr.trim_end(), max_chars));
    }
    record
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!(
            "{}\n... ({} more characters)",
            &text[..cut],
            text[cut..].chars().count()
        ),
        None => text.to_string(),
    }
}
