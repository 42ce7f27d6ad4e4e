//! # Interpretation Mode
//!
//! Builds the prompt for one user turn, calls the model gateway once and
//! decodes the reply into a [`ParsedReply`]. Retrying is the controller's job.

use crate::application::history::HistoryView;
use crate::domain::action::Action;
use crate::domain::error::{GatewayError, InterpretError};
use crate::domain::traits::ModelGateway;
use crate::domain::types::{Confidence, ParsedReply};
use crate::strings::{messages, prompts};
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct InterpretationMode {
    gateway: Arc<dyn ModelGateway>,
    working_root: String,
    system_info: String,
}

impl InterpretationMode {
    pub fn new(gateway: Arc<dyn ModelGateway>, working_root: impl Into<String>) -> Self {
        Self {
            gateway,
            working_root: working_root.into(),
            system_info: String::new(),
        }
    }

    /// Host description placed under the working directory in every prompt.
    pub fn with_system_info(mut self, system_info: impl Into<String>) -> Self {
        self.system_info = system_info.into();
        self
    }

    pub async fn interpret(
        &self,
        user_text: &str,
        history: HistoryView<'_>,
        scene: &str,
        retry_hint: Option<&str>,
    ) -> Result<ParsedReply, InterpretError> {
        let prompt = prompts::interpret_prompt(
            &self.working_root,
            &self.system_info,
            scene,
            &history.render(),
            user_text,
            retry_hint,
        );
        tracing::debug!("Interpretation prompt ({} chars):\n{}", prompt.len(), prompt);

        let raw = self.gateway.generate(&prompt).await?;
        tracing::debug!("Model reply: {}", raw);

        parse_reply(&raw)
    }

    /// In-character first line for a scene. Falls back to a fixed greeting on empty output.
    pub async fn opening_message(&self, scene: &str) -> Result<String, GatewayError> {
        let raw = self.gateway.generate(&prompts::opening_prompt(scene)).await?;
        let line = raw.trim().trim_matches('"').trim();
        if line.is_empty() {
            Ok(messages::DEFAULT_GREETING.to_string())
        } else {
            Ok(line.to_string())
        }
    }
}

/// Decodes a raw model reply.
///
/// Shape problems are `MalformedReply`; a well-formed action that is missing
/// required payload, or that the model itself flags as ambiguous, is `AmbiguousAction`.
pub fn parse_reply(raw: &str) -> Result<ParsedReply, InterpretError> {
    let object = extract_json_object(raw)
        .ok_or_else(|| InterpretError::MalformedReply("no JSON object found in the reply".into()))?;

    let response_text = match object.get("response") {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(_) => {
            return Err(InterpretError::MalformedReply(
                "`response` must be a string".into(),
            ));
        }
        None => {
            return Err(InterpretError::MalformedReply(
                "missing the `response` field".into(),
            ));
        }
    };

    let action = match object.get("action") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            Action::from_wire(value).map_err(|e| InterpretError::MalformedReply(e.to_string()))?,
        ),
    };

    let raw_confidence = match object.get("confidence") {
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|_| {
            tracing::debug!("Ignoring unrecognised confidence value: {}", value);
            Confidence::Clear
        }),
        None => Confidence::Clear,
    };

    if let Some(action) = &action {
        if let Some(field) = action.missing_field() {
            return Err(InterpretError::AmbiguousAction(format!(
                "the `{}` action has no `{}`",
                action.kind(),
                field
            )));
        }
        if raw_confidence == Confidence::Ambiguous && action.requires_execution() {
            return Err(InterpretError::AmbiguousAction(format!(
                "the `{}` action was marked ambiguous",
                action.kind()
            )));
        }
    }

    Ok(ParsedReply {
        response_text,
        action,
        raw_confidence,
    })
}

/// Finds the reply object: the whole text, a fenced code block, or the first
/// balanced `{...}` embedded in prose that parses as a JSON object.
fn extract_json_object(raw: &str) -> Option<Map<String, Value>> {
    let as_object = |text: &str| match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };

    if let Some(map) = as_object(raw) {
        return Some(map);
    }

    if let Some(block) = fenced_block(raw) {
        if let Some(map) = as_object(block) {
            return Some(map);
        }
    }

    raw.char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(start, _)| balanced_object(&raw[start..]))
        .find_map(as_object)
}

fn fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after = &raw[start + 3..];
    // Skip the language tag line, if any.
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// Returns the prefix of `text` (which starts with `{`) up to its matching `}`,
/// ignoring braces inside JSON strings.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::history::ConversationHistory;
    use crate::application::testing::ScriptedGateway;
    use crate::domain::types::ConversationTurn;

    #[test]
    fn test_plain_json_reply() {
        let reply = parse_reply(
            r#"{"response": "Listing.", "action": {"type": "dir_search"}}"#,
        )
        .unwrap();
        assert_eq!(reply.response_text, "Listing.");
        assert_eq!(reply.action, Some(Action::DirSearch { path: None, query: None }));
        assert_eq!(reply.raw_confidence, Confidence::Clear);
    }

    #[test]
    fn test_fenced_and_embedded_replies() {
        let fenced = "Sure!\n```json\n{\"response\": \"ok\", \"action\": {\"type\": \"none\"}}\n```\n";
        assert_eq!(parse_reply(fenced).unwrap().action, Some(Action::None));

        let embedded = r#"Here you go: {"response": "Opening {braces} \"x\"", "action": {"type": "launch_app", "app_name": "gedit"}} hope it helps"#;
        let reply = parse_reply(embedded).unwrap();
        assert_eq!(reply.response_text, "Opening {braces} \"x\"");
        assert_eq!(reply.action, Some(Action::LaunchApp { app_name: "gedit".into() }));
    }

    #[test]
    fn test_action_is_optional() {
        let reply = parse_reply(r#"{"response": "Hello there"}"#).unwrap();
        assert!(reply.action.is_none());
        let reply = parse_reply(r#"{"response": "Hi", "action": null}"#).unwrap();
        assert!(reply.action.is_none());
    }

    #[test]
    fn test_malformed_replies() {
        for raw in [
            "I think you should run ls.",
            r#"{"text": "no response field"}"#,
            r#"{"response": 42}"#,
            r#"{"response": "x", "action": {"type": "reboot_now"}}"#,
            r#"{"response": "x", "action": "os_command"}"#,
            "[1, 2, 3]",
        ] {
            assert!(
                matches!(parse_reply(raw), Err(InterpretError::MalformedReply(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_ambiguous_replies() {
        let empty_command = r#"{"response": "Running it", "action": {"type": "os_command", "command": ""}}"#;
        assert!(matches!(
            parse_reply(empty_command),
            Err(InterpretError::AmbiguousAction(msg)) if msg.contains("command")
        ));

        let no_file = r#"{"response": "Checking that file", "action": {"type": "file_check"}}"#;
        assert!(matches!(parse_reply(no_file), Err(InterpretError::AmbiguousAction(_))));

        let flagged = r#"{"response": "Maybe?", "action": {"type": "os_command", "command": "ls"}, "confidence": "ambiguous"}"#;
        assert!(matches!(parse_reply(flagged), Err(InterpretError::AmbiguousAction(_))));
    }

    #[test]
    fn test_ambiguous_flag_on_informational_action_is_kept() {
        let raw = r#"{"response": "Which one?", "action": {"type": "clarify", "query": "Which file?"}, "confidence": "ambiguous"}"#;
        let reply = parse_reply(raw).unwrap();
        assert_eq!(reply.raw_confidence, Confidence::Ambiguous);
    }

    #[tokio::test]
    async fn test_interpret_sends_history_scene_and_hint() {
        let gateway = ScriptedGateway::new([r#"{"response": "done"}"#]);
        let mode = InterpretationMode::new(gateway.clone(), "/work")
            .with_system_info("## Host\nOperating system: linux");

        let mut history = ConversationHistory::new(5);
        history.append(ConversationTurn::user("earlier question"));
        history.append(ConversationTurn::assistant("earlier answer"));

        let reply = mode
            .interpret("next", history.view(), "\n## Role-play\nA shop.\n", Some("bad JSON"))
            .await
            .unwrap();
        assert_eq!(reply.response_text, "done");

        let prompt = gateway.last_prompt().unwrap();
        assert!(prompt.contains("User: earlier question\nAssistant: earlier answer"));
        assert!(prompt.contains("## Role-play\nA shop."));
        assert!(prompt.contains("rejected: bad JSON"));
        assert!(prompt.contains("Working directory: /work\n## Host\nOperating system: linux"));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_opening_message_falls_back_on_empty_output() {
        let gateway = ScriptedGateway::new(["  ", "\"Welcome to the shop!\""]);
        let mode = InterpretationMode::new(gateway, "/");
        assert_eq!(mode.opening_message("scene").await.unwrap(), messages::DEFAULT_GREETING);
        assert_eq!(mode.opening_message("scene").await.unwrap(), "Welcome to the shop!");
    }
}
