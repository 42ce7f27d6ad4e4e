//! # Action Schema
//!
//! The structured instruction a model reply may carry, plus the shape checks
//! applied before anything downstream sees it.
//!
//! On the wire an action is a JSON object tagged by `type`:
//!
//! ```json
//! { "type": "os_command", "command": "ls -la" }
//! { "type": "dir_search", "path": "projects", "query": "notes" }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A kind-tagged action proposed by the model.
///
/// Payload fields default to empty so that a reply with a known kind but a
/// missing field still decodes; [`Action::missing_field`] then reports it as
/// ambiguous instead of malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    OsCommand {
        #[serde(default)]
        command: String,
    },
    LaunchApp {
        #[serde(default)]
        app_name: String,
    },
    FileCheck {
        #[serde(default, alias = "file_path")]
        path: String,
    },
    DirSearch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, alias = "dir_name", skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    ExplainDownload {
        #[serde(default, alias = "target")]
        query: String,
    },
    Explain {
        #[serde(default, alias = "content")]
        query: String,
    },
    Clarify {
        #[serde(default, alias = "question")]
        query: String,
    },
    None,
}

/// The fixed set of action kinds, without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    OsCommand,
    LaunchApp,
    FileCheck,
    DirSearch,
    ExplainDownload,
    Explain,
    Clarify,
    None,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::OsCommand,
        ActionKind::LaunchApp,
        ActionKind::FileCheck,
        ActionKind::DirSearch,
        ActionKind::ExplainDownload,
        ActionKind::Explain,
        ActionKind::Clarify,
        ActionKind::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::OsCommand => "os_command",
            ActionKind::LaunchApp => "launch_app",
            ActionKind::FileCheck => "file_check",
            ActionKind::DirSearch => "dir_search",
            ActionKind::ExplainDownload => "explain_download",
            ActionKind::Explain => "explain",
            ActionKind::Clarify => "clarify",
            ActionKind::None => "none",
        }
    }

    /// Kinds that touch the host and therefore pass through the confirmation gate.
    pub fn requires_execution(&self) -> bool {
        match self {
            ActionKind::OsCommand
            | ActionKind::LaunchApp
            | ActionKind::FileCheck
            | ActionKind::DirSearch => true,
            ActionKind::ExplainDownload
            | ActionKind::Explain
            | ActionKind::Clarify
            | ActionKind::None => false,
        }
    }

    /// Kinds whose execution changes system state (as opposed to inspecting it).
    pub fn mutates_system(&self) -> bool {
        matches!(self, ActionKind::OsCommand | ActionKind::LaunchApp)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons an action object fails to decode.
#[derive(Debug, thiserror::Error)]
pub enum ActionParseError {
    #[error("action must be a JSON object")]
    NotAnObject,
    #[error("action is missing the `type` field")]
    MissingType,
    #[error("unknown action type `{0}`")]
    UnknownKind(String),
    #[error("invalid `{kind}` action: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::OsCommand { .. } => ActionKind::OsCommand,
            Action::LaunchApp { .. } => ActionKind::LaunchApp,
            Action::FileCheck { .. } => ActionKind::FileCheck,
            Action::DirSearch { .. } => ActionKind::DirSearch,
            Action::ExplainDownload { .. } => ActionKind::ExplainDownload,
            Action::Explain { .. } => ActionKind::Explain,
            Action::Clarify { .. } => ActionKind::Clarify,
            Action::None => ActionKind::None,
        }
    }

    pub fn requires_execution(&self) -> bool {
        self.kind().requires_execution()
    }

    /// Decodes an action object from its wire form.
    ///
    /// Unknown kinds are an error rather than being coerced to `none`.
    pub fn from_wire(value: &serde_json::Value) -> Result<Self, ActionParseError> {
        let object = value.as_object().ok_or(ActionParseError::NotAnObject)?;
        let kind = object
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ActionParseError::MissingType)?;

        if !ActionKind::ALL.iter().any(|k| k.as_str() == kind) {
            return Err(ActionParseError::UnknownKind(kind.to_string()));
        }

        serde_json::from_value(value.clone()).map_err(|source| ActionParseError::Payload {
            kind: kind.to_string(),
            source,
        })
    }

    pub fn to_wire(&self) -> serde_json::Value {
        // Serializing a plain enum of strings cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Returns the name of a required payload field that is empty, if any.
    ///
    /// `dir_search` has no required field: without a path it lists the working root.
    pub fn missing_field(&self) -> Option<&'static str> {
        let blank = |s: &str| s.trim().is_empty();
        match self {
            Action::OsCommand { command } if blank(command) => Some("command"),
            Action::LaunchApp { app_name } if blank(app_name) => Some("app_name"),
            Action::FileCheck { path } if blank(path) => Some("path"),
            Action::ExplainDownload { query }
            | Action::Explain { query }
            | Action::Clarify { query }
                if blank(query) =>
            {
                Some("query")
            }
            _ => None,
        }
    }

    /// One-line description used in confirmations and history.
    pub fn describe(&self) -> String {
        match self {
            Action::OsCommand { command } => format!("run `{command}`"),
            Action::LaunchApp { app_name } => format!("launch {app_name}"),
            Action::FileCheck { path } => format!("check file `{path}`"),
            Action::DirSearch { path, query } => match (path.as_deref(), query.as_deref()) {
                (p, Some(q)) => {
                    format!("search `{}` for directories named `{q}`", p.unwrap_or("."))
                }
                (Some(p), None) => format!("list directory `{p}`"),
                (None, None) => "list the working directory".to_string(),
            },
            Action::ExplainDownload { query } => format!("explain how to download {query}"),
            Action::Explain { query } => format!("explain {query}"),
            Action::Clarify { query } => format!("ask: {query}"),
            Action::None => "no action".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_kind_survives_the_wire() {
        let actions = vec![
            Action::OsCommand { command: "ls -la".into() },
            Action::LaunchApp { app_name: "firefox".into() },
            Action::FileCheck { path: "notes/hi.txt".into() },
            Action::DirSearch { path: None, query: None },
            Action::DirSearch { path: Some("src".into()), query: Some("tests".into()) },
            Action::ExplainDownload { query: "vlc".into() },
            Action::Explain { query: "what a pipe is".into() },
            Action::Clarify { query: "which file?".into() },
            Action::None,
        ];
        for action in actions {
            let wire = action.to_wire();
            assert_eq!(Action::from_wire(&wire).unwrap(), action, "wire form: {wire}");
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = Action::from_wire(&json!({"type": "format_disk", "command": "x"})).unwrap_err();
        assert!(matches!(err, ActionParseError::UnknownKind(k) if k == "format_disk"));
    }

    #[test]
    fn test_missing_type_and_non_object() {
        assert!(matches!(
            Action::from_wire(&json!({"command": "ls"})),
            Err(ActionParseError::MissingType)
        ));
        assert!(matches!(
            Action::from_wire(&json!("ls")),
            Err(ActionParseError::NotAnObject)
        ));
    }

    #[test]
    fn test_legacy_field_aliases() {
        let check =
            Action::from_wire(&json!({"type": "file_check", "file_path": "a.txt"})).unwrap();
        assert_eq!(check, Action::FileCheck { path: "a.txt".into() });

        let search =
            Action::from_wire(&json!({"type": "dir_search", "dir_name": "music"})).unwrap();
        assert_eq!(search, Action::DirSearch { path: None, query: Some("music".into()) });

        let clarify = Action::from_wire(&json!({"type": "clarify", "question": "which?"})).unwrap();
        assert_eq!(clarify, Action::Clarify { query: "which?".into() });
    }

    #[test]
    fn test_missing_payload_decodes_but_is_flagged() {
        let action = Action::from_wire(&json!({"type": "os_command"})).unwrap();
        assert_eq!(action.missing_field(), Some("command"));

        let blank = Action::FileCheck { path: "  ".into() };
        assert_eq!(blank.missing_field(), Some("path"));

        let listing = Action::DirSearch { path: None, query: None };
        assert_eq!(listing.missing_field(), None);
    }

    #[test]
    fn test_execution_kinds() {
        let executable: Vec<_> = ActionKind::ALL
            .iter()
            .filter(|k| k.requires_execution())
            .map(|k| k.as_str())
            .collect();
        assert_eq!(executable, vec!["os_command", "launch_app", "file_check", "dir_search"]);
    }
}
