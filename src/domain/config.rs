//! # Configuration
//!
//! Manages the loading and parsing of the application's configuration file (`config.yaml`).
//! Every section is optional; a missing file yields the built-in defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "data/config.yaml";

/// Main application configuration structure.
/// Matches the layout of `data/config.yaml`.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub wrapper: WrapperConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads the config from an explicit path, or from the first default location that exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_locations().into_iter().find(|p| p.exists()),
        };

        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty file parses to `null`, which we treat as "all defaults".
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(DEFAULT_CONFIG_PATH)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("steward").join("config.yaml"));
        }
        paths
    }
}

/// Controller behavior: retries, history, confirmation.
#[derive(Debug, Deserialize, Clone)]
pub struct WrapperConfig {
    #[serde(default = "default_agent")]
    pub default_agent: String,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub manual_confirm: bool,
    /// Auto-execute wait in milliseconds when `manual_confirm` is off.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_exit_phrases")]
    pub exit_phrases: Vec<String>,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            default_agent: default_agent(),
            max_history: default_max_history(),
            max_retries: default_max_retries(),
            dry_run: false,
            manual_confirm: false,
            delay_ms: default_delay_ms(),
            exit_phrases: default_exit_phrases(),
        }
    }
}

fn default_agent() -> String {
    "gemini".to_string()
}
fn default_max_history() -> usize {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_delay_ms() -> u64 {
    500
}
fn default_exit_phrases() -> Vec<String> {
    vec!["exit".into(), "quit".into(), "bye".into()]
}

/// A labelled deny-list regex for `os_command` actions.
#[derive(Debug, Deserialize, Clone)]
pub struct DenyPatternConfig {
    pub label: String,
    pub pattern: String,
}

/// Safety policy applied before any action reaches the host.
#[derive(Debug, Deserialize, Clone)]
pub struct SafetyConfig {
    /// Root that `file_check` / `dir_search` paths must stay inside. Defaults to the cwd.
    #[serde(default)]
    pub working_root: Option<String>,
    #[serde(default = "default_true")]
    pub use_default_patterns: bool,
    /// Extra patterns, appended to the built-in set.
    #[serde(default)]
    pub deny_patterns: Vec<DenyPatternConfig>,
    #[serde(default = "default_true")]
    pub restrict_apps: bool,
    #[serde(default = "default_allowed_apps")]
    pub allowed_apps: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            working_root: None,
            use_default_patterns: true,
            deny_patterns: Vec::new(),
            restrict_apps: true,
            allowed_apps: default_allowed_apps(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_allowed_apps() -> Vec<String> {
    [
        "firefox",
        "chromium",
        "chromium-browser",
        "chrome",
        "google-chrome",
        "code",
        "gedit",
        "nano",
        "vim",
        "emacs",
        "nautilus",
        "thunar",
        "dolphin",
        "nemo",
        "pcmanfm",
        "gnome-terminal",
        "xterm",
        "konsole",
        "alacritty",
        "libreoffice",
        "evince",
        "okular",
        "eog",
        "gimp",
        "inkscape",
        "vlc",
        "mpv",
        "rhythmbox",
        "audacity",
        "gnome-calculator",
        "kcalc",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Host execution limits.
#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Captured output longer than this is truncated before it enters the history.
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    #[serde(default = "default_search_depth")]
    pub search_depth: usize,
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_output_chars: default_max_output_chars(),
            search_depth: default_search_depth(),
            max_search_results: default_max_search_results(),
        }
    }
}

fn default_timeout() -> u64 {
    60
}
fn default_max_output_chars() -> usize {
    2000
}
fn default_search_depth() -> usize {
    3
}
fn default_max_search_results() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_log_file")]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            file: default_log_file(),
        }
    }
}

fn default_log_dir() -> String {
    "data".to_string()
}
fn default_log_file() -> String {
    "session.log".to_string()
}

pub type AgentsConfig = HashMap<String, AgentConfig>;

/// A named model endpoint. The agent name is what `--model` selects.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>, // e.g. "GEMINI_API_KEY"
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Sampling temperature sent with every request. Provider default when unset.
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Agents available when the config file defines none.
pub fn builtin_agents() -> AgentsConfig {
    let mut agents = AgentsConfig::new();
    agents.insert(
        "gemini".to_string(),
        AgentConfig {
            provider: "gemini".into(),
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash-001".into()),
            api_key_env: Some("GEMINI_API_KEY".into()),
            ..Default::default()
        },
    );
    agents.insert(
        "claude".to_string(),
        AgentConfig {
            provider: "anthropic".into(),
            model: std::env::var("CLAUDE_MODEL")
                .unwrap_or_else(|_| "claude-3-haiku-20240307".into()),
            api_key_env: Some("CLAUDE_API_KEY".into()),
            ..Default::default()
        },
    );
    agents.insert(
        "llama".to_string(),
        AgentConfig {
            provider: "ollama".into(),
            model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama2".into()),
            endpoint: std::env::var("OLLAMA_API_URL").ok(),
            ..Default::default()
        },
    );
    agents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config.wrapper.max_history, 5);
        assert_eq!(config.wrapper.max_retries, 3);
        assert_eq!(config.wrapper.delay_ms, 500);
        assert!(!config.wrapper.dry_run);
        assert!(config.safety.use_default_patterns);
        assert_eq!(config.execution.timeout_secs, 60);
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let yaml = r#"
wrapper:
  manual_confirm: true
  max_history: 12
safety:
  working_root: /tmp/sandbox
  deny_patterns:
    - label: no-shutdown
      pattern: "\\bshutdown\\b"
agents:
  local:
    provider: ollama
    model: mistral
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.wrapper.manual_confirm);
        assert_eq!(config.wrapper.max_history, 12);
        assert_eq!(config.wrapper.max_retries, 3);
        assert_eq!(config.wrapper.exit_phrases, vec!["exit", "quit", "bye"]);
        assert_eq!(config.safety.working_root.as_deref(), Some("/tmp/sandbox"));
        assert_eq!(config.safety.deny_patterns[0].label, "no-shutdown");
        assert!(config.safety.restrict_apps);
        assert_eq!(config.agents["local"].model, "mistral");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/steward.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_builtin_agents() {
        let agents = builtin_agents();
        assert_eq!(agents["gemini"].provider, "gemini");
        assert_eq!(agents["claude"].provider, "anthropic");
        assert!(agents["llama"].api_key_env.is_none());
    }
}
