//! Command-line flags. Every flag overrides the matching config file entry.

use crate::domain::config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(
    name = "steward",
    version,
    about = "Conversational assistant that turns requests into checked, confirmable OS actions"
)]
pub struct Cli {
    /// Agent to talk to (e.g. gemini, claude, llama, or one defined in the config).
    #[arg(long)]
    pub model: Option<String>,

    /// Scene file, or a name looked up in `scenes/`.
    #[arg(long)]
    pub scene: Option<String>,

    /// Simulate every action instead of running it.
    #[arg(long)]
    pub dry_run: bool,

    /// Ask before every action instead of auto-executing after a delay.
    #[arg(long)]
    pub manual_confirm: bool,

    /// Auto-execute delay in milliseconds.
    #[arg(long, value_name = "MS")]
    pub delay: Option<u64>,

    /// Number of conversation turns kept for context.
    #[arg(long, value_name = "N")]
    pub max_history: Option<usize>,

    /// Interpretation attempts per user turn before asking for clarification.
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Directory that file and directory actions are confined to.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Config file (defaults to data/config.yaml, then the user config dir).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Mirror log output on stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn apply(&self, config: &mut AppConfig) {
        let wrapper = &mut config.wrapper;
        if let Some(model) = &self.model {
            wrapper.default_agent = model.clone();
        }
        if self.dry_run {
            wrapper.dry_run = true;
        }
        if self.manual_confirm {
            wrapper.manual_confirm = true;
        }
        if let Some(delay) = self.delay {
            wrapper.delay_ms = delay;
        }
        if let Some(n) = self.max_history {
            wrapper.max_history = n;
        }
        if let Some(n) = self.max_retries {
            wrapper.max_retries = n;
        }
        if let Some(root) = &self.root {
            config.safety.working_root = Some(root.to_string_lossy().into_owned());
        }
    }
}
