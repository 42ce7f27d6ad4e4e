//! # Execution Mode
//!
//! Confirmation gate plus dispatch of approved actions to the host.
//! Every kind produces an [`ExecutionResult`]; host failures are data, never errors.

use crate::application::safety::WorkingRoot;
use crate::domain::action::Action;
use crate::domain::types::{ExecutionFailure, ExecutionResult, ExecutionStatus};
use crate::infrastructure::tools::executor::{HostExecutor, HostOutput, NamePattern};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::watch;

const CONFIRM_PHRASES: &[&str] = &[
    "yes", "y", "yep", "yeah", "sure", "ok", "okay", "confirm", "do it", "execute", "run it",
    "proceed", "go", "go ahead",
];
const DECLINE_PHRASES: &[&str] = &["no", "n", "nope", "cancel", "stop", "abort", "don't"];
/// Words that may follow a confirm phrase without turning the input into a new request.
const CONFIRM_FILLERS: &[&str] = &[
    "now", "please", "thanks", "thank", "you", "it", "ahead", "and", "do", "run", "go", "yes",
    "sure", "then", "right", "away", "that", "this", "one",
];

/// `find <dir> [-type f] -name|-iname <pattern>`, handled as an in-process file search.
static FIND_BY_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*find\s+(\S+)\s+(?:-type\s+f\s+)?-(i?)name\s+(\S+)\s*$").ok()
});

/// How consent is obtained for an approved action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationGate {
    /// Wait for an explicit reply on the next input.
    Manual,
    /// Execute after the delay unless cancelled first.
    Timed(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Confirmed,
    Cancelled,
}

/// Classification of the input received while an action waits for manual consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationReply {
    Confirm,
    Decline,
    /// Anything else. The pending action is dropped and the input starts a new turn.
    Other,
}

impl ConfirmationReply {
    pub fn parse(input: &str) -> Self {
        let text = input
            .trim()
            .trim_end_matches(['.', '!'])
            .to_lowercase()
            .replace('\u{2019}', "'");
        let declines = DECLINE_PHRASES
            .iter()
            .any(|p| text == *p || text.starts_with(&format!("{p} ")));
        if declines {
            return ConfirmationReply::Decline;
        }

        // A confirm phrase may only be followed by filler, so "go to the
        // downloads folder" is a new request rather than a yes.
        let confirms = CONFIRM_PHRASES.iter().any(|p| match text.strip_prefix(*p) {
            Some("") => true,
            Some(rest) if rest.starts_with([' ', ',']) => rest
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|w| !w.is_empty())
                .all(|w| CONFIRM_FILLERS.contains(&w)),
            _ => false,
        });
        if confirms {
            ConfirmationReply::Confirm
        } else {
            ConfirmationReply::Other
        }
    }
}

/// Cloneable trigger that aborts a timed confirmation from outside the running turn.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn channel() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Single cancellable wait: completes after `delay` unless the flag is raised first.
/// A cancellation that is already pending, or arrives together with the deadline, wins.
pub async fn timed_confirmation(
    delay: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> GateDecision {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => GateDecision::Cancelled,
        _ = tokio::time::sleep(delay) => GateDecision::Confirmed,
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        // Sender gone: nobody can cancel any more.
        std::future::pending::<()>().await;
    }
}

pub struct ExecutionMode {
    host: HostExecutor,
    root: WorkingRoot,
    dry_run: bool,
}

impl ExecutionMode {
    pub fn new(host: HostExecutor, root: WorkingRoot, dry_run: bool) -> Self {
        Self { host, root, dry_run }
    }

    /// Runs an action that has already been validated and confirmed.
    pub async fn execute(&self, action: &Action) -> ExecutionResult {
        if self.dry_run {
            tracing::info!("Dry run, not executing: {}", action.describe());
            return ExecutionResult {
                action: action.clone(),
                stdout: format!("[dry run] would {}", action.describe()),
                stderr: String::new(),
                exit_status: None,
                status: ExecutionStatus::Simulated,
            };
        }

        tracing::info!("Executing: {}", action.describe());
        let output = match action {
            Action::OsCommand { command } => match self.name_search(command) {
                Some((base, pattern)) => self.host.find_files(&base, &pattern).await,
                None => self.host.run_shell(command).await,
            },
            Action::LaunchApp { app_name } => self.host.launch(app_name.trim()),
            Action::FileCheck { path } => match self.root.resolve(path) {
                Some(resolved) => self.host.describe_path(&resolved, path).await,
                None => escaped(path),
            },
            Action::DirSearch { path, query } => {
                let shown = path.as_deref().unwrap_or(".");
                match (self.root.resolve(shown), query.as_deref().map(str::trim)) {
                    (None, _) => escaped(shown),
                    (Some(base), Some(q)) if !q.is_empty() => {
                        self.host.find_dirs(&base, q).await
                    }
                    (Some(base), _) => self.host.list_dir(&base).await,
                }
            }
            Action::ExplainDownload { .. }
            | Action::Explain { .. }
            | Action::Clarify { .. }
            | Action::None => HostOutput {
                exit_status: Some(0),
                ..Default::default()
            },
        };

        let status = match output.failure {
            Some(failure) => {
                tracing::warn!("{} failed: {}", action.kind(), failure);
                ExecutionStatus::Failed(failure)
            }
            None => ExecutionStatus::Succeeded,
        };

        ExecutionResult {
            action: action.clone(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_status: output.exit_status,
            status,
        }
    }

    /// A plain `find <dir> -name <pattern>` inside the working root becomes a
    /// walk of the root. Anything else, or a directory outside it, goes to the shell.
    fn name_search(&self, command: &str) -> Option<(std::path::PathBuf, NamePattern)> {
        let caps = FIND_BY_NAME.as_ref()?.captures(command)?;
        let dir = strip_quotes(&caps[1]);
        let base = self.root.resolve(dir)?;
        let pattern = NamePattern::new(strip_quotes(&caps[3]), !caps[2].is_empty()).ok()?;
        tracing::debug!("Searching {} for files named {}", base.display(), pattern.as_str());
        Some((base, pattern))
    }
}

fn strip_quotes(word: &str) -> &str {
    word.strip_prefix('\'')
        .and_then(|w| w.strip_suffix('\''))
        .or_else(|| word.strip_prefix('"').and_then(|w| w.strip_suffix('"')))
        .unwrap_or(word)
}

// Validation runs first, so this only triggers if the root changed underneath us.
fn escaped(path: &str) -> HostOutput {
    HostOutput {
        stderr: format!("{path}: outside the working directory"),
        failure: Some(ExecutionFailure::Io(format!("path escape: {path}"))),
        ..Default::default()
    }
}
