//! # Console Session
//!
//! Line-based terminal loop around the controller. Input is read on its own
//! task so that `cancel` can interrupt a timed confirmation while a turn runs.

use crate::application::controller::{ControllerState, TurnOutcome, TurnReport, WrapperController};
use crate::application::execution::ConfirmationReply;
use crate::domain::error::ControllerError;
use crate::domain::types::{ExecutionResult, ExecutionStatus};
use crate::strings::messages;
use anyhow::Result;
use std::collections::VecDeque;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Forwards stdin lines into a channel. The channel closes on EOF.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

pub struct Console<W: Write> {
    out: W,
    max_output_chars: usize,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, max_output_chars: usize) -> Self {
        Self {
            out,
            max_output_chars,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "assistant> {}", text)?;
        Ok(())
    }

    pub fn note(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "  ({})", text)?;
        Ok(())
    }

    /// Runs until the controller ends or input is exhausted.
    pub async fn run(
        &mut self,
        controller: &mut WrapperController,
        mut lines: mpsc::Receiver<String>,
    ) -> Result<()> {
        let mut queued: VecDeque<String> = VecDeque::new();
        let mut input_open = true;

        while !controller.is_ended() {
            let line = match queued.pop_front() {
                Some(line) => line,
                None => {
                    self.prompt(controller.state())?;
                    match lines.recv().await {
                        Some(line) => line,
                        None => {
                            tracing::info!("End of input");
                            controller.end();
                            writeln!(self.out)?;
                            self.say(messages::SESSION_ENDED)?;
                            break;
                        }
                    }
                }
            };

            let cancel = controller.cancel_handle();
            let settings = controller.settings().clone();
            let mut cancel_line: Option<String> = None;
            let mut exit_line: Option<String> = None;
            let result = {
                let turn = controller.handle_input(&line);
                tokio::pin!(turn);
                loop {
                    tokio::select! {
                        result = &mut turn => break result,
                        next = lines.recv(), if input_open => match next {
                            Some(extra) if settings.is_exit_phrase(&extra) => {
                                tracing::info!("Exit requested while the turn was running");
                                cancel.cancel();
                                exit_line = Some(extra);
                            }
                            Some(extra) if is_decline(&extra) => {
                                tracing::info!("Cancel requested while the turn was running");
                                cancel.cancel();
                                cancel_line = Some(extra);
                            }
                            Some(extra) => queued.push_back(extra),
                            None => input_open = false,
                        },
                    }
                }
            };

            // A manual gate ignores the flag; the line is its answer instead.
            if let Some(line) = cancel_line {
                if controller.pending_action().is_some() {
                    queued.push_front(line);
                }
            }
            if let Some(line) = exit_line {
                queued.push_front(line);
            }

            match result {
                Ok(report) => self.render(&report)?,
                Err(ControllerError::SessionEnded) => break,
                Err(e) => writeln!(self.out, "error: {}. Please try again.", e)?,
            }
            self.out.flush()?;
        }

        self.out.flush()?;
        Ok(())
    }

    fn prompt(&mut self, state: ControllerState) -> Result<()> {
        match state {
            ControllerState::PendingConfirmation => write!(self.out, "confirm (yes/no)> ")?,
            _ => write!(self.out, "you> ")?,
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn render(&mut self, report: &TurnReport) -> Result<()> {
        for notice in &report.notices {
            self.note(notice)?;
        }

        match &report.outcome {
            TurnOutcome::Replied { response, .. } | TurnOutcome::Fallback { response, .. } => {
                self.say(response)?;
            }
            TurnOutcome::AwaitingConfirmation { response, action } => {
                self.say(response)?;
                self.note(&messages::confirm_prompt(action))?;
            }
            TurnOutcome::Executed { response, result } => {
                if let Some(response) = response {
                    self.say(response)?;
                }
                self.print_result(result)?;
            }
            TurnOutcome::Declined { response, action } => {
                if let Some(response) = response {
                    self.say(response)?;
                }
                self.note(&messages::declined_record(action))?;
            }
            TurnOutcome::Ended => self.say(messages::SESSION_ENDED)?,
            TurnOutcome::Ignored => {}
        }
        Ok(())
    }

    fn print_result(&mut self, result: &ExecutionResult) -> Result<()> {
        let status = match &result.status {
            ExecutionStatus::Succeeded => "done".to_string(),
            ExecutionStatus::Failed(failure) => format!("failed: {failure}"),
            ExecutionStatus::Simulated => "dry run".to_string(),
        };
        writeln!(self.out, "[{}] {}", status, result.action.describe())?;

        let stdout = result.stdout.trim_end();
        if !stdout.is_empty() {
            writeln!(self.out, "{}", messages::truncate(stdout, self.max_output_chars))?;
        }
        let stderr = result.stderr.trim_end();
        if !stderr.is_empty() {
            for line in messages::truncate(stderr, self.max_output_chars).lines() {
                writeln!(self.out, "! {}", line)?;
            }
        }
        if let (Some(code), ExecutionStatus::Failed(_)) = (result.exit_status, &result.status) {
            writeln!(self.out, "exit status: {}", code)?;
        }
        Ok(())
    }
}

fn is_decline(line: &str) -> bool {
    ConfirmationReply::parse(line) == ConfirmationReply::Decline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::safety::WorkingRoot;
    use crate::application::testing::ScriptedGateway;
    use crate::domain::config::AppConfig;
    use crate::domain::types::Role;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn controller(
        gateway: Arc<ScriptedGateway>,
        config: &AppConfig,
        root: &TempDir,
    ) -> WrapperController {
        WrapperController::from_config(gateway, config, WorkingRoot::new(root.path()), "").unwrap()
    }

    async fn feed(lines: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            tx.send(line.to_string()).await.unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_session_runs_until_exit_phrase() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("todo.txt"), "milk").unwrap();
        let mut config = AppConfig::default();
        config.wrapper.delay_ms = 0;
        let gateway = ScriptedGateway::new([
            r#"{"response": "Here you go.", "action": {"type": "dir_search"}}"#,
        ]);
        let mut c = controller(gateway, &config, &root);

        let mut console = Console::new(Vec::new(), 500);
        console
            .run(&mut c, feed(&["show my files", "quit", "never read"]).await)
            .await
            .unwrap();

        let out = String::from_utf8(console.into_inner()).unwrap();
        assert!(out.contains("assistant> Here you go."));
        assert!(out.contains("[done] list the working directory"));
        assert!(out.contains("todo.txt [FILE]"));
        assert!(out.trim_end().ends_with("assistant> Goodbye!"));
        assert!(c.is_ended());
    }

    #[tokio::test]
    async fn test_end_of_input_ends_session_and_drops_pending() {
        let root = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.wrapper.manual_confirm = true;
        let gateway = ScriptedGateway::new([
            r#"{"response": "I'll run it.", "action": {"type": "os_command", "command": "echo hi"}}"#,
        ]);
        let mut c = controller(gateway, &config, &root);

        let mut console = Console::new(Vec::new(), 500);
        console.run(&mut c, feed(&["say hi"]).await).await.unwrap();

        let out = String::from_utf8(console.into_inner()).unwrap();
        assert!(out.contains("About to run `echo hi`. Proceed? (yes/no)"));
        assert!(out.contains("confirm (yes/no)> "));
        assert!(c.is_ended());
        let last = c.history().last().unwrap();
        assert_eq!(last.role, Role::SystemAction);
        assert!(last.content.starts_with("[declined]"));
    }

    #[tokio::test]
    async fn test_cancel_typed_during_timed_gate() {
        let root = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.wrapper.delay_ms = 10_000;
        let gateway = ScriptedGateway::new([
            r#"{"response": "Creating it.", "action": {"type": "os_command", "command": "touch made.txt"}}"#,
        ]);
        let mut c = controller(gateway, &config, &root);

        let (tx, rx) = mpsc::channel(4);
        tx.send("make a file".to_string()).await.unwrap();
        let typist = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            tx.send("cancel".to_string()).await.unwrap();
            tx.send("exit".to_string()).await.unwrap();
        });

        let mut console = Console::new(Vec::new(), 500);
        console.run(&mut c, rx).await.unwrap();
        typist.await.unwrap();

        let out = String::from_utf8(console.into_inner()).unwrap();
        assert!(out.contains("[declined] run `touch made.txt`"));
        assert!(!root.path().join("made.txt").exists());
        assert!(c.is_ended());
    }

    #[tokio::test]
    async fn test_exit_typed_during_timed_gate_skips_the_action() {
        let root = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.wrapper.delay_ms = 1_000;
        let gateway = ScriptedGateway::new([
            r#"{"response": "Creating it.", "action": {"type": "os_command", "command": "touch made.txt"}}"#,
        ]);
        let mut c = controller(gateway.clone(), &config, &root);

        let (tx, rx) = mpsc::channel(4);
        tx.send("make a file".to_string()).await.unwrap();
        let typist = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            tx.send("exit".to_string()).await.unwrap();
            tx.send("make another".to_string()).await.unwrap();
        });

        let mut console = Console::new(Vec::new(), 500);
        console.run(&mut c, rx).await.unwrap();
        typist.await.unwrap();

        let out = String::from_utf8(console.into_inner()).unwrap();
        assert!(out.contains("[declined] run `touch made.txt`"));
        assert!(out.trim_end().ends_with("assistant> Goodbye!"));
        assert!(!root.path().join("made.txt").exists());
        assert!(c.is_ended());
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_exit_typed_ahead_ends_manual_gate() {
        let root = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.wrapper.manual_confirm = true;
        let gateway = ScriptedGateway::new([
            r#"{"response": "I'll run it.", "action": {"type": "os_command", "command": "touch typed.txt"}}"#,
        ]);
        let mut c = controller(gateway, &config, &root);

        let mut console = Console::new(Vec::new(), 500);
        console.run(&mut c, feed(&["make it", "Exit.", "yes"]).await).await.unwrap();

        assert!(c.is_ended());
        assert!(!root.path().join("typed.txt").exists());
        assert!(c.history().last().unwrap().content.starts_with("[declined]"));
    }

    #[tokio::test]
    async fn test_typed_ahead_decline_answers_manual_gate() {
        let root = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.wrapper.manual_confirm = true;
        let gateway = ScriptedGateway::new([
            r#"{"response": "I'll run it.", "action": {"type": "os_command", "command": "touch typed.txt"}}"#,
        ]);
        let mut c = controller(gateway.clone(), &config, &root);

        let mut console = Console::new(Vec::new(), 500);
        console.run(&mut c, feed(&["make it", "no", "bye"]).await).await.unwrap();

        let out = String::from_utf8(console.into_inner()).unwrap();
        assert!(out.contains("[declined] run `touch typed.txt`"));
        assert!(!root.path().join("typed.txt").exists());
        assert_eq!(gateway.calls(), 1);
    }

    #[test]
    fn test_failed_result_shows_stderr_and_status() {
        use crate::domain::action::Action;
        use crate::domain::types::ExecutionFailure;

        let mut console = Console::new(Vec::new(), 500);
        console
            .print_result(&ExecutionResult {
                action: Action::OsCommand { command: "ls nope".into() },
                stdout: String::new(),
                stderr: "ls: cannot access 'nope'\n".into(),
                exit_status: Some(2),
                status: ExecutionStatus::Failed(ExecutionFailure::ExitStatus(Some(2))),
            })
            .unwrap();
        let out = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(
            out,
            "[failed: exited with status 2] run `ls nope`\n! ls: cannot access 'nope'\nexit status: 2\n"
        );
    }
}
