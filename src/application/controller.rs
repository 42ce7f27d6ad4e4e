//! # Wrapper Controller
//!
//! The per-turn state machine between interpretation and execution.
//!
//! ```text
//! AwaitingInput -> Interpreting -> PendingConfirmation -> Executing -> AwaitingInput
//!                        |  ^                |
//!                        +--+ retry w/ hint  +-> declined -> AwaitingInput
//! any state --exit phrase--> Ended
//! ```
//!
//! The controller owns the conversation history. Modes get a read view and
//! return data; only this module appends.

use crate::application::execution::{
    CancelHandle, ConfirmationGate, ConfirmationReply, ExecutionMode, GateDecision,
    timed_confirmation,
};
use crate::application::history::{ConversationHistory, HistoryView};
use crate::application::interpretation::InterpretationMode;
use crate::application::safety::{SafetyValidator, Verdict, WorkingRoot};
use crate::domain::action::Action;
use crate::domain::config::AppConfig;
use crate::domain::error::{ConfigError, ControllerError, InterpretError};
use crate::domain::traits::ModelGateway;
use crate::domain::types::{ConversationTurn, ExecutionResult, ParsedReply};
use crate::infrastructure::tools::executor::HostExecutor;
use crate::infrastructure::tools::system_info::SystemInfo;
use crate::strings::messages;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    AwaitingInput,
    Interpreting,
    PendingConfirmation,
    Executing,
    Ended,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::AwaitingInput => "awaiting input",
            ControllerState::Interpreting => "interpreting",
            ControllerState::PendingConfirmation => "pending confirmation",
            ControllerState::Executing => "executing",
            ControllerState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Invalid, ambiguous or rejected replies within one user turn.
/// Starts at zero for every turn and never exceeds its cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    count: u32,
    cap: u32,
}

impl RetryCounter {
    pub fn new(cap: u32) -> Self {
        Self {
            count: 0,
            cap: cap.max(1),
        }
    }

    /// Records one failed attempt. Returns whether another attempt is allowed.
    pub fn record_failure(&mut self) -> bool {
        self.count = (self.count + 1).min(self.cap);
        !self.exhausted()
    }

    pub fn exhausted(&self) -> bool {
        self.count >= self.cap
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub max_history: usize,
    pub max_retries: u32,
    pub gate: ConfirmationGate,
    pub exit_phrases: Vec<String>,
    pub max_output_chars: usize,
}

impl ControllerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let gate = if config.wrapper.manual_confirm {
            ConfirmationGate::Manual
        } else {
            ConfirmationGate::Timed(Duration::from_millis(config.wrapper.delay_ms))
        };
        Self {
            max_history: config.wrapper.max_history,
            max_retries: config.wrapper.max_retries,
            gate,
            exit_phrases: config
                .wrapper
                .exit_phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .collect(),
            max_output_chars: config.execution.max_output_chars,
        }
    }

    pub fn is_exit_phrase(&self, input: &str) -> bool {
        let text = input.trim().trim_end_matches(['.', '!']).to_lowercase();
        self.exit_phrases.iter().any(|p| *p == text)
    }
}

/// What a turn produced, for the caller to present.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// A reply with no host action (informational kinds, `clarify`, or none at all).
    Replied {
        response: String,
        action: Option<Action>,
    },
    /// An approved action waits for an explicit yes/no on the next input.
    AwaitingConfirmation { response: String, action: Action },
    Executed {
        response: Option<String>,
        result: ExecutionResult,
    },
    Declined {
        response: Option<String>,
        action: Action,
    },
    /// The retry cap was reached; the user is asked to clarify.
    Fallback { response: String, attempts: u32 },
    Ended,
    /// Blank input, nothing happened.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Retry and gate messages produced along the way, in order.
    pub notices: Vec<String>,
}

impl TurnReport {
    fn new(outcome: TurnOutcome, notices: Vec<String>) -> Self {
        Self { outcome, notices }
    }
}

pub struct WrapperController {
    state: ControllerState,
    history: ConversationHistory,
    interpreter: InterpretationMode,
    validator: SafetyValidator,
    executor: ExecutionMode,
    settings: ControllerSettings,
    scene: String,
    pending: Option<Action>,
    cancel: CancelHandle,
    cancel_rx: watch::Receiver<bool>,
}

impl WrapperController {
    pub fn new(
        interpreter: InterpretationMode,
        validator: SafetyValidator,
        executor: ExecutionMode,
        settings: ControllerSettings,
        scene: impl Into<String>,
    ) -> Self {
        let (cancel, cancel_rx) = CancelHandle::channel();
        Self {
            state: ControllerState::AwaitingInput,
            history: ConversationHistory::new(settings.max_history),
            interpreter,
            validator,
            executor,
            settings,
            scene: scene.into(),
            pending: None,
            cancel,
            cancel_rx,
        }
    }

    /// Wires the modes from configuration around a gateway.
    pub fn from_config(
        gateway: Arc<dyn ModelGateway>,
        config: &AppConfig,
        root: WorkingRoot,
        scene: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let dry_run = config.wrapper.dry_run;
        let validator = SafetyValidator::new(&config.safety, root.clone(), dry_run)?;
        let host = HostExecutor::new(root.path(), &config.execution);
        let interpreter = InterpretationMode::new(gateway, root.path().display().to_string())
            .with_system_info(SystemInfo::detect().render());
        let executor = ExecutionMode::new(host, root, dry_run);
        Ok(Self::new(
            interpreter,
            validator,
            executor,
            ControllerSettings::from_config(config),
            scene,
        ))
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_ended(&self) -> bool {
        self.state == ControllerState::Ended
    }

    pub fn history(&self) -> HistoryView<'_> {
        self.history.view()
    }

    pub fn pending_action(&self) -> Option<&Action> {
        self.pending.as_ref()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Handle for aborting a timed confirmation while `handle_input` runs.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Asks the model for an in-character first line and records it.
    pub async fn opening_message(&mut self) -> Result<String, ControllerError> {
        let line = self.interpreter.opening_message(&self.scene).await?;
        self.history.append(ConversationTurn::assistant(line.clone()));
        Ok(line)
    }

    /// Ends the session. A still-pending action is recorded as declined.
    pub fn end(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.history
                .append(ConversationTurn::system_action(messages::declined_record(&pending)));
        }
        self.transition(ControllerState::Ended);
    }

    /// Processes one user input to completion.
    ///
    /// Only a gateway failure is returned as an error; history is untouched
    /// in that case and the controller is back in `AwaitingInput`.
    pub async fn handle_input(&mut self, input: &str) -> Result<TurnReport, ControllerError> {
        if self.state == ControllerState::Ended {
            return Err(ControllerError::SessionEnded);
        }
        if matches!(
            self.state,
            ControllerState::Interpreting | ControllerState::Executing
        ) {
            tracing::warn!("Previous turn did not complete (state {}), resetting", self.state);
            self.transition(ControllerState::AwaitingInput);
        }

        let input = input.trim();
        let mut notices = Vec::new();

        if self.settings.is_exit_phrase(input) {
            self.end();
            return Ok(TurnReport::new(TurnOutcome::Ended, notices));
        }

        if let Some(pending) = self.pending.take() {
            match ConfirmationReply::parse(input) {
                ConfirmationReply::Confirm => {
                    let result = self.execute(&pending).await;
                    return Ok(TurnReport::new(
                        TurnOutcome::Executed {
                            response: None,
                            result,
                        },
                        notices,
                    ));
                }
                ConfirmationReply::Decline => {
                    self.decline(&pending);
                    return Ok(TurnReport::new(
                        TurnOutcome::Declined {
                            response: None,
                            action: pending,
                        },
                        notices,
                    ));
                }
                ConfirmationReply::Other => {
                    tracing::info!("New input while an action was pending, dropping it");
                    self.decline(&pending);
                    notices.push(messages::pending_discarded(&pending));
                }
            }
        }

        if input.is_empty() {
            return Ok(TurnReport::new(TurnOutcome::Ignored, notices));
        }

        self.run_turn(input, notices).await
    }

    async fn run_turn(
        &mut self,
        input: &str,
        mut notices: Vec<String>,
    ) -> Result<TurnReport, ControllerError> {
        self.cancel.reset();

        let mut retries = RetryCounter::new(self.settings.max_retries);
        let mut hint: Option<String> = None;

        let accepted = loop {
            self.transition(ControllerState::Interpreting);
            let attempt = self
                .interpreter
                .interpret(input, self.history.view(), &self.scene, hint.as_deref())
                .await;

            let reason = match attempt {
                Ok(reply) => match self.screen(reply) {
                    Ok(accepted) => break Some(accepted),
                    Err(reason) => reason,
                },
                Err(InterpretError::Gateway(e)) => {
                    tracing::error!("Gateway failure: {}", e);
                    self.transition(ControllerState::AwaitingInput);
                    return Err(e.into());
                }
                Err(e) => e.to_string(),
            };

            let again = retries.record_failure();
            tracing::warn!(
                "Unusable reply [{}/{}]: {}",
                retries.count(),
                retries.cap(),
                reason
            );
            if !again {
                notices.push(messages::giving_up(retries.count()));
                break None;
            }
            notices.push(messages::retrying(&reason, retries.count(), retries.cap()));
            hint = Some(reason);
        };

        self.history.append(ConversationTurn::user(input));

        let Some((reply, verdict)) = accepted else {
            let response = messages::FALLBACK_CLARIFY.to_string();
            self.history.append(ConversationTurn::assistant(response.clone()));
            self.transition(ControllerState::AwaitingInput);
            return Ok(TurnReport::new(
                TurnOutcome::Fallback {
                    response,
                    attempts: retries.count(),
                },
                notices,
            ));
        };

        let response = reply.response_text;
        self.history.append(ConversationTurn::assistant(response.clone()));

        let action = match reply.action {
            Some(action) if action.requires_execution() => action,
            informational => {
                self.transition(ControllerState::AwaitingInput);
                return Ok(TurnReport::new(
                    TurnOutcome::Replied {
                        response,
                        action: informational,
                    },
                    notices,
                ));
            }
        };

        let gate = match verdict {
            Verdict::RequiresManualConfirm(why) => {
                notices.push(why);
                ConfirmationGate::Manual
            }
            _ => self.settings.gate,
        };

        self.transition(ControllerState::PendingConfirmation);
        match gate {
            ConfirmationGate::Manual => {
                self.pending = Some(action.clone());
                Ok(TurnReport::new(
                    TurnOutcome::AwaitingConfirmation { response, action },
                    notices,
                ))
            }
            ConfirmationGate::Timed(delay) => {
                tracing::info!("Auto-executing in {:?}: {}", delay, action.describe());
                match timed_confirmation(delay, &mut self.cancel_rx).await {
                    GateDecision::Confirmed => {
                        let result = self.execute(&action).await;
                        Ok(TurnReport::new(
                            TurnOutcome::Executed {
                                response: Some(response),
                                result,
                            },
                            notices,
                        ))
                    }
                    GateDecision::Cancelled => {
                        self.decline(&action);
                        Ok(TurnReport::new(
                            TurnOutcome::Declined {
                                response: Some(response),
                                action,
                            },
                            notices,
                        ))
                    }
                }
            }
        }
    }

    /// Validates the action of an otherwise usable reply. `Err` carries the retry hint.
    fn screen(&self, reply: ParsedReply) -> Result<(ParsedReply, Verdict), String> {
        let verdict = match &reply.action {
            Some(action) if action.requires_execution() => self.validator.validate(action),
            _ => Verdict::Approved,
        };
        match verdict {
            Verdict::Rejected(reason) => Err(messages::action_refused(&reason.to_string())),
            verdict => Ok((reply, verdict)),
        }
    }

    async fn execute(&mut self, action: &Action) -> ExecutionResult {
        self.transition(ControllerState::Executing);
        let result = self.executor.execute(action).await;
        self.history.append(ConversationTurn::system_action(messages::action_record(
            &result,
            self.settings.max_output_chars,
        )));
        self.transition(ControllerState::AwaitingInput);
        result
    }

    fn decline(&mut self, action: &Action) {
        tracing::info!("Declined: {}", action.describe());
        self.history
            .append(ConversationTurn::system_action(messages::declined_record(action)));
        self.transition(ControllerState::AwaitingInput);
    }

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            tracing::debug!("State: {} -> {}", self.state, next);
            self.state = next;
        }
    }
}
