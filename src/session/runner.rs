//! One request/response exchange over a bridge.
//!
//! [`CommandSession::drive`] writes a command to the child and then watches
//! stdout and stderr, whichever speaks first:
//!
//! - the terminator line completes the session without a payload;
//! - a line that decodes as the payload completes it, after acknowledging;
//! - any other stdout line is log text and is forwarded to the sink;
//! - any stderr block aborts the session and is forwarded verbatim.
//!
//! A child usually follows its payload with the terminator line. That line
//! arrives after the session has already completed, so the next session on
//! the same channels discards it before reading anything else.

use serde::de::DeserializeOwned;

use crate::bridge::{BridgeChannels, StreamKind};
use crate::config::ProtocolConfig;
use crate::display::{LogSink, ResponseDecorator};
use crate::session::{LineOutcome, SessionState, SessionStateMachine, SessionStats, TerminalState};

/// Error type for session operations.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// The command could not be queued because the input channel is closed.
    #[error("input channel closed, cannot send {command:?}")]
    InputClosed { command: String },
}

/// Result of a driven session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome<P> {
    /// Decoded payload, if the child sent one.
    pub payload: Option<P>,
    /// Diagnostic text from stderr that aborted the session.
    pub diagnostic: Option<String>,
    pub state: TerminalState,
    pub stats: SessionStats,
}

impl<P> SessionOutcome<P> {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == TerminalState::Completed
    }
}

/// Drives commands through a bridge using a fixed protocol and sink.
///
/// Every call to [`drive`](Self::drive) is an independent session with its
/// own state machine.
#[derive(Debug)]
pub struct CommandSession<S> {
    protocol: ProtocolConfig,
    decorator: ResponseDecorator,
    sink: S,
    /// Terminator still owed by the child after a payload completed.
    trailing_terminator: Option<String>,
}

impl<S: LogSink> CommandSession<S> {
    #[must_use]
    pub fn new(protocol: ProtocolConfig, decorator: ResponseDecorator, sink: S) -> Self {
        Self {
            protocol,
            decorator,
            sink,
            trailing_terminator: None,
        }
    }

    #[must_use]
    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    #[must_use]
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Send `command` and read until the child completes or aborts.
    ///
    /// If both output streams close before either happens, the session is
    /// reported as aborted without diagnostic text.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InputClosed` if the command cannot be queued.
    pub async fn drive<P: DeserializeOwned>(
        &mut self,
        channels: &mut BridgeChannels,
        command: &str,
    ) -> Result<SessionOutcome<P>, SessionError> {
        let terminator = self.protocol.terminator_for(command);
        let mut machine = SessionStateMachine::new();
        let mut stale_terminator = self.trailing_terminator.take();

        tracing::debug!(%command, %terminator, "Sending command");
        if !channels.send(command).await {
            return Err(SessionError::InputClosed {
                command: command.to_string(),
            });
        }
        machine.transition(SessionState::AwaitingResponse);

        let mut output_open = true;
        let mut error_open = true;

        loop {
            tokio::select! {
                line = channels.output.recv(), if output_open => {
                    let Some(line) = line else {
                        tracing::debug!("Output channel closed");
                        output_open = false;
                        continue;
                    };

                    if let Some(stale) = stale_terminator.take() {
                        if line == stale {
                            tracing::debug!(%stale, "Discarding terminator of previous command");
                            continue;
                        }
                    }

                    match LineOutcome::<P>::classify(&line, &terminator) {
                        LineOutcome::Terminator => {
                            tracing::debug!(%command, "Terminator received");
                            machine.finish(TerminalState::Completed);
                            return Ok(finished(&machine, None, None, TerminalState::Completed));
                        }
                        LineOutcome::Payload(payload) => {
                            tracing::debug!(%command, "Payload received");
                            self.acknowledge(channels, &self.protocol.ack).await;
                            machine.finish(TerminalState::Completed);
                            self.trailing_terminator = Some(terminator);
                            return Ok(finished(
                                &machine,
                                Some(payload),
                                None,
                                TerminalState::Completed,
                            ));
                        }
                        LineOutcome::LogLine(line) => {
                            machine.record_log_line();
                            self.sink
                                .emit(StreamKind::Stdout, &self.decorator.format(StreamKind::Stdout, &line));
                        }
                    }
                }
                block = channels.error.recv(), if error_open => {
                    let Some(block) = block else {
                        tracing::debug!("Error channel closed");
                        error_open = false;
                        continue;
                    };

                    tracing::warn!(%command, "Child reported a diagnostic, aborting session");
                    machine.finish(TerminalState::Aborted);
                    if let Some(abort_ack) = self.protocol.abort_ack.as_deref() {
                        self.acknowledge(channels, abort_ack).await;
                    }
                    self.sink
                        .emit(StreamKind::Stderr, &self.decorator.format(StreamKind::Stderr, &block));
                    return Ok(finished(&machine, None, Some(block), TerminalState::Aborted));
                }
                else => {
                    tracing::warn!(%command, "Child closed its streams without responding");
                    machine.finish(TerminalState::Aborted);
                    return Ok(finished(&machine, None, None, TerminalState::Aborted));
                }
            }
        }
    }

    /// Send a protocol token; an empty token means none is sent.
    async fn acknowledge(&self, channels: &BridgeChannels, token: &str) {
        if token.is_empty() {
            return;
        }
        if !channels.send(token).await {
            tracing::debug!(%token, "Input closed, acknowledgement not sent");
        }
    }
}

fn finished<P>(
    machine: &SessionStateMachine,
    payload: Option<P>,
    diagnostic: Option<String>,
    state: TerminalState,
) -> SessionOutcome<P> {
    SessionOutcome {
        payload,
        diagnostic,
        state,
        stats: machine.stats(),
    }
}
