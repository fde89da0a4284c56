//! Caller-facing ends of the bridge channels.

use tokio::sync::mpsc;

/// The three message conduits of a running bridge.
///
/// `input` carries lines for the child's stdin, `output` one message per
/// non-empty stdout line, `error` one message per stderr read cycle.
#[derive(Debug)]
pub struct BridgeChannels {
    pub(crate) input: Option<mpsc::Sender<String>>,
    pub(crate) output: mpsc::Receiver<String>,
    pub(crate) error: mpsc::Receiver<String>,
}

impl BridgeChannels {
    /// Assemble channels from raw parts.
    ///
    /// Useful for driving sessions against something other than a child
    /// process.
    #[must_use]
    pub fn new(
        input: mpsc::Sender<String>,
        output: mpsc::Receiver<String>,
        error: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            input: Some(input),
            output,
            error,
        }
    }

    /// Queue a line for the child's stdin.
    ///
    /// Returns `false` if the input channel is closed, either by the caller or
    /// because the writer stopped.
    pub async fn send(&self, line: impl Into<String>) -> bool {
        match &self.input {
            Some(input) => input.send(line.into()).await.is_ok(),
            None => false,
        }
    }

    /// Close the input channel. The child sees end-of-input once queued lines
    /// are written.
    pub fn close_input(&mut self) {
        if self.input.take().is_some() {
            tracing::debug!("Input channel closed by caller");
        }
    }

    /// Whether lines can still be queued.
    #[must_use]
    pub fn is_input_open(&self) -> bool {
        self.input.as_ref().is_some_and(|input| !input.is_closed())
    }

    /// Receive the next stdout line. `None` once the output stream ended.
    pub async fn recv_output(&mut self) -> Option<String> {
        self.output.recv().await
    }

    /// Receive the next stderr block. `None` once the error stream ended.
    pub async fn recv_error(&mut self) -> Option<String> {
        self.error.recv().await
    }
}
