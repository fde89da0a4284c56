//! Child process bridge.
//!
//! [`ChildProcessBridge::start`] spawns the child with all three standard
//! streams piped and hands each pipe to its own worker task. The workers
//! wait on a one-shot start gate before touching their pipe; the gate is only
//! released once every pipe has been acquired and the process is confirmed
//! running, so no worker ever reads from or writes to a process that never
//! existed.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ProcessConfig;

use super::{BlockReader, BridgeChannels, LineScanner, SpawnError, StreamKind};

/// Lifecycle of the bridged child process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Liveness {
    /// Spawned, start gate not yet released.
    #[default]
    Starting,
    /// Running with all workers attached.
    Healthy,
    /// Start failed, a stream failed, or the child exited unsuccessfully.
    Failed,
    /// The child exited successfully.
    Terminated,
}

/// Owns a child process and exposes its standard streams as channels.
///
/// One bridge drives exactly one process for its whole lifetime. The child is
/// killed if the bridge is dropped while it is still running.
#[derive(Debug)]
pub struct ChildProcessBridge {
    child: Child,
    program: String,
    channels: BridgeChannels,
    gate: watch::Sender<Liveness>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    terminate_timeout: Duration,
}

impl ChildProcessBridge {
    /// Spawn `program` with `args` using default limits.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process or one of its pipes cannot be
    /// created.
    pub fn spawn<I, S>(program: &str, args: I) -> Result<Self, SpawnError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::start(&ProcessConfig::new(program).args(args))
    }

    /// Spawn the child described by `config` and wire up its workers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process or one of its pipes cannot be
    /// created. No worker ever touches a pipe in that case and the child, if
    /// it was created, is killed.
    pub fn start(config: &ProcessConfig) -> Result<Self, SpawnError> {
        let program = config.program.clone();

        let mut cmd = Command::new(&program);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| SpawnError::from_io(&program, e))?;

        let (stdin, stdout, stderr) =
            match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
                (stdin, stdout, _) => {
                    let missing = if stdin.is_none() {
                        StreamKind::Stdin
                    } else if stdout.is_none() {
                        StreamKind::Stdout
                    } else {
                        StreamKind::Stderr
                    };
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(error = %e, "Failed to kill child with missing pipe");
                    }
                    return Err(SpawnError::MissingPipe(missing));
                }
            };

        let capacity = config.channel_capacity.max(1);
        let (input_tx, input_rx) = mpsc::channel(capacity);
        let (output_tx, output_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(capacity);
        let (gate, gate_rx) = watch::channel(Liveness::Starting);
        let cancel = CancellationToken::new();

        let workers = vec![
            tokio::spawn(run_input_worker(
                stdin,
                input_rx,
                gate_rx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(run_output_worker(
                stdout,
                config.max_line_bytes,
                output_tx,
                error_tx.clone(),
                gate_rx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(run_error_worker(
                stderr,
                config.diagnostic_settle(),
                error_tx,
                gate_rx,
                cancel.clone(),
            )),
        ];

        let Some(pid) = child.id() else {
            gate.send_replace(Liveness::Failed);
            return Err(SpawnError::Io {
                program,
                source: std::io::Error::other("process exited before start"),
            });
        };

        gate.send_replace(Liveness::Healthy);
        tracing::info!(program = %program, pid, "Child process started");

        Ok(Self {
            child,
            program,
            channels: BridgeChannels::new(input_tx, output_rx, error_rx),
            gate,
            cancel,
            workers,
            terminate_timeout: config.terminate_timeout(),
        })
    }

    /// The executable this bridge spawned.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Current lifecycle state, polling the child without blocking.
    pub fn liveness(&mut self) -> Liveness {
        let gate = *self.gate.borrow();
        if gate != Liveness::Healthy {
            return gate;
        }
        if self.cancel.is_cancelled() {
            return Liveness::Failed;
        }
        match self.child.try_wait() {
            Ok(None) => Liveness::Healthy,
            Ok(Some(status)) if status.success() => Liveness::Terminated,
            Ok(Some(_)) | Err(_) => Liveness::Failed,
        }
    }

    /// The channels to talk to the child through.
    #[must_use]
    pub fn channels(&self) -> &BridgeChannels {
        &self.channels
    }

    /// Mutable access to the channels, needed to receive.
    pub fn channels_mut(&mut self) -> &mut BridgeChannels {
        &mut self.channels
    }

    /// Close the input channel, signalling end-of-input to the child.
    pub fn close_input(&mut self) {
        self.channels.close_input();
    }

    /// Wait for the child to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Terminate the child.
    ///
    /// On Unix, sends SIGTERM first, then SIGKILL after `timeout`.
    /// On other platforms, kills immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent or waiting fails.
    pub async fn terminate(&mut self, timeout: Duration) -> std::io::Result<ExitStatus> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
                if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
                    tracing::debug!(error = %e, pid, "Failed to send SIGTERM");
                }

                if let Ok(status) = tokio::time::timeout(timeout, self.child.wait()).await {
                    return status;
                }
                tracing::warn!(program = %self.program, pid, "Child ignored SIGTERM, killing");
            }
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
        }

        self.child.kill().await?;
        self.child.wait().await
    }

    /// Close stdin, give the child its grace period to exit, terminate it if it
    /// does not, then stop and join the workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be waited on or terminated.
    pub async fn shutdown(mut self) -> std::io::Result<ExitStatus> {
        self.channels.close_input();

        let status =
            if let Ok(status) = tokio::time::timeout(self.terminate_timeout, self.child.wait()).await {
                status?
            } else {
                tracing::debug!(program = %self.program, "Child still running after stdin closed");
                self.terminate(self.terminate_timeout).await?
            };

        self.cancel.cancel();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Bridge worker panicked");
            }
        }

        tracing::info!(program = %self.program, %status, "Child process exited");
        Ok(status)
    }
}

/// Block until the start gate is released. Returns whether the start succeeded.
async fn wait_for_start(gate: &mut watch::Receiver<Liveness>) -> bool {
    match gate.wait_for(|state| *state != Liveness::Starting).await {
        Ok(state) => *state == Liveness::Healthy,
        Err(_) => false,
    }
}

/// Send `message`, giving up if the bridge is cancelled first.
async fn forward(tx: &mpsc::Sender<String>, message: String, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;

        () = cancel.cancelled() => false,
        sent = tx.send(message) => sent.is_ok(),
    }
}

async fn write_line<W: AsyncWrite + Unpin>(pipe: &mut W, line: &str) -> std::io::Result<()> {
    pipe.write_all(line.as_bytes()).await?;
    pipe.write_all(b"\n").await?;
    pipe.flush().await
}

pub(crate) async fn run_input_worker<W>(
    mut pipe: W,
    mut rx: mpsc::Receiver<String>,
    mut gate: watch::Receiver<Liveness>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    if !wait_for_start(&mut gate).await {
        return;
    }

    loop {
        let line = tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        tracing::trace!(%line, "Writing to child stdin");
        if let Err(e) = write_line(&mut pipe, &line).await {
            tracing::warn!(error = %e, "Failed to write to child stdin");
            break;
        }
    }

    if let Err(e) = pipe.shutdown().await {
        tracing::debug!(error = %e, "Failed to close child stdin");
    }
}

pub(crate) async fn run_output_worker<R>(
    pipe: R,
    max_line_bytes: usize,
    tx: mpsc::Sender<String>,
    errors: mpsc::Sender<String>,
    mut gate: watch::Receiver<Liveness>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    if !wait_for_start(&mut gate).await {
        return;
    }

    let mut scanner = LineScanner::new(pipe, max_line_bytes);
    loop {
        let next = tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            next = scanner.next_line() => next,
        };

        match next {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                if !forward(&tx, line, &cancel).await {
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!("Child stdout reached end of stream");
                break;
            }
            Err(err) => {
                tracing::error!(error = %err, "Child stdout failed, closing bridge");
                if errors.send(err.to_string()).await.is_err() {
                    tracing::debug!("Error channel closed, stdout failure not reported");
                }
                cancel.cancel();
                break;
            }
        }
    }
}

pub(crate) async fn run_error_worker<R>(
    pipe: R,
    settle: Duration,
    tx: mpsc::Sender<String>,
    mut gate: watch::Receiver<Liveness>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    if !wait_for_start(&mut gate).await {
        return;
    }

    let mut blocks = BlockReader::with_settle(pipe, settle);
    loop {
        let next = tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            next = blocks.next_block() => next,
        };

        match next {
            Ok(Some(block)) => {
                if !forward(&tx, block, &cancel).await {
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!("Child stderr reached end of stream");
                break;
            }
            Err(err) => {
                tracing::error!(error = %err, "Child stderr failed, closing bridge");
                if tx.send(err.to_string()).await.is_err() {
                    tracing::debug!("Error channel closed, stderr failure not reported");
                }
                cancel.cancel();
                break;
            }
        }
    }
}
