//! Configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bound for each bridge channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default maximum length of a single stdout line, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How to launch the child process.
    pub process: ProcessConfig,
    /// Line protocol tokens used by command sessions.
    pub protocol: ProtocolConfig,
    /// Terminal rendering of child output.
    pub display: DisplayConfig,
}

/// Child process launch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Executable to spawn.
    pub program: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory for the child, if different from ours.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables for the child.
    ///
    /// These are layered on top of the inherited environment; nothing is
    /// written to our own process environment.
    pub env: BTreeMap<String, String>,
    /// Bound of the input, output and error channels.
    pub channel_capacity: usize,
    /// Longest stdout line accepted before the bridge fails.
    pub max_line_bytes: usize,
    /// Grace period between closing stdin and killing the child.
    pub terminate_timeout_ms: u64,
    /// Quiet period on stderr that ends one diagnostic block.
    pub diagnostic_settle_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            terminate_timeout_ms: 5000,
            diagnostic_settle_ms: 50,
        }
    }
}

impl ProcessConfig {
    /// Create a launch configuration for `program` with default limits.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory for the child.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the maximum stdout line length.
    #[must_use]
    pub fn max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }

    /// Set the channel bound.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Grace period used by `shutdown`.
    #[must_use]
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    /// Quiet period that ends a stderr block.
    #[must_use]
    pub fn diagnostic_settle(&self) -> Duration {
        Duration::from_millis(self.diagnostic_settle_ms)
    }
}

/// Tokens of the line protocol spoken with the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Suffix appended to a command to form its terminator line.
    pub terminator_suffix: String,
    /// Fixed terminator line, overriding the suffix rule.
    pub terminator: Option<String>,
    /// Sent after a payload has been decoded.
    pub ack: String,
    /// Sent after a diagnostic aborted the session.
    pub abort_ack: Option<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            terminator_suffix: "_DONE".to_string(),
            terminator: None,
            ack: "END".to_string(),
            abort_ack: Some("END_EARLY".to_string()),
        }
    }
}

impl ProtocolConfig {
    /// Terminator line that ends the response to `command`.
    #[must_use]
    pub fn terminator_for(&self, command: &str) -> String {
        match &self.terminator {
            Some(fixed) => fixed.clone(),
            None => format!("{command}{}", self.terminator_suffix),
        }
    }
}

/// Display settings for decorated output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Prefix naming the child, e.g. `(Node.js)`.
    pub source_label: String,
    /// Emit ANSI colors.
    pub color: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            source_label: "(child)".to_string(),
            color: true,
        }
    }
}
