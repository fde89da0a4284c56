//! Error types for the process bridge.

use super::StreamKind;

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The executable was not found.
    #[error("executable not found: {program}")]
    NotFound { program: String },
    /// Permission denied when spawning.
    #[error("permission denied: {program}")]
    PermissionDenied { program: String },
    /// The process started but one of its pipes was not available.
    #[error("{0} pipe not available")]
    MissingPipe(StreamKind),
    /// Other I/O error.
    #[error("failed to spawn {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    pub(crate) fn from_io(program: &str, err: std::io::Error) -> Self {
        let program = program.to_string();
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { program },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { program },
            _ => Self::Io {
                program,
                source: err,
            },
        }
    }
}

/// A non-EOF failure while reading one of the child's output streams.
///
/// Fatal to the bridge: the worker reports it on the error channel and every
/// channel closes afterwards.
#[derive(thiserror::Error, Debug)]
pub enum StreamReadError {
    /// A stdout line grew past the configured maximum.
    #[error("{stream} line exceeds maximum length of {max} bytes")]
    LineTooLong { stream: StreamKind, max: usize },
    /// The underlying read failed.
    #[error("{stream} read failed: {source}")]
    Io {
        stream: StreamKind,
        source: std::io::Error,
    },
}
