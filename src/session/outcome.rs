//! Classification of stdout lines and the default payload type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Structured result written by the child as a single stdout line.
///
/// Every field is optional on the wire, so `{}` decodes to an empty payload.
/// The capitalised `Kind`/`Data` spellings are accepted as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsePayload {
    /// Discriminator naming the message kind.
    #[serde(alias = "Kind")]
    pub kind: String,
    /// Child-defined data section.
    #[serde(alias = "Data")]
    pub data: serde_json::Value,
}

impl ResponsePayload {
    /// True when the data section is absent, `null` or `{}`.
    #[must_use]
    pub fn data_is_empty(&self) -> bool {
        match &self.data {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

/// What a single stdout line means to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome<P> {
    /// The terminator token: the response ended without a payload.
    Terminator,
    /// The line decoded as the expected payload.
    Payload(P),
    /// Anything else: ordinary log output from the child.
    LogLine(String),
}

impl<P: DeserializeOwned> LineOutcome<P> {
    /// Classify `line` against `terminator`.
    ///
    /// Only a JSON object can be a payload. A decode failure is never an
    /// error here; it simply makes the line a log line.
    #[must_use]
    pub fn classify(line: &str, terminator: &str) -> Self {
        if line == terminator {
            return Self::Terminator;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value @ serde_json::Value::Object(_)) => match serde_json::from_value::<P>(value) {
                Ok(payload) => Self::Payload(payload),
                Err(e) => {
                    tracing::trace!(error = %e, "Output object is not a payload");
                    Self::LogLine(line.to_string())
                }
            },
            Ok(_) => Self::LogLine(line.to_string()),
            Err(e) => {
                tracing::trace!(error = %e, "Output line is not JSON");
                Self::LogLine(line.to_string())
            }
        }
    }
}
