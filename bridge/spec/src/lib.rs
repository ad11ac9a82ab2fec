//! Bridge wire records and decode rules.
//!
//! The controller and the executor never share memory. They agree on two JSON
//! documents instead: a command written by the controller and a response
//! written by the executor. Decoding validates the fields each command variant
//! requires, so a malformed command is rejected here and never reaches
//! dispatch.
#![deny(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// File name of the command channel inside the bridge directory.
pub const COMMAND_FILE: &str = "command.json";

/// File name of the response channel inside the bridge directory.
pub const RESPONSE_FILE: &str = "response.json";

/// Success marker returned for actions that produce no output.
pub const EXECUTED_MARKER: &str = "Action executed successfully.";

/// Optional parameters attached to a query.
pub type QueryParams = Map<String, Value>;

/// Errors raised while decoding a channel record.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not a complete JSON document of the expected shape.
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A field required by the command variant is absent.
    #[error("{kind} command is missing `{field}`")]
    MissingField {
        /// Command variant being decoded.
        kind: CommandKind,
        /// Name of the absent field.
        field: &'static str,
    },
    /// A field that belongs to the other command variant is present.
    #[error("{kind} command carries unexpected `{field}`")]
    UnexpectedField {
        /// Command variant being decoded.
        kind: CommandKind,
        /// Name of the stray field.
        field: &'static str,
    },
}

impl DecodeError {
    /// Whether the bytes are complete JSON that can never decode, as opposed to
    /// a write that may still be in progress.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Malformed(err) => err.is_data(),
            Self::MissingField { .. } | Self::UnexpectedField { .. } => true,
        }
    }
}

/// A record that lives in one of the two single-slot channels.
pub trait Record: Sized {
    /// File name of the channel this record travels through.
    const CHANNEL: &'static str;

    /// Serialize the record into its on-disk bytes.
    fn encode(&self) -> Result<Vec<u8>, serde_json::Error>;

    /// Parse and validate on-disk bytes.
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError>;
}

/// Discriminant of a command on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Run an opaque action descriptor in the host.
    #[serde(rename = "EXECUTE_CODE")]
    ExecuteCode,
    /// Resolve a named query against the host.
    #[serde(rename = "READ_DATA")]
    ReadData,
}

impl CommandKind {
    /// Wire tag for the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExecuteCode => "EXECUTE_CODE",
            Self::ReadData => "READ_DATA",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request submitted by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Execute an action descriptor in the host's native context.
    ExecuteCode {
        /// Action text, interpreted by the executor capability.
        code: String,
    },
    /// Resolve a query by name.
    ReadData {
        /// Query identifier.
        query: String,
        /// Optional query parameters.
        params: Option<QueryParams>,
    },
}

impl Command {
    /// Build an action command.
    pub fn execute(code: impl Into<String>) -> Self {
        Self::ExecuteCode { code: code.into() }
    }

    /// Build a query command without parameters.
    pub fn read(query: impl Into<String>) -> Self {
        Self::ReadData {
            query: query.into(),
            params: None,
        }
    }

    /// Build a query command with parameters.
    pub fn read_with(query: impl Into<String>, params: QueryParams) -> Self {
        Self::ReadData {
            query: query.into(),
            params: Some(params),
        }
    }

    /// Wire discriminant of this command.
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::ExecuteCode { .. } => CommandKind::ExecuteCode,
            Self::ReadData { .. } => CommandKind::ReadData,
        }
    }

    /// Short single-line description for logs.
    pub fn summary(&self) -> String {
        const MAX: usize = 80;
        let text = match self {
            Self::ExecuteCode { code } => code.as_str(),
            Self::ReadData { query, .. } => query.as_str(),
        };
        let line = text.lines().next().unwrap_or_default();
        if line.chars().count() > MAX || line.len() != text.len() {
            let cut: String = line.chars().take(MAX).collect();
            format!("{} {cut}…", self.kind())
        } else {
            format!("{} {line}", self.kind())
        }
    }
}

/// Flat on-disk shape of a command before per-variant validation.
#[derive(Debug, Serialize, Deserialize)]
struct CommandRecord {
    #[serde(rename = "type")]
    kind: CommandKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<QueryParams>,
}

impl From<&Command> for CommandRecord {
    fn from(command: &Command) -> Self {
        match command {
            Command::ExecuteCode { code } => Self {
                kind: CommandKind::ExecuteCode,
                code: Some(code.clone()),
                query: None,
                params: None,
            },
            Command::ReadData { query, params } => Self {
                kind: CommandKind::ReadData,
                code: None,
                query: Some(query.clone()),
                params: params.clone(),
            },
        }
    }
}

impl TryFrom<CommandRecord> for Command {
    type Error = DecodeError;

    fn try_from(record: CommandRecord) -> Result<Self, Self::Error> {
        let kind = record.kind;
        match kind {
            CommandKind::ExecuteCode => {
                if record.query.is_some() {
                    return Err(DecodeError::UnexpectedField {
                        kind,
                        field: "query",
                    });
                }
                if record.params.is_some() {
                    return Err(DecodeError::UnexpectedField {
                        kind,
                        field: "params",
                    });
                }
                let code = record
                    .code
                    .ok_or(DecodeError::MissingField { kind, field: "code" })?;
                Ok(Self::ExecuteCode { code })
            }
            CommandKind::ReadData => {
                if record.code.is_some() {
                    return Err(DecodeError::UnexpectedField {
                        kind,
                        field: "code",
                    });
                }
                let query = record.query.ok_or(DecodeError::MissingField {
                    kind,
                    field: "query",
                })?;
                Ok(Self::ReadData {
                    query,
                    params: record.params,
                })
            }
        }
    }
}

impl Record for Command {
    const CHANNEL: &'static str = COMMAND_FILE;

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&CommandRecord::from(self))
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let record: CommandRecord = serde_json::from_slice(bytes)?;
        Self::try_from(record)
    }
}

/// Outcome discriminant of a response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The command completed; `data` holds its result.
    Success,
    /// The command failed or the exchange did not complete; `data` describes why.
    Error,
}

impl Status {
    /// Wire tag for the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome written by the executor for exactly one command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    /// Success or error.
    pub status: Status,
    /// Result value on success, human-readable description on error.
    pub data: Value,
}

impl Response {
    /// Successful response carrying `data`.
    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            status: Status::Success,
            data: data.into(),
        }
    }

    /// Error response carrying a description.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: Value::String(message.into()),
        }
    }

    /// Whether the response reports success.
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

impl Record for Response {
    const CHANNEL: &'static str = RESPONSE_FILE;

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Renders the response as the JSON string handed back to agents.
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}
