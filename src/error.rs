//! Error types for server initialization.
//!
//! Every variant is fatal for the startup sequence. A script that fails with
//! `continueOnFail` set, or a missing default script, is not an error and
//! never shows up here.

use std::fmt;

use crate::types::ScriptName;

/// Errors that abort server initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerInitError {
    /// An explicitly configured script did not resolve to a file.
    ScriptNotFound(ScriptName),

    /// A script reported `pass: false` without `continueOnFail: true`.
    ScriptFailed(ScriptName),

    /// The script's `result` export is missing or does not have the expected shape.
    MalformedResult { script: ScriptName, reason: String },

    /// The module loader could not load or evaluate the script.
    LoadFailed { script: ScriptName, reason: String },

    /// The configuration document could not be read or parsed.
    Config(String),

    /// Internal error occurred.
    Internal(String),
}

impl fmt::Display for ServerInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScriptNotFound(name) => {
                write!(f, "Server initialization script not found: {}", name)
            }
            Self::ScriptFailed(name) => {
                write!(f, "Server initialization script failed: {}", name)
            }
            Self::MalformedResult { script, reason } => {
                write!(f, "Malformed script result from {}: {}", script, reason)
            }
            Self::LoadFailed { script, reason } => {
                write!(f, "Failed to load script {}: {}", script, reason)
            }
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ServerInitError {}

/// Result type for server initialization.
pub type ServerInitResult<T> = Result<T, ServerInitError>;

impl From<anyhow::Error> for ServerInitError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl ServerInitError {
    /// The script this error is attributed to, if any.
    pub fn script(&self) -> Option<&ScriptName> {
        match self {
            Self::ScriptNotFound(name) | Self::ScriptFailed(name) => Some(name),
            Self::MalformedResult { script, .. } | Self::LoadFailed { script, .. } => Some(script),
            Self::Config(_) | Self::Internal(_) => None,
        }
    }
}
