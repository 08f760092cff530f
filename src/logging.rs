//! Leveled logging for the initialization run.
//!
//! Events go through `tracing` under the `server_init` target. The `silent`
//! option is enforced here rather than in the subscriber, so a host with a
//! verbose global filter still gets a quiet startup.

use std::fmt::Display;

pub const LOG_TARGET: &str = "server_init";

/// How much of the run is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Warnings and errors only.
    Silent,
    /// Everything, including progress and success messages.
    Normal,
}

impl Verbosity {
    pub fn from_silent(silent: bool) -> Self {
        if silent { Self::Silent } else { Self::Normal }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InitLogger {
    verbosity: Verbosity,
}

impl InitLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn info(&self, message: impl Display) {
        if self.verbosity == Verbosity::Normal {
            tracing::info!(target: LOG_TARGET, "{}", message);
        }
    }

    pub fn success(&self, message: impl Display) {
        if self.verbosity == Verbosity::Normal {
            tracing::info!(target: LOG_TARGET, status = "success", "{}", message);
        }
    }

    pub fn warn(&self, message: impl Display) {
        tracing::warn!(target: LOG_TARGET, "{}", message);
    }

    pub fn error(&self, message: impl Display) {
        tracing::error!(target: LOG_TARGET, "{}", message);
    }
}
