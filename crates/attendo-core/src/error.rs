// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Attendo.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all Attendo operations.
#[derive(Debug, Error)]
pub enum AttendoError {
    // -- Transport errors --
    #[error("not connected to the print daemon")]
    NotConnected,

    #[error("print daemon transport failed: {0}")]
    Transport(String),

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    // -- Protocol errors --
    #[error("print daemon rejected {operation} (code {code}): {message}")]
    Daemon {
        operation: String,
        code: i64,
        message: String,
    },

    #[error("malformed daemon message: {0}")]
    Protocol(String),

    // -- Sequencing errors --
    #[error("printer session is not ready")]
    NotReady,

    #[error("printer subsystem has not been initialised")]
    SdkNotInitialised,

    #[error("printer {0} is not available")]
    DeviceUnavailable(String),

    #[error("a print job is already in progress")]
    JobInProgress,

    #[error("operation {0} is not supported by the connected print daemon")]
    Unsupported(String),

    // -- Job errors --
    #[error("print job did not complete within {}s", .after.as_secs())]
    JobTimedOut { after: Duration },

    #[error("print job failed during {step} (code {code}): {message}")]
    JobFailed {
        step: String,
        code: i64,
        message: String,
    },

    // -- Check-in collaborators --
    #[error("participant {0} not found")]
    ParticipantNotFound(String),

    #[error("not authorized")]
    Unauthorized,

    #[error("participant store error: {0}")]
    Store(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AttendoError {
    /// Daemon error code carried by this error, if any.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Daemon { code, .. } | Self::JobFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AttendoError>;
