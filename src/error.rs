//! Error types.
//!
//! Record-level failures carry the entry's DN so that a single bad directory
//! entry can be tracked down from the log.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Failure of one run stage.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    /// The account source could not be reached or queried.
    #[error("account source {target} unavailable: {source}")]
    SourceUnavailable {
        /// Directory URL or fixture path.
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A record lacks a required attribute or its address has no domain.
    #[error("malformed record {dn}: {reason}")]
    MalformedRecord { dn: String, reason: MalformedReason },

    /// A status value outside active/closed/locked/maintenance/pending.
    #[error("record {dn} has unknown account status '{status}'")]
    UnknownStatus { dn: String, status: String },

    /// The report could not be written.
    #[error("failed to write report to {}: {source}", path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The report could not be sent.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SummaryError {
    /// Whether the error concerns a single record and may be skipped.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            SummaryError::MalformedRecord { .. } | SummaryError::UnknownStatus { .. }
        )
    }
}

/// Why a record was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    MissingAttribute(String),
    AddressWithoutDomain(String),
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::MissingAttribute(name) => {
                write!(f, "missing attribute '{}'", name)
            }
            MalformedReason::AddressWithoutDomain(address) => {
                write!(f, "address '{}' is not of the form user@domain", address)
            }
        }
    }
}

/// Mail relay failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error talking to mail relay: {0}")]
    Io(#[from] io::Error),

    /// Relay answered with a non-success reply.
    #[error("SMTP error {code}: {message}")]
    Smtp { code: u16, message: String },

    /// Relay sent something that is not a valid SMTP reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("mail relay does not support {0}")]
    NotSupported(String),

    #[error("timed out after {0}s waiting for mail relay")]
    Timeout(u64),
}

impl TransportError {
    /// Creates an SMTP error from a reply code and message.
    pub fn smtp(code: u16, message: impl Into<String>) -> Self {
        TransportError::Smtp {
            code,
            message: message.into(),
        }
    }
}
