//! Error types for tgsend
//!
//! One enum covers every stage of a transfer. [`ErrorKind`] is the
//! payload-free mirror used when reporting a failed pipeline state.

use crate::transport::TransportError;
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a transfer can end with
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid required input
    #[error("configuration error: {0}")]
    Config(String),

    /// A remote authentication step failed
    #[error("authentication failed: {0}")]
    AuthFailed(#[source] TransportError),

    /// The user declined the terms of service
    #[error("terms of service were not accepted")]
    TermsRejected,

    /// The credential responder failed or answered the wrong question
    #[error("input error: {0}")]
    Input(String),

    /// Reading the local source failed or it did not match its declared size
    #[error("failed to read source: {0}")]
    SourceRead(String),

    /// A part was rejected by the remote or the network failed
    #[error("failed to transmit part {part}: {source}")]
    Transmit {
        part: u32,
        #[source]
        source: TransportError,
    },

    /// The execution context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// The file was uploaded but the message could not be sent
    #[error("file uploaded but not delivered: {0}")]
    Send(#[source] TransportError),

    /// Target peer lookup failed
    #[error("failed to resolve target '{target}': {source}")]
    PeerResolution {
        target: String,
        #[source]
        source: TransportError,
    },

    /// Session store I/O failure
    #[error("session store error: {0}")]
    Session(String),

    /// Downloading a remote source failed
    #[error("download failed: {0}")]
    Download(String),

    /// Plain I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Payload-free classification of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    AuthFailed,
    TermsRejected,
    Input,
    SourceRead,
    Transmit,
    Cancelled,
    Send,
    PeerResolution,
    Session,
    Download,
    Io,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::AuthFailed(_) => ErrorKind::AuthFailed,
            Error::TermsRejected => ErrorKind::TermsRejected,
            Error::Input(_) => ErrorKind::Input,
            Error::SourceRead(_) => ErrorKind::SourceRead,
            Error::Transmit { .. } => ErrorKind::Transmit,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Send(_) => ErrorKind::Send,
            Error::PeerResolution { .. } => ErrorKind::PeerResolution,
            Error::Session(_) => ErrorKind::Session,
            Error::Download(_) => ErrorKind::Download,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

/// Pipeline stage an error surfaced in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Source,
    Authenticating,
    Resolving,
    Uploading,
    Classifying,
    Dispatching,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Source => "source",
            Stage::Authenticating => "authentication",
            Stage::Resolving => "target resolution",
            Stage::Uploading => "upload",
            Stage::Classifying => "classification",
            Stage::Dispatching => "dispatch",
        };
        f.write_str(name)
    }
}

/// An [`Error`] with the stage it happened in
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct TransferError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl TransferError {
    pub fn new(stage: Stage, source: Error) -> Self {
        TransferError { stage, source }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// True when the bytes reached the remote but no message was sent
    pub fn is_undelivered(&self) -> bool {
        matches!(self.source, Error::Send(_))
    }
}
