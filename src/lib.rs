//! tgsend - upload a file to Telegram and send it as a message
//!
//! The pipeline authenticates (reusing a stored session when possible),
//! streams the file in fixed-size parts with live speed reporting,
//! classifies it by extension, and sends it to the target peer.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod media;
pub mod session;
pub mod source;
pub mod transfer;
pub mod transport;
pub mod upload;

pub use config::{Settings, TransferRequest};
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::auth::{CredentialResponder, ScriptedResponder, TerminalResponder};
    pub use crate::config::{Settings, SourceSpec, TransferRequest};
    pub use crate::error::{Error, ErrorKind, Result, TransferError};
    pub use crate::session::{FileSessionStore, PhoneIdentity, SessionStore};
    pub use crate::source::SourceFile;
    pub use crate::transfer::{Delivery, Orchestrator, TransferState};
    pub use crate::transport::Transport;
}
