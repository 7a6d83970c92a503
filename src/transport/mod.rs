//! Remote service backend
//!
//! The pipeline only talks to Telegram through the [`Transport`] trait:
//! - Authorization status and the interactive login primitives
//! - Session export for persistence
//! - Uploading file parts
//! - Peer lookup and sending a message with media
//!
//! Session encryption, framing and datacenter discovery belong to the
//! backend. The grammers backend is compiled with the `grammers` feature.

#[cfg(feature = "grammers")]
mod client;

#[cfg(feature = "grammers")]
pub use client::GrammersTransport;

use crate::dispatch::TransferId;
use crate::media::MediaDescriptor;
use crate::session::Session;
use crate::upload::UploadHandle;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Largest part the remote accepts
pub const MAX_PART_SIZE: usize = 512 * 1024;

/// Files above this size must be uploaded with the "big file" calls
pub const BIG_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Failure reported by the backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The remote answered with an error
    #[error("remote error: {0}")]
    Rpc(String),

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// The backend cannot perform this operation
    #[error("unsupported by backend: {0}")]
    Unsupported(String),
}

/// Authorization status of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthStatus {
    pub authorized: bool,
}

/// How the login code was delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    /// Human readable delivery channel ("app", "sms", ...)
    pub delivery: String,
}

/// Terms of service the remote asks a new user to accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsOfService {
    pub id: String,
    pub text: String,
}

/// Profile for a first-time account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupProfile {
    pub first_name: String,
    pub last_name: String,
}

/// What the remote answered to a submitted login code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    Authorized,
    PasswordRequired { hint: Option<String> },
    SignUpRequired { terms: Option<TermsOfService> },
}

/// One part of a chunked upload
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub file_id: i64,
    pub index: u32,
    pub total_parts: u32,
    /// Total file size, lets the backend pick small or big file calls
    pub file_size: u64,
    pub bytes: Bytes,
}

/// Resolved destination of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    /// The account's own "Saved Messages"
    SavedMessages,
    User { id: i64, access_hash: i64 },
    Chat { id: i64 },
    Channel { id: i64, access_hash: i64 },
}

/// A message carrying uploaded media
#[derive(Debug)]
pub struct OutgoingMedia<'a> {
    pub peer: &'a Peer,
    pub upload: UploadHandle,
    pub media: &'a MediaDescriptor,
    pub caption: &'a str,
    pub transfer_id: TransferId,
}

/// Remote acknowledgement of a sent message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub transfer_id: TransferId,
    /// Message id when the backend reports one
    pub message_id: Option<i32>,
}

/// Capability surface of the remote messaging service
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the loaded session is already authorized
    async fn auth_status(&self) -> Result<AuthStatus, TransportError>;

    /// Ask the remote to deliver a login code for `phone`
    async fn send_code(&self, phone: &str) -> Result<SentCode, TransportError>;

    /// Submit the login code
    async fn submit_code(&self, code: &str) -> Result<SignInOutcome, TransportError>;

    /// Submit the two-factor password
    async fn submit_password(&self, password: &str) -> Result<(), TransportError>;

    /// Accept the terms of service with the given id
    async fn accept_terms(&self, terms_id: &str) -> Result<(), TransportError>;

    /// Register a new account
    async fn sign_up(&self, profile: &SignupProfile) -> Result<(), TransportError>;

    /// Serialize the current session for persistence
    async fn export_session(&self) -> Result<Session, TransportError>;

    /// Transmit one file part
    async fn upload_part(&self, part: UploadPart) -> Result<(), TransportError>;

    /// Look up a target identifier ("me", a username or a numeric id)
    async fn resolve_peer(&self, target: &str) -> Result<Peer, TransportError>;

    /// Send a message wrapping uploaded media
    async fn send_media(&self, message: OutgoingMedia<'_>) -> Result<Confirmation, TransportError>;
}

/// True for targets meaning the account's own saved messages
pub fn is_self_target(target: &str) -> bool {
    let target = target.trim();
    target.is_empty() || target.eq_ignore_ascii_case("me") || target.eq_ignore_ascii_case("self")
}
