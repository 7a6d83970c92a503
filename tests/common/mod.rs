#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;
use tgsend::config::{SourceSpec, TransferRequest};
use tgsend::dispatch::TransferId;
use tgsend::error::{Error, Result};
use tgsend::session::{PhoneIdentity, Session, SessionStore};
use tgsend::transport::{
    AuthStatus, Confirmation, OutgoingMedia, Peer, SentCode, SignInOutcome, SignupProfile,
    Transport, TransportError, UploadPart,
};
use tgsend::upload::{ProgressSink, ProgressSnapshot};

pub const PHONE: &str = "+1 555 0100";
pub const PART_SIZE: usize = 512 * 1024;

/// What the mock saw of one sent message
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub peer: Peer,
    pub file_id: i64,
    pub parts: u32,
    pub name: String,
    pub mime_type: String,
    pub caption: String,
    pub transfer_id: TransferId,
}

/// In-memory remote recording every call
#[derive(Default)]
pub struct MockTransport {
    pub authorized: bool,
    /// Code accepted by `submit_code`; anything else is rejected
    pub valid_code: String,
    /// `upload_part` fails for this part index
    pub fail_part: Option<u32>,
    pub fail_send: bool,
    /// Delay applied to every part
    pub part_delay: Option<Duration>,

    pub auth_calls: AtomicUsize,
    pub parts: Mutex<Vec<UploadPart>>,
    pub sent: Mutex<Vec<SentMessage>>,
}

impl MockTransport {
    pub fn authorized() -> Self {
        MockTransport {
            authorized: true,
            ..Default::default()
        }
    }

    pub fn needs_login(code: &str) -> Self {
        MockTransport {
            valid_code: code.to_string(),
            ..Default::default()
        }
    }

    pub fn part_count(&self) -> usize {
        self.parts.lock().len()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.parts.lock().iter().map(|p| p.bytes.len() as u64).sum()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn auth_status(&self) -> std::result::Result<AuthStatus, TransportError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AuthStatus {
            authorized: self.authorized,
        })
    }

    async fn send_code(&self, _phone: &str) -> std::result::Result<SentCode, TransportError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SentCode {
            delivery: "app".to_string(),
        })
    }

    async fn submit_code(&self, code: &str) -> std::result::Result<SignInOutcome, TransportError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if code == self.valid_code {
            Ok(SignInOutcome::Authorized)
        } else {
            Err(TransportError::Rpc("PHONE_CODE_INVALID".to_string()))
        }
    }

    async fn submit_password(&self, _password: &str) -> std::result::Result<(), TransportError> {
        Err(TransportError::Rpc("PASSWORD_HASH_INVALID".to_string()))
    }

    async fn accept_terms(&self, _terms_id: &str) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    async fn sign_up(&self, _profile: &SignupProfile) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    async fn export_session(&self) -> std::result::Result<Session, TransportError> {
        Ok(Session::new(b"mock-session".to_vec()))
    }

    async fn upload_part(&self, part: UploadPart) -> std::result::Result<(), TransportError> {
        if let Some(delay) = self.part_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_part == Some(part.index) {
            return Err(TransportError::Network("connection reset".to_string()));
        }
        self.parts.lock().push(part);
        Ok(())
    }

    async fn resolve_peer(&self, target: &str) -> std::result::Result<Peer, TransportError> {
        match target {
            "me" => Ok(Peer::SavedMessages),
            "@channel" => Ok(Peer::Channel {
                id: 42,
                access_hash: 7,
            }),
            other => Err(TransportError::Rpc(format!("USERNAME_NOT_OCCUPIED: {}", other))),
        }
    }

    async fn send_media(
        &self,
        message: OutgoingMedia<'_>,
    ) -> std::result::Result<Confirmation, TransportError> {
        if self.fail_send {
            return Err(TransportError::Rpc("CHAT_WRITE_FORBIDDEN".to_string()));
        }
        let mut sent = self.sent.lock();
        sent.push(SentMessage {
            peer: message.peer.clone(),
            file_id: message.upload.file_id,
            parts: message.upload.parts,
            name: message.upload.name.clone(),
            mime_type: message.media.mime_type.clone(),
            caption: message.caption.to_string(),
            transfer_id: message.transfer_id,
        });
        Ok(Confirmation {
            transfer_id: message.transfer_id,
            message_id: Some(sent.len() as i32),
        })
    }
}

/// Session store kept in memory
#[derive(Default)]
pub struct MemoryStore {
    pub sessions: Mutex<HashMap<String, Session>>,
}

impl MemoryStore {
    pub fn saved(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, identity: &PhoneIdentity) -> Result<Option<Session>> {
        Ok(self.sessions.lock().get(identity.as_str()).cloned())
    }

    fn save(&self, identity: &PhoneIdentity, session: &Session) -> Result<()> {
        self.sessions
            .lock()
            .insert(identity.as_str().to_string(), session.clone());
        Ok(())
    }
}

/// Sink recording every sample it is given
#[derive(Default)]
pub struct RecordingSink {
    pub samples: Mutex<Vec<ProgressSnapshot>>,
    pub finished: Mutex<Option<(ProgressSnapshot, bool)>>,
}

impl ProgressSink for RecordingSink {
    fn update(&self, snapshot: &ProgressSnapshot) {
        self.samples.lock().push(*snapshot);
    }

    fn finish(&self, snapshot: &ProgressSnapshot, success: bool) {
        *self.finished.lock() = Some((*snapshot, success));
    }
}

/// Temporary file of `size` bytes with the given suffix
pub fn temp_source(size: usize, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp file");
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    file.write_all(&data).expect("Failed to write temp file");
    file
}

pub fn request_for(path: PathBuf) -> TransferRequest {
    TransferRequest {
        api_id: 12345,
        api_hash: "0123456789abcdef".to_string(),
        phone: PHONE.to_string(),
        source: SourceSpec::File(path),
        target: "me".to_string(),
        caption: None,
        part_size: PART_SIZE,
        session_dir: PathBuf::from("sessions"),
    }
}

pub fn is_kind(err: &Error, kind: tgsend::error::ErrorKind) -> bool {
    err.kind() == kind
}
