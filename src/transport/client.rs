//! Telegram backend built on grammers
//!
//! Login goes through the high-level client. File parts and the final
//! message use raw TL calls so the pipeline controls part numbering and
//! the message random id.

use super::{
    is_self_target, AuthStatus, Confirmation, OutgoingMedia, Peer, SentCode, SignInOutcome,
    SignupProfile, TermsOfService, Transport, TransportError, UploadPart, BIG_FILE_THRESHOLD,
};
use crate::error::{Error, Result};
use crate::media::{MediaAttribute, MediaKind};
use crate::session::Session;
use async_trait::async_trait;
use grammers_client::types::{LoginToken, PasswordToken};
use grammers_client::{Client, Config, InitParams, SignInError};
use grammers_mtsender::InvocationError;
use grammers_tl_types as tl;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest FLOOD_WAIT honoured before giving up
const MAX_FLOOD_WAIT: Duration = Duration::from_secs(60);

/// [`Transport`] backed by a grammers client
pub struct GrammersTransport {
    client: Client,
    login: Mutex<Option<LoginToken>>,
    password: Mutex<Option<PasswordToken>>,
}

impl GrammersTransport {
    /// Connect, resuming `session` when one was stored
    pub async fn connect(api_id: i32, api_hash: &str, session: Option<Session>) -> Result<Self> {
        info!("Connecting to Telegram...");

        if api_id == 0 || api_hash.is_empty() {
            return Err(Error::Config(
                "API ID and hash are required. Get them from my.telegram.org".to_string(),
            ));
        }

        let session = match session {
            Some(stored) => grammers_session::Session::load(stored.as_bytes())
                .map_err(|e| Error::Session(format!("stored session is unreadable: {}", e)))?,
            None => grammers_session::Session::new(),
        };

        let client = Client::connect(Config {
            session,
            api_id,
            api_hash: api_hash.to_string(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| Error::AuthFailed(TransportError::Network(e.to_string())))?;

        info!("Connected to Telegram");
        Ok(GrammersTransport {
            client,
            login: Mutex::new(None),
            password: Mutex::new(None),
        })
    }

    async fn invoke_part(&self, part: &UploadPart) -> std::result::Result<bool, InvocationError> {
        let file_part = part.index as i32;
        let bytes = part.bytes.to_vec();
        if part.file_size > BIG_FILE_THRESHOLD {
            self.client
                .invoke(&tl::functions::upload::SaveBigFilePart {
                    file_id: part.file_id,
                    file_part,
                    file_total_parts: part.total_parts as i32,
                    bytes,
                })
                .await
        } else {
            self.client
                .invoke(&tl::functions::upload::SaveFilePart {
                    file_id: part.file_id,
                    file_part,
                    bytes,
                })
                .await
        }
    }
}

#[async_trait]
impl Transport for GrammersTransport {
    async fn auth_status(&self) -> std::result::Result<AuthStatus, TransportError> {
        let authorized = self.client.is_authorized().await.map_err(invocation)?;
        Ok(AuthStatus { authorized })
    }

    async fn send_code(&self, phone: &str) -> std::result::Result<SentCode, TransportError> {
        let token = self
            .client
            .request_login_code(phone)
            .await
            .map_err(|e| TransportError::Rpc(e.to_string()))?;
        *self.login.lock() = Some(token);
        Ok(SentCode {
            delivery: "Telegram".to_string(),
        })
    }

    async fn submit_code(&self, code: &str) -> std::result::Result<SignInOutcome, TransportError> {
        let token = self
            .login
            .lock()
            .take()
            .ok_or_else(|| TransportError::Rpc("no login code was requested".to_string()))?;

        match self.client.sign_in(&token, code).await {
            Ok(_) => Ok(SignInOutcome::Authorized),
            Err(SignInError::PasswordRequired(password)) => {
                let hint = password.hint().map(str::to_string);
                *self.password.lock() = Some(password);
                Ok(SignInOutcome::PasswordRequired { hint })
            }
            Err(SignInError::SignUpRequired { terms_of_service }) => {
                *self.login.lock() = Some(token);
                let terms = terms_of_service.map(|tos| TermsOfService {
                    id: match tos.id {
                        tl::enums::DataJson::Json(json) => json.data,
                    },
                    text: tos.text,
                });
                Ok(SignInOutcome::SignUpRequired { terms })
            }
            Err(e) => Err(TransportError::Rpc(e.to_string())),
        }
    }

    async fn submit_password(&self, password: &str) -> std::result::Result<(), TransportError> {
        let token = self
            .password
            .lock()
            .take()
            .ok_or_else(|| TransportError::Rpc("no password was requested".to_string()))?;
        self.client
            .check_password(token, password.as_bytes())
            .await
            .map_err(|e| TransportError::Rpc(e.to_string()))?;
        Ok(())
    }

    async fn accept_terms(&self, terms_id: &str) -> std::result::Result<(), TransportError> {
        self.client
            .invoke(&tl::functions::help::AcceptTermsOfService {
                id: tl::enums::DataJson::Json(tl::types::DataJson {
                    data: terms_id.to_string(),
                }),
            })
            .await
            .map_err(invocation)?;
        Ok(())
    }

    async fn sign_up(&self, _profile: &SignupProfile) -> std::result::Result<(), TransportError> {
        Err(TransportError::Unsupported(
            "new accounts must be registered with an official Telegram app".to_string(),
        ))
    }

    async fn export_session(&self) -> std::result::Result<Session, TransportError> {
        Ok(Session::new(self.client.session().save()))
    }

    async fn upload_part(&self, part: UploadPart) -> std::result::Result<(), TransportError> {
        let first = self.invoke_part(&part).await;
        let delay = match &first {
            Err(InvocationError::Rpc(rpc)) => flood_wait_delay(&rpc.name, rpc.value),
            _ => None,
        };

        // At most one flood wait per part; a second failure is final
        let outcome = match delay {
            Some(wait) => {
                warn!("Flood wait on part {}, sleeping {:?} once", part.index, wait);
                tokio::time::sleep(wait).await;
                self.invoke_part(&part).await
            }
            None => first,
        };

        match outcome {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::Rpc(format!(
                "part {} was not accepted",
                part.index
            ))),
            Err(e) => Err(invocation(e)),
        }
    }

    async fn resolve_peer(&self, target: &str) -> std::result::Result<Peer, TransportError> {
        if is_self_target(target) {
            return Ok(Peer::SavedMessages);
        }

        let target = target.trim();
        if let Ok(id) = target.parse::<i64>() {
            // Only basic groups can be addressed without an access hash
            return if id < 0 {
                Ok(Peer::Chat { id: -id })
            } else {
                Err(TransportError::Unsupported(format!(
                    "user id {} cannot be addressed directly; use a username",
                    id
                )))
            };
        }

        let username = target.trim_start_matches('@').to_string();
        debug!("Resolving username {}", username);
        let tl::enums::contacts::ResolvedPeer::Peer(resolved) = self
            .client
            .invoke(&tl::functions::contacts::ResolveUsername { username })
            .await
            .map_err(invocation)?;

        match resolved.peer {
            tl::enums::Peer::User(user) => resolved
                .users
                .iter()
                .find_map(|u| match u {
                    tl::enums::User::User(u) if u.id == user.user_id => Some(u),
                    _ => None,
                })
                .ok_or_else(|| TransportError::Rpc("resolved user missing from reply".to_string()))
                .and_then(|u| {
                    Ok(Peer::User {
                        id: u.id,
                        access_hash: require_access_hash(u.access_hash, "user", u.id)?,
                    })
                }),
            tl::enums::Peer::Chat(chat) => Ok(Peer::Chat { id: chat.chat_id }),
            tl::enums::Peer::Channel(channel) => resolved
                .chats
                .iter()
                .find_map(|c| match c {
                    tl::enums::Chat::Channel(c) if c.id == channel.channel_id => Some(c),
                    _ => None,
                })
                .ok_or_else(|| {
                    TransportError::Rpc("resolved channel missing from reply".to_string())
                })
                .and_then(|c| {
                    Ok(Peer::Channel {
                        id: c.id,
                        access_hash: require_access_hash(c.access_hash, "channel", c.id)?,
                    })
                }),
        }
    }

    async fn send_media(
        &self,
        message: OutgoingMedia<'_>,
    ) -> std::result::Result<Confirmation, TransportError> {
        let upload = &message.upload;
        let file = if upload.size > BIG_FILE_THRESHOLD {
            tl::enums::InputFile::Big(tl::types::InputFileBig {
                id: upload.file_id,
                parts: upload.parts as i32,
                name: upload.name.clone(),
            })
        } else {
            tl::enums::InputFile::File(tl::types::InputFile {
                id: upload.file_id,
                parts: upload.parts as i32,
                name: upload.name.clone(),
                md5_checksum: String::new(),
            })
        };

        let media = match message.media.kind {
            MediaKind::Photo => {
                tl::enums::InputMedia::UploadedPhoto(tl::types::InputMediaUploadedPhoto {
                    spoiler: false,
                    file,
                    stickers: None,
                    ttl_seconds: None,
                })
            }
            MediaKind::Video | MediaKind::Document => {
                tl::enums::InputMedia::UploadedDocument(tl::types::InputMediaUploadedDocument {
                    nosound_video: false,
                    force_file: false,
                    spoiler: false,
                    file,
                    thumb: None,
                    mime_type: message.media.mime_type.clone(),
                    attributes: message.media.attributes.iter().map(attribute).collect(),
                    stickers: None,
                    ttl_seconds: None,
                })
            }
        };

        let random_id = message.transfer_id.value();
        let updates = self
            .client
            .invoke(&tl::functions::messages::SendMedia {
                silent: false,
                background: false,
                clear_draft: false,
                noforwards: false,
                update_stickersets_order: false,
                invert_media: false,
                peer: input_peer(message.peer),
                reply_to: None,
                media,
                message: message.caption.to_string(),
                random_id,
                reply_markup: None,
                entities: None,
                schedule_date: None,
                send_as: None,
                quick_reply_shortcut: None,
                effect: None,
            })
            .await
            .map_err(invocation)?;

        Ok(Confirmation {
            transfer_id: message.transfer_id,
            message_id: sent_message_id(&updates, random_id),
        })
    }
}

fn invocation(e: InvocationError) -> TransportError {
    match e {
        InvocationError::Rpc(rpc) => TransportError::Rpc(rpc.to_string()),
        other => TransportError::Network(other.to_string()),
    }
}

fn input_peer(peer: &Peer) -> tl::enums::InputPeer {
    match *peer {
        Peer::SavedMessages => tl::enums::InputPeer::PeerSelf,
        Peer::User { id, access_hash } => tl::enums::InputPeer::User(tl::types::InputPeerUser {
            user_id: id,
            access_hash,
        }),
        Peer::Chat { id } => tl::enums::InputPeer::Chat(tl::types::InputPeerChat { chat_id: id }),
        Peer::Channel { id, access_hash } => {
            tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
                channel_id: id,
                access_hash,
            })
        }
    }
}

fn attribute(attr: &MediaAttribute) -> tl::enums::DocumentAttribute {
    match attr {
        MediaAttribute::FileName(name) => {
            tl::enums::DocumentAttribute::Filename(tl::types::DocumentAttributeFilename {
                file_name: name.clone(),
            })
        }
        MediaAttribute::SupportsStreaming => {
            tl::enums::DocumentAttribute::Video(tl::types::DocumentAttributeVideo {
                round_message: false,
                supports_streaming: true,
                nosound: false,
                duration: 0.0,
                w: 0,
                h: 0,
                preload_prefix_size: None,
                video_start_ts: None,
            })
        }
    }
}

fn sent_message_id(updates: &tl::enums::Updates, random_id: i64) -> Option<i32> {
    match updates {
        tl::enums::Updates::UpdateShortSentMessage(sent) => Some(sent.id),
        tl::enums::Updates::Updates(u) => u.updates.iter().find_map(|update| match update {
            tl::enums::Update::MessageId(m) if m.random_id == random_id => Some(m.id),
            _ => None,
        }),
        _ => None,
    }
}

/// Delay to honour for a FLOOD_WAIT error, if it is short enough
fn flood_wait_delay(name: &str, seconds: Option<u32>) -> Option<Duration> {
    if name != "FLOOD_WAIT" {
        return None;
    }
    let wait = Duration::from_secs(u64::from(seconds.unwrap_or(1)));
    (wait <= MAX_FLOOD_WAIT).then_some(wait)
}

/// Min peers come without an access hash and cannot be messaged
fn require_access_hash(
    access_hash: Option<i64>,
    what: &str,
    id: i64,
) -> std::result::Result<i64, TransportError> {
    access_hash.ok_or_else(|| TransportError::Rpc(format!("no access hash for {} {}", what, id)))
}
