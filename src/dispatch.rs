//! Message dispatch
//!
//! Wraps an uploaded file in a single send. Each call mints a fresh
//! [`TransferId`] the remote uses to drop duplicate sends.

use crate::error::{Error, Result};
use crate::media::MediaDescriptor;
use crate::transport::{Confirmation, OutgoingMedia, Peer, Transport};
use crate::upload::UploadHandle;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Random non-zero id deduplicating one send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(i64);

impl TransferId {
    /// Draw a uniformly random non-zero id from the OS generator
    pub fn generate() -> Self {
        loop {
            let id = OsRng.next_u64() as i64;
            if id != 0 {
                return TransferId(id);
            }
        }
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0 as u64)
    }
}

/// Caption used when none is given
pub fn default_caption(file_name: &str) -> String {
    format!("Uploaded file: {}", file_name)
}

/// Sends uploaded media to a peer
pub struct Dispatcher<'a, T: ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> Dispatcher<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Dispatcher { transport }
    }

    /// Send `upload` as a message; consumes the handle
    ///
    /// A failure here means the bytes are on the remote but no message
    /// references them. Nothing is retried.
    pub async fn send(
        &self,
        peer: &Peer,
        upload: UploadHandle,
        media: &MediaDescriptor,
        caption: &str,
        cancel: &CancellationToken,
    ) -> Result<Confirmation> {
        let transfer_id = TransferId::generate();
        info!("Sending {} as {:?} (transfer {})", upload.name, media.kind, transfer_id);

        let message = OutgoingMedia {
            peer,
            upload,
            media,
            caption,
            transfer_id,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            sent = self.transport.send_media(message) => sent.map_err(Error::Send),
        }
    }
}
