//! Transfer orchestration
//!
//! Sequences one transfer: authenticate, upload, classify, dispatch. Every
//! step runs under the same cancellation token and any failure moves the
//! pipeline to [`TransferState::Failed`].

use crate::auth::{AuthOutcome, Authenticator, CredentialResponder};
use crate::config::TransferRequest;
use crate::dispatch::{default_caption, Dispatcher};
use crate::error::{Error, ErrorKind, Result, Stage, TransferError};
use crate::media::{classify, MediaKind};
use crate::session::{PhoneIdentity, SessionStore};
use crate::source::SourceFile;
use crate::transport::{Confirmation, Transport};
use crate::upload::{ChunkedUploader, NullSink, ProgressSink, DEFAULT_REPORT_INTERVAL};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Authenticating,
    Uploading,
    Classifying,
    Dispatching,
    Done,
    Failed(ErrorKind),
}

/// Result of a successful transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub confirmation: Confirmation,
    pub auth: AuthOutcome,
    pub file_name: String,
    pub size: u64,
    pub kind: MediaKind,
}

/// Runs one transfer against a transport
pub struct Orchestrator<'a, T: ?Sized, S: ?Sized, R: ?Sized> {
    transport: &'a T,
    store: &'a S,
    responder: &'a R,
    sink: Arc<dyn ProgressSink>,
    report_interval: Duration,
    state: TransferState,
    history: Vec<TransferState>,
}

impl<'a, T, S, R> Orchestrator<'a, T, S, R>
where
    T: Transport + ?Sized,
    S: SessionStore + ?Sized,
    R: CredentialResponder + ?Sized,
{
    pub fn new(transport: &'a T, store: &'a S, responder: &'a R) -> Self {
        Orchestrator {
            transport,
            store,
            responder,
            sink: Arc::new(NullSink),
            report_interval: DEFAULT_REPORT_INTERVAL,
            state: TransferState::Idle,
            history: vec![TransferState::Idle],
        }
    }

    /// Display upload progress through `sink`
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[TransferState] {
        &self.history
    }

    /// Run the whole pipeline for `source`
    pub async fn run(
        &mut self,
        request: &TransferRequest,
        source: &SourceFile,
        cancel: &CancellationToken,
    ) -> std::result::Result<Delivery, TransferError> {
        match self.run_stages(request, source, cancel).await {
            Ok(delivery) => {
                self.enter(TransferState::Done);
                Ok(delivery)
            }
            Err(err) => {
                error!("Transfer failed: {}", err);
                self.enter(TransferState::Failed(err.kind()));
                Err(err)
            }
        }
    }

    async fn run_stages(
        &mut self,
        request: &TransferRequest,
        source: &SourceFile,
        cancel: &CancellationToken,
    ) -> std::result::Result<Delivery, TransferError> {
        self.enter(TransferState::Authenticating);
        let identity = PhoneIdentity::from_phone(&request.phone)
            .map_err(|e| TransferError::new(Stage::Authenticating, e))?;
        let auth = guarded(
            cancel,
            Authenticator::new(self.transport, self.store, self.responder)
                .authenticate(&request.phone, &identity),
        )
        .await
        .map_err(|e| TransferError::new(Stage::Authenticating, e))?;

        // Look the target up before spending time on the upload
        let peer = guarded(cancel, async {
            self.transport
                .resolve_peer(&request.target)
                .await
                .map_err(|source| Error::PeerResolution {
                    target: request.target.clone(),
                    source,
                })
        })
        .await
        .map_err(|e| TransferError::new(Stage::Resolving, e))?;

        self.enter(TransferState::Uploading);
        let upload = async {
            let reader = source.open().await?;
            ChunkedUploader::new(self.transport, request.part_size)
                .with_sink(Arc::clone(&self.sink))
                .with_report_interval(self.report_interval)
                .upload(reader, source.size(), source.name(), cancel)
                .await
        }
        .await
        .map_err(|e| TransferError::new(Stage::Uploading, e))?;

        self.enter(TransferState::Classifying);
        check_cancelled(cancel).map_err(|e| TransferError::new(Stage::Classifying, e))?;
        let media = classify(source.name());
        info!("Processing as {:?} ({})", media.kind, media.mime_type);

        self.enter(TransferState::Dispatching);
        check_cancelled(cancel).map_err(|e| TransferError::new(Stage::Dispatching, e))?;
        let caption = request
            .caption
            .clone()
            .unwrap_or_else(|| default_caption(source.name()));
        let confirmation = Dispatcher::new(self.transport)
            .send(&peer, upload, &media, &caption, cancel)
            .await
            .map_err(|e| TransferError::new(Stage::Dispatching, e))?;

        Ok(Delivery {
            confirmation,
            auth,
            file_name: source.name().to_string(),
            size: source.size(),
            kind: media.kind,
        })
    }

    fn enter(&mut self, state: TransferState) {
        self.state = state;
        self.history.push(state);
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Race `fut` against cancellation
async fn guarded<F, V>(cancel: &CancellationToken, fut: F) -> Result<V>
where
    F: Future<Output = Result<V>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        out = fut => out,
    }
}
