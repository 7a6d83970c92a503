//! Chunked upload
//!
//! Streams a source to the remote in fixed-size parts:
//! - Parts are read sequentially and each is acknowledged before the next
//! - A [`SpeedReporter`] samples progress for the whole duration of the call
//! - Every read and send races the cancellation token

mod parts;
mod progress;

pub use parts::{part_count, PartReader};
pub use progress::{
    LogSink, NullSink, ProgressBarSink, ProgressSink, ProgressSnapshot, ProgressState,
    ProgressView, ReporterHandle, SpeedReporter, DEFAULT_REPORT_INTERVAL,
};

use crate::error::{Error, Result};
use crate::transport::{Transport, UploadPart, MAX_PART_SIZE};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reference part size: 512 KiB
pub const DEFAULT_PART_SIZE: usize = 512 * 1024;

/// Reference to a fully acknowledged upload
///
/// Not `Clone`: a handle is consumed by exactly one send.
#[derive(Debug, PartialEq, Eq)]
pub struct UploadHandle {
    pub file_id: i64,
    pub parts: u32,
    pub name: String,
    pub size: u64,
}

/// Check a part size against the remote's rules
pub fn validate_part_size(part_size: usize) -> Result<()> {
    if part_size == 0 || part_size % 1024 != 0 {
        return Err(Error::Config(format!(
            "part size must be a positive multiple of 1 KiB, got {} bytes",
            part_size
        )));
    }
    if part_size > MAX_PART_SIZE || MAX_PART_SIZE % part_size != 0 {
        return Err(Error::Config(format!(
            "part size must divide {} KiB evenly, got {} KiB",
            MAX_PART_SIZE / 1024,
            part_size / 1024
        )));
    }
    Ok(())
}

/// Uploads one stream through a transport
pub struct ChunkedUploader<'a, T: ?Sized> {
    transport: &'a T,
    part_size: usize,
    report_interval: Duration,
    sink: Arc<dyn ProgressSink>,
}

impl<'a, T: Transport + ?Sized> ChunkedUploader<'a, T> {
    pub fn new(transport: &'a T, part_size: usize) -> Self {
        ChunkedUploader {
            transport,
            part_size,
            report_interval: DEFAULT_REPORT_INTERVAL,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Upload exactly `total_size` bytes read from `reader`
    ///
    /// The reader is dropped before returning, whatever the outcome.
    pub async fn upload<R>(
        &self,
        reader: R,
        total_size: u64,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadHandle>
    where
        R: AsyncRead + Unpin + Send,
    {
        validate_part_size(self.part_size)?;
        if total_size == 0 {
            return Err(Error::SourceRead(format!("{} is empty", name)));
        }
        let total_parts = u32::try_from(part_count(total_size, self.part_size)).map_err(|_| {
            Error::SourceRead(format!("{} is too large ({} bytes)", name, total_size))
        })?;

        let file_id: i64 = rand::thread_rng().gen();
        info!(
            "Uploading {} ({:.2} MB) in {} parts",
            name,
            total_size as f64 / (1024.0 * 1024.0),
            total_parts
        );

        let mut progress = ProgressState::new(total_size);
        self.sink.start(Some(total_size));
        let reporter =
            SpeedReporter::spawn(progress.view(), Arc::clone(&self.sink), self.report_interval);

        let parts = PartReader::new(reader, self.part_size);
        let result = self
            .send_parts(parts, file_id, total_parts, total_size, &mut progress, cancel)
            .await;

        reporter.stop().await;
        let snapshot = progress.snapshot();
        self.sink.finish(&snapshot, result.is_ok());
        result?;

        info!(
            "Upload completed in {:.1}s ({:.2} MB/s)",
            snapshot.elapsed.as_secs_f64(),
            snapshot.mb_per_sec()
        );
        Ok(UploadHandle {
            file_id,
            parts: total_parts,
            name: name.to_string(),
            size: total_size,
        })
    }

    async fn send_parts<R>(
        &self,
        mut parts: PartReader<R>,
        file_id: i64,
        total_parts: u32,
        total_size: u64,
        progress: &mut ProgressState,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        for index in 0..total_parts {
            let bytes = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                read = parts.next_part() => read.map_err(|e| Error::SourceRead(e.to_string()))?,
            };
            let bytes = bytes.ok_or_else(|| {
                Error::SourceRead(format!(
                    "source ended after {} of {} bytes",
                    parts.offset(),
                    total_size
                ))
            })?;
            if parts.offset() > total_size {
                return Err(Error::SourceRead(format!(
                    "source is longer than the declared {} bytes",
                    total_size
                )));
            }

            let len = bytes.len() as u64;
            let part = UploadPart {
                file_id,
                index,
                total_parts,
                file_size: total_size,
                bytes,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                sent = self.transport.upload_part(part) => {
                    sent.map_err(|source| Error::Transmit { part: index, source })?
                }
            }

            progress.record(len);
            debug!("Part {}/{} acknowledged ({} bytes)", index + 1, total_parts, len);
        }

        // All declared bytes are sent; anything left means the size was wrong
        let trailing = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            read = parts.next_part() => read.map_err(|e| Error::SourceRead(e.to_string()))?,
        };
        if trailing.is_some() {
            return Err(Error::SourceRead(format!(
                "source is longer than the declared {} bytes",
                total_size
            )));
        }

        Ok(())
    }
}
