//! Fixed-size part splitting for streamed sources

use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads a stream as consecutive parts of exactly `part_size` bytes
///
/// Only the final part may be shorter. Concatenating every part yields the
/// original byte sequence.
pub struct PartReader<R> {
    reader: R,
    part_size: usize,
    offset: u64,
}

impl<R: AsyncRead + Unpin> PartReader<R> {
    pub fn new(reader: R, part_size: usize) -> Self {
        assert!(part_size > 0, "part size must be positive");
        PartReader {
            reader,
            part_size,
            offset: 0,
        }
    }

    /// Bytes handed out so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Next part, or `None` at end of stream
    pub async fn next_part(&mut self) -> io::Result<Option<Bytes>> {
        let mut buffer = vec![0u8; self.part_size];
        let mut total_read = 0;

        // Short reads are normal for pipes and sockets; keep going until full or EOF
        while total_read < self.part_size {
            match self.reader.read(&mut buffer[total_read..]).await {
                Ok(0) => break,
                Ok(n) => total_read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if total_read == 0 {
            return Ok(None);
        }

        buffer.truncate(total_read);
        self.offset += total_read as u64;
        Ok(Some(Bytes::from(buffer)))
    }
}

/// Number of parts needed for `total_size` bytes
pub fn part_count(total_size: u64, part_size: usize) -> u64 {
    total_size.div_ceil(part_size as u64)
}
