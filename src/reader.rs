//! Guarded chunk reads from a source file
//!
//! [`ChunkReader`] reads bounded byte ranges by chunk index. At most one
//! read per index may be in flight at a time: overlapping reads against the
//! same range of the same underlying resource can corrupt or abort both on
//! some platforms, so a second concurrent read for an index that is already
//! pending fails immediately with [`FlowgateError::Busy`] rather than
//! queuing behind the first. Distinct indices may be read concurrently.

use crate::chunk::ChunkDescriptor;
use crate::error::{FlowgateError, Result};
use crate::pool::BufferPool;
use dashmap::DashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Reads chunks of a file on demand, guarding against duplicate
/// concurrent reads of the same chunk index.
///
/// The backing file is read-only; multiple logical transfers may share one
/// reader as long as they target distinct chunk indices at any given time.
pub struct ChunkReader {
    file: Arc<Mutex<File>>,
    total_size: u64,
    chunk_size: u64,
    file_name: String,
    mime_type: String,
    in_flight: Arc<DashSet<u64>>,
    buffer_pool: Option<BufferPool>,
}

/// Removes the chunk index from the in-flight set when the read ends,
/// on every exit path.
struct InFlightGuard {
    set: Arc<DashSet<u64>>,
    index: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.index);
    }
}

impl ChunkReader {
    /// Open a file for chunked reading
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its metadata read,
    /// or if `chunk_size` is zero.
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(FlowgateError::InvalidConfig(
                "chunk_size must be positive".into(),
            ));
        }

        let path = path.as_ref();
        let file = File::open(path)?;
        let total_size = file.metadata()?.len();

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = guess_mime(&file_name).to_string();

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            total_size,
            chunk_size,
            file_name,
            mime_type,
            in_flight: Arc::new(DashSet::new()),
            buffer_pool: None,
        })
    }

    /// Open a file for chunked reading with a buffer pool
    ///
    /// Chunk buffers are acquired from the pool instead of being allocated
    /// fresh for each read. Callers should hand processed buffers back via
    /// [`release_chunk`](Self::release_chunk).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`open`](Self::open).
    pub fn with_buffer_pool<P: AsRef<Path>>(
        path: P,
        chunk_size: u64,
        pool: BufferPool,
    ) -> Result<Self> {
        let mut reader = Self::open(path, chunk_size)?;
        reader.buffer_pool = Some(pool);
        Ok(reader)
    }

    /// Read the chunk at `index`
    ///
    /// The byte range is `[index * chunk_size, min((index + 1) * chunk_size,
    /// total_size))`; the final chunk is shorter and that is not an error.
    ///
    /// # Errors
    ///
    /// - [`FlowgateError::OutOfRange`] when `index` is not in
    ///   `[0, total_chunks)`.
    /// - [`FlowgateError::Busy`] when a read for `index` is already in
    ///   flight. The call never waits for the other read.
    /// - [`FlowgateError::Io`] when the underlying read fails; the
    ///   in-flight guard is released on this path too.
    pub async fn read_chunk(&self, index: u64) -> Result<Vec<u8>> {
        let descriptor = ChunkDescriptor::compute(self.total_size, self.chunk_size, index)
            .ok_or(FlowgateError::OutOfRange {
                index,
                total: self.total_chunks(),
            })?;

        if !self.in_flight.insert(index) {
            tracing::debug!(index, "rejecting overlapping chunk read");
            return Err(FlowgateError::Busy(index));
        }
        let _guard = InFlightGuard {
            set: Arc::clone(&self.in_flight),
            index,
        };

        let len = descriptor.len as usize;
        let mut buffer = match &self.buffer_pool {
            Some(pool) => {
                let mut buf = pool.acquire();
                buf.resize(len, 0);
                buf
            }
            None => vec![0u8; len],
        };

        let file = Arc::clone(&self.file);
        let offset = descriptor.offset;
        let buffer = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
            let mut file = file.lock().map_err(|_| {
                std::io::Error::other("chunk reader file lock poisoned")
            })?;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
            Ok(buffer)
        })
        .await
        .map_err(std::io::Error::other)??;

        tracing::trace!(index, len, "read chunk");
        Ok(buffer)
    }

    /// Return a chunk buffer to the pool, if one is configured
    pub fn release_chunk(&self, buffer: Vec<u8>) {
        if let Some(pool) = &self.buffer_pool {
            pool.release(buffer);
        }
    }

    /// Total size of the backing file in bytes
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Total number of chunks
    #[must_use]
    pub fn total_chunks(&self) -> u64 {
        crate::chunk::total_chunks(self.total_size, self.chunk_size)
    }

    /// Chunk size in bytes
    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Name of the backing file
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// MIME type guessed from the file extension
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Number of chunk reads currently in flight (diagnostics)
    #[must_use]
    pub fn in_flight_reads(&self) -> usize {
        self.in_flight.len()
    }
}

/// Guess a MIME type from a file name extension
///
/// Opaque passthrough for transfer metadata; unknown extensions map to
/// `application/octet-stream`.
fn guess_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "md" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}
