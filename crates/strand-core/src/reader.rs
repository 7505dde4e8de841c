//! Lazy, seekable reading of a chunk chain
//!
//! A file is a chain of chunks of `MAX_CHUNK_SIZE` plaintext bytes each (the
//! last may be shorter). The reader buffers one decrypted chunk at a time and
//! fetches the next one only when a read or skip crosses into it.
//!
//! Chunks are located either by walking stored next pointers one hop at a
//! time, or, when the file has a stream secret, by deriving any chunk's map
//! key directly from the first chunk's location.
//!
//! Cursor state only changes once a fetch has fully succeeded, so a failed
//! read or skip leaves the reader where it was.

use std::sync::Arc;

use bytes::Bytes;
use strand_blockstore::{ignore_progress, Progress};
use strand_crypto::StreamSecret;
use tracing::{debug, instrument};

use crate::capability::{AbsoluteCapability, Bat, MapKey};
use crate::chunk::{chunk_index, chunk_length, chunk_start, MAX_CHUNK_SIZE};
use crate::network::NetworkAccess;
use crate::{CoreError, Result};

/// How chunk locations are found
#[derive(Clone, Debug)]
pub enum Addressing {
    /// Map keys derive from the stream secret and the first chunk's location
    Deterministic(StreamSecret),
    /// Each chunk's node stores the location of the next
    ChainWalk,
}

impl Addressing {
    fn secret(&self) -> Option<&StreamSecret> {
        match self {
            Addressing::Deterministic(secret) => Some(secret),
            Addressing::ChainWalk => None,
        }
    }
}

/// Cursor over one buffered chunk
#[derive(Clone)]
struct StreamPosition {
    /// Stream offset of the buffered chunk's first byte
    global_index: u64,
    /// Offset inside the buffered chunk
    index: usize,
    chunk: Bytes,
    /// Capability of the chunk after the buffered one
    next_pointer: AbsoluteCapability,
}

impl StreamPosition {
    fn offset(&self) -> u64 {
        self.global_index + self.index as u64
    }

    fn available(&self) -> usize {
        self.chunk.len() - self.index
    }
}

/// The first chunk, kept so the reader can rewind without network access
struct Origin {
    capability: AbsoluteCapability,
    chunk: Bytes,
    next: AbsoluteCapability,
}

/// Seekable reader over an encrypted chunk chain
#[derive(Clone)]
pub struct LazyChunkReader {
    network: Arc<dyn NetworkAccess>,
    total_length: u64,
    addressing: Addressing,
    origin: Arc<Origin>,
    position: StreamPosition,
    monitor: Arc<Progress>,
}

impl LazyChunkReader {
    /// Build a reader positioned at the start of the stream
    ///
    /// `origin` is the capability of the first chunk, `origin_chunk` its
    /// decrypted plaintext and `origin_next` the capability of the second.
    pub fn new(
        network: Arc<dyn NetworkAccess>,
        origin: AbsoluteCapability,
        origin_chunk: Bytes,
        origin_next: AbsoluteCapability,
        total_length: u64,
        stream_secret: Option<StreamSecret>,
    ) -> Result<Self> {
        let expected = chunk_length(0, total_length);
        if origin_chunk.len() != expected {
            return Err(CoreError::InvalidInitialChunk {
                expected,
                actual: origin_chunk.len(),
            });
        }

        let origin = Arc::new(Origin {
            capability: origin,
            chunk: origin_chunk,
            next: origin_next,
        });
        Ok(Self {
            network,
            total_length,
            addressing: stream_secret.map_or(Addressing::ChainWalk, Addressing::Deterministic),
            position: Self::origin_position(&origin),
            origin,
            monitor: Arc::new(ignore_progress),
        })
    }

    /// Open the file whose first chunk lives at `cap`
    pub async fn open(
        network: Arc<dyn NetworkAccess>,
        cap: AbsoluteCapability,
        total_length: u64,
        stream_secret: Option<StreamSecret>,
    ) -> Result<Self> {
        let node = network.get_metadata(&cap).await?.ok_or(CoreError::EndOfStream)?;
        if node.is_directory() {
            return Err(CoreError::LinkedToDirectory);
        }

        let (map_key, bat) = node.next_chunk_location(
            stream_secret.as_ref(),
            cap.map_key(),
            cap.bat.as_ref(),
            network.hasher(),
        )?;
        let chunk = node
            .retriever(&cap.key)
            .get_chunk(network.storage(), chunk_length(0, total_length), &ignore_progress)
            .await?;
        let next = cap.with_map_key(map_key, bat);

        Self::new(network, cap, chunk, next, total_length, stream_secret)
    }

    /// Report downloaded bytes to `monitor`
    pub fn with_progress(mut self, monitor: Arc<Progress>) -> Self {
        self.monitor = monitor;
        self
    }

    fn origin_position(origin: &Origin) -> StreamPosition {
        StreamPosition {
            global_index: 0,
            index: 0,
            chunk: origin.chunk.clone(),
            next_pointer: origin.next.clone(),
        }
    }

    /// Current stream offset
    pub fn position(&self) -> u64 {
        self.position.offset()
    }

    /// Length of the whole stream
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Bytes left before the end of the stream
    pub fn remaining(&self) -> u64 {
        self.total_length - self.position()
    }

    /// How this reader locates chunks
    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    /// Read up to `dst.len()` bytes, returning how many were read
    ///
    /// Returns fewer bytes only when the stream ends first. Reading with a
    /// non-empty buffer at the end of the stream fails with `EndOfStream`.
    pub async fn read_into(&mut self, dst: &mut [u8]) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        let remaining = self.remaining();
        if remaining == 0 {
            return Err(CoreError::EndOfStream);
        }

        let wanted = dst.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let mut position = self.position.clone();
        let mut copied = 0;
        while copied < wanted {
            if position.available() == 0 {
                let next_start = position.global_index + MAX_CHUNK_SIZE as u64;
                let length = chunk_length(next_start, self.total_length);
                position = self.get_next_stream(&position.next_pointer, next_start, length).await?;
                continue;
            }
            let n = position.available().min(wanted - copied);
            dst[copied..copied + n].copy_from_slice(&position.chunk[position.index..position.index + n]);
            position.index += n;
            copied += n;
        }

        self.position = position;
        Ok(copied)
    }

    /// Read everything from the current offset to the end
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; usize::try_from(self.remaining()).unwrap_or(usize::MAX)];
        let mut filled = 0;
        while filled < out.len() {
            filled += self.read_into(&mut out[filled..]).await?;
        }
        Ok(out)
    }

    /// Advance the cursor by `n` bytes
    #[instrument(skip(self), fields(from = self.position()))]
    pub async fn skip(&mut self, n: u64) -> Result<()> {
        if n <= self.position.available() as u64 {
            self.position.index += n as usize;
            return Ok(());
        }

        let target = self.position().checked_add(n).ok_or(CoreError::InvalidSeek {
            offset: u64::MAX,
            length: self.total_length,
        })?;
        if target > self.total_length {
            return Err(CoreError::InvalidSeek {
                offset: target,
                length: self.total_length,
            });
        }

        let current_chunk = self.position.global_index / MAX_CHUNK_SIZE as u64;
        let target_chunk = chunk_index(target, self.total_length);
        let start = chunk_start(target_chunk);
        let length = chunk_length(start, self.total_length);

        let pointer = match &self.addressing {
            Addressing::Deterministic(secret) => {
                let origin = &self.origin.capability;
                let (map_key, bat) = strand_crypto::chunk_location(
                    self.network.hasher(),
                    secret,
                    origin.map_key().as_bytes(),
                    origin.bat.as_ref().map(|b| b.as_bytes()),
                    target_chunk,
                );
                origin.with_map_key(MapKey::from_bytes(map_key), bat.map(Bat::from_bytes))
            }
            Addressing::ChainWalk => {
                let hops = target_chunk - current_chunk - 1;
                self.walk(self.position.next_pointer.clone(), hops).await?
            }
        };

        let mut position = self.get_next_stream(&pointer, start, length).await?;
        position.index = (target - start) as usize;
        debug!(target, chunk = target_chunk, "skipped to chunk");
        self.position = position;
        Ok(())
    }

    /// Follow stored next pointers `hops` times without downloading payloads
    async fn walk(&self, mut pointer: AbsoluteCapability, hops: u64) -> Result<AbsoluteCapability> {
        for _ in 0..hops {
            let node = self
                .network
                .get_metadata(&pointer)
                .await?
                .ok_or(CoreError::EndOfStream)?;
            if node.is_directory() {
                return Err(CoreError::LinkedToDirectory);
            }
            let (map_key, bat) =
                node.next_chunk_location(None, pointer.map_key(), pointer.bat.as_ref(), self.network.hasher())?;
            pointer = pointer.with_map_key(map_key, bat);
        }
        Ok(pointer)
    }

    /// A reader positioned at `target`; `self` is left untouched
    pub async fn seek(&self, target: u64) -> Result<LazyChunkReader> {
        if target > self.total_length {
            return Err(CoreError::InvalidSeek {
                offset: target,
                length: self.total_length,
            });
        }

        let mut reader = self.copy();
        let current = reader.position();
        if target >= current {
            reader.skip(target - current).await?;
        } else {
            reader.reset();
            reader.skip(target).await?;
        }
        Ok(reader)
    }

    /// `seek` with the offset split into high and low 32-bit halves
    pub async fn seek_js(&self, high: u32, low: u32) -> Result<LazyChunkReader> {
        self.seek((u64::from(high) << 32) | u64::from(low)).await
    }

    /// Rewind to the start of the stream
    pub fn reset(&mut self) {
        self.position = Self::origin_position(&self.origin);
    }

    /// An independent reader at the same position
    pub fn copy(&self) -> LazyChunkReader {
        self.clone()
    }

    /// Fetch the chunk at `pointer`, which starts at stream offset `global_index`
    ///
    /// Returns the new cursor with its index at 0; the caller commits it.
    #[instrument(skip(self, pointer))]
    async fn get_next_stream(
        &self,
        pointer: &AbsoluteCapability,
        global_index: u64,
        length: usize,
    ) -> Result<StreamPosition> {
        let node = self
            .network
            .get_metadata(pointer)
            .await?
            .ok_or(CoreError::EndOfStream)?;
        if node.is_directory() {
            return Err(CoreError::LinkedToDirectory);
        }

        let (map_key, bat) = node.next_chunk_location(
            self.addressing.secret(),
            pointer.map_key(),
            pointer.bat.as_ref(),
            self.network.hasher(),
        )?;
        let chunk = node
            .retriever(&pointer.key)
            .get_chunk(self.network.storage(), length, self.monitor.as_ref())
            .await?;

        Ok(StreamPosition {
            global_index,
            index: 0,
            chunk,
            next_pointer: pointer.with_map_key(map_key, bat),
        })
    }
}
