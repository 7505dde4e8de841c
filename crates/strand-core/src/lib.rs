//! # Strand Core
//!
//! Encrypted, chunked file streams on top of content-addressed block storage.
//!
//! This crate provides:
//! - **Capabilities**: locations, batch access tokens and the keys that open them
//! - **Cryptree nodes**: encrypted per-chunk metadata naming fragments and successors
//! - **Lazy reading**: `LazyChunkReader`, a seekable reader that fetches one chunk at a time
//! - **Chain writing**: `ChunkChainWriter`, which uploads a file as a chunk chain
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   LazyChunkReader  │  ChunkChainWriter  │
//! ├─────────────────────────────────────────┤
//! │     CryptreeNode   │   ChunkRetriever   │
//! ├─────────────────────────────────────────┤
//! │             NetworkAccess               │
//! ├─────────────────────────────────────────┤
//! │        ContentAddressedStorage          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use strand_core::{ChunkChainWriter, LazyChunkReader};
//!
//! let file = ChunkChainWriter::new(network.clone(), owner, keys).upload(&data).await?;
//! let mut reader = LazyChunkReader::open(network, file.capability, file.total_length, file.stream_secret).await?;
//! let tail = reader.seek(1024).await?.read_to_end().await?;
//! ```

pub mod capability;
pub mod chunk;
pub mod cryptree;
pub mod error;
pub mod network;
pub mod reader;
pub mod retriever;
pub mod writer;

pub use capability::{AbsoluteCapability, Bat, Location, MapKey};
pub use chunk::{FRAGMENT_SIZE, MAX_CHUNK_SIZE};
pub use cryptree::{CryptreeNode, NodeKind};
pub use error::{CoreError, Result};
pub use network::{MemoryNetwork, NetworkAccess};
pub use reader::{Addressing, LazyChunkReader};
pub use retriever::ChunkRetriever;
pub use writer::{ChunkChainWriter, FileCapability};
