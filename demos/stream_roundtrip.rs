//! Upload a file as an encrypted chunk chain and read it back lazily
//!
//! This example demonstrates:
//! - Routing writes straight to object storage through presigned URLs
//! - Reading anonymously from a public bucket
//! - Seeking with stream-secret addressing
//!
//! Run with: cargo run --example stream_roundtrip

use std::sync::Arc;

use strand_blockstore::{
    create_cid, BlockStoreProperties, CidCodec, DirectBlockStore, MemoryCoreNode, MemoryObjectStore,
    MemoryStorage, PublicKeyHash,
};
use strand_core::{ChunkChainWriter, LazyChunkReader, MemoryNetwork, MAX_CHUNK_SIZE};
use strand_crypto::WriterKeyPair;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BUCKET: &str = "http://objects.strand.local/blocks/";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strand_core=info,strand_blockstore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let node_id = create_cid(b"demo node", CidCodec::Raw);
    let objects = Arc::new(MemoryObjectStore::new(BUCKET));
    objects.set_public_reads(true);
    let fallback = Arc::new(MemoryStorage::new(node_id, objects.clone()));

    let keys = WriterKeyPair::generate();
    let owner = PublicKeyHash::from_public_key(&keys.public_key());
    let registry = Arc::new(MemoryCoreNode::new());
    registry.register("demo", owner, vec![node_id]);

    let properties = match BlockStoreProperties::from_env() {
        Ok(properties) if properties.direct_writes || properties.public_reads => properties,
        _ => BlockStoreProperties::default()
            .with_direct_writes(true)
            .with_public_reads(BUCKET),
    };
    let store = DirectBlockStore::new(properties, objects.clone(), fallback.clone(), node_id, registry)?;
    let network = Arc::new(MemoryNetwork::new(Arc::new(store)));

    let data: Vec<u8> = (0..2 * MAX_CHUNK_SIZE + 4321).map(|i| (i % 253) as u8).collect();
    let file = ChunkChainWriter::new(network.clone(), owner, keys)
        .with_stream_secret(true)
        .upload(&data)
        .await?;
    info!(
        objects = objects.object_count(),
        uploads = objects.put_count(),
        "file stored"
    );

    let mut reader = LazyChunkReader::open(
        network.clone(),
        file.capability.clone(),
        file.total_length,
        file.stream_secret.clone(),
    )
    .await?;
    let all = reader.read_to_end().await?;
    anyhow::ensure!(all == data, "sequential read differs from upload");

    let offset = MAX_CHUNK_SIZE as u64 + 1000;
    let mut sought = reader.seek(offset).await?;
    let mut window = [0u8; 32];
    let read = sought.read_into(&mut window).await?;
    anyhow::ensure!(
        window[..read] == data[offset as usize..offset as usize + read],
        "seek landed on the wrong bytes"
    );

    info!(
        bytes = all.len(),
        metadata_lookups = network.lookups(),
        bucket_reads = objects.get_count(),
        fallback_calls = ?fallback.calls(),
        "read back"
    );
    Ok(())
}
