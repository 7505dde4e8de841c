//! Benchmarks for lazy chunk reading

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strand_blockstore::{create_cid, CidCodec, MemoryObjectStore, MemoryStorage, PublicKeyHash};
use strand_core::{ChunkChainWriter, FileCapability, LazyChunkReader, MemoryNetwork, MAX_CHUNK_SIZE};
use strand_crypto::WriterKeyPair;

fn setup(rt: &tokio::runtime::Runtime, len: usize, stream_secret: bool) -> (Arc<MemoryNetwork>, FileCapability) {
    let objects = Arc::new(MemoryObjectStore::new("http://objects.bench/"));
    let storage = Arc::new(MemoryStorage::new(create_cid(b"bench", CidCodec::Raw), objects));
    let network = Arc::new(MemoryNetwork::new(storage));
    let keys = WriterKeyPair::generate();
    let owner = PublicKeyHash::from_public_key(&keys.public_key());
    let data: Vec<u8> = (0..len).map(|i| i as u8).collect();

    let file = rt.block_on(async {
        ChunkChainWriter::new(network.clone(), owner, keys)
            .with_stream_secret(stream_secret)
            .upload(&data)
            .await
            .unwrap()
    });
    (network, file)
}

fn bench_sequential_read(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("sequential_read");
    group.sample_size(10);

    for chunks in [1usize, 3].iter() {
        let (network, file) = setup(&rt, chunks * MAX_CHUNK_SIZE, false);
        group.bench_with_input(BenchmarkId::from_parameter(chunks), chunks, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let mut reader = LazyChunkReader::open(
                        network.clone(),
                        file.capability.clone(),
                        file.total_length,
                        None,
                    )
                    .await
                    .unwrap();
                    black_box(reader.read_to_end().await.unwrap())
                })
            });
        });
    }

    group.finish();
}

fn bench_seek(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("seek_last_chunk");
    group.sample_size(10);

    for (name, stream_secret) in [("chain_walk", false), ("deterministic", true)] {
        let (network, file) = setup(&rt, 4 * MAX_CHUNK_SIZE, stream_secret);
        let reader = rt.block_on(async {
            LazyChunkReader::open(network, file.capability, file.total_length, file.stream_secret)
                .await
                .unwrap()
        });
        let target = 3 * MAX_CHUNK_SIZE as u64 + 17;

        group.bench_function(name, |b| {
            b.iter(|| rt.block_on(async { black_box(reader.seek(target).await.unwrap()) }));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequential_read, bench_seek);
criterion_main!(benches);
