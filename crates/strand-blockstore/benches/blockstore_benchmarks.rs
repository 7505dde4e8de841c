//! Benchmarks for block store operations

use std::sync::Arc;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strand_blockstore::{
    create_cid, hash_to_key, ignore_progress, key_to_hash, BlockStoreProperties, CidCodec,
    ContentAddressedStorage, DirectBlockStore, MemoryCoreNode, MemoryObjectStore, MemoryStorage,
    PublicKeyHash,
};
use strand_crypto::WriterKeyPair;

fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn bench_key_encoding(c: &mut Criterion) {
    let cid = create_cid(&generate_data(1024), CidCodec::Raw);
    let key = hash_to_key(&cid);

    c.bench_function("hash_to_key", |b| b.iter(|| hash_to_key(black_box(&cid))));
    c.bench_function("key_to_hash", |b| b.iter(|| key_to_hash(black_box(&key)).unwrap()));
}

fn bench_create_cid(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_cid");

    for size in [1024, 128 * 1024, 1024 * 1024].iter() {
        let data = generate_data(*size);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| create_cid(black_box(data), CidCodec::Raw))
        });
    }

    group.finish();
}

fn bench_download_fragments(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("download_fragments");

    for count in [8usize, 40].iter() {
        let node_id = create_cid(b"bench node", CidCodec::Raw);
        let objects = Arc::new(MemoryObjectStore::new("http://bench.local/blocks/"));
        let fallback = Arc::new(MemoryStorage::new(node_id, objects.clone()));
        let registry = Arc::new(MemoryCoreNode::new());
        let keys = WriterKeyPair::generate();
        let owner = PublicKeyHash::from_public_key(&keys.public_key());
        registry.register("bench", owner, vec![node_id]);

        let blocks: Vec<Bytes> = (0..*count)
            .map(|i| {
                let mut data = generate_data(128 * 1024);
                data[0] = i as u8;
                Bytes::from(data)
            })
            .collect();
        let signed: Vec<Vec<u8>> = blocks
            .iter()
            .map(|b| keys.sign_message(&create_cid(b, CidCodec::Raw).to_bytes()))
            .collect();
        let hashes = rt.block_on(async {
            let tid = fallback.start_transaction(&owner).await.unwrap();
            fallback.put_raw(&owner, &owner, &signed, &blocks, &tid).await.unwrap()
        });

        let store = DirectBlockStore::new(
            BlockStoreProperties::default().with_authed_reads(true),
            objects,
            fallback,
            node_id,
            registry,
        )
        .unwrap();

        group.throughput(Throughput::Bytes((*count * 128 * 1024) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &hashes, |b, hashes| {
            b.iter(|| {
                rt.block_on(async {
                    let fragments = store
                        .download_fragments(hashes, &ignore_progress, 1.0)
                        .await
                        .unwrap();
                    black_box(fragments)
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_key_encoding, bench_create_cid, bench_download_fragments);
criterion_main!(benches);
