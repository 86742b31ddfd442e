//! Throughput Benchmark for memline
//!
//! Measures request parsing, the cache contract operations the executor
//! relies on, and whole requests run through the command handler.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use memline::commands::CommandHandler;
use memline::protocol::{keys, resolve_exptime, Request, SetCommand};
use memline::storage::{Cache, Expiration, Lookup, SetTxn, StorageEngine};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

/// Benchmark request line parsing
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_line", |b| {
        let line = b"set user:12345 0 3600 1024 noreply";
        b.iter(|| {
            let Some(Request::Set(args)) = Request::classify(black_box(line)) else {
                unreachable!()
            };
            let cmd = SetCommand::parse(args).unwrap();
            black_box(resolve_exptime(cmd.exptime).unwrap());
            black_box(cmd.payload_size().unwrap());
            black_box(cmd.is_noreply().unwrap());
        });
    });

    group.bench_function("get_10_keys", |b| {
        let line = b"get k0 k1 k2 k3 k4 k5 k6 k7 k8 k9";
        b.iter(|| {
            let Some(Request::Get(args)) = Request::classify(black_box(line)) else {
                unreachable!()
            };
            black_box(keys(args).count());
        });
    });

    group.finish();
}

/// Benchmark the cache operations behind get and set
fn bench_cache(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());
    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        engine.set(key, value);
    }
    let rt = runtime();

    let mut group = c.benchmark_group("cache");
    group.throughput(Throughput::Elements(1));

    group.bench_function("lookup_hit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(matches!(engine.lookup(key.as_bytes()), Lookup::Found(_)));
            i += 1;
        });
    });

    group.bench_function("lookup_miss", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(matches!(engine.lookup(key.as_bytes()), Lookup::NotFound));
            i += 1;
        });
    });

    group.bench_function("set_txn_1kb", |b| {
        let value = vec![b'x'; 1024];
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("new:{}", i % 10_000);
            let mut txn = engine
                .begin_set(key.as_bytes(), value.len(), Expiration::Never)
                .unwrap();
            rt.block_on(txn.write_all(&value)).unwrap();
            txn.commit();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark whole requests through the command handler
fn bench_requests(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());
    engine.set(Bytes::from("hot"), Bytes::from("x".repeat(100)));
    let rt = runtime();

    let mut group = c.benchmark_group("requests");

    let pipeline: Vec<u8> = (0..100)
        .flat_map(|i| {
            if i % 5 == 0 {
                format!("set k{} 0 0 5\r\nhello\r\n", i).into_bytes()
            } else {
                b"get hot\r\n".to_vec()
            }
        })
        .collect();
    group.throughput(Throughput::Elements(100));

    group.bench_function("pipelined_80_get_20_set", |b| {
        let mut out = Vec::with_capacity(16 * 1024);
        b.iter(|| {
            out.clear();
            let mut handler = CommandHandler::new(Arc::clone(&engine), 8192);
            let mut reader = BufReader::new(&pipeline[..]);
            rt.block_on(async {
                while handler.execute(&mut reader, &mut out).await.is_ok() {}
            });
            black_box(out.len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_cache, bench_requests);

criterion_main!(benches);
