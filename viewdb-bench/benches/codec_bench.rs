//! Codec encoding/decoding benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use viewdb_protocol::{Decoder, Encoder};

fn encode_pairs(count: usize, value_size: usize) -> Vec<u8> {
    let value = vec![0x42u8; value_size];
    let mut encoder = Encoder::new();
    for i in 0..count {
        encoder.put_bytes(format!("key-{:08}", i).as_bytes()).unwrap();
        encoder.put_bytes(&value).unwrap();
    }
    encoder.put_nil();
    encoder.put_nil();
    encoder.take().to_vec()
}

fn bench_encode_u64(c: &mut Criterion) {
    c.bench_function("encode_u64", |b| {
        let mut encoder = Encoder::new();
        b.iter(|| {
            encoder.put_u64(black_box(0xDEADBEEF));
            black_box(encoder.take());
        });
    });
}

fn bench_encode_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_bytes");

    for size in [32, 1024, 65536] {
        let data = vec![0x42u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            let mut encoder = Encoder::new();
            b.iter(|| {
                encoder.put_bytes(black_box(data)).unwrap();
                black_box(encoder.take());
            });
        });
    }

    group.finish();
}

fn bench_decode_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_bytes");

    for size in [32, 1024, 65536] {
        let mut encoder = Encoder::new();
        encoder.put_bytes(&vec![0x42u8; size]).unwrap();
        let encoded = encoder.take().to_vec();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                decoder.extend(encoded);
                black_box(decoder.decode_bytes().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_decode_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_page");

    // A streamed cursor page decoded into preallocated slot buffers.
    for pairs in [100, 1000, 10000] {
        let encoded = encode_pairs(pairs, 64);

        group.throughput(Throughput::Elements(pairs as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(pairs),
            &encoded,
            |b, encoded| {
                let mut key_slot = Vec::with_capacity(64);
                let mut value_slot = Vec::with_capacity(64);
                b.iter(|| {
                    let mut decoder = Decoder::new();
                    decoder.extend(encoded);
                    loop {
                        let filled = decoder.decode_bytes_into(&mut key_slot).unwrap().unwrap();
                        decoder.decode_bytes_into(&mut value_slot).unwrap().unwrap();
                        if !filled || key_slot.is_empty() {
                            break;
                        }
                        black_box(&key_slot);
                        black_box(&value_slot);
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_u64,
    bench_encode_bytes,
    bench_decode_bytes,
    bench_decode_page,
);

criterion_main!(benches);
