//! Upload benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tokio::io::AsyncReadExt;
use tos3::upload::checksum::Md5Reader;
use tos3::upload::sniff::{detect_content_type, ContentSniff};

fn benchmark_detect_content_type(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_content_type");

    let samples: [(&str, Vec<u8>); 4] = [
        ("text", b"The quick brown fox jumps over the lazy dog. ".repeat(12)),
        ("html", b"  <!DOCTYPE html><html><body>hi</body></html>".to_vec()),
        ("png", b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec()),
        ("binary", (0..512u32).map(|i| (i % 256) as u8).collect()),
    ];

    for (name, data) in samples.iter() {
        group.bench_function(*name, |b| {
            b.iter(|| black_box(detect_content_type(black_box(data))));
        });
    }

    group.finish();
}

fn benchmark_sniff_and_hash(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("sniff_and_hash");

    for size in [1024, 10 * 1024, 100 * 1024, 1024 * 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(format!("{}_bytes", size), size, |b, &size| {
            let data = vec![0x5au8; size];
            b.to_async(&runtime).iter(|| async {
                let mut reader = &data[..];
                let sniff = ContentSniff::read(&mut reader).await.unwrap();
                let mut hashed = Md5Reader::new(sniff.chain(reader));
                let mut sink = Vec::with_capacity(size);
                hashed.read_to_end(&mut sink).await.unwrap();
                black_box(hashed.hex_digest())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_detect_content_type, benchmark_sniff_and_hash);
criterion_main!(benches);
