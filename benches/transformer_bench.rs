//! Benchmarks for the stream decoders.
//!
//! Run with: cargo bench --bench transformer_bench
//!
//! These benchmarks measure decoding throughput for each provider dialect,
//! both for a body delivered in one frame and for one chopped into small
//! transport-sized pieces.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glossa_gateway::api::streaming::StreamIncrement;
use glossa_gateway::transformer::{decode_all, WireFormat};

const FRAGMENTS: usize = 400;

fn chat_body() -> Vec<u8> {
    let mut body = String::new();
    for i in 0..FRAGMENTS {
        body.push_str(&format!(
            "data: {{\"id\":\"c\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"λόγος {} \"}}}}]}}\n\n",
            i
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

fn ndjson_body() -> Vec<u8> {
    let mut body = String::new();
    for i in 0..FRAGMENTS {
        body.push_str(&format!(
            "{{\"model\":\"m\",\"response\":\"λόγος {} \",\"done\":false}}\n",
            i
        ));
    }
    body.push_str("{\"response\":\"\",\"done\":true}\n");
    body.into_bytes()
}

fn token_body() -> Vec<u8> {
    let mut body = String::new();
    for i in 0..FRAGMENTS {
        body.push_str(&format!(
            "data:{{\"token\":{{\"id\":{},\"text\":\"λόγος \",\"special\":false}}}}\n\n",
            i
        ));
    }
    body.into_bytes()
}

fn bench_decoders(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let cases = [
        ("chat_completions", WireFormat::ChatCompletions, chat_body()),
        ("generate_ndjson", WireFormat::GenerateNdjson, ndjson_body()),
        ("token_events", WireFormat::TokenEvents, token_body()),
    ];

    for (name, format, body) in cases.iter() {
        group.throughput(Throughput::Bytes(body.len() as u64));

        group.bench_with_input(BenchmarkId::new("single_frame", name), body, |b, body| {
            b.iter(|| decode_all(*format, [black_box(body.as_slice())]))
        });

        group.bench_with_input(BenchmarkId::new("chunks_of_37", name), body, |b, body| {
            b.iter(|| decode_all(*format, black_box(body.as_slice()).chunks(37)))
        });
    }
    group.finish();
}

fn bench_ndjson_encoding(c: &mut Criterion) {
    let increment = StreamIncrement::Content("Ἐν ἀρχῇ ἦν ὁ λόγος, \"καὶ\" ὁ λόγος".to_string());
    c.bench_function("increment_to_ndjson", |b| {
        b.iter(|| -> Bytes { black_box(&increment).to_ndjson() })
    });
}

criterion_group!(benches, bench_decoders, bench_ndjson_encoding);
criterion_main!(benches);
