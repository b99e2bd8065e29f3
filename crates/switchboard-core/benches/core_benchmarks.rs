//! Performance benchmarks for switchboard-core.
//!
//! Run with: cargo bench -p switchboard-core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use switchboard_core::types::{ChannelId, PeerId, PeerType, SessionKey};
use switchboard_core::validation::{validate_message_content, validate_raw_payload};

/// Benchmark session key construction.
fn bench_session_key_build(c: &mut Criterion) {
    c.bench_function("session_key_build", |b| {
        let channel = ChannelId::telegram();
        let peer_id = PeerId::new("test-peer");

        b.iter(|| {
            SessionKey::build(
                black_box(&channel),
                black_box("test-account"),
                black_box(PeerType::Dm),
                black_box(&peer_id),
            )
        });
    });
}

/// Benchmark session key parsing.
fn bench_session_key_parts(c: &mut Criterion) {
    let key = SessionKey::build(
        &ChannelId::telegram(),
        "123456",
        PeerType::Group,
        &PeerId::new("-100987654321"),
    );

    c.bench_function("session_key_parts", |b| {
        b.iter(|| black_box(&key).parts());
    });
}

/// Benchmark inbound text sanitization at different sizes.
fn bench_message_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_message_content");

    for size in [64usize, 1024, 16 * 1024].iter() {
        let content = "héllo wörld \u{FB01}\n".repeat(size / 16);
        group.bench_with_input(BenchmarkId::new("bytes", size), &content, |b, content| {
            b.iter(|| validate_message_content(black_box(content), 64 * 1024));
        });
    }

    group.finish();
}

/// Benchmark raw payload checks on a Telegram-shaped update.
fn bench_raw_payload(c: &mut Criterion) {
    let raw = serde_json::json!({
        "update_id": 1,
        "message": {
            "message_id": 42,
            "date": 1_700_000_000,
            "chat": { "id": -100, "type": "supergroup", "title": "bench" },
            "from": { "id": 7, "is_bot": false, "first_name": "Bench" },
            "text": "hello"
        }
    });

    c.bench_function("validate_raw_payload", |b| {
        b.iter(|| validate_raw_payload(black_box(&raw)));
    });
}

criterion_group!(
    benches,
    bench_session_key_build,
    bench_session_key_parts,
    bench_message_validation,
    bench_raw_payload,
);
criterion_main!(benches);
