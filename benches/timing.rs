use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use citadel_mail::{open_naked, MessageEnvelope, OrgKey, UserKey};

fn message(body_bytes: usize) -> Vec<u8> {
    let mut message = b"Date: Mon, 2 Mar 2026 09:15:00 +0000\r\n\
        From: alice@example.org\r\n\
        To: bob@example.com\r\n\
        Subject: bench\r\n\
        \r\n"
        .to_vec();
    message.resize(message.len() + body_bytes, 0x42);
    message
}

fn bench_seal(c: &mut Criterion) {
    let org = OrgKey::generate();
    let user = UserKey::generate();
    let signet = user.signet();

    let mut group = c.benchmark_group("seal_naked");
    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let message = message(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| MessageEnvelope::seal_naked(black_box(message), &org, &signet).unwrap())
        });
    }
    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let org = OrgKey::generate();
    let user = UserKey::generate();
    let org_signet = org.signet();

    let mut group = c.benchmark_group("open_naked");
    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let sealed = MessageEnvelope::seal_naked(&message(size), &org, &user.signet())
            .unwrap()
            .into_bytes();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &sealed, |b, bytes| {
            b.iter(|| open_naked(black_box(bytes), &org_signet, &user).unwrap())
        });
    }
    group.finish();
}

/// Rejection at an early, a late and the final decode stage.
fn bench_reject(c: &mut Criterion) {
    let org = OrgKey::generate();
    let user = UserKey::generate();
    let org_signet = org.signet();
    let sealed = MessageEnvelope::seal_naked(&message(1024), &org, &user.signet()).unwrap();

    let mut tampered_body = sealed.encrypted().to_vec();
    let middle = tampered_body.len() / 2;
    tampered_body[middle] ^= 0x01;

    let mut tampered_org = sealed.encrypted().to_vec();
    let last = tampered_org.len() - 1;
    tampered_org[last] ^= 0x01;

    let wrong_org = OrgKey::generate().signet();

    let mut group = c.benchmark_group("reject");
    group.bench_function("tampered_body", |b| {
        b.iter(|| open_naked(black_box(&tampered_body), &org_signet, &user).unwrap_err())
    });
    group.bench_function("tampered_org_signature", |b| {
        b.iter(|| open_naked(black_box(&tampered_org), &org_signet, &user).unwrap_err())
    });
    group.bench_function("wrong_org", |b| {
        b.iter(|| open_naked(black_box(sealed.encrypted()), &wrong_org, &user).unwrap_err())
    });
    group.finish();
}

criterion_group!(benches, bench_seal, bench_open, bench_reject);
criterion_main!(benches);
