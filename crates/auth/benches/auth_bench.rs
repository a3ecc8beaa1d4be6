use std::sync::Arc;

use auth::{HashParams, PasswordHasher, TokenConfig, TokenService};
use chrono::Duration;
use common::{AccountId, SystemClock};
use criterion::{Criterion, criterion_group, criterion_main};
use secrecy::SecretString;

fn bench_password(c: &mut Criterion) {
    let hasher = PasswordHasher::new(HashParams::default()).unwrap();
    let stored = hasher.hash("correct horse battery staple").unwrap();

    let mut group = c.benchmark_group("auth/password");
    group.sample_size(10);
    group.bench_function("hash_default_params", |b| {
        b.iter(|| hasher.hash("correct horse battery staple").unwrap());
    });
    group.bench_function("verify_default_params", |b| {
        b.iter(|| hasher.verify("correct horse battery staple", &stored));
    });
    group.finish();
}

fn bench_tokens(c: &mut Criterion) {
    let tokens = TokenService::new(
        TokenConfig {
            signing_key: SecretString::from("bench-signing-key-0123456789abcdef0123"),
            issuer: "online-store".to_string(),
            audience: "online-store-clients".to_string(),
            ttl: Duration::hours(1),
        },
        Arc::new(SystemClock),
    )
    .unwrap();
    let subject = AccountId::new();
    let issued = tokens.issue(subject).unwrap();

    c.bench_function("auth/token_issue", |b| {
        b.iter(|| tokens.issue(subject).unwrap());
    });
    c.bench_function("auth/token_validate", |b| {
        b.iter(|| tokens.validate(&issued.token).unwrap());
    });
}

criterion_group!(benches, bench_password, bench_tokens);
criterion_main!(benches);
