use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mentor_identity::auth::{Credential, NewCredential, PasswordHasher, TokenService};
use mentor_identity::identifier::classify;
use mentor_identity::verification::email::hash_code;
use std::hint::black_box;

fn sample_credential() -> Credential {
    let hasher = PasswordHasher::new("bench-pepper");
    let id = classify("bench@example.com").unwrap();
    NewCredential::with_password(&id, hasher.hash("Password123").unwrap(), Some("uid".into()))
        .into_credential(uuid::Uuid::new_v4(), chrono::Utc::now())
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    for raw in ["Mentor@Example.com", "+44 7911 123456", "not an identifier"] {
        group.bench_with_input(BenchmarkId::from_parameter(raw), raw, |b, raw| {
            b.iter(|| classify(black_box(raw)))
        });
    }
    group.finish();
}

fn bench_tokens(c: &mut Criterion) {
    let tokens = TokenService::new("benchmark_secret_key_for_jwt_signing");
    let credential = sample_credential();
    let token = tokens.issue(&credential).unwrap().token;

    c.bench_function("token_issue", |b| b.iter(|| tokens.issue(black_box(&credential))));
    c.bench_function("token_verify", |b| b.iter(|| tokens.verify(black_box(&token))));
}

fn bench_code_hash(c: &mut Criterion) {
    c.bench_function("hash_code", |b| b.iter(|| hash_code(black_box("482913"))));
}

criterion_group!(benches, bench_classify, bench_tokens, bench_code_hash);
criterion_main!(benches);
