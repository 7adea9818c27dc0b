//! Benchmarks for the mutex's own bookkeeping over a backend that answers instantly.

use criterion::{Criterion, criterion_group, criterion_main};
use db_mutex::prelude::*;
use std::time::Duration;

/// Grants every lock without doing any I/O.
struct InstantBackend;

impl MutexBackend for InstantBackend {
    fn backend_name(&self) -> &'static str {
        "instant"
    }

    async fn acquire_lock(&self, _name: &str, _timeout: TimeoutValue) -> MutexResult<Acquisition> {
        Ok(Acquisition::Acquired)
    }

    async fn release_lock(&self, _name: &str) -> MutexResult<bool> {
        Ok(true)
    }
}

fn bench_mutex_overhead(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mutex = DbMutex::new(InstantBackend);

    let mut group = c.benchmark_group("db_mutex");
    group.bench_function("acquire_release", |b| {
        b.to_async(&runtime).iter(|| async {
            mutex.acquire("bench-lock").await.unwrap();
            mutex.release("bench-lock").await.unwrap();
        });
    });

    runtime.block_on(async {
        mutex.acquire("bench-held").await.unwrap();
    });
    group.bench_function("reentrant_acquire", |b| {
        b.to_async(&runtime).iter(|| async {
            mutex
                .acquire_timeout("bench-held", Duration::ZERO)
                .await
                .unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_mutex_overhead);
criterion_main!(benches);
