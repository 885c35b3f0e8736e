use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use work_scheduler::scheduler::{JobOutcome, PullQueue, PullQueueConfig, SchedulerRegistry};

fn bench_pull_drain(c: &mut Criterion) {
    c.bench_function("pull_drain_256_jobs", |b| {
        b.iter_batched(
            || {
                let registry = SchedulerRegistry::new();
                let queue = PullQueue::new(PullQueueConfig::default(), &registry);
                for _ in 0..256 {
                    queue.submit_with(0.0, || Ok(JobOutcome::Completed));
                }
                (registry, queue)
            },
            |(_registry, queue)| queue.drain_with_limit(256, 256),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("pull_drain_empty", |b| {
        let registry = SchedulerRegistry::new();
        let queue = PullQueue::new(PullQueueConfig::default(), &registry);
        b.iter(|| queue.drain(16))
    });
}

criterion_group!(benches, bench_pull_drain);
criterion_main!(benches);
