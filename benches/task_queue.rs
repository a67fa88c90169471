//! Dedup-candidate scoring cost as the queue grows.

use abathur::domain::models::{Task, TaskPriority};
use abathur::services::task_queue_service::{best_duplicate, cosine_similarity};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

fn embedding(seed: u64) -> Vec<f32> {
    (0..1536).map(|i| ((seed.wrapping_mul(2654435761).wrapping_add(i)) % 997) as f32 / 997.0).collect()
}

fn candidate_tasks(workflow_id: Uuid, n: usize) -> Vec<Task> {
    (0..n as u64)
        .map(|i| {
            let mut task = Task::new(workflow_id, format!("task {i}"), "done").with_priority(TaskPriority::Med);
            task.description_embedding = Some(embedding(i));
            task
        })
        .collect()
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a = embedding(1);
    let b = embedding(2);
    c.bench_function("cosine_similarity/1536d", |bencher| {
        bencher.iter(|| cosine_similarity(black_box(&a), black_box(&b)));
    });
}

fn bench_best_duplicate(c: &mut Criterion) {
    let workflow_id = Uuid::new_v4();
    let mut group = c.benchmark_group("best_duplicate");
    for size in [10usize, 100, 1000] {
        let candidates = candidate_tasks(workflow_id, size);
        let query = embedding(size as u64 + 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &candidates, |bencher, candidates| {
            bencher.iter(|| best_duplicate(black_box(&query), black_box(candidates), 0.92));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cosine_similarity, bench_best_duplicate);
criterion_main!(benches);
