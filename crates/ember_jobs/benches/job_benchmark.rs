//! # Job System Benchmarks
//!
//! Scheduling overhead for independent jobs and for dependency chains.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ember_jobs::{Job, JobSystem, JobSystemConfig, JobThreadType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const JOBS: usize = 1_000;

fn bench_independent_jobs(c: &mut Criterion) {
    c.bench_function("schedule_and_drain_1k_independent", |b| {
        b.iter(|| {
            let system = JobSystem::init(JobSystemConfig::default()).unwrap();
            let counter = Arc::new(AtomicUsize::new(0));
            for _ in 0..JOBS {
                let counter = Arc::clone(&counter);
                let job = Job::new("tick", move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
                system.schedule(&job, JobThreadType::Other).unwrap();
            }
            system.destroy().unwrap();
            black_box(counter.load(Ordering::Relaxed))
        });
    });
}

fn bench_dependency_fan_in(c: &mut Criterion) {
    c.bench_function("schedule_and_drain_1k_fan_in", |b| {
        b.iter(|| {
            let system = JobSystem::init(JobSystemConfig::default()).unwrap();
            let join = Job::new("join", || {});
            let leaves: Vec<_> = (0..JOBS).map(|_| Job::new("leaf", || {})).collect();
            for leaf in &leaves {
                join.add_dependency(leaf).unwrap();
            }
            system.schedule(&join, JobThreadType::Main).unwrap();
            for leaf in &leaves {
                system.schedule(leaf, JobThreadType::Resource).unwrap();
            }
            system.destroy().unwrap();
            black_box(join.is_done())
        });
    });
}

criterion_group!(benches, bench_independent_jobs, bench_dependency_fan_in);
criterion_main!(benches);
