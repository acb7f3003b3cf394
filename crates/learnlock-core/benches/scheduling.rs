use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use learnlock_core::config::EngineConfig;
use learnlock_core::model::{BeliefState, Claim, ClaimAssessment, ClaimKind, ClaimStatus};
use learnlock_core::scheduler::{ReviewScheduler, ScheduleRecord};
use learnlock_core::scoring::Scorer;

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("review_scheduler");
    let config = EngineConfig::default();
    let scheduler = ReviewScheduler::new(&config);
    let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let record = ScheduleRecord::new("bench", &config, now);

    group.bench_function("apply_pass", |b| {
        b.iter(|| scheduler.apply(black_box(&record), black_box(4), now))
    });

    group.bench_function("apply_fail", |b| {
        b.iter(|| scheduler.apply(black_box(&record), black_box(1), now))
    });

    group.bench_function("twenty_reviews", |b| {
        b.iter(|| {
            let mut r = record.clone();
            for score in [5, 4, 3, 2, 5].iter().cycle().take(20) {
                r = scheduler.apply(&r, *score, now).unwrap();
            }
            r
        })
    });

    group.finish();
}

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("scorer");
    let scorer = Scorer::new(&EngineConfig::default());
    let claims: Vec<Claim> = (0..8)
        .map(|i| {
            let kind = if i % 2 == 0 {
                ClaimKind::Mechanism
            } else {
                ClaimKind::Boundary
            };
            Claim::new(format!("claim {i} holds because of rule {i}"), kind)
        })
        .collect();
    let trajectory: Vec<BeliefState> = (1..=3u8)
        .map(|turn| BeliefState {
            turn,
            assessments: (0..claims.len())
                .map(|claim| ClaimAssessment {
                    claim,
                    status: if claim < usize::from(turn) * 3 {
                        ClaimStatus::Satisfied
                    } else {
                        ClaimStatus::Unaddressed
                    },
                    justification: String::new(),
                    conflated_with: None,
                })
                .collect(),
            notes: String::new(),
        })
        .collect();

    group.bench_function("three_turns", |b| {
        b.iter(|| scorer.score(black_box(&claims), black_box(&trajectory), false))
    });

    group.finish();
}

criterion_group!(benches, bench_schedule, bench_score);
criterion_main!(benches);
