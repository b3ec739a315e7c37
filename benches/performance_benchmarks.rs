use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hyroxrs::models::*;
use hyroxrs::{AnalyticsService, AppConfig, IntervalMerger, TrainingLoadAggregator, ZoneClassifier};

/// Performance benchmarks for the analytics pipeline
///
/// These benchmarks track how the core aggregations scale with the
/// number of samples and users.

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn reference_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 8).unwrap()
}

fn overlapping_spans(count: usize) -> Vec<TimeSpan> {
    (0..count)
        .map(|i| {
            // Every third span overlaps its predecessor
            let start = origin() + Duration::seconds((i as i64) * 50);
            let length = if i % 3 == 0 { 90 } else { 40 };
            TimeSpan::new(start, start + Duration::seconds(length)).unwrap()
        })
        .collect()
}

fn heart_rate_series(count: usize) -> Vec<HeartRateSample> {
    (0..count)
        .map(|i| {
            let start = origin() + Duration::seconds(i as i64 * 5);
            HeartRateSample {
                bpm: 100.0 + (i % 90) as f64,
                span: TimeSpan::new(start, start + Duration::seconds(5)).unwrap(),
            }
        })
        .collect()
}

fn workout_series(days: i64) -> Vec<WorkoutRecord> {
    (0..days)
        .map(|day| {
            let start = origin() - Duration::days(day) + Duration::hours(7);
            let laps = (0..10)
                .map(|km| {
                    let lap_start = start + Duration::seconds(km * 300);
                    TimeSpan::new(lap_start, lap_start + Duration::seconds(300)).unwrap()
                })
                .collect();
            WorkoutRecord {
                id: format!("run-{}", day),
                span: TimeSpan::new(start, start + Duration::seconds(3000)).unwrap(),
                distance_meters: 10_000.0,
                activity_kind: ActivityKind::Running,
                laps,
            }
        })
        .collect()
}

fn snapshot(user: usize) -> UserSnapshot {
    let mut snapshot = UserSnapshot::new(format!("athlete-{}", user));
    snapshot.hrv_ms = Some(45.0 + (user % 20) as f64);
    snapshot.resting_hr = Some(52);
    snapshot.workouts = workout_series(14);
    snapshot.heart_rate_samples = heart_rate_series(2_000);
    snapshot.sleep_samples = (1..=7)
        .flat_map(|night| {
            let bed = origin() + Duration::days(night) - Duration::hours(1);
            [
                (SleepCategory::AsleepCore, 0, 300),
                (SleepCategory::AsleepDeep, 300, 390),
                (SleepCategory::AsleepRem, 390, 480),
            ]
            .into_iter()
            .map(move |(category, from, to)| CategorizedSample {
                category,
                span: TimeSpan::new(bed + Duration::minutes(from), bed + Duration::minutes(to)).unwrap(),
            })
        })
        .collect();
    snapshot
}

fn bench_interval_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("Interval Merge");

    for &size in &[10, 100, 1_000, 10_000] {
        let spans = overlapping_spans(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("total_duration", size), &spans, |b, spans| {
            b.iter(|| IntervalMerger::total_duration(black_box(spans)));
        });
    }

    group.finish();
}

fn bench_zone_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("Zone Classification");

    for &size in &[100, 1_000, 10_000] {
        let samples = heart_rate_series(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("classify", size), &samples, |b, samples| {
            b.iter(|| ZoneClassifier::classify(black_box(samples), 190.0));
        });
    }

    group.finish();
}

fn bench_training_load(c: &mut Criterion) {
    let aggregator = TrainingLoadAggregator::default();
    let mut group = c.benchmark_group("Training Load");

    for &days in &[7, 30, 365] {
        let workouts = workout_series(days);

        group.bench_with_input(BenchmarkId::new("weekly_load", days), &workouts, |b, workouts| {
            b.iter(|| aggregator.weekly_load(black_box(workouts), 6.0, reference_day()));
        });
    }

    group.finish();
}

fn bench_weekly_summary(c: &mut Criterion) {
    let service = AnalyticsService::from_config(&AppConfig::default());
    let mut group = c.benchmark_group("Weekly Summary");
    group.sample_size(20);

    let single = snapshot(0);
    group.bench_function("single_user", |b| {
        b.iter(|| service.weekly_summary(black_box(&single), reference_day()));
    });

    for &users in &[4, 32] {
        let snapshots: Vec<UserSnapshot> = (0..users).map(snapshot).collect();

        group.throughput(Throughput::Elements(users as u64));
        group.bench_with_input(BenchmarkId::new("summarize_many", users), &snapshots, |b, snapshots| {
            b.iter(|| service.summarize_many(black_box(snapshots), reference_day()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_interval_merge,
    bench_zone_classification,
    bench_training_load,
    bench_weekly_summary
);
criterion_main!(benches);
