use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fs;
use tempfile::TempDir;
use wx_ingest::models::ObservationRecord;
use wx_ingest::processors::{aggregate_yearly, group_by_station};
use wx_ingest::readers::{ConcurrentReader, ObservationReader};

fn station_lines(days: usize) -> Vec<String> {
    let base = NaiveDate::from_ymd_opt(1985, 1, 1).unwrap();
    (0..days)
        .map(|day| {
            let date = base + Duration::days(day as i64);
            let precip = if day % 7 == 0 { -9999 } else { (day % 40) as i32 };
            format!(
                "{}\t{}\t{}\t{}",
                date.format("%Y%m%d"),
                150 + (day % 100) as i32,
                -20 + (day % 60) as i32,
                precip
            )
        })
        .collect()
}

fn create_test_records(stations: usize, days: usize) -> Vec<ObservationRecord> {
    let reader = ObservationReader::new();
    let lines = station_lines(days);
    (0..stations)
        .flat_map(|s| {
            let station = format!("USC{:08}", s);
            lines
                .iter()
                .filter_map(|line| reader.parse_line(line, &station))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn benchmark_parse_line(c: &mut Criterion) {
    let reader = ObservationReader::new();
    let lines = station_lines(3650);

    c.bench_function("parse_station_lines", |b| {
        b.iter(|| {
            lines
                .iter()
                .filter_map(|line| reader.parse_line(black_box(line), "USC00110072"))
                .count()
        })
    });
}

fn benchmark_parallel_read(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let content = station_lines(3650).join("\n");
    for s in 0..32 {
        fs::write(dir.path().join(format!("USC{:08}.txt", s)), &content).unwrap();
    }

    let mut group = c.benchmark_group("read_directory");
    for workers in [1usize, 4, 8] {
        let reader = ConcurrentReader::new(workers);
        let files = reader.discover_files(dir.path()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| reader.read_all(black_box(&files), None).unwrap().candidate_count())
        });
    }
    group.finish();
}

fn benchmark_dedup_and_aggregate(c: &mut Criterion) {
    let records = create_test_records(20, 3650);

    c.bench_function("group_by_station", |b| {
        b.iter(|| group_by_station(black_box(records.clone())).1)
    });

    c.bench_function("aggregate_yearly", |b| {
        b.iter(|| aggregate_yearly(black_box(&records)).len())
    });
}

criterion_group!(
    benches,
    benchmark_parse_line,
    benchmark_parallel_read,
    benchmark_dedup_and_aggregate
);
criterion_main!(benches);
