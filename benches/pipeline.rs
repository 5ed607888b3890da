use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kuba_rollup::aggregation::ConsolidationFunction;
use kuba_rollup::query::{ResultDescriptor, ResultProcessor};
use kuba_rollup::source::InMemorySampleSource;
use kuba_rollup::time::{Duration, Timestamp};
use kuba_rollup::types::{Resource, Sample};
use kuba_rollup::value::ValueType;

const START: i64 = 900_000_000;

/// Two counters and a gauge sampled every `spacing` seconds for `count` samples
fn create_source(count: i64, spacing: i64) -> InMemorySampleSource {
    let resource = Resource::new("localhost");
    let source = InMemorySampleSource::new();
    source.insert_all((0..count).flat_map(|i| {
        let ts = Timestamp::from_epoch_seconds(START + i * spacing);
        let octets = (i as u64).wrapping_mul(1_500) as u32 as u64;
        [
            Sample::new(ts, resource.clone(), "ifInOctets", ValueType::Counter(octets)),
            Sample::new(ts, resource.clone(), "ifOutOctets", ValueType::Counter(octets * 2)),
            Sample::new(ts, resource.clone(), "load", ValueType::Gauge((i % 17) as f64)),
        ]
    }));
    source
}

fn traffic_descriptor() -> ResultDescriptor {
    ResultDescriptor::builder()
        .step(Duration::seconds(300))
        .datasource("in", "ifInOctets", ConsolidationFunction::Average)
        .datasource("out", "ifOutOctets", ConsolidationFunction::Max)
        .datasource("load", "load", ConsolidationFunction::Average)
        .expression("bits", "(in + out) * 8")
        .export(["in", "out", "bits", "load"])
        .build()
        .unwrap()
}

fn bench_resolutions(c: &mut Criterion) {
    let samples = 10_000;
    let source = create_source(samples, 300);
    let end = Timestamp::from_epoch_seconds(START + samples * 300);

    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(samples as u64));

    for resolution in [Duration::minutes(5), Duration::hours(1), Duration::days(1)] {
        let processor = ResultProcessor::new(
            Resource::new("localhost"),
            Timestamp::from_epoch_seconds(START).step_ceiling(resolution),
            end,
            traffic_descriptor(),
            resolution,
        )
        .unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(resolution),
            &processor,
            |b, processor| b.iter(|| black_box(processor.select(&source).unwrap())),
        );
    }

    group.finish();
}

fn bench_sample_density(c: &mut Criterion) {
    let span = 86_400;
    let mut group = c.benchmark_group("sample_density");

    for spacing in [10, 60, 300] {
        let source = create_source(span / spacing, spacing);
        let processor = ResultProcessor::new(
            Resource::new("localhost"),
            Timestamp::from_epoch_seconds(START + 3_600),
            Timestamp::from_epoch_seconds(START + span),
            traffic_descriptor(),
            Duration::hours(1),
        )
        .unwrap();

        group.throughput(Throughput::Elements((span / spacing) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(spacing), &processor, |b, processor| {
            b.iter(|| black_box(processor.select(&source).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolutions, bench_sample_density);
criterion_main!(benches);
