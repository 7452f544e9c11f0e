//! 패턴 매칭 및 수집 벤치마크
//!
//! 템플릿 매칭, 규칙 수에 따른 평가 비용, 메시지 한 건의 전체 수집 비용을 측정합니다.

use std::collections::HashMap;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use logharvest_log_pipeline::{
    LogPipelineBuilder, MetricRule, NormalizedRecord, RuleEngine, RuleSet, Template,
};

fn record(message: &str) -> NormalizedRecord {
    let mut fields = HashMap::new();
    fields.insert("message".to_owned(), message.to_owned());
    NormalizedRecord::new(fields, None)
}

fn bench_template(c: &mut Criterion) {
    let mut group = c.benchmark_group("template");

    let cases = [
        ("literal", "request completed", "request completed"),
        (
            "captures",
            "user=<user> status=<code:number>",
            "user=alice status=500",
        ),
        (
            "wildcard",
            "<method> * took <ms:number>ms",
            "GET /api/v1/users/42 took 12.5ms",
        ),
        (
            "ip",
            "connection from <client:ip> port <port:number>",
            "connection from 2001:db8::1 port 443",
        ),
    ];

    for (name, pattern, input) in cases {
        let template = Template::compile(pattern, false).unwrap();
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::new("captures", name), input, |b, input| {
            b.iter(|| template.captures(black_box(input)));
        });
    }

    group.finish();
}

fn bench_rule_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_scaling");
    let message = record("user=alice status=500");

    for count in [1_usize, 10, 50, 100] {
        let rules = RuleSet {
            counters: (0..count)
                .map(|i| MetricRule::with_pattern(format!("rule{i}"), format!("user=<user> status={i}")))
                .chain(std::iter::once(MetricRule::with_pattern(
                    "requests",
                    "user=<user> status=<code:number>",
                )))
                .collect(),
            ..RuleSet::default()
        };
        let engine = RuleEngine::compile(&rules).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), &engine, |b, engine| {
            b.iter(|| engine.evaluate(black_box(&message)).count());
        });
    }

    group.finish();
}

fn bench_ingest(c: &mut Criterion) {
    let rules = RuleSet {
        counters: vec![MetricRule::with_pattern(
            "requests",
            "user=<user> status=<code:number>",
        )],
        histograms: vec![
            MetricRule::with_pattern("latency", "* took <ms:number>ms")
                .value("ms")
                .partial(true),
        ],
        ..RuleSet::default()
    };
    let (pipeline, _points) = LogPipelineBuilder::new().rules(rules).build().unwrap();
    let ingestor = pipeline.ingestor();

    let payload = br#"{"message":"user=alice status=500","@timestamp":"2024-01-15T12:00:00Z"}"#;
    c.bench_function("ingest_json_message", |b| {
        b.iter(|| ingestor.ingest(black_box(payload)));
    });
}

criterion_group!(benches, bench_template, bench_rule_scaling, bench_ingest);
criterion_main!(benches);
