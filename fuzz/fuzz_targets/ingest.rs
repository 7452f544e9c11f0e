#![no_main]

use libfuzzer_sys::fuzz_target;
use logharvest_log_pipeline::{LogPipelineBuilder, MetricRule, RuleSet};

fuzz_target!(|data: &[u8]| {
    let rules = RuleSet {
        counters: vec![MetricRule::with_pattern(
            "fuzz.requests",
            "user=<user> status=<code:number>",
        )],
        gauges: vec![MetricRule::with_pattern("fuzz.peer", "from <addr:ip> load=<load:number>")
            .value("load")
            .partial(true)],
        histograms: vec![MetricRule::with_pattern("fuzz.latency", "* took <ms:number>ms").value("ms")],
    };
    let Ok((pipeline, _points)) = LogPipelineBuilder::new().rules(rules).build() else {
        return;
    };

    pipeline.on_message(data);

    // 메시지 하나는 손상/미매칭 중 최대 한 곳에만 집계
    let snap = pipeline.meta().snapshot();
    assert_eq!(snap.received, 1);
    assert!(snap.malformed + snap.unparsed <= 1);
});
