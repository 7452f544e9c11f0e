//! 메타 메트릭 -- 파이프라인 자체의 처리 통계
//!
//! 파이프라인 인스턴스마다 독립된 원자 카운터를 소유하며, 모든 증가는
//! `metrics` 파사드로도 미러링됩니다. 드리프트는 이벤트 시각과 수신 시각의
//! 차이를 기록하는 히스토그램입니다.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use logharvest_core::metrics as names;
use logharvest_core::types::{HistogramSnapshot, MetricPoint, MetricValue};

use crate::histogram::DecayingHistogram;

/// 메타 메트릭 값 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetaSnapshot {
    /// 수신된 메시지 수
    pub received: u64,
    /// 규칙 매칭 수
    pub parsed: u64,
    /// 매칭되지 않은 메시지 수
    pub unparsed: u64,
    /// 디코딩 실패 메시지 수
    pub malformed: u64,
    /// 전송된 포인트 수
    pub sent: u64,
    /// 전송 실패 포인트 수
    pub send_failed: u64,
}

/// 메타 메트릭
#[derive(Debug)]
pub struct MetaMetrics {
    received: AtomicU64,
    parsed: AtomicU64,
    unparsed: AtomicU64,
    malformed: AtomicU64,
    sent: AtomicU64,
    send_failed: AtomicU64,
    drift: Mutex<DecayingHistogram>,
}

impl MetaMetrics {
    /// 새 메타 메트릭을 생성합니다.
    pub fn new(now_millis: i64) -> Self {
        Self {
            received: AtomicU64::new(0),
            parsed: AtomicU64::new(0),
            unparsed: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            send_failed: AtomicU64::new(0),
            drift: Mutex::new(DecayingHistogram::new(now_millis)),
        }
    }

    /// 메시지 수신
    pub fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::MESSAGES_RECEIVED_TOTAL).increment(1);
    }

    /// 규칙 매칭 1건
    pub fn inc_parsed(&self) {
        self.parsed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::MESSAGES_PARSED_TOTAL).increment(1);
    }

    /// 어떤 규칙에도 매칭되지 않은 메시지
    pub fn inc_unparsed(&self) {
        self.unparsed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::MESSAGES_UNPARSED_TOTAL).increment(1);
    }

    /// 디코딩 실패 메시지
    pub fn inc_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::MESSAGES_MALFORMED_TOTAL).increment(1);
    }

    /// 전송 성공 포인트
    pub fn inc_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::POINTS_SENT_TOTAL).increment(1);
    }

    /// 전송 실패 포인트
    pub fn inc_send_failed(&self) {
        self.send_failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::POINTS_SEND_FAILED_TOTAL).increment(1);
    }

    /// 드리프트 관측값을 기록합니다 (수신 시각 - 이벤트 시각, 밀리초).
    ///
    /// 미래 이벤트는 음수이며 그대로 기록합니다.
    pub fn record_drift(&self, drift_millis: i64, now_millis: i64) {
        #[allow(clippy::cast_precision_loss)]
        let drift = drift_millis as f64;
        self.drift.lock().update(drift, now_millis);
        metrics::histogram!(names::EVENT_DRIFT_MILLIS).record(drift);
    }

    /// 현재 카운터 값 스냅샷
    pub fn snapshot(&self) -> MetaSnapshot {
        MetaSnapshot {
            received: self.received.load(Ordering::Relaxed),
            parsed: self.parsed.load(Ordering::Relaxed),
            unparsed: self.unparsed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            send_failed: self.send_failed.load(Ordering::Relaxed),
        }
    }

    /// 현재 드리프트 분포 (상태 변경 없음)
    pub fn drift_snapshot(&self) -> HistogramSnapshot {
        self.drift.lock().snapshot()
    }

    /// 플러시용 메타 포인트를 생성합니다.
    ///
    /// 카운터는 누적값으로 방출하며, 드리프트는 구간에 샘플이 있을 때만
    /// 방출하고 다음 구간으로 넘깁니다. 이름은 예약 네임스페이스를 사용하며
    /// 전역 접두어를 적용하지 않습니다.
    pub fn flush_points(&self, now_millis: i64) -> Vec<MetricPoint> {
        let snap = self.snapshot();
        let counters = [
            (names::META_RECEIVED, snap.received),
            (names::META_PARSED, snap.parsed),
            (names::META_UNPARSED, snap.unparsed),
            (names::META_MALFORMED, snap.malformed),
            (names::META_SENT, snap.sent),
            (names::META_SEND_FAILED, snap.send_failed),
        ];

        let mut points: Vec<MetricPoint> = counters
            .into_iter()
            .map(|(name, value)| MetricPoint {
                name: meta_name(name),
                tags: Vec::new(),
                value: MetricValue::Counter(i64::try_from(value).unwrap_or(i64::MAX)),
                timestamp_millis: now_millis,
            })
            .collect();

        let drift = self.drift.lock().advance(now_millis);
        if drift.count > 0 {
            points.push(MetricPoint {
                name: meta_name(names::META_DRIFT),
                tags: Vec::new(),
                value: MetricValue::Histogram(drift),
                timestamp_millis: now_millis,
            });
        }

        points
    }
}

fn meta_name(name: &str) -> String {
    format!("{}.{name}", names::META_NAMESPACE)
}
