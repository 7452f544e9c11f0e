//! 플러시 스케줄러 -- 주기적 방출과 만료 스윕
//!
//! [`FlushProcessor`]는 레지스트리 스냅샷의 모든 누산기를 방출 레코드로
//! 바꾸어 아웃바운드 큐에 넣습니다. 큐가 가득 차면 기다리지 않고
//! 포인트를 버린 뒤 `send_failed`로 집계합니다.
//!
//! 주기 태스크는 [`CancellationToken`]으로 정지하며, 첫 실행은
//! 한 주기가 지난 뒤입니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use logharvest_core::metrics as names;
use logharvest_core::types::MetricPoint;

use crate::clock::Clock;
use crate::liveness::LivenessTracker;
use crate::meta::MetaMetrics;
use crate::registry::MetricRegistry;

/// 플러시 한 회의 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// 큐에 들어간 포인트 수
    pub queued: usize,
    /// 큐가 가득 차거나 닫혀 버려진 포인트 수
    pub dropped: usize,
}

/// 레지스트리를 방출 레코드로 변환하는 플러시 처리기
pub struct FlushProcessor {
    registry: Arc<MetricRegistry>,
    meta: Arc<MetaMetrics>,
    clock: Arc<dyn Clock>,
    prefix: String,
    report_empty_histograms: bool,
    tx: mpsc::Sender<MetricPoint>,
}

impl FlushProcessor {
    /// 새 플러시 처리기를 생성합니다.
    pub fn new(
        registry: Arc<MetricRegistry>,
        meta: Arc<MetaMetrics>,
        clock: Arc<dyn Clock>,
        prefix: impl Into<String>,
        report_empty_histograms: bool,
        tx: mpsc::Sender<MetricPoint>,
    ) -> Self {
        Self {
            registry,
            meta,
            clock,
            prefix: prefix.into(),
            report_empty_histograms,
            tx,
        }
    }

    /// 메트릭 이름에 전역 접두어를 적용합니다.
    pub fn qualified_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}.{name}", self.prefix)
        }
    }

    /// 플러시를 한 번 수행합니다.
    ///
    /// 모든 누산기의 값을 산출해 큐에 넣은 뒤 메타 메트릭을 덧붙입니다.
    /// 모든 포인트는 같은 플러시 시각을 타임스탬프로 갖습니다.
    pub fn flush_once(&self) -> FlushReport {
        let now = self.clock.now_millis();
        let entries = self.registry.snapshot();

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(names::REGISTRY_SIZE).set(entries.len() as f64);

        let mut points: Vec<MetricPoint> = entries
            .into_iter()
            .filter_map(|(identity, accumulator)| {
                accumulator
                    .flush(now, self.report_empty_histograms)
                    .map(|value| MetricPoint {
                        name: self.qualified_name(identity.name()),
                        tags: identity.tags().to_vec(),
                        value,
                        timestamp_millis: now,
                    })
            })
            .collect();
        points.extend(self.meta.flush_points(now));

        let mut report = FlushReport::default();
        for point in points {
            match self.tx.try_send(point) {
                Ok(()) => report.queued += 1,
                Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                    self.meta.inc_send_failed();
                    report.dropped += 1;
                }
            }
        }

        if report.dropped > 0 {
            tracing::warn!(
                dropped = report.dropped,
                capacity = self.tx.max_capacity(),
                "outbound queue full, points dropped"
            );
        }
        tracing::debug!(queued = report.queued, "flush completed");

        report
    }
}

/// 주기 플러시 태스크를 스폰합니다.
pub fn spawn_flush_task(
    processor: Arc<FlushProcessor>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    processor.flush_once();
                }
            }
        }
        tracing::debug!("flush task stopped");
    })
}

/// 주기 만료 스윕 태스크를 스폰합니다.
pub fn spawn_sweep_task(
    liveness: Arc<LivenessTracker>,
    registry: Arc<MetricRegistry>,
    clock: Arc<dyn Clock>,
    period: Duration,
    expiry_millis: i64,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = liveness.sweep(&registry, clock.now_millis(), expiry_millis);
                    if !evicted.is_empty() {
                        metrics::counter!(names::METRICS_EVICTED_TOTAL)
                            .increment(evicted.len() as u64);
                        tracing::info!(count = evicted.len(), "evicted stale metrics");
                    }
                }
            }
        }
        tracing::debug!("sweep task stopped");
    })
}
