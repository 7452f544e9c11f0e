//! 다운스트림 싱크 -- 플러시된 포인트를 전달합니다.
//!
//! 플러시는 포인트를 제한된 아웃바운드 큐에 `try_send`로 넣기만 하고,
//! [`SinkForwarder`] 태스크가 큐를 비우며 [`PointHandler`]를 호출합니다.
//! 느리거나 응답하지 않는 싱크는 수집이나 스윕을 막지 못합니다.
//!
//! # 제공 핸들러
//! - [`LogSink`]: 포인트를 구조화된 `tracing` 이벤트로 기록
//! - [`TcpLineSink`]: 라인 프로토콜로 TCP 전송, 실패 후 지연 재연결

pub mod line;
pub mod log;

pub use line::{TcpLineSink, format_lines};
pub use log::LogSink;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use logharvest_core::pipeline::PointHandler;
use logharvest_core::types::MetricPoint;

use crate::meta::MetaMetrics;

/// 큐를 비우며 포인트를 싱크로 전달하는 태스크
pub struct SinkForwarder;

impl SinkForwarder {
    /// 포워더 태스크를 스폰합니다.
    ///
    /// 모든 송신측이 닫히고 큐가 빌 때까지 실행됩니다.
    /// 성공한 포인트는 `sent`, 실패한 포인트는 `send_failed`로 집계합니다.
    pub fn spawn(
        mut rx: mpsc::Receiver<MetricPoint>,
        handler: Arc<dyn PointHandler>,
        meta: Arc<MetaMetrics>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(sink = handler.name(), "sink forwarder started");
            while let Some(point) = rx.recv().await {
                match handler.report(&point).await {
                    Ok(()) => meta.inc_sent(),
                    Err(e) => {
                        meta.inc_send_failed();
                        tracing::warn!(
                            sink = handler.name(),
                            metric = %point.name,
                            error = %e,
                            "failed to deliver point"
                        );
                    }
                }
            }
            tracing::info!(sink = handler.name(), "sink forwarder stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logharvest_core::error::SinkError;
    use logharvest_core::pipeline::BoxFuture;
    use logharvest_core::types::MetricValue;
    use parking_lot::Mutex;

    /// 이름에 "fail"이 들어간 포인트는 실패시키는 테스트 싱크
    #[derive(Default)]
    struct FlakySink {
        delivered: Mutex<Vec<String>>,
    }

    impl PointHandler for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        fn report<'a>(&'a self, point: &'a MetricPoint) -> BoxFuture<'a, Result<(), SinkError>> {
            Box::pin(async move {
                if point.name.contains("fail") {
                    return Err(SinkError::SendFailed {
                        metric: point.name.clone(),
                        reason: "rejected".to_owned(),
                    });
                }
                self.delivered.lock().push(point.name.clone());
                Ok(())
            })
        }
    }

    fn point(name: &str) -> MetricPoint {
        MetricPoint {
            name: name.to_owned(),
            tags: vec![],
            value: MetricValue::Counter(1),
            timestamp_millis: 0,
        }
    }

    #[tokio::test]
    async fn forwarder_counts_successes_and_failures() {
        let (tx, rx) = mpsc::channel(8);
        let sink = Arc::new(FlakySink::default());
        let meta = Arc::new(MetaMetrics::new(0));
        let handle = SinkForwarder::spawn(rx, sink.clone(), Arc::clone(&meta));

        for name in ["a", "fail.b", "c"] {
            tx.send(point(name)).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        // 실패한 포인트가 나머지 전달을 막지 않습니다.
        assert_eq!(*sink.delivered.lock(), vec!["a".to_owned(), "c".to_owned()]);
        let snap = meta.snapshot();
        assert_eq!(snap.sent, 2);
        assert_eq!(snap.send_failed, 1);
    }
}
