//! 로그 싱크 -- 포인트를 `tracing` 이벤트로 기록합니다.

use logharvest_core::error::SinkError;
use logharvest_core::pipeline::{BoxFuture, PointHandler};
use logharvest_core::types::MetricPoint;

use super::line::format_lines;

/// 포인트를 라인 프로토콜 형태로 `info` 레벨에 기록하는 싱크
#[derive(Debug, Clone)]
pub struct LogSink {
    source: String,
}

impl LogSink {
    /// 새 로그 싱크를 생성합니다.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new("logharvest")
    }
}

impl PointHandler for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn report<'a>(&'a self, point: &'a MetricPoint) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            for line in format_lines(point, &self.source) {
                tracing::info!(target: "logharvest::points", kind = %point.kind(), "{line}");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logharvest_core::types::MetricValue;

    #[tokio::test]
    async fn log_sink_always_succeeds() {
        let sink = LogSink::default();
        let point = MetricPoint {
            name: "requests".to_owned(),
            tags: vec![("user".to_owned(), "alice".to_owned())],
            value: MetricValue::Gauge(2.0),
            timestamp_millis: 1_000,
        };
        assert_eq!(sink.name(), "log");
        sink.report(&point).await.unwrap();
    }
}
