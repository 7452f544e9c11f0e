//! 라인 프로토콜 싱크 -- 포인트를 TCP로 전송합니다.
//!
//! 한 줄 형식:
//!
//! ```text
//! "<name>" <value> <epoch-seconds> [source="<source>"] "<key>"="<value>" ...
//! ```
//!
//! 히스토그램은 통계별로 `<name>.<stat>` 줄로 펼쳐집니다.
//! 연결은 첫 전송 시 맺고, 쓰기 실패 시 끊은 뒤 다음 전송에서 다시 연결합니다.

use std::fmt::Write as _;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use logharvest_core::error::SinkError;
use logharvest_core::pipeline::{BoxFuture, PointHandler};
use logharvest_core::types::{MetricPoint, MetricValue};

/// 기본 연결 타임아웃
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 포인트를 라인 프로토콜 문자열로 변환합니다.
///
/// 카운터와 게이지는 한 줄, 히스토그램은 통계 수만큼의 줄을 생성합니다.
/// `source`가 비어 있으면 source 태그를 생략합니다.
pub fn format_lines(point: &MetricPoint, source: &str) -> Vec<String> {
    let seconds = point.timestamp_millis.div_euclid(1000);
    let mut suffix = format!(" {seconds}");
    if !source.is_empty() {
        let _ = write!(suffix, " source={}", quote(source));
    }
    for (key, value) in &point.tags {
        let _ = write!(suffix, " {}={}", quote(key), quote(value));
    }

    match &point.value {
        MetricValue::Counter(v) => vec![format!("{} {v}{suffix}", quote(&point.name))],
        MetricValue::Gauge(v) => vec![format!("{} {v}{suffix}", quote(&point.name))],
        MetricValue::Histogram(snapshot) => snapshot
            .stats()
            .into_iter()
            .map(|(stat, v)| format!("{} {v}{suffix}", quote(&format!("{}.{stat}", point.name))))
            .collect(),
    }
}

fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// TCP 라인 프로토콜 싱크
pub struct TcpLineSink {
    address: String,
    source: String,
    connect_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpLineSink {
    /// 새 싱크를 생성합니다. 연결은 첫 전송 시 맺습니다.
    pub fn new(address: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            source: source.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stream: Mutex::new(None),
        }
    }

    /// 연결 타임아웃을 설정합니다.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// 대상 주소
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<TcpStream, SinkError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| {
                SinkError::Connection(format!(
                    "connect to {} timed out after {:?}",
                    self.address, self.connect_timeout
                ))
            })?
            .map_err(|e| SinkError::Connection(format!("connect to {}: {e}", self.address)))?;

        tracing::info!(address = %self.address, "connected to line protocol sink");
        Ok(stream)
    }
}

impl PointHandler for TcpLineSink {
    fn name(&self) -> &str {
        "tcp"
    }

    fn report<'a>(&'a self, point: &'a MetricPoint) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let mut payload = String::new();
            for line in format_lines(point, &self.source) {
                payload.push_str(&line);
                payload.push('\n');
            }

            let mut guard = self.stream.lock().await;
            if guard.is_none() {
                *guard = Some(self.connect().await?);
            }

            let Some(stream) = guard.as_mut() else {
                return Err(SinkError::Connection("no connection".to_owned()));
            };

            if let Err(e) = stream.write_all(payload.as_bytes()).await {
                // 다음 전송에서 재연결합니다.
                *guard = None;
                tracing::debug!(address = %self.address, error = %e, "sink connection dropped");
                return Err(SinkError::SendFailed {
                    metric: point.name.clone(),
                    reason: e.to_string(),
                });
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logharvest_core::types::HistogramSnapshot;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn counter_point() -> MetricPoint {
        MetricPoint {
            name: "logs.requests".to_owned(),
            tags: vec![("user".to_owned(), "alice".to_owned())],
            value: MetricValue::Counter(3),
            timestamp_millis: 1_700_000_000_500,
        }
    }

    #[test]
    fn counter_formats_single_line() {
        let lines = format_lines(&counter_point(), "web-01");
        assert_eq!(
            lines,
            vec![r#""logs.requests" 3 1700000000 source="web-01" "user"="alice""#.to_owned()]
        );
    }

    #[test]
    fn gauge_formats_float_value() {
        let point = MetricPoint {
            name: "temp".to_owned(),
            tags: vec![],
            value: MetricValue::Gauge(21.5),
            timestamp_millis: 2_000,
        };
        assert_eq!(format_lines(&point, "h"), vec![r#""temp" 21.5 2 source="h""#.to_owned()]);
    }

    #[test]
    fn histogram_expands_per_stat() {
        let point = MetricPoint {
            name: "latency".to_owned(),
            tags: vec![],
            value: MetricValue::Histogram(HistogramSnapshot {
                count: 4,
                ..HistogramSnapshot::default()
            }),
            timestamp_millis: 0,
        };
        let lines = format_lines(&point, "h");
        assert_eq!(lines.len(), 9);
        assert!(lines[0].starts_with(r#""latency.count" 4 "#));
        assert!(lines.iter().any(|l| l.starts_with(r#""latency.p999" "#)));
    }

    #[test]
    fn empty_source_is_omitted() {
        let line = &format_lines(&counter_point(), "")[0];
        assert_eq!(line, r#""logs.requests" 3 1700000000 "user"="alice""#);
    }

    #[test]
    fn quotes_are_escaped() {
        let point = MetricPoint {
            name: "m".to_owned(),
            tags: vec![("path".to_owned(), r#"say "hi""#.to_owned())],
            value: MetricValue::Counter(1),
            timestamp_millis: 0,
        };
        let line = &format_lines(&point, "h")[0];
        assert!(line.ends_with(r#""path"="say \"hi\"""#));
    }

    #[tokio::test]
    async fn tcp_sink_writes_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            lines.next_line().await.unwrap()
        });

        let sink = TcpLineSink::new(addr.to_string(), "web-01");
        sink.report(&counter_point()).await.unwrap();

        let received = server.await.unwrap().unwrap();
        assert!(received.starts_with(r#""logs.requests" 3 "#));
    }

    #[tokio::test]
    async fn tcp_sink_reports_connection_failure() {
        // 바인딩 후 즉시 닫아 연결이 거부되는 주소를 얻습니다.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = TcpLineSink::new(addr.to_string(), "h")
            .with_connect_timeout(Duration::from_millis(500));
        let err = sink.report(&counter_point()).await.unwrap_err();
        assert!(matches!(err, SinkError::Connection(_)));
    }
}
