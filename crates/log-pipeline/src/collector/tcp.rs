//! TCP shipper 수집기
//!
//! 개행으로 구분된 JSON 메시지를 TCP 소켓으로 수신합니다.
//! 각 연결은 별도의 tokio 태스크에서 처리되며, 완성된 라인마다
//! [`Ingestor::on_message`]를 호출합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CollectorStatus, RawMessage};
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::pipeline::Ingestor;

/// 연결당 초기 읽기 버퍼 크기
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// TCP shipper 수집기 설정
#[derive(Debug, Clone)]
pub struct TcpShipperConfig {
    /// 바인드 주소 (예: "0.0.0.0:5044")
    pub bind_addr: String,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 최대 메시지(라인) 크기 (바이트)
    pub max_message_size: usize,
    /// 유휴 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for TcpShipperConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5044".to_owned(),
            max_connections: 256,
            max_message_size: 1024 * 1024, // 1MB
            connection_timeout_secs: 300,  // 5 minutes
        }
    }
}

impl TcpShipperConfig {
    /// 파이프라인 설정의 수신 항목으로 생성합니다.
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            bind_addr: config.ingest_bind.clone(),
            max_connections: config.max_connections,
            max_message_size: config.max_message_size,
            connection_timeout_secs: config.connection_timeout_secs,
        }
    }
}

/// TCP shipper 수집기
pub struct TcpShipperCollector {
    config: TcpShipperConfig,
    ingestor: Arc<Ingestor>,
    cancel_token: CancellationToken,
    listener: Option<TcpListener>,
    connections: Arc<Semaphore>,
    status: CollectorStatus,
}

impl TcpShipperCollector {
    /// 새 수집기를 생성합니다.
    pub fn new(
        config: TcpShipperConfig,
        ingestor: Arc<Ingestor>,
        cancel_token: CancellationToken,
    ) -> Self {
        let connections = Arc::new(Semaphore::new(config.max_connections));
        Self {
            config,
            ingestor,
            cancel_token,
            listener: None,
            connections,
            status: CollectorStatus::Idle,
        }
    }

    /// 소켓을 바인드하고 실제 주소를 반환합니다.
    ///
    /// `run` 전에 호출하지 않으면 `run`이 바인드합니다.
    pub async fn bind(&mut self) -> Result<SocketAddr, LogPipelineError> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| {
                let err = LogPipelineError::Collector {
                    source_type: "tcp".to_owned(),
                    reason: format!("failed to bind to {}: {}", self.config.bind_addr, e),
                };
                self.status = CollectorStatus::Error(err.to_string());
                err
            })?;
        let addr = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(addr)
    }

    /// 수집기를 실행합니다.
    ///
    /// 연결 수락 루프를 돌며, 취소 토큰이 취소되면 종료합니다.
    pub async fn run(&mut self) -> Result<(), LogPipelineError> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let Some(listener) = self.listener.take() else {
            return Err(LogPipelineError::Collector {
                source_type: "tcp".to_owned(),
                reason: "listener not bound".to_owned(),
            });
        };

        self.status = CollectorStatus::Running;
        info!(
            addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            "TCP shipper collector listening"
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            // 일시적인 accept 실패 (fd 고갈 등)는 루프를 유지합니다.
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    let Ok(permit) = Arc::clone(&self.connections).try_acquire_owned() else {
                        warn!(peer = %addr, "max connections reached, rejecting connection");
                        continue;
                    };
                    debug!(peer = %addr, "accepted connection");

                    let ingestor = Arc::clone(&self.ingestor);
                    let config = self.config.clone();
                    let cancel = self.cancel_token.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, ingestor, config, cancel).await {
                            error!(peer = %addr, error = %e, "connection handler error");
                        }
                        drop(permit);
                    });
                }
                () = self.cancel_token.cancelled() => {
                    info!("TCP shipper collector received shutdown signal");
                    break;
                }
            }
        }

        self.status = CollectorStatus::Stopped;
        Ok(())
    }

    /// 설정된 바인드 주소
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// 현재 활성 연결 수
    pub fn active_connections(&self) -> usize {
        self.config
            .max_connections
            .saturating_sub(self.connections.available_permits())
    }

    /// 현재 상태
    pub fn status(&self) -> &CollectorStatus {
        &self.status
    }
}

/// 단일 연결을 처리합니다.
///
/// 완성된 라인은 즉시 수집기에 전달하고, 개행 없이 최대 크기를 넘는
/// 데이터가 쌓이면 연결을 닫습니다. EOF에서 남은 부분 라인도 전달합니다.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ingestor: Arc<Ingestor>,
    config: TcpShipperConfig,
    cancel: CancellationToken,
) -> Result<(), LogPipelineError> {
    let idle_timeout = Duration::from_secs(config.connection_timeout_secs);
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut scanned = 0;
    let source = format!("tcp:{peer}");

    loop {
        while let Some(offset) = buf[scanned..].iter().position(|b| *b == b'\n') {
            let line = buf.split_to(scanned + offset + 1).freeze();
            scanned = 0;
            dispatch(&ingestor, &source, line);
        }
        scanned = buf.len();

        if buf.len() > config.max_message_size {
            warn!(
                peer = %peer,
                size = buf.len(),
                max = config.max_message_size,
                "unterminated message exceeds max size, closing connection"
            );
            return Err(LogPipelineError::Collector {
                source_type: "tcp".to_owned(),
                reason: format!("message from {peer} exceeds {} bytes", config.max_message_size),
            });
        }

        tokio::select! {
            result = timeout(idle_timeout, stream.read_buf(&mut buf)) => {
                match result {
                    Ok(Ok(0)) => {
                        dispatch(&ingestor, &source, buf.split().freeze());
                        debug!(peer = %peer, "connection closed by peer");
                        break;
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        return Err(LogPipelineError::Collector {
                            source_type: "tcp".to_owned(),
                            reason: format!("read error from {peer}: {e}"),
                        });
                    }
                    Err(_) => {
                        warn!(peer = %peer, "connection idle timeout");
                        return Err(LogPipelineError::Collector {
                            source_type: "tcp".to_owned(),
                            reason: "connection timeout".to_owned(),
                        });
                    }
                }
            }
            () = cancel.cancelled() => {
                debug!(peer = %peer, "connection handler received shutdown signal");
                break;
            }
        }
    }

    Ok(())
}

/// 라인 앞뒤 공백을 제거하고 비어 있지 않으면 전달합니다.
fn dispatch(ingestor: &Ingestor, source: &str, line: Bytes) {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return;
    }
    let data = line.slice_ref(trimmed);
    ingestor.on_raw(&RawMessage::new(data, source));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::LogPipelineBuilder;
    use crate::rule::{MetricRule, RuleSet};
    use tokio::io::AsyncWriteExt;

    fn ingestor() -> Arc<Ingestor> {
        let rules = RuleSet {
            counters: vec![MetricRule::with_pattern("completed", "request completed")],
            ..RuleSet::default()
        };
        let (pipeline, _) = LogPipelineBuilder::new().rules(rules).build().unwrap();
        pipeline.ingestor()
    }

    fn local_config() -> TcpShipperConfig {
        TcpShipperConfig {
            bind_addr: "127.0.0.1:0".to_owned(),
            max_message_size: 256,
            ..TcpShipperConfig::default()
        }
    }

    #[test]
    fn default_config() {
        let config = TcpShipperConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5044");
        assert_eq!(config.max_connections, 256);
    }

    #[test]
    fn collector_starts_idle() {
        let collector =
            TcpShipperCollector::new(local_config(), ingestor(), CancellationToken::new());
        assert_eq!(*collector.status(), CollectorStatus::Idle);
        assert_eq!(collector.active_connections(), 0);
        assert_eq!(collector.bind_addr(), "127.0.0.1:0");
    }

    #[tokio::test]
    async fn lines_reach_ingestor() {
        let ingestor = ingestor();
        let token = CancellationToken::new();
        let mut collector =
            TcpShipperCollector::new(local_config(), Arc::clone(&ingestor), token.clone());
        let addr = collector.bind().await.unwrap();
        let server = tokio::spawn(async move { collector.run().await });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(
                b"{\"message\":\"request completed\"}\r\n\n{\"message\":\"other\"}\n{\"message\":\"request completed\"}",
            )
            .await
            .unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        // 연결 태스크가 EOF까지 처리할 때까지 기다립니다.
        let mut received = 0;
        for _ in 0..100 {
            received = ingestor.meta().snapshot().received;
            if received == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received, 3);
        let snap = ingestor.meta().snapshot();
        assert_eq!(snap.parsed, 2);
        assert_eq!(snap.unparsed, 1);

        token.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn oversized_unterminated_line_closes_connection() {
        let ingestor = ingestor();
        let token = CancellationToken::new();
        let mut collector =
            TcpShipperCollector::new(local_config(), Arc::clone(&ingestor), token.clone());
        let addr = collector.bind().await.unwrap();
        let server = tokio::spawn(async move { collector.run().await });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&[b'x'; 1024]).await.unwrap();

        // 서버가 연결을 닫으면 읽기가 EOF(또는 리셋)로 끝납니다.
        let mut sink = Vec::new();
        let _ = timeout(Duration::from_secs(5), client.read_to_end(&mut sink)).await;
        assert_eq!(ingestor.meta().snapshot().received, 0);

        token.cancel();
        server.await.unwrap().unwrap();
    }
}
