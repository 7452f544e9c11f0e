//! 수신 모듈 -- shipper로부터 원시 메시지를 받아 파이프라인에 전달합니다.
//!
//! # 수집 소스
//! - [`TcpShipperCollector`]: 개행 구분 JSON 메시지를 TCP로 수신
//!
//! 수집기는 자체 tokio 태스크에서 실행되며, 메시지마다
//! [`Ingestor::on_message`](crate::pipeline::Ingestor::on_message)를 동기 호출합니다.
//! 처리 결과는 메타 메트릭으로만 드러나며 연결에는 영향을 주지 않습니다.

pub mod tcp;

pub use tcp::{TcpShipperCollector, TcpShipperConfig};

use std::time::SystemTime;

use bytes::Bytes;

/// 수집기가 받은 원시 메시지 하나
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// 메시지 바이트 (개행 제외)
    pub data: Bytes,
    /// 수집 소스 식별자 (예: "tcp:10.0.0.7:51234")
    pub source: String,
    /// 수신 시각
    pub received_at: SystemTime,
}

impl RawMessage {
    /// 현재 시각으로 새 메시지를 생성합니다.
    pub fn new(data: Bytes, source: impl Into<String>) -> Self {
        Self {
            data,
            source: source.into(),
            received_at: SystemTime::now(),
        }
    }
}

/// 수집기 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorStatus {
    /// 실행 대기 중
    Idle,
    /// 실행 중
    Running,
    /// 에러로 중단됨
    Error(String),
    /// 정상 종료됨
    Stopped,
}

impl std::fmt::Display for CollectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Error(reason) => write!(f, "error: {reason}"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
