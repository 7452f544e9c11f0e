//! 에러 타입: 도메인별 에러 정의

/// logharvest 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 다운스트림 싱크 전송 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 다운스트림 싱크 전송 에러
///
/// 개별 포인트 단위로 보고되며, 플러시 배치의 나머지 전송을 중단시키지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 아웃바운드 큐가 가득 참
    #[error("outbound queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// 아웃바운드 큐가 닫힘
    #[error("outbound queue closed")]
    QueueClosed,

    /// 싱크 연결 실패
    #[error("sink connection failed: {0}")]
    Connection(String),

    /// 포인트 전송 실패
    #[error("send failed for '{metric}': {reason}")]
    SendFailed { metric: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_error_converts_to_harvest_error() {
        let err: HarvestError = SinkError::QueueFull { capacity: 8 }.into();
        assert!(matches!(err, HarvestError::Sink(SinkError::QueueFull { .. })));
        assert!(err.to_string().contains("capacity 8"));
    }

    #[test]
    fn config_error_display_names_field() {
        let err = ConfigError::InvalidValue {
            field: "aggregation.expiry_millis".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        assert!(err.to_string().contains("aggregation.expiry_millis"));
    }
}
