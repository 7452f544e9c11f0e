//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 로그 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<LogPipelineError> for HarvestError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logharvest_core::error::{ConfigError, HarvestError, PipelineError};
use logharvest_core::types::MetricIdentity;

/// 로그 파이프라인 도메인 에러
///
/// 디코딩, 규칙 로딩, 패턴 컴파일, 누산기 갱신, 수집, 채널 통신 등
/// 파이프라인 내부의 모든 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 디코딩할 수 없는 메시지
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패
    #[error("rule validation error: rule '{rule}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 이름
        rule: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 패턴 템플릿 컴파일 실패
    #[error("pattern compile error at {position}: {reason}")]
    PatternCompile {
        /// 템플릿 내 문자 위치
        position: usize,
        /// 실패 사유
        reason: String,
    },

    /// 누산기 갱신 실패 (종류 불일치, 음수 카운터 증분 등)
    #[error("accumulator update failed for {identity}: {reason}")]
    AccumulatorUpdate {
        /// 대상 메트릭
        identity: MetricIdentity,
        /// 실패 사유
        reason: String,
    },

    /// 수집기 에러 (네트워크 등)
    #[error("collector error: {source_type}: {reason}")]
    Collector {
        /// 수집 소스 유형
        source_type: String,
        /// 에러 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<LogPipelineError> for HarvestError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Config { field, reason } => {
                HarvestError::Config(ConfigError::InvalidValue { field, reason })
            }
            LogPipelineError::Io(e) => HarvestError::Io(e),
            other => HarvestError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_load_error_display() {
        let err = LogPipelineError::RuleLoad {
            path: "/etc/logharvest/rules.yml".to_owned(),
            reason: "invalid YAML".to_owned(),
        };
        assert!(err.to_string().contains("rules.yml"));
    }

    #[test]
    fn accumulator_update_display_names_identity() {
        let err = LogPipelineError::AccumulatorUpdate {
            identity: MetricIdentity::new("hits", vec![("user".to_owned(), "bob".to_owned())]),
            reason: "kind mismatch".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("hits{user=bob}"));
        assert!(msg.contains("kind mismatch"));
    }

    #[test]
    fn pattern_compile_display() {
        let err = LogPipelineError::PatternCompile {
            position: 7,
            reason: "unterminated capture".to_owned(),
        };
        assert!(err.to_string().contains("at 7"));
    }

    #[test]
    fn converts_to_harvest_error() {
        let err = LogPipelineError::Channel("receiver closed".to_owned());
        let harvest_err: HarvestError = err.into();
        assert!(matches!(harvest_err, HarvestError::Pipeline(_)));
    }

    #[test]
    fn config_error_maps_to_config_variant() {
        let err = LogPipelineError::Config {
            field: "expiry_millis".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        let harvest_err: HarvestError = err.into();
        assert!(matches!(
            harvest_err,
            HarvestError::Config(ConfigError::InvalidValue { .. })
        ));
    }
}
