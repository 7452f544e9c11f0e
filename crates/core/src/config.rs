//! 설정 관리: logharvest.toml 파싱 및 런타임 설정
//!
//! [`HarvestConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//! 설정은 시작 시 한 번 로드되며 프로세스 수명 동안 불변으로 취급합니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGHARVEST_AGGREGATION_PREFIX=app` 형식)
//! 3. 설정 파일 (`logharvest.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logharvest_core::error::HarvestError> {
//! use logharvest_core::config::HarvestConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = HarvestConfig::load("logharvest.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = HarvestConfig::parse("[aggregation]\nprefix = \"app\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, HarvestError};

/// logharvest 통합 설정
///
/// `logharvest.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수신(shipper 리스너) 설정
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// 집계 설정
    #[serde(default)]
    pub aggregation: AggregationConfig,
    /// 다운스트림 싱크 설정
    #[serde(default)]
    pub sink: SinkConfig,
    /// Prometheus 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl HarvestConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HarvestError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, HarvestError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HarvestError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                HarvestError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, HarvestError> {
        toml::from_str(toml_str).map_err(|e| {
            HarvestError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGHARVEST_{SECTION}_{FIELD}`
    /// 예: `LOGHARVEST_AGGREGATION_EXPIRY_MILLIS=60000`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGHARVEST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGHARVEST_GENERAL_LOG_FORMAT");

        // Ingestion
        override_bool(&mut self.ingestion.enabled, "LOGHARVEST_INGESTION_ENABLED");
        override_string(&mut self.ingestion.bind, "LOGHARVEST_INGESTION_BIND");
        override_usize(
            &mut self.ingestion.max_connections,
            "LOGHARVEST_INGESTION_MAX_CONNECTIONS",
        );
        override_usize(
            &mut self.ingestion.max_message_size,
            "LOGHARVEST_INGESTION_MAX_MESSAGE_SIZE",
        );

        // Aggregation
        override_string(&mut self.aggregation.prefix, "LOGHARVEST_AGGREGATION_PREFIX");
        override_u64(
            &mut self.aggregation.aggregation_interval_secs,
            "LOGHARVEST_AGGREGATION_AGGREGATION_INTERVAL_SECS",
        );
        override_u64(
            &mut self.aggregation.expiry_millis,
            "LOGHARVEST_AGGREGATION_EXPIRY_MILLIS",
        );
        override_u64(
            &mut self.aggregation.reap_interval_millis,
            "LOGHARVEST_AGGREGATION_REAP_INTERVAL_MILLIS",
        );
        override_string(
            &mut self.aggregation.rules_path,
            "LOGHARVEST_AGGREGATION_RULES_PATH",
        );
        override_usize(
            &mut self.aggregation.sink_queue_capacity,
            "LOGHARVEST_AGGREGATION_SINK_QUEUE_CAPACITY",
        );
        override_bool(
            &mut self.aggregation.report_empty_histograms,
            "LOGHARVEST_AGGREGATION_REPORT_EMPTY_HISTOGRAMS",
        );

        // Sink
        override_string(&mut self.sink.kind, "LOGHARVEST_SINK_KIND");
        override_string(&mut self.sink.address, "LOGHARVEST_SINK_ADDRESS");

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGHARVEST_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGHARVEST_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGHARVEST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), HarvestError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.ingestion.enabled && self.ingestion.bind.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ingestion.bind".to_owned(),
                reason: "bind address must not be empty when ingestion is enabled".to_owned(),
            }
            .into());
        }

        self.aggregation.validate()?;

        // sink kind 검증
        let valid_sinks = ["log", "tcp"];
        if !valid_sinks.contains(&self.sink.kind.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "sink.kind".to_owned(),
                reason: format!("must be one of: {}", valid_sinks.join(", ")),
            }
            .into());
        }

        if self.sink.kind == "tcp" && self.sink.address.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sink.address".to_owned(),
                reason: "address must not be empty for the tcp sink".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// shipper 리스너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub bind: String,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 최대 메시지 크기 (바이트)
    pub max_message_size: usize,
    /// 유휴 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:5044".to_owned(),
            max_connections: 256,
            max_message_size: 1024 * 1024, // 1MB
            connection_timeout_secs: 300,
        }
    }
}

/// 집계 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// 모든 사용자 메트릭 이름 앞에 붙는 전역 접두어 (비어 있으면 생략)
    pub prefix: String,
    /// 플러시 주기 (초)
    pub aggregation_interval_secs: u64,
    /// 이 시간 동안 갱신되지 않은 메트릭은 제거됨 (밀리초)
    pub expiry_millis: u64,
    /// 만료 스윕 주기 (밀리초)
    pub reap_interval_millis: u64,
    /// 규칙 YAML 파일 또는 디렉토리 경로
    pub rules_path: String,
    /// 아웃바운드 큐 용량
    pub sink_queue_capacity: usize,
    /// 샘플이 없는 히스토그램도 방출할지 여부
    pub report_empty_histograms: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            aggregation_interval_secs: 5,
            expiry_millis: 60 * 60 * 1000, // 1 hour
            reap_interval_millis: 5_000,
            rules_path: "/etc/logharvest/rules.yml".to_owned(),
            sink_queue_capacity: 10_000,
            report_empty_histograms: false,
        }
    }
}

impl AggregationConfig {
    /// 집계 설정의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), HarvestError> {
        const MAX_AGGREGATION_INTERVAL_SECS: u64 = 3600;

        if self.aggregation_interval_secs == 0
            || self.aggregation_interval_secs > MAX_AGGREGATION_INTERVAL_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "aggregation.aggregation_interval_secs".to_owned(),
                reason: format!("must be 1-{MAX_AGGREGATION_INTERVAL_SECS}"),
            }
            .into());
        }

        if self.expiry_millis == 0 {
            return Err(ConfigError::InvalidValue {
                field: "aggregation.expiry_millis".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.reap_interval_millis == 0 {
            return Err(ConfigError::InvalidValue {
                field: "aggregation.reap_interval_millis".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.sink_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "aggregation.sink_queue_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.prefix.starts_with('.') || self.prefix.ends_with('.') {
            return Err(ConfigError::InvalidValue {
                field: "aggregation.prefix".to_owned(),
                reason: "prefix must not start or end with '.'".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 다운스트림 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// 싱크 종류 (log, tcp)
    pub kind: String,
    /// tcp 싱크 대상 주소
    pub address: String,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
    /// 라인 프로토콜의 source 태그 값 (비어 있으면 생략)
    pub source: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: "log".to_owned(),
            address: "127.0.0.1:2878".to_owned(),
            connect_timeout_secs: 5,
            source: String::new(),
        }
    }
}

/// Prometheus 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
