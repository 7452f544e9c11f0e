//! 로그 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`HarvestConfig`](logharvest_core::config::HarvestConfig)
//! 중 수신/집계 섹션을 평탄화하여 파이프라인 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logharvest_core::config::HarvestConfig;
//! use logharvest_log_pipeline::config::PipelineConfig;
//!
//! let core_config = HarvestConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use std::time::Duration;

use logharvest_core::config::HarvestConfig;

use crate::error::LogPipelineError;

/// 로그 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 전역 메트릭 이름 접두어 (비어 있으면 생략)
    pub prefix: String,
    /// 플러시 주기 (초)
    pub aggregation_interval_secs: u64,
    /// 비활성 메트릭 만료 시간 (밀리초)
    pub expiry_millis: u64,
    /// 만료 스윕 주기 (밀리초)
    pub reap_interval_millis: u64,
    /// 규칙 파일 또는 디렉토리 경로
    pub rules_path: String,
    /// 아웃바운드 큐 용량
    pub sink_queue_capacity: usize,
    /// 샘플이 없는 히스토그램도 방출할지 여부
    pub report_empty_histograms: bool,

    // --- 수신 설정 ---
    /// shipper 리스너 활성화 여부
    pub ingestion_enabled: bool,
    /// shipper 리스너 바인드 주소
    pub ingest_bind: String,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 최대 메시지 크기 (바이트)
    pub max_message_size: usize,
    /// 유휴 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&HarvestConfig::default())
    }
}

impl PipelineConfig {
    /// core의 `HarvestConfig`에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &HarvestConfig) -> Self {
        let agg = &core.aggregation;
        let ing = &core.ingestion;
        Self {
            prefix: agg.prefix.clone(),
            aggregation_interval_secs: agg.aggregation_interval_secs,
            expiry_millis: agg.expiry_millis,
            reap_interval_millis: agg.reap_interval_millis,
            rules_path: agg.rules_path.clone(),
            sink_queue_capacity: agg.sink_queue_capacity,
            report_empty_histograms: agg.report_empty_histograms,
            ingestion_enabled: ing.enabled,
            ingest_bind: ing.bind.clone(),
            max_connections: ing.max_connections,
            max_message_size: ing.max_message_size,
            connection_timeout_secs: ing.connection_timeout_secs,
        }
    }

    /// 플러시 주기
    pub fn aggregation_interval(&self) -> Duration {
        Duration::from_secs(self.aggregation_interval_secs)
    }

    /// 만료 스윕 주기
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_millis)
    }

    /// 규칙 경로가 안전한지 검증합니다 (path traversal 방지).
    fn validate_rules_path(path_str: &str) -> Result<(), LogPipelineError> {
        if path_str.is_empty() {
            return Err(LogPipelineError::Config {
                field: "rules_path".to_owned(),
                reason: "rules path must not be empty".to_owned(),
            });
        }

        let path = Path::new(path_str);
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(LogPipelineError::Config {
                field: "rules_path".to_owned(),
                reason: format!("rules path '{path_str}' contains path traversal pattern '..'"),
            });
        }

        Ok(())
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        const MAX_AGGREGATION_INTERVAL_SECS: u64 = 3600;
        const MAX_QUEUE_CAPACITY: usize = 10_000_000;
        const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

        if self.aggregation_interval_secs == 0
            || self.aggregation_interval_secs > MAX_AGGREGATION_INTERVAL_SECS
        {
            return Err(LogPipelineError::Config {
                field: "aggregation_interval_secs".to_owned(),
                reason: format!("must be 1-{MAX_AGGREGATION_INTERVAL_SECS}"),
            });
        }

        if self.expiry_millis == 0 {
            return Err(LogPipelineError::Config {
                field: "expiry_millis".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.reap_interval_millis == 0 {
            return Err(LogPipelineError::Config {
                field: "reap_interval_millis".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.sink_queue_capacity == 0 || self.sink_queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(LogPipelineError::Config {
                field: "sink_queue_capacity".to_owned(),
                reason: format!("must be 1-{MAX_QUEUE_CAPACITY}"),
            });
        }

        if self.max_message_size == 0 || self.max_message_size > MAX_MESSAGE_SIZE {
            return Err(LogPipelineError::Config {
                field: "max_message_size".to_owned(),
                reason: format!("must be 1-{MAX_MESSAGE_SIZE}"),
            });
        }

        if self.ingestion_enabled && self.max_connections == 0 {
            return Err(LogPipelineError::Config {
                field: "max_connections".to_owned(),
                reason: "must be greater than 0 when ingestion is enabled".to_owned(),
            });
        }

        Self::validate_rules_path(&self.rules_path)?;

        Ok(())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 전역 접두어를 설정합니다.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// 플러시 주기(초)를 설정합니다.
    pub fn aggregation_interval_secs(mut self, secs: u64) -> Self {
        self.config.aggregation_interval_secs = secs;
        self
    }

    /// 만료 시간(밀리초)을 설정합니다.
    pub fn expiry_millis(mut self, millis: u64) -> Self {
        self.config.expiry_millis = millis;
        self
    }

    /// 스윕 주기(밀리초)를 설정합니다.
    pub fn reap_interval_millis(mut self, millis: u64) -> Self {
        self.config.reap_interval_millis = millis;
        self
    }

    /// 규칙 경로를 설정합니다.
    pub fn rules_path(mut self, path: impl Into<String>) -> Self {
        self.config.rules_path = path.into();
        self
    }

    /// 아웃바운드 큐 용량을 설정합니다.
    pub fn sink_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.sink_queue_capacity = capacity;
        self
    }

    /// 빈 히스토그램 방출 여부를 설정합니다.
    pub fn report_empty_histograms(mut self, report: bool) -> Self {
        self.config.report_empty_histograms = report;
        self
    }

    /// 최대 메시지 크기를 설정합니다.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
