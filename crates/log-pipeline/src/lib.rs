#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`decoder`]: shipper 메시지를 정규화된 레코드로 디코딩
//! - [`rule`]: YAML 규칙 로딩, 패턴 템플릿, 토큰 인식기, 추출
//! - [`registry`]: 식별자별 누산기 저장소
//! - [`accumulator`]: 카운터/게이지/히스토그램 누산기
//! - [`histogram`]: 지수 감쇠 샘플 저장소
//! - [`liveness`]: 마지막 관측 시각 추적 및 만료 스윕
//! - [`flush`]: 주기 플러시와 스윕 태스크
//! - [`sink`]: 아웃바운드 큐 포워더와 싱크 구현
//! - [`meta`]: 파이프라인 자체 처리 통계
//! - [`pipeline`]: 메시지별 수집 흐름과 생명주기 (Pipeline trait 구현)
//! - [`collector`]: TCP shipper 수신
//! - [`clock`]: 시간 소스 추상화
//! - [`config`]: 파이프라인 설정 (core 설정 평탄화)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! TcpShipperCollector -> Ingestor -> JsonMessageDecoder -> RuleEngine
//!                                                              |
//!                                          LivenessTracker + MetricRegistry
//!                                                              |
//!              PointHandler <- SinkForwarder <- queue <- FlushProcessor
//! ```

pub mod accumulator;
pub mod clock;
pub mod collector;
pub mod config;
pub mod decoder;
pub mod error;
pub mod flush;
pub mod histogram;
pub mod liveness;
pub mod meta;
pub mod pipeline;
pub mod registry;
pub mod rule;
pub mod sink;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{Ingestor, LogPipeline, LogPipelineBuilder, MessageOutcome};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 디코더
pub use decoder::{JsonMessageDecoder, MessageDecoder, NormalizedRecord};

// 규칙 엔진
pub use rule::{CompiledRule, Extraction, MetricRule, RuleEngine, RuleSet, Template, TokenClass};

// 집계
pub use accumulator::Accumulator;
pub use histogram::DecayingHistogram;
pub use liveness::LivenessTracker;
pub use meta::{MetaMetrics, MetaSnapshot};
pub use registry::MetricRegistry;

// 플러시 및 싱크
pub use flush::{FlushProcessor, FlushReport};
pub use sink::{LogSink, SinkForwarder, TcpLineSink};

// 수집기
pub use collector::{CollectorStatus, RawMessage, TcpShipperCollector, TcpShipperConfig};

// 시간
pub use clock::{Clock, ManualClock, SystemClock};
