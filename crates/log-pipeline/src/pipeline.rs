//! 파이프라인 오케스트레이션 -- 수신/매칭/집계/플러시의 전체 흐름을 관리합니다.
//!
//! [`LogPipeline`]은 core의 [`Pipeline`](logharvest_core::pipeline::Pipeline) trait을 구현하여
//! `logharvest-daemon`에서 시작/정지/상태 조회됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! Collector -> Ingestor::on_message -> Decoder -> RuleEngine -> Registry/Liveness
//!                                                                   |
//!                          Sink <- SinkForwarder <- mpsc <- FlushProcessor
//! ```
//!
//! 레지스트리, 생존 맵, 메타 메트릭은 파이프라인 인스턴스가 소유하며
//! 생성 시 각 구성 요소에 전달됩니다. 인스턴스끼리 상태를 공유하지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logharvest_core::error::{HarvestError, PipelineError};
use logharvest_core::pipeline::{HealthStatus, Pipeline, PointHandler};
use logharvest_core::types::MetricPoint;

use crate::clock::{Clock, SystemClock};
use crate::collector::RawMessage;
use crate::config::PipelineConfig;
use crate::decoder::{JsonMessageDecoder, MessageDecoder};
use crate::error::LogPipelineError;
use crate::flush::{FlushProcessor, FlushReport, spawn_flush_task, spawn_sweep_task};
use crate::liveness::LivenessTracker;
use crate::meta::MetaMetrics;
use crate::registry::MetricRegistry;
use crate::rule::{RuleEngine, RuleSet};
use crate::sink::SinkForwarder;

/// 정지 시 포워더가 큐를 비우기를 기다리는 최대 시간
const FORWARDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// 메시지 하나의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// 디코딩 실패로 버려짐
    Malformed,
    /// 디코딩되었지만 어떤 규칙에도 매칭되지 않음
    Unmatched,
    /// 매칭된 규칙 수
    Matched(usize),
}

/// 메시지 수집기 -- 메시지당 디코딩/매칭/누산을 수행합니다.
///
/// 모든 메서드는 동기이며 I/O를 수행하지 않으므로, 여러 연결 태스크에서
/// 동시에 호출할 수 있습니다. 오류는 호출자에게 전파되지 않고
/// 메타 메트릭과 로그로만 드러납니다.
pub struct Ingestor {
    decoder: Box<dyn MessageDecoder>,
    rules: RwLock<Arc<RuleEngine>>,
    registry: Arc<MetricRegistry>,
    liveness: Arc<LivenessTracker>,
    meta: Arc<MetaMetrics>,
    clock: Arc<dyn Clock>,
}

impl Ingestor {
    /// 원시 메시지 하나를 처리합니다.
    pub fn on_message(&self, raw: &[u8]) {
        let _ = self.ingest(raw);
    }

    /// 수집기가 전달한 메시지를 처리합니다.
    pub fn on_raw(&self, message: &RawMessage) {
        let outcome = self.ingest(&message.data);
        tracing::trace!(source = %message.source, ?outcome, "message processed");
    }

    /// 원시 메시지 하나를 처리하고 결과를 반환합니다.
    pub fn ingest(&self, raw: &[u8]) -> MessageOutcome {
        self.meta.inc_received();

        let record = match self.decoder.decode(raw) {
            Ok(record) => record,
            Err(e) => {
                self.meta.inc_malformed();
                tracing::warn!(
                    format = self.decoder.format_name(),
                    error = %e,
                    "dropping malformed message"
                );
                return MessageOutcome::Malformed;
            }
        };

        let now = self.clock.now_millis();
        if let Some(event_ts) = record.timestamp_millis() {
            self.meta.record_drift(now.saturating_sub(event_ts), now);
        }

        let rules = Arc::clone(&self.rules.read());
        let mut matched = 0;
        for extraction in rules.evaluate(&record) {
            matched += 1;
            let accumulator = self.liveness.touch_and_get(
                &self.registry,
                &extraction.identity,
                extraction.kind,
                now,
            );
            if let Err(e) =
                accumulator.apply(&extraction.identity, extraction.kind, extraction.value, now)
            {
                tracing::warn!(error = %e, "dropping accumulator update");
            }
            self.meta.inc_parsed();
        }

        if matched == 0 {
            self.meta.inc_unparsed();
            MessageOutcome::Unmatched
        } else {
            MessageOutcome::Matched(matched)
        }
    }

    /// 메타 메트릭
    pub fn meta(&self) -> &Arc<MetaMetrics> {
        &self.meta
    }

    /// 메트릭 레지스트리
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// 생존 추적기
    pub fn liveness(&self) -> &Arc<LivenessTracker> {
        &self.liveness
    }

    /// 현재 적용 중인 규칙 수
    pub fn rule_count(&self) -> usize {
        self.rules.read().rule_count()
    }

    fn install_rules(&self, engine: RuleEngine) {
        *self.rules.write() = Arc::new(engine);
    }
}

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 로그 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use logharvest_log_pipeline::{LogPipelineBuilder, LogSink};
///
/// let (mut pipeline, _) = LogPipelineBuilder::new()
///     .config(config)
///     .sink(Arc::new(LogSink::default()))
///     .build()?;
///
/// pipeline.start().await?;
/// pipeline.on_message(br#"{"message":"request completed"}"#);
/// ```
pub struct LogPipeline {
    config: PipelineConfig,
    state: PipelineState,
    ingestor: Arc<Ingestor>,
    /// 빌더에서 규칙을 받았으면 시작 시 파일에서 로드하지 않습니다.
    rules_provided: bool,
    point_tx: Option<mpsc::Sender<MetricPoint>>,
    point_rx: Option<mpsc::Receiver<MetricPoint>>,
    sink: Option<Arc<dyn PointHandler>>,
    flush: Option<Arc<FlushProcessor>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    forwarder: Option<JoinHandle<()>>,
}

impl LogPipeline {
    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 수집기와 공유할 메시지 수집기 핸들
    pub fn ingestor(&self) -> Arc<Ingestor> {
        Arc::clone(&self.ingestor)
    }

    /// 원시 메시지 하나를 처리합니다.
    pub fn on_message(&self, raw: &[u8]) {
        self.ingestor.on_message(raw);
    }

    /// 메타 메트릭
    pub fn meta(&self) -> &Arc<MetaMetrics> {
        self.ingestor.meta()
    }

    /// 메트릭 레지스트리
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        self.ingestor.registry()
    }

    /// 적용 중인 규칙 수
    pub fn rule_count(&self) -> usize {
        self.ingestor.rule_count()
    }

    /// 파이프라인 설정
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 주기를 기다리지 않고 즉시 플러시합니다.
    ///
    /// 실행 중이 아니면 `None`을 반환합니다.
    pub fn flush_now(&self) -> Option<FlushReport> {
        self.flush.as_ref().map(|flush| flush.flush_once())
    }

    /// 아웃바운드 큐 사용률 (0.0 ~ 1.0)
    pub fn queue_utilization(&self) -> f64 {
        match &self.point_tx {
            Some(tx) => {
                let max = tx.max_capacity();
                #[allow(clippy::cast_precision_loss)]
                let used = max.saturating_sub(tx.capacity()) as f64;
                #[allow(clippy::cast_precision_loss)]
                let max = max as f64;
                used / max
            }
            None => 0.0,
        }
    }
}

impl Pipeline for LogPipeline {
    async fn start(&mut self) -> Result<(), HarvestError> {
        match self.state {
            PipelineState::Running => return Err(PipelineError::AlreadyRunning.into()),
            PipelineState::Stopped => {
                return Err(PipelineError::InitFailed(
                    "stopped pipeline cannot be restarted".to_owned(),
                )
                .into());
            }
            PipelineState::Initialized => {}
        }

        tracing::info!("starting log pipeline");

        // 1. 규칙 로드
        if !self.rules_provided {
            let engine = RuleEngine::load(&self.config.rules_path).await?;
            if engine.is_empty() {
                tracing::warn!(path = %self.config.rules_path, "no metric rules loaded");
            }
            self.ingestor.install_rules(engine);
        }
        tracing::info!(rules = self.ingestor.rule_count(), "metric rules ready");

        let Some(point_tx) = self.point_tx.clone() else {
            return Err(PipelineError::InitFailed("outbound queue closed".to_owned()).into());
        };

        // 2. 싱크 포워더
        if let (Some(sink), Some(rx)) = (self.sink.clone(), self.point_rx.take()) {
            self.forwarder = Some(SinkForwarder::spawn(
                rx,
                sink,
                Arc::clone(self.ingestor.meta()),
            ));
        }

        // 3. 주기 플러시
        let flush = Arc::new(FlushProcessor::new(
            Arc::clone(&self.ingestor.registry),
            Arc::clone(&self.ingestor.meta),
            Arc::clone(&self.ingestor.clock),
            self.config.prefix.clone(),
            self.config.report_empty_histograms,
            point_tx,
        ));
        self.tasks.push(spawn_flush_task(
            Arc::clone(&flush),
            self.config.aggregation_interval(),
            self.cancel.child_token(),
        ));
        self.flush = Some(flush);

        // 4. 만료 스윕
        self.tasks.push(spawn_sweep_task(
            Arc::clone(&self.ingestor.liveness),
            Arc::clone(&self.ingestor.registry),
            Arc::clone(&self.ingestor.clock),
            self.config.reap_interval(),
            i64::try_from(self.config.expiry_millis).unwrap_or(i64::MAX),
            self.cancel.child_token(),
        ));

        self.state = PipelineState::Running;
        tracing::info!(
            interval_secs = self.config.aggregation_interval_secs,
            expiry_millis = self.config.expiry_millis,
            "log pipeline started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), HarvestError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping log pipeline");

        // 1. 주기 태스크 취소
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "periodic task ended abnormally");
            }
        }

        // 2. 마지막 플러시 후 송신측을 닫습니다.
        if let Some(flush) = self.flush.take() {
            let report = flush.flush_once();
            tracing::info!(queued = report.queued, "final flush completed");
        }
        self.point_tx = None;

        // 3. 포워더가 남은 포인트를 비울 때까지 대기
        if let Some(handle) = self.forwarder.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(FORWARDER_DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "sink forwarder ended abnormally"),
                Err(_) => {
                    tracing::warn!("sink forwarder did not drain in time, aborting");
                    abort.abort();
                }
            }
        }

        self.state = PipelineState::Stopped;
        tracing::info!("log pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let utilization = self.queue_utilization();
                if utilization > 0.9 {
                    HealthStatus::Degraded(format!(
                        "outbound queue utilization high: {:.1}%",
                        utilization * 100.0
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 로그 파이프라인 빌더
///
/// 공유 상태와 아웃바운드 큐를 생성합니다.
pub struct LogPipelineBuilder {
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
    rules: Option<RuleSet>,
    decoder: Option<Box<dyn MessageDecoder>>,
    sink: Option<Arc<dyn PointHandler>>,
}

impl LogPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            clock: Arc::new(SystemClock),
            rules: None,
            decoder: None,
            sink: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 시간 소스를 지정합니다.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 규칙을 직접 지정합니다.
    ///
    /// 지정하면 시작 시 `rules_path`에서 로드하지 않습니다.
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// 메시지 디코더를 지정합니다. 기본값은 JSON 디코더입니다.
    pub fn decoder(mut self, decoder: Box<dyn MessageDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// 다운스트림 싱크를 지정합니다.
    ///
    /// 지정하지 않으면 빌더가 포인트 수신 채널을 반환합니다.
    pub fn sink(mut self, sink: Arc<dyn PointHandler>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 파이프라인을 빌드합니다.
    ///
    /// # Returns
    /// - `LogPipeline`: 파이프라인 인스턴스
    /// - `Option<mpsc::Receiver<MetricPoint>>`: 플러시된 포인트 수신 채널
    ///   (싱크를 지정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(LogPipeline, Option<mpsc::Receiver<MetricPoint>>), LogPipelineError> {
        self.config.validate()?;

        let (rules_provided, engine) = match &self.rules {
            Some(rules) => (true, RuleEngine::compile(rules)?),
            None => (false, RuleEngine::default()),
        };

        let decoder = self.decoder.unwrap_or_else(|| {
            Box::new(JsonMessageDecoder::new().with_max_input_size(self.config.max_message_size))
        });

        let now = self.clock.now_millis();
        let ingestor = Arc::new(Ingestor {
            decoder,
            rules: RwLock::new(Arc::new(engine)),
            registry: Arc::new(MetricRegistry::new()),
            liveness: Arc::new(LivenessTracker::new()),
            meta: Arc::new(MetaMetrics::new(now)),
            clock: self.clock,
        });

        let (point_tx, point_rx) = mpsc::channel(self.config.sink_queue_capacity);
        let (point_rx, external_rx) = if self.sink.is_some() {
            (Some(point_rx), None)
        } else {
            (None, Some(point_rx))
        };

        let pipeline = LogPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            ingestor,
            rules_provided,
            point_tx: Some(point_tx),
            point_rx,
            sink: self.sink,
            flush: None,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            forwarder: None,
        };

        Ok((pipeline, external_rx))
    }
}

impl Default for LogPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
