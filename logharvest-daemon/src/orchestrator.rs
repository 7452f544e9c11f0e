//! Daemon orchestration -- assembly, startup ordering, and graceful shutdown.
//!
//! The [`Orchestrator`] loads configuration, builds the downstream sink and
//! the log pipeline, starts the shipper collector, and tears everything down
//! when a shutdown signal arrives.
//!
//! # Startup Order
//!
//! 1. Log pipeline (loads rules, spawns flush/sweep/forwarder tasks)
//! 2. Shipper collector (starts accepting messages)
//!
//! # Shutdown Order (reverse)
//!
//! 1. Shipper collector (stop accepting messages)
//! 2. Log pipeline (final flush, drain the outbound queue)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logharvest_core::config::{HarvestConfig, SinkConfig};
use logharvest_core::pipeline::{HealthStatus, Pipeline, PointHandler};
use logharvest_log_pipeline::{
    LogPipeline, LogPipelineBuilder, LogPipelineError, LogSink, PipelineConfig, RuleEngine,
    TcpLineSink, TcpShipperCollector, TcpShipperConfig,
};

use crate::health::{ComponentHealth, DaemonHealth, aggregate_status};
use crate::metrics_server;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: HarvestConfig,
    /// The log-to-metric pipeline.
    pipeline: LogPipeline,
    /// Cancels the collector's accept loop and connection handlers.
    collector_token: CancellationToken,
    /// Running collector task, if ingestion is enabled and started.
    collector_task: Option<JoinHandle<Result<(), LogPipelineError>>>,
    /// Address the collector is actually bound to.
    ingest_addr: Option<SocketAddr>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - The sink or pipeline fails to initialize
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = HarvestConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    pub fn build_from_config(config: HarvestConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before the pipeline records anything
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let sink = build_sink(&config.sink)?;
        tracing::info!(sink = sink.name(), "downstream sink configured");

        let (pipeline, _) = LogPipelineBuilder::new()
            .config(PipelineConfig::from_core(&config))
            .sink(sink)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build log pipeline: {}", e))?;

        Ok(Self {
            config,
            pipeline,
            collector_token: CancellationToken::new(),
            collector_task: None,
            ingest_addr: None,
            start_time: Instant::now(),
        })
    }

    /// Start the pipeline, then the collector.
    ///
    /// If the collector cannot bind, the already-started pipeline is stopped.
    pub async fn start(&mut self) -> Result<()> {
        self.pipeline
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start log pipeline: {}", e))?;

        if !self.config.ingestion.enabled {
            tracing::info!("shipper ingestion disabled in configuration");
            return Ok(());
        }

        let mut collector = TcpShipperCollector::new(
            TcpShipperConfig::from_pipeline(self.pipeline.config()),
            self.pipeline.ingestor(),
            self.collector_token.child_token(),
        );

        let addr = match collector.bind().await {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!("collector bind failed, rolling back pipeline start");
                if let Err(stop_err) = self.pipeline.stop().await {
                    tracing::error!(
                        startup_error = %e,
                        rollback_error = %stop_err,
                        "rollback also failed during startup failure cleanup"
                    );
                }
                return Err(anyhow::anyhow!("failed to start collector: {}", e));
            }
        };

        self.ingest_addr = Some(addr);
        self.collector_task = Some(tokio::spawn(async move { collector.run().await }));
        tracing::info!(addr = %addr, "shipper collector started");
        Ok(())
    }

    /// Start everything and block until a shutdown signal is received.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        tracing::info!("logharvest-daemon running");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        self.shutdown().await
    }

    /// Stop the collector, then the pipeline.
    ///
    /// In-flight messages on open connections are processed before the
    /// pipeline performs its final flush.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.collector_token.cancel();
        if let Some(task) = self.collector_task.take() {
            match task.await {
                Ok(Ok(())) => tracing::info!("shipper collector stopped"),
                Ok(Err(e)) => tracing::error!(error = %e, "shipper collector failed"),
                Err(e) => tracing::error!(error = %e, "shipper collector task panicked"),
            }
        }

        self.pipeline
            .stop()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop log pipeline: {}", e))?;

        tracing::info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "logharvest-daemon shut down"
        );
        Ok(())
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let collector_status = match &self.collector_task {
            Some(task) if !task.is_finished() => HealthStatus::Healthy,
            Some(_) => HealthStatus::Unhealthy("collector exited".to_owned()),
            None => HealthStatus::Unhealthy("not started".to_owned()),
        };

        let components = vec![
            ComponentHealth {
                name: "log-pipeline".to_owned(),
                enabled: true,
                status: self.pipeline.health_check().await,
            },
            ComponentHealth {
                name: "collector".to_owned(),
                enabled: self.config.ingestion.enabled,
                status: collector_status,
            },
        ];

        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs: self.start_time.elapsed().as_secs(),
            components,
        }
    }

    /// Address the collector is bound to, once started.
    pub fn ingest_addr(&self) -> Option<SocketAddr> {
        self.ingest_addr
    }

    /// The managed pipeline.
    pub fn pipeline(&self) -> &LogPipeline {
        &self.pipeline
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }
}

/// Build the downstream sink selected by `[sink] kind`.
///
/// # Errors
///
/// Returns an error for an unknown sink kind.
pub fn build_sink(config: &SinkConfig) -> Result<Arc<dyn PointHandler>> {
    match config.kind.as_str() {
        "log" => Ok(Arc::new(LogSink::new(config.source.clone()))),
        "tcp" => Ok(Arc::new(
            TcpLineSink::new(config.address.clone(), config.source.clone())
                .with_connect_timeout(Duration::from_secs(config.connect_timeout_secs)),
        )),
        other => Err(anyhow::anyhow!(
            "unknown sink kind '{}', expected 'log' or 'tcp'",
            other
        )),
    }
}

/// Validate configuration and compile the rule files it points to.
///
/// Returns the number of compiled rules.
pub async fn validate_config(config: &HarvestConfig) -> Result<usize> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    let pipeline_config = PipelineConfig::from_core(config);
    pipeline_config
        .validate()
        .map_err(|e| anyhow::anyhow!("pipeline config validation failed: {}", e))?;

    let engine = RuleEngine::load(&pipeline_config.rules_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load rules: {}", e))?;
    Ok(engine.rule_count())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
