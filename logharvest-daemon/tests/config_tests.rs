//! Configuration loading and validation tests.
//!
//! Tests TOML file loading, environment variable overrides, CLI overrides,
//! and validation as the daemon performs them.

use std::io::Write;

use clap::Parser;
use serial_test::serial;

use logharvest_core::config::HarvestConfig;
use logharvest_daemon::cli::DaemonCli;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[tokio::test]
#[serial]
async fn test_load_full_config_file() {
    // Given: A complete config file
    let file = write_config(
        r#"
[general]
log_level = "debug"
log_format = "pretty"

[ingestion]
enabled = true
bind = "127.0.0.1:5044"
max_connections = 64

[aggregation]
prefix = "logs"
aggregation_interval_secs = 10
expiry_millis = 600000
reap_interval_millis = 1000
rules_path = "/etc/logharvest/rules.d"

[sink]
kind = "tcp"
address = "wavefront-proxy:2878"
source = "web-01"

[metrics]
enabled = false
"#,
    );

    // When: Loading
    let config = HarvestConfig::load(file.path())
        .await
        .expect("config should load");

    // Then: All sections are populated
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.ingestion.max_connections, 64);
    assert_eq!(config.aggregation.prefix, "logs");
    assert_eq!(config.aggregation.expiry_millis, 600_000);
    assert_eq!(config.sink.kind, "tcp");
    assert_eq!(config.sink.source, "web-01");
}

#[tokio::test]
#[serial]
async fn test_env_override_applies_on_load() {
    // Given: A minimal config and an environment override
    let file = write_config("[aggregation]\nprefix = \"file\"\n");
    // SAFETY: serial_test로 환경변수 접근을 직렬화합니다.
    unsafe {
        std::env::set_var("LOGHARVEST_AGGREGATION_PREFIX", "env");
    }

    // When: Loading
    let result = HarvestConfig::load(file.path()).await;
    unsafe {
        std::env::remove_var("LOGHARVEST_AGGREGATION_PREFIX");
    }

    // Then: The environment wins
    let config = result.expect("config should load");
    assert_eq!(config.aggregation.prefix, "env");
}

#[tokio::test]
#[serial]
async fn test_invalid_values_fail_validation() {
    // Given: A zero aggregation interval
    let file = write_config("[aggregation]\naggregation_interval_secs = 0\n");

    // When/Then: Loading fails with the field name
    let err = HarvestConfig::load(file.path())
        .await
        .expect_err("zero interval must be rejected");
    assert!(err.to_string().contains("aggregation_interval_secs"));
}

#[tokio::test]
#[serial]
async fn test_missing_file_reports_path() {
    let err = HarvestConfig::load("/nonexistent/logharvest.toml")
        .await
        .expect_err("missing file must fail");
    assert!(err.to_string().contains("/nonexistent/logharvest.toml"));
}

#[test]
fn test_cli_overrides_config_values() {
    // Given: CLI flags for logging
    let cli = DaemonCli::parse_from(["logharvest-daemon", "--log-format", "pretty"]);
    let mut config = HarvestConfig::default();

    // When: Applying overrides
    cli.apply_overrides(&mut config);

    // Then: Only the given flag changes
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.general.log_level, "info");
    assert!(config.validate().is_ok());
}
