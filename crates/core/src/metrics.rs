//! 메트릭 상수 및 설명 등록
//!
//! 두 종류의 이름을 중앙에서 정의합니다.
//!
//! - 플러시 경로로 싱크에 방출되는 메타 메트릭 (`logsharvesting.` 예약 네임스페이스)
//! - `metrics` 파사드로 미러링되는 Prometheus 메트릭 (`logharvest_` 접두어)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(logharvest_core::metrics::MESSAGES_RECEIVED_TOTAL).increment(1);
//! ```

// ─── 싱크 방출용 메타 메트릭 (예약 네임스페이스) ─────────────────────

/// 메타 메트릭 예약 네임스페이스. 전역 접두어가 적용되지 않습니다.
pub const META_NAMESPACE: &str = "logsharvesting";

/// 수신된 메시지 수
pub const META_RECEIVED: &str = "received";

/// 하나 이상의 규칙에 매칭된 추출 수
pub const META_PARSED: &str = "parsed";

/// 디코딩은 되었지만 어떤 규칙에도 매칭되지 않은 메시지 수
pub const META_UNPARSED: &str = "unparsed";

/// 디코딩할 수 없었던 메시지 수
pub const META_MALFORMED: &str = "malformed";

/// 싱크로 전송된 포인트 수
pub const META_SENT: &str = "sent";

/// 싱크 전송에 실패한 포인트 수
pub const META_SEND_FAILED: &str = "send_failed";

/// 수신 시각과 이벤트 타임스탬프 차이 (밀리초)
pub const META_DRIFT: &str = "drift";

// ─── Prometheus 미러 메트릭 ──────────────────────────────────────────

/// 수신된 메시지 수 (counter)
pub const MESSAGES_RECEIVED_TOTAL: &str = "logharvest_messages_received_total";

/// 규칙 매칭 수 (counter)
pub const MESSAGES_PARSED_TOTAL: &str = "logharvest_messages_parsed_total";

/// 매칭되지 않은 메시지 수 (counter)
pub const MESSAGES_UNPARSED_TOTAL: &str = "logharvest_messages_unparsed_total";

/// 손상된 메시지 수 (counter)
pub const MESSAGES_MALFORMED_TOTAL: &str = "logharvest_messages_malformed_total";

/// 전송된 포인트 수 (counter)
pub const POINTS_SENT_TOTAL: &str = "logharvest_points_sent_total";

/// 전송 실패 포인트 수 (counter)
pub const POINTS_SEND_FAILED_TOTAL: &str = "logharvest_points_send_failed_total";

/// 이벤트 시각 드리프트 (histogram, 밀리초)
pub const EVENT_DRIFT_MILLIS: &str = "logharvest_event_drift_millis";

/// 레지스트리 내 활성 메트릭 수 (gauge)
pub const REGISTRY_SIZE: &str = "logharvest_registry_size";

/// 만료로 제거된 메트릭 수 (counter)
pub const METRICS_EVICTED_TOTAL: &str = "logharvest_metrics_evicted_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 Prometheus 미러 메트릭의 설명을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        MESSAGES_RECEIVED_TOTAL,
        "Total number of shipper messages received"
    );
    describe_counter!(
        MESSAGES_PARSED_TOTAL,
        "Total number of successful rule extractions"
    );
    describe_counter!(
        MESSAGES_UNPARSED_TOTAL,
        "Total number of decodable messages matched by no rule"
    );
    describe_counter!(
        MESSAGES_MALFORMED_TOTAL,
        "Total number of undecodable messages dropped"
    );
    describe_counter!(
        POINTS_SENT_TOTAL,
        "Total number of points delivered to the downstream sink"
    );
    describe_counter!(
        POINTS_SEND_FAILED_TOTAL,
        "Total number of points that could not be delivered"
    );
    describe_histogram!(
        EVENT_DRIFT_MILLIS,
        "Difference between ingest clock and event timestamp in milliseconds"
    );
    describe_gauge!(
        REGISTRY_SIZE,
        "Number of live metric identities in the registry"
    );
    describe_counter!(
        METRICS_EVICTED_TOTAL,
        "Total number of metric identities evicted as stale"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMETHEUS_NAMES: &[&str] = &[
        MESSAGES_RECEIVED_TOTAL,
        MESSAGES_PARSED_TOTAL,
        MESSAGES_UNPARSED_TOTAL,
        MESSAGES_MALFORMED_TOTAL,
        POINTS_SENT_TOTAL,
        POINTS_SEND_FAILED_TOTAL,
        EVENT_DRIFT_MILLIS,
        REGISTRY_SIZE,
        METRICS_EVICTED_TOTAL,
    ];

    #[test]
    fn prometheus_names_start_with_prefix() {
        for name in PROMETHEUS_NAMES {
            assert!(
                name.starts_with("logharvest_"),
                "Metric '{}' does not start with 'logharvest_' prefix",
                name
            );
        }
    }

    #[test]
    fn meta_names_are_lowercase_without_dots() {
        let names = [
            META_RECEIVED,
            META_PARSED,
            META_UNPARSED,
            META_MALFORMED,
            META_SENT,
            META_SEND_FAILED,
            META_DRIFT,
        ];
        for name in names {
            assert_eq!(name.to_lowercase(), name);
            assert!(!name.contains('.'));
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }
}
