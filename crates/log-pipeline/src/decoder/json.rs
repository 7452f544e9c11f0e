//! JSON 메시지 디코더
//!
//! Beats 계열 shipper가 보내는 JSON 객체 하나를 [`NormalizedRecord`]로 변환합니다.
//!
//! - 중첩 객체는 dot notation으로 평탄화합니다 (`beat.hostname`).
//! - 숫자와 불리언은 문자열로 렌더링합니다.
//! - 배열과 null은 건너뜁니다.
//! - `@timestamp`는 RFC 3339로 파싱합니다. 없거나 파싱할 수 없으면 `None`입니다.

use std::collections::HashMap;

use chrono::DateTime;

use super::{MessageDecoder, NormalizedRecord};
use crate::error::LogPipelineError;

/// 기본 타임스탬프 필드
pub const DEFAULT_TIMESTAMP_FIELD: &str = "@timestamp";

/// 기본 최대 입력 크기 (1MB)
pub const DEFAULT_MAX_INPUT_SIZE: usize = 1024 * 1024;

/// 최대 중첩 깊이
const MAX_NESTING_DEPTH: usize = 32;

/// JSON 메시지 디코더
pub struct JsonMessageDecoder {
    /// 타임스탬프 필드명
    timestamp_field: String,
    /// 최대 허용 입력 크기 (바이트)
    max_input_size: usize,
}

impl JsonMessageDecoder {
    /// 새 디코더를 생성합니다.
    pub fn new() -> Self {
        Self {
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_owned(),
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
        }
    }

    /// 최대 입력 크기를 설정합니다.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// 타임스탬프 필드명을 설정합니다.
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    /// JSON 객체를 평탄화하여 dot notation 필드 맵에 기록합니다.
    fn flatten_object(
        map: &serde_json::Map<String, serde_json::Value>,
        prefix: &str,
        depth: usize,
        out: &mut HashMap<String, String>,
    ) {
        if depth > MAX_NESTING_DEPTH {
            return;
        }

        for (key, val) in map {
            let field_name = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };

            match val {
                serde_json::Value::Object(inner) => {
                    Self::flatten_object(inner, &field_name, depth + 1, out);
                }
                serde_json::Value::String(s) => {
                    out.insert(field_name, s.clone());
                }
                serde_json::Value::Number(n) => {
                    out.insert(field_name, n.to_string());
                }
                serde_json::Value::Bool(b) => {
                    out.insert(field_name, b.to_string());
                }
                serde_json::Value::Array(_) | serde_json::Value::Null => {}
            }
        }
    }

    /// RFC 3339 타임스탬프를 epoch 밀리초로 변환합니다.
    fn parse_timestamp(timestamp: &str) -> Option<i64> {
        DateTime::parse_from_rfc3339(timestamp)
            .ok()
            .map(|dt| dt.timestamp_millis())
    }
}

impl Default for JsonMessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDecoder for JsonMessageDecoder {
    fn format_name(&self) -> &str {
        "json"
    }

    fn decode(&self, raw: &[u8]) -> Result<NormalizedRecord, LogPipelineError> {
        if raw.len() > self.max_input_size {
            return Err(LogPipelineError::MalformedMessage(format!(
                "input too large: {} bytes (max: {})",
                raw.len(),
                self.max_input_size
            )));
        }

        let value: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|e| LogPipelineError::MalformedMessage(e.to_string()))?;

        let serde_json::Value::Object(map) = value else {
            return Err(LogPipelineError::MalformedMessage(
                "expected JSON object at top level".to_owned(),
            ));
        };

        let mut fields = HashMap::with_capacity(map.len());
        Self::flatten_object(&map, "", 0, &mut fields);

        let timestamp_millis = fields
            .get(&self.timestamp_field)
            .and_then(|ts| Self::parse_timestamp(ts));

        Ok(NormalizedRecord::new(fields, timestamp_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_name_is_json() {
        assert_eq!(JsonMessageDecoder::default().format_name(), "json");
    }

    #[test]
    fn decode_basic_message() {
        let decoder = JsonMessageDecoder::default();
        let record = decoder
            .decode(br#"{"message":"user=alice status=500","source":"/var/log/app.log"}"#)
            .unwrap();
        assert_eq!(record.field("message"), Some("user=alice status=500"));
        assert_eq!(record.field("source"), Some("/var/log/app.log"));
        assert_eq!(record.timestamp_millis(), None);
    }

    #[test]
    fn decode_parses_timestamp() {
        let decoder = JsonMessageDecoder::default();
        let record = decoder
            .decode(br#"{"@timestamp":"2024-01-15T12:00:00.250Z","message":"x"}"#)
            .unwrap();
        assert_eq!(record.timestamp_millis(), Some(1_705_320_000_250));
    }

    #[test]
    fn decode_unparseable_timestamp_is_none() {
        let decoder = JsonMessageDecoder::default();
        let record = decoder
            .decode(br#"{"@timestamp":"yesterday","message":"x"}"#)
            .unwrap();
        assert_eq!(record.timestamp_millis(), None);
        // 원본 값은 필드로 남습니다
        assert_eq!(record.field("@timestamp"), Some("yesterday"));
    }

    #[test]
    fn decode_flattens_nested_objects() {
        let decoder = JsonMessageDecoder::default();
        let record = decoder
            .decode(br#"{"beat":{"hostname":"web-01","meta":{"zone":"a"}},"message":"m"}"#)
            .unwrap();
        assert_eq!(record.field("beat.hostname"), Some("web-01"));
        assert_eq!(record.field("beat.meta.zone"), Some("a"));
    }

    #[test]
    fn decode_renders_numbers_and_bools() {
        let decoder = JsonMessageDecoder::default();
        let record = decoder
            .decode(br#"{"offset":1024,"ratio":0.5,"eof":true}"#)
            .unwrap();
        assert_eq!(record.field("offset"), Some("1024"));
        assert_eq!(record.field("ratio"), Some("0.5"));
        assert_eq!(record.field("eof"), Some("true"));
    }

    #[test]
    fn decode_skips_arrays_and_nulls() {
        let decoder = JsonMessageDecoder::default();
        let record = decoder
            .decode(br#"{"tags":["a","b"],"empty":null,"message":"m"}"#)
            .unwrap();
        assert_eq!(record.field("tags"), None);
        assert_eq!(record.field("empty"), None);
        assert_eq!(record.fields().len(), 1);
    }

    #[test]
    fn decode_missing_message_is_not_an_error() {
        let decoder = JsonMessageDecoder::default();
        let record = decoder.decode(br#"{}"#).unwrap();
        assert!(record.fields().is_empty());
    }

    #[test]
    fn decode_truncated_json_is_malformed() {
        let decoder = JsonMessageDecoder::default();
        let err = decoder.decode(br#"{"message":"trunc"#).unwrap_err();
        assert!(matches!(err, LogPipelineError::MalformedMessage(_)));
    }

    #[test]
    fn decode_non_object_is_malformed() {
        let decoder = JsonMessageDecoder::default();
        assert!(decoder.decode(br#"["not","an","object"]"#).is_err());
        assert!(decoder.decode(b"42").is_err());
    }

    #[test]
    fn decode_too_large_input_is_malformed() {
        let decoder = JsonMessageDecoder::default().with_max_input_size(10);
        let err = decoder
            .decode(br#"{"message":"this is way too long for the limit"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn custom_timestamp_field() {
        let decoder = JsonMessageDecoder::default().with_timestamp_field("ts");
        let record = decoder
            .decode(br#"{"ts":"2024-01-15T12:00:00Z"}"#)
            .unwrap();
        assert_eq!(record.timestamp_millis(), Some(1_705_320_000_000));
    }
}
