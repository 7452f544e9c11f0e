//! 메시지 디코딩 모듈 -- shipper 원시 메시지를 정규화된 레코드로 변환합니다.
//!
//! 디코더는 순수 변환입니다. 필드가 없거나 남는 것은 에러가 아니며,
//! 필드 자체를 얻을 수 없을 때만 [`LogPipelineError::MalformedMessage`]를 반환합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logharvest_log_pipeline::decoder::{JsonMessageDecoder, MessageDecoder};
//!
//! let decoder = JsonMessageDecoder::default();
//! let record = decoder.decode(br#"{"message":"request completed"}"#)?;
//! assert_eq!(record.field("message"), Some("request completed"));
//! ```

pub mod json;

pub use json::JsonMessageDecoder;

use std::collections::HashMap;

use crate::error::LogPipelineError;

/// 정규화된 레코드
///
/// 필드 이름 → 문자열 값 매핑과 선택적 이벤트 타임스탬프를 담습니다.
/// 메시지당 한 번 생성되며 이후 읽기 전용입니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    fields: HashMap<String, String>,
    timestamp_millis: Option<i64>,
}

impl NormalizedRecord {
    /// 필드와 타임스탬프로 레코드를 생성합니다.
    pub fn new(fields: HashMap<String, String>, timestamp_millis: Option<i64>) -> Self {
        Self {
            fields,
            timestamp_millis,
        }
    }

    /// 필드 값을 조회합니다.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// 전체 필드 맵
    pub fn fields(&self) -> &HashMap<String, String> {
        &self.fields
    }

    /// 이벤트 타임스탬프 (epoch 밀리초, 없으면 `None`)
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.timestamp_millis
    }
}

/// 메시지 디코더 trait
///
/// 새로운 shipper 포맷을 지원하려면 이 trait을 구현합니다.
pub trait MessageDecoder: Send + Sync {
    /// 포맷 이름 (로그용)
    fn format_name(&self) -> &str;

    /// 원시 바이트를 레코드로 디코딩합니다.
    fn decode(&self, raw: &[u8]) -> Result<NormalizedRecord, LogPipelineError>;
}
