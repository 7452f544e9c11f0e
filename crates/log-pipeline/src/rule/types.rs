//! 메트릭 규칙 데이터 타입
//!
//! YAML 규칙 파일에서 역직렬화되는 구조체들을 정의합니다.

use std::collections::BTreeMap;

use logharvest_core::types::MetricKind;
use serde::{Deserialize, Serialize};

use crate::error::LogPipelineError;

/// 메트릭 이름 최대 길이
const MAX_NAME_LEN: usize = 256;

/// 규칙 집합 -- 하나의 YAML 문서에 대응합니다.
///
/// 종류별로 순서가 있는 규칙 목록을 가집니다.
///
/// # YAML 스키마
/// ```yaml
/// counters:
///   - name: requests.completed
///     pattern: "request completed"
/// gauges:
///   - name: queue.depth
///     pattern: "queue=<queue> depth=<depth:number>"
///     value: depth
/// histograms:
///   - name: http.latency
///     pattern: "<method> * took <ms:number>ms"
///     value: ms
///     tags:
///       verb: method
///     static_tags:
///       service: api
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    /// 카운터 규칙
    #[serde(default)]
    pub counters: Vec<MetricRule>,
    /// 게이지 규칙
    #[serde(default)]
    pub gauges: Vec<MetricRule>,
    /// 히스토그램 규칙
    #[serde(default)]
    pub histograms: Vec<MetricRule>,
}

impl RuleSet {
    /// 다른 규칙 집합을 뒤에 이어 붙입니다 (목록 순서 유지).
    pub fn merge(&mut self, other: RuleSet) {
        self.counters.extend(other.counters);
        self.gauges.extend(other.gauges);
        self.histograms.extend(other.histograms);
    }

    /// 전체 규칙 수
    pub fn len(&self) -> usize {
        self.counters.len() + self.gauges.len() + self.histograms.len()
    }

    /// 규칙이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (종류, 규칙) 쌍을 카운터 → 게이지 → 히스토그램 순서로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, &MetricRule)> {
        self.counters
            .iter()
            .map(|r| (MetricKind::Counter, r))
            .chain(self.gauges.iter().map(|r| (MetricKind::Gauge, r)))
            .chain(self.histograms.iter().map(|r| (MetricKind::Histogram, r)))
    }

    /// 모든 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        for (kind, rule) in self.iter() {
            rule.validate(kind)?;
        }
        Ok(())
    }
}

/// 메트릭 추출 규칙
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricRule {
    /// 메트릭 이름 (`<capture>` 참조로 캡처 값 치환 가능)
    pub name: String,
    /// 패턴 템플릿 (`regex`와 배타적)
    #[serde(default)]
    pub pattern: Option<String>,
    /// 이름 있는 그룹을 갖는 정규식 (`pattern`과 배타적)
    #[serde(default)]
    pub regex: Option<String>,
    /// 매칭 대상 필드 (순서대로 시도, 처음 매칭된 필드 사용)
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
    /// 수치 값을 담은 캡처 이름 (카운터는 선택, 게이지/히스토그램은 필수)
    #[serde(default)]
    pub value: Option<String>,
    /// 태그 키 → 캡처 이름. 생략 시 값/이름에 쓰이지 않은 모든 캡처가 태그가 됨
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    /// 고정 태그 키 → 값
    #[serde(default)]
    pub static_tags: BTreeMap<String, String>,
    /// 필드 값 일부와의 매칭 허용 여부
    #[serde(default)]
    pub partial: bool,
}

fn default_fields() -> Vec<String> {
    vec!["message".to_owned()]
}

impl MetricRule {
    /// 템플릿 규칙을 생성합니다 (테스트 및 프로그래밍 방식 구성용).
    pub fn with_pattern(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: Some(pattern.into()),
            regex: None,
            fields: default_fields(),
            value: None,
            tags: None,
            static_tags: BTreeMap::new(),
            partial: false,
        }
    }

    /// 값 캡처를 설정합니다.
    pub fn value(mut self, capture: impl Into<String>) -> Self {
        self.value = Some(capture.into());
        self
    }

    /// 태그 매핑을 추가합니다.
    pub fn tag(mut self, key: impl Into<String>, capture: impl Into<String>) -> Self {
        self.tags
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), capture.into());
        self
    }

    /// 고정 태그를 추가합니다.
    pub fn static_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_tags.insert(key.into(), value.into());
        self
    }

    /// 부분 매칭을 허용합니다.
    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// 매칭 대상 필드를 설정합니다.
    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// 규칙의 구조적 유효성을 검증합니다.
    ///
    /// 패턴 컴파일과 캡처 참조 검증은 [`CompiledRule`](super::CompiledRule)에서 수행합니다.
    pub fn validate(&self, kind: MetricKind) -> Result<(), LogPipelineError> {
        let fail = |reason: String| LogPipelineError::RuleValidation {
            rule: if self.name.is_empty() {
                "(empty)".to_owned()
            } else {
                self.name.clone()
            },
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(fail("metric name must not be empty".to_owned()));
        }

        if self.name.len() > MAX_NAME_LEN {
            return Err(fail(format!(
                "metric name must not exceed {MAX_NAME_LEN} characters"
            )));
        }

        match (&self.pattern, &self.regex) {
            (Some(_), Some(_)) => {
                return Err(fail("'pattern' and 'regex' are mutually exclusive".to_owned()));
            }
            (None, None) => {
                return Err(fail("one of 'pattern' or 'regex' is required".to_owned()));
            }
            _ => {}
        }

        if self.fields.is_empty() || self.fields.iter().any(String::is_empty) {
            return Err(fail("'fields' must list at least one non-empty field".to_owned()));
        }

        if kind != MetricKind::Counter && self.value.is_none() {
            return Err(fail(format!("{kind} rules require a 'value' capture")));
        }

        if self.static_tags.keys().any(String::is_empty) {
            return Err(fail("static tag keys must not be empty".to_owned()));
        }

        Ok(())
    }
}
