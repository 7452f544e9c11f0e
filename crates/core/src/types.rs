//! 도메인 타입: 메트릭 식별자, 종류, 방출 레코드
//!
//! 엔진과 싱크가 공유하는 데이터 구조를 정의합니다.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// 메트릭 종류
///
/// 규칙은 정확히 하나의 종류를 선언하며, 레지스트리는 처음 사용 시
/// 해당 종류의 누산기를 생성합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// 플러시마다 0으로 리셋되는 누적 카운터
    Counter,
    /// 마지막 관측값을 유지하는 게이지
    Gauge,
    /// 감쇠 샘플 윈도우를 갖는 히스토그램
    Histogram,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
            Self::Histogram => write!(f, "histogram"),
        }
    }
}

/// 메트릭 식별자 -- 이름 + 정렬된 태그 목록
///
/// 레지스트리 키로 사용됩니다. 생성 후 불변이며, 이름과 태그 시퀀스가
/// 모두 같을 때만 동일합니다. 내부 데이터는 `Arc`로 공유되므로
/// 복제 비용이 낮습니다.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricIdentity {
    inner: Arc<IdentityInner>,
}

#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
struct IdentityInner {
    name: String,
    tags: Vec<(String, String)>,
}

impl MetricIdentity {
    /// 이름과 태그로 식별자를 생성합니다.
    ///
    /// 태그는 키 기준으로 정렬되어 저장되므로, 입력 순서와 무관하게
    /// 같은 태그 집합은 같은 식별자가 됩니다.
    pub fn new(name: impl Into<String>, mut tags: Vec<(String, String)>) -> Self {
        tags.sort();
        Self {
            inner: Arc::new(IdentityInner {
                name: name.into(),
                tags,
            }),
        }
    }

    /// 메트릭 이름
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 정렬된 태그 목록
    pub fn tags(&self) -> &[(String, String)] {
        &self.inner.tags
    }
}

impl fmt::Debug for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricIdentity")
            .field("name", &self.inner.name)
            .field("tags", &self.inner.tags)
            .finish()
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.name)?;
        if !self.inner.tags.is_empty() {
            write!(f, "{{")?;
            for (i, (k, v)) in self.inner.tags.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}

/// 히스토그램 분포 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    /// 이번 윈도우에서 관측된 샘플 수
    pub count: u64,
    /// 최솟값
    pub min: f64,
    /// 최댓값
    pub max: f64,
    /// 평균
    pub mean: f64,
    /// 50 백분위
    pub p50: f64,
    /// 75 백분위
    pub p75: f64,
    /// 95 백분위
    pub p95: f64,
    /// 99 백분위
    pub p99: f64,
    /// 99.9 백분위
    pub p999: f64,
}

impl HistogramSnapshot {
    /// 통계 이름과 값 목록을 반환합니다 (라인 프로토콜 확장용).
    pub fn stats(&self) -> [(&'static str, f64); 9] {
        #[allow(clippy::cast_precision_loss)]
        let count = self.count as f64;
        [
            ("count", count),
            ("min", self.min),
            ("max", self.max),
            ("mean", self.mean),
            ("p50", self.p50),
            ("p75", self.p75),
            ("p95", self.p95),
            ("p99", self.p99),
            ("p999", self.p999),
        ]
    }
}

/// 방출 값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    /// 지난 플러시 이후 누적 합계
    Counter(i64),
    /// 현재 게이지 값
    Gauge(f64),
    /// 분포 스냅샷
    Histogram(HistogramSnapshot),
}

impl MetricValue {
    /// 값에 대응하는 메트릭 종류
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Histogram(_) => MetricKind::Histogram,
        }
    }
}

/// 플러시 시 싱크로 전달되는 방출 레코드
///
/// `(metricName, tags, kind, value, timestampMillis)` 형태입니다.
/// `name`에는 전역 접두어가 이미 적용되어 있습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// 접두어가 적용된 메트릭 이름
    pub name: String,
    /// 정렬된 태그 목록
    pub tags: Vec<(String, String)>,
    /// 방출 값 (종류 포함)
    pub value: MetricValue,
    /// 플러시 시각 (epoch 밀리초)
    pub timestamp_millis: i64,
}

impl MetricPoint {
    /// 메트릭 종류
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

impl fmt::Display for MetricPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?} @{}", self.kind(), self.name, self.value, self.timestamp_millis)
    }
}
