//! 누산기 -- 메트릭 식별자 하나의 살아 있는 상태
//!
//! - 카운터: 지난 플러시 이후 증분 합계. 플러시 시 0으로 리셋
//! - 게이지: 마지막 관측값. 플러시해도 유지
//! - 히스토그램: 감쇠 샘플 저장소. 플러시 시 구간을 넘김
//!
//! 동일 식별자에 대한 동시 갱신은 원자 연산 또는 뮤텍스로 선형화됩니다.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

use logharvest_core::types::{MetricIdentity, MetricKind, MetricValue};

use crate::error::LogPipelineError;
use crate::histogram::DecayingHistogram;

/// 종류별 누산기
#[derive(Debug)]
pub enum Accumulator {
    /// 카운터
    Counter(AtomicI64),
    /// 게이지 (아직 값이 없으면 `None`)
    Gauge(Mutex<Option<f64>>),
    /// 히스토그램
    Histogram(Mutex<DecayingHistogram>),
}

impl Accumulator {
    /// 종류에 맞는 초기 상태의 누산기를 생성합니다.
    pub fn new(kind: MetricKind, now_millis: i64) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(AtomicI64::new(0)),
            MetricKind::Gauge => Self::Gauge(Mutex::new(None)),
            MetricKind::Histogram => Self::Histogram(Mutex::new(DecayingHistogram::new(now_millis))),
        }
    }

    /// 누산기 종류
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Histogram(_) => MetricKind::Histogram,
        }
    }

    /// 추출된 값을 반영합니다.
    ///
    /// - 카운터: 값이 없으면 1 증가, 있으면 반올림한 값만큼 증가
    /// - 게이지: 값으로 설정
    /// - 히스토그램: 샘플 추가
    ///
    /// # Errors
    /// 종류 불일치, 음수/비유한 카운터 증분, 값이 없는 게이지/히스토그램 갱신
    pub fn apply(
        &self,
        identity: &MetricIdentity,
        kind: MetricKind,
        value: Option<f64>,
        now_millis: i64,
    ) -> Result<(), LogPipelineError> {
        let fail = |reason: String| LogPipelineError::AccumulatorUpdate {
            identity: identity.clone(),
            reason,
        };

        if kind != self.kind() {
            return Err(fail(format!(
                "kind mismatch: existing {} cannot accept {kind} update",
                self.kind()
            )));
        }

        match self {
            Self::Counter(total) => {
                let delta = match value {
                    None => 1,
                    // `as` 변환은 i64 범위에서 포화됩니다.
                    #[allow(clippy::cast_possible_truncation)]
                    Some(v) if v.is_finite() && v >= 0.0 => v.round() as i64,
                    Some(v) => {
                        return Err(fail(format!("invalid counter increment {v}")));
                    }
                };
                total
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| t.checked_add(delta))
                    .map_err(|t| fail(format!("counter overflow: {t} + {delta}")))?;
            }
            Self::Gauge(current) => {
                let v = require_finite(value).map_err(fail)?;
                *current.lock() = Some(v);
            }
            Self::Histogram(histogram) => {
                let v = require_finite(value).map_err(fail)?;
                histogram.lock().update(v, now_millis);
            }
        }
        Ok(())
    }

    /// 현재 값을 읽습니다 (상태 변경 없음).
    ///
    /// 값이 없는 게이지는 `None`입니다.
    pub fn current(&self) -> Option<MetricValue> {
        match self {
            Self::Counter(total) => Some(MetricValue::Counter(total.load(Ordering::Relaxed))),
            Self::Gauge(current) => current.lock().map(MetricValue::Gauge),
            Self::Histogram(histogram) => Some(MetricValue::Histogram(histogram.lock().snapshot())),
        }
    }

    /// 플러시용 값을 산출하고 플러시 후 규칙을 적용합니다.
    ///
    /// 카운터는 0으로 리셋하고, 히스토그램은 다음 구간으로 넘깁니다.
    /// 값이 없는 게이지와 (설정에 따라) 빈 히스토그램은 `None`입니다.
    pub fn flush(&self, now_millis: i64, report_empty_histograms: bool) -> Option<MetricValue> {
        match self {
            Self::Counter(total) => Some(MetricValue::Counter(total.swap(0, Ordering::Relaxed))),
            Self::Gauge(current) => current.lock().map(MetricValue::Gauge),
            Self::Histogram(histogram) => {
                let snapshot = histogram.lock().advance(now_millis);
                if snapshot.count == 0 && !report_empty_histograms {
                    None
                } else {
                    Some(MetricValue::Histogram(snapshot))
                }
            }
        }
    }
}

fn require_finite(value: Option<f64>) -> Result<f64, String> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(format!("non-finite value {v}")),
        None => Err("update requires a value".to_owned()),
    }
}
