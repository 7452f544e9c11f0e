//! 감쇠 히스토그램 -- forward-decay 우선순위 샘플 저장소
//!
//! 분위수는 최근 샘플에 지수적으로 더 큰 가중치를 주는 고정 크기 저장소에서
//! 계산합니다 (Cormode et al., "Forward Decay"). 샘플 수, 최솟값, 최댓값,
//! 합계는 플러시 구간마다 정확히 집계한 뒤 리셋합니다.

use std::collections::BTreeMap;

use logharvest_core::types::HistogramSnapshot;

/// 기본 저장소 크기
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

/// 기본 감쇠 계수 (최근 약 5분에 가중치 집중)
pub const DEFAULT_ALPHA: f64 = 0.015;

/// 랜드마크 재설정 주기 (밀리초)
const RESCALE_THRESHOLD_MILLIS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy)]
struct WeightedSample {
    value: f64,
    weight: f64,
}

/// forward-decay 히스토그램
#[derive(Debug)]
pub struct DecayingHistogram {
    size: usize,
    alpha: f64,
    /// 우선순위(양수 f64의 비트 표현) → 샘플. 양수 f64의 비트 순서는 값 순서와 같습니다.
    samples: BTreeMap<u64, WeightedSample>,
    landmark_millis: i64,
    next_rescale_millis: i64,
    // 구간 통계
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
}

impl DecayingHistogram {
    /// 기본 파라미터로 히스토그램을 생성합니다.
    pub fn new(now_millis: i64) -> Self {
        Self::with_params(DEFAULT_RESERVOIR_SIZE, DEFAULT_ALPHA, now_millis)
    }

    /// 저장소 크기와 감쇠 계수를 지정하여 생성합니다.
    pub fn with_params(size: usize, alpha: f64, now_millis: i64) -> Self {
        Self {
            size: size.max(1),
            alpha,
            samples: BTreeMap::new(),
            landmark_millis: now_millis,
            next_rescale_millis: now_millis + RESCALE_THRESHOLD_MILLIS,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
        }
    }

    /// 샘플을 추가합니다.
    pub fn update(&mut self, value: f64, now_millis: i64) {
        if now_millis >= self.next_rescale_millis {
            self.rescale(now_millis);
        }

        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        #[allow(clippy::cast_precision_loss)]
        let elapsed_secs = (now_millis - self.landmark_millis) as f64 / 1000.0;
        let weight = (self.alpha * elapsed_secs).exp();
        // (0, 1] 구간 난수
        let random = 1.0 - fastrand::f64();
        let priority = weight / random;
        if !priority.is_finite() || priority <= 0.0 {
            return;
        }

        let key = priority.to_bits();
        let sample = WeightedSample { value, weight };
        if self.samples.len() < self.size {
            self.samples.entry(key).or_insert(sample);
        } else if let Some((&lowest, _)) = self.samples.first_key_value()
            && lowest < key
            && !self.samples.contains_key(&key)
        {
            self.samples.insert(key, sample);
            self.samples.pop_first();
        }
    }

    /// 이번 구간의 샘플 수
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 저장소에 보관 중인 샘플 수
    pub fn retained(&self) -> usize {
        self.samples.len()
    }

    /// 현재 분포 스냅샷을 계산합니다 (상태 변경 없음).
    pub fn snapshot(&self) -> HistogramSnapshot {
        if self.count == 0 {
            return HistogramSnapshot::default();
        }

        let mut weighted: Vec<WeightedSample> = self.samples.values().copied().collect();
        weighted.sort_by(|a, b| a.value.total_cmp(&b.value));
        let total_weight: f64 = weighted.iter().map(|s| s.weight).sum();

        // 누적 정규화 가중치: cumulative[i]는 i번째 샘플 이전까지의 합
        let mut cumulative = Vec::with_capacity(weighted.len());
        let mut acc = 0.0;
        for s in &weighted {
            cumulative.push(acc);
            acc += if total_weight > 0.0 {
                s.weight / total_weight
            } else {
                0.0
            };
        }

        let quantile = |q: f64| -> f64 {
            if weighted.is_empty() {
                return 0.0;
            }
            let pos = cumulative.partition_point(|&c| c <= q);
            weighted[pos.saturating_sub(1).min(weighted.len() - 1)].value
        };

        #[allow(clippy::cast_precision_loss)]
        let mean = self.sum / self.count as f64;
        HistogramSnapshot {
            count: self.count,
            min: self.min,
            max: self.max,
            mean,
            p50: quantile(0.5),
            p75: quantile(0.75),
            p95: quantile(0.95),
            p99: quantile(0.99),
            p999: quantile(0.999),
        }
    }

    /// 스냅샷을 반환하고 다음 구간으로 넘어갑니다.
    ///
    /// 구간 통계를 리셋하고 감쇠 랜드마크를 현재 시각으로 옮깁니다.
    /// 저장소 샘플은 재가중되어 유지됩니다.
    pub fn advance(&mut self, now_millis: i64) -> HistogramSnapshot {
        let snapshot = self.snapshot();
        self.count = 0;
        self.sum = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        self.rescale(now_millis);
        snapshot
    }

    /// 랜드마크를 옮기고 기존 샘플의 가중치와 우선순위를 재조정합니다.
    fn rescale(&mut self, now_millis: i64) {
        let old_landmark = self.landmark_millis;
        self.landmark_millis = now_millis;
        self.next_rescale_millis = now_millis + RESCALE_THRESHOLD_MILLIS;

        #[allow(clippy::cast_precision_loss)]
        let elapsed_secs = (now_millis - old_landmark) as f64 / 1000.0;
        let factor = (-self.alpha * elapsed_secs).exp();
        if (factor - 1.0).abs() < f64::EPSILON {
            return;
        }

        let old = std::mem::take(&mut self.samples);
        for (key, sample) in old {
            let priority = f64::from_bits(key) * factor;
            let weight = sample.weight * factor;
            if priority > 0.0 && weight > 0.0 && priority.is_finite() {
                self.samples
                    .entry(priority.to_bits())
                    .or_insert(WeightedSample {
                        value: sample.value,
                        weight,
                    });
            }
        }
    }
}
