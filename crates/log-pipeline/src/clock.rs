//! 시간 소스 추상화
//!
//! 만료 판정, 드리프트 계산, 플러시 타임스탬프는 모두 [`Clock`]을 통해
//! 현재 시각을 얻습니다. 테스트에서는 [`ManualClock`]으로 시간을 직접 제어합니다.

use std::sync::atomic::{AtomicI64, Ordering};

/// 밀리초 단위 epoch 시각을 제공하는 시간 소스
pub trait Clock: Send + Sync {
    /// 현재 시각 (epoch 밀리초)
    fn now_millis(&self) -> i64;
}

/// 시스템 벽시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// 수동으로 조작하는 시계 (테스트용)
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// 주어진 시각에서 시작하는 시계를 생성합니다.
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// 시각을 설정합니다.
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    /// 시각을 전진시킵니다.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
