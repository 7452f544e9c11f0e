//! 파이프라인 trait: 모듈 확장 포인트 정의

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::{HarvestError, SinkError};
use crate::types::MetricPoint;

/// `dyn` 호환 trait에서 사용하는 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하 (사유 포함)
    Degraded(String),
    /// 비정상 (사유 포함)
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 생명주기를 갖는 모듈 trait
///
/// 데몬은 이 trait을 통해 모듈을 시작/정지하고 상태를 조회합니다.
pub trait Pipeline: Send + Sync {
    /// 모듈을 시작합니다. 백그라운드 태스크를 스폰합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// 모듈을 정지합니다. 주기 태스크를 취소하고 남은 상태를 정리합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// 모듈의 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 다운스트림 포인트 핸들러 trait
///
/// 플러시마다 메트릭당 한 번 호출됩니다. 전송은 best-effort이며,
/// 실패는 해당 포인트에만 영향을 줍니다.
/// 새로운 싱크를 지원하려면 이 trait을 구현합니다.
pub trait PointHandler: Send + Sync {
    /// 싱크 이름 (로그용)
    fn name(&self) -> &str;

    /// 포인트 하나를 전송합니다.
    fn report<'a>(&'a self, point: &'a MetricPoint) -> BoxFuture<'a, Result<(), SinkError>>;
}
