//! 메트릭 레지스트리 -- 식별자 → 누산기 저장소
//!
//! 처음 사용될 때 누산기를 생성하며, 동일 식별자에 대한 동시 생성 요청은
//! 정확히 하나의 인스턴스를 공유합니다. 조회는 읽기 락만 잡고, 생성할 때만
//! 쓰기 락을 잡습니다.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use logharvest_core::types::{MetricIdentity, MetricKind};

use crate::accumulator::Accumulator;

/// 메트릭 레지스트리
#[derive(Debug, Default)]
pub struct MetricRegistry {
    accumulators: RwLock<HashMap<MetricIdentity, Arc<Accumulator>>>,
}

impl MetricRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 식별자의 누산기를 조회하거나 없으면 생성합니다.
    ///
    /// 이미 다른 종류로 존재하면 기존 누산기를 그대로 반환합니다.
    /// 종류 불일치는 [`Accumulator::apply`]에서 보고됩니다.
    pub fn get_or_create(
        &self,
        identity: &MetricIdentity,
        kind: MetricKind,
        now_millis: i64,
    ) -> Arc<Accumulator> {
        if let Some(existing) = self.accumulators.read().get(identity) {
            return Arc::clone(existing);
        }

        let mut accumulators = self.accumulators.write();
        let entry = accumulators.entry(identity.clone()).or_insert_with(|| {
            tracing::debug!(identity = %identity, kind = %kind, "created accumulator");
            Arc::new(Accumulator::new(kind, now_millis))
        });
        Arc::clone(entry)
    }

    /// 식별자의 누산기를 조회합니다.
    pub fn get(&self, identity: &MetricIdentity) -> Option<Arc<Accumulator>> {
        self.accumulators.read().get(identity).cloned()
    }

    /// 식별자의 누산기를 제거합니다.
    ///
    /// 이후 같은 식별자로 `get_or_create`하면 초기 상태의 새 누산기가 생성됩니다.
    pub fn remove(&self, identity: &MetricIdentity) -> Option<Arc<Accumulator>> {
        self.accumulators.write().remove(identity)
    }

    /// 현재 모든 (식별자, 누산기) 쌍의 스냅샷
    ///
    /// 읽기 락은 복사하는 동안만 유지합니다.
    pub fn snapshot(&self) -> Vec<(MetricIdentity, Arc<Accumulator>)> {
        self.accumulators
            .read()
            .iter()
            .map(|(id, acc)| (id.clone(), Arc::clone(acc)))
            .collect()
    }

    /// 등록된 식별자 수
    pub fn len(&self) -> usize {
        self.accumulators.read().len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.accumulators.read().is_empty()
    }

    /// 식별자가 등록되어 있는지 확인합니다.
    pub fn contains(&self, identity: &MetricIdentity) -> bool {
        self.accumulators.read().contains_key(identity)
    }
}
