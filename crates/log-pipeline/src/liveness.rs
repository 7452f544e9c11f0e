//! 생존 추적기 -- 식별자별 마지막 관측 시각과 만료 스윕
//!
//! `touch`는 읽기 락 아래에서 원자적으로 시각을 갱신하며, 처음 보는 식별자일
//! 때만 쓰기 락을 잡습니다.
//!
//! `sweep`은 현재 항목의 스냅샷에서 만료 후보를 고른 뒤, 후보마다 쓰기 락을
//! 잡고 마지막 관측 시각을 다시 확인한 다음에 레지스트리와 생존 맵에서
//! 함께 제거합니다. 락 순서는 항상 생존 맵 → 레지스트리입니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::RwLock;

use logharvest_core::types::{MetricIdentity, MetricKind};

use crate::accumulator::Accumulator;
use crate::registry::MetricRegistry;

/// 생존 추적기
#[derive(Debug, Default)]
pub struct LivenessTracker {
    last_seen: RwLock<HashMap<MetricIdentity, Arc<AtomicI64>>>,
}

impl LivenessTracker {
    /// 빈 추적기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 식별자의 마지막 관측 시각을 기록합니다.
    pub fn touch(&self, identity: &MetricIdentity, now_millis: i64) {
        if let Some(cell) = self.last_seen.read().get(identity) {
            cell.fetch_max(now_millis, Ordering::AcqRel);
            return;
        }

        let mut map = self.last_seen.write();
        map.entry(identity.clone())
            .or_insert_with(|| Arc::new(AtomicI64::new(now_millis)))
            .fetch_max(now_millis, Ordering::AcqRel);
    }

    /// 시각을 기록하고 같은 락 구간에서 레지스트리 누산기를 조회하거나 생성합니다.
    ///
    /// 스윕은 생존 맵 쓰기 락 아래에서 제거하므로, 생존 항목 없이 레지스트리
    /// 항목만 남는 상태가 생기지 않습니다.
    pub fn touch_and_get(
        &self,
        registry: &MetricRegistry,
        identity: &MetricIdentity,
        kind: MetricKind,
        now_millis: i64,
    ) -> Arc<Accumulator> {
        {
            let map = self.last_seen.read();
            if let Some(cell) = map.get(identity) {
                cell.fetch_max(now_millis, Ordering::AcqRel);
                return registry.get_or_create(identity, kind, now_millis);
            }
        }

        let mut map = self.last_seen.write();
        map.entry(identity.clone())
            .or_insert_with(|| Arc::new(AtomicI64::new(now_millis)))
            .fetch_max(now_millis, Ordering::AcqRel);
        registry.get_or_create(identity, kind, now_millis)
    }

    /// 마지막 관측 시각을 조회합니다.
    pub fn last_seen(&self, identity: &MetricIdentity) -> Option<i64> {
        self.last_seen
            .read()
            .get(identity)
            .map(|cell| cell.load(Ordering::Acquire))
    }

    /// 추적 중인 식별자 수
    pub fn len(&self) -> usize {
        self.last_seen.read().len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.last_seen.read().is_empty()
    }

    /// 만료된 식별자를 생존 맵과 레지스트리에서 함께 제거합니다.
    ///
    /// `now - last_seen > expiry_millis`인 식별자가 대상입니다.
    /// 제거된 식별자 목록을 반환합니다.
    pub fn sweep(
        &self,
        registry: &MetricRegistry,
        now_millis: i64,
        expiry_millis: i64,
    ) -> Vec<MetricIdentity> {
        let is_stale = |seen: i64| now_millis.saturating_sub(seen) > expiry_millis;

        let candidates: Vec<MetricIdentity> = self
            .last_seen
            .read()
            .iter()
            .filter(|(_, cell)| is_stale(cell.load(Ordering::Acquire)))
            .map(|(id, _)| id.clone())
            .collect();

        let mut evicted = Vec::with_capacity(candidates.len());
        for identity in candidates {
            let mut map = self.last_seen.write();
            // 스냅샷 이후 touch된 항목은 건너뜁니다.
            let still_stale = map
                .get(&identity)
                .is_some_and(|cell| is_stale(cell.load(Ordering::Acquire)));
            if !still_stale {
                continue;
            }
            map.remove(&identity);
            registry.remove(&identity);
            drop(map);

            tracing::debug!(identity = %identity, "evicted stale metric");
            evicted.push(identity);
        }

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> MetricIdentity {
        MetricIdentity::new(name, vec![])
    }

    #[test]
    fn touch_records_latest_time() {
        let tracker = LivenessTracker::new();
        tracker.touch(&id("a"), 100);
        tracker.touch(&id("a"), 300);
        // 늦게 도착한 과거 시각은 되돌리지 않습니다.
        tracker.touch(&id("a"), 200);
        assert_eq!(tracker.last_seen(&id("a")), Some(300));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn sweep_evicts_only_stale_entries() {
        let tracker = LivenessTracker::new();
        let registry = MetricRegistry::new();
        for (name, seen) in [("old", 0), ("fresh", 900)] {
            tracker.touch(&id(name), seen);
            registry.get_or_create(&id(name), MetricKind::Counter, seen);
        }

        let evicted = tracker.sweep(&registry, 1_000, 500);
        assert_eq!(evicted, vec![id("old")]);
        assert!(!registry.contains(&id("old")));
        assert!(registry.contains(&id("fresh")));
        assert_eq!(tracker.last_seen(&id("old")), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn entry_at_exact_expiry_survives() {
        let tracker = LivenessTracker::new();
        let registry = MetricRegistry::new();
        tracker.touch(&id("edge"), 500);
        registry.get_or_create(&id("edge"), MetricKind::Gauge, 500);

        assert!(tracker.sweep(&registry, 1_000, 500).is_empty());
        assert_eq!(tracker.sweep(&registry, 1_001, 500), vec![id("edge")]);
    }

    #[test]
    fn regularly_touched_entry_survives_many_sweeps() {
        let tracker = LivenessTracker::new();
        let registry = MetricRegistry::new();
        registry.get_or_create(&id("busy"), MetricKind::Counter, 0);

        for tick in 0..100 {
            let now = tick * 100;
            tracker.touch(&id("busy"), now);
            assert!(tracker.sweep(&registry, now + 50, 200).is_empty());
        }
        assert!(registry.contains(&id("busy")));
    }

    #[test]
    fn concurrent_touch_during_sweep_is_not_lost() {
        let tracker = Arc::new(LivenessTracker::new());
        let registry = Arc::new(MetricRegistry::new());
        let identities: Vec<_> = (0..200).map(|i| id(&format!("m{i}"))).collect();
        for identity in &identities {
            tracker.touch(identity, 0);
            registry.get_or_create(identity, MetricKind::Counter, 0);
        }

        // 절반은 sweep과 동시에 새 시각으로 갱신합니다.
        let toucher = {
            let tracker = Arc::clone(&tracker);
            let registry = Arc::clone(&registry);
            let refreshed: Vec<_> = identities.iter().step_by(2).cloned().collect();
            std::thread::spawn(move || {
                for identity in &refreshed {
                    tracker.touch(identity, 10_000);
                    registry.get_or_create(identity, MetricKind::Counter, 10_000);
                }
                refreshed
            })
        };
        tracker.sweep(&registry, 10_000, 1_000);
        let refreshed = toucher.join().unwrap();

        // 갱신된 식별자는 레지스트리와 생존 맵 양쪽에 존재하거나 양쪽 모두에 없어야 하며,
        // 갱신 이후에는 반드시 양쪽에 존재합니다.
        for identity in &refreshed {
            assert_eq!(tracker.last_seen(identity), Some(10_000));
            assert!(registry.contains(identity));
        }
    }

    #[test]
    fn touch_and_get_keeps_registry_and_liveness_paired() {
        let tracker = LivenessTracker::new();
        let registry = MetricRegistry::new();

        let acc = tracker.touch_and_get(&registry, &id("late"), MetricKind::Counter, 0);
        assert!(registry.contains(&id("late")));
        assert_eq!(tracker.last_seen(&id("late")), Some(0));
        assert!(Arc::ptr_eq(
            &acc,
            &tracker.touch_and_get(&registry, &id("late"), MetricKind::Counter, 5)
        ));

        // 이미 만료된 시각으로 기록된 항목은 양쪽에서 함께 제거됩니다.
        tracker.sweep(&registry, 10_000, 1_000);
        assert!(registry.is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn stale_touches_racing_sweeps_leave_no_orphans() {
        let tracker = Arc::new(LivenessTracker::new());
        let registry = Arc::new(MetricRegistry::new());
        let identities: Vec<_> = (0..50).map(|i| id(&format!("m{i}"))).collect();

        // 만료 기준보다 오래된 시각으로 계속 기록하는 수집 스레드들
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let registry = Arc::clone(&registry);
                let identities = identities.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        for identity in &identities {
                            tracker.touch_and_get(&registry, identity, MetricKind::Counter, 0);
                        }
                    }
                })
            })
            .collect();
        for _ in 0..200 {
            tracker.sweep(&registry, 10_000, 1_000);
        }
        for worker in workers {
            worker.join().unwrap();
        }

        for (identity, _) in registry.snapshot() {
            assert!(
                tracker.last_seen(&identity).is_some(),
                "{identity} has no liveness entry"
            );
        }
        tracker.sweep(&registry, 10_000, 1_000);
        assert!(registry.is_empty());
    }
}
