//! 용량 제한 상태 테이블
//!
//! 속도 제한, SYN 타이밍, 연결 추적이 공유하는 샤드 해시맵입니다.
//! [`DashMap`]이 키를 샤드로 나눠 잠그므로 서로 다른 키를 다루는 워커는
//! 서로를 막지 않습니다.
//!
//! # 제거 정책
//! - **유휴 만료**: [`BoundedTable::evict_idle`]이 마지막 갱신 이후
//!   `idle`보다 오래된 엔트리를 제거합니다. 호스트가 주기적으로 호출합니다.
//! - **용량 압박**: 가득 찬 상태에서 새 키가 들어오면, 앞쪽 샤드에서 최대
//!   [`EVICTION_SAMPLE`]개를 표본으로 뽑아 가장 오래된 엔트리 하나를 제거합니다.
//!   정확한 LRU가 아닌 근사이며, 패킷당 작업량을 상수로 묶습니다.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use crate::types::Timestamp;

/// 용량 압박 시 검사하는 표본 크기
pub const EVICTION_SAMPLE: usize = 32;

/// 마지막 갱신 시각을 알려주는 테이블 값
pub trait Touched {
    fn last_touched(&self) -> Timestamp;
}

/// 용량이 제한된 동시성 해시 테이블
pub struct BoundedTable<K, V> {
    map: DashMap<K, V>,
    capacity: usize,
    live: AtomicUsize,
    evicted: AtomicU64,
}

impl<K, V> BoundedTable<K, V>
where
    K: Eq + Hash + Copy,
    V: Touched,
{
    /// 최대 `capacity`개 엔트리를 담는 테이블을 생성합니다.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: DashMap::new(),
            capacity: capacity.max(1),
            live: AtomicUsize::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// 키가 있으면 `update`를, 없으면 `insert`로 만든 값을 저장합니다.
    ///
    /// 두 클로저 모두 샤드 쓰기 잠금 안에서 실행되므로 이 테이블에 다시
    /// 접근해서는 안 됩니다.
    pub fn upsert<R>(
        &self,
        key: K,
        update: impl FnOnce(&mut V) -> R,
        insert: impl FnOnce() -> (V, R),
    ) -> R {
        if let Some(mut existing) = self.map.get_mut(&key) {
            return update(existing.value_mut());
        }

        self.reserve_slot();

        match self.map.entry(key) {
            Entry::Occupied(mut occupied) => {
                // 다른 스레드가 먼저 삽입함: 예약 반환
                self.live.fetch_sub(1, Ordering::AcqRel);
                update(occupied.get_mut())
            }
            Entry::Vacant(vacant) => {
                let (value, result) = insert();
                vacant.insert(value);
                result
            }
        }
    }

    /// 새 엔트리를 위한 슬롯 하나를 예약합니다.
    ///
    /// `live`는 삽입 전에 증가하므로 동시 삽입이 몰려도 `capacity`를 넘지
    /// 않습니다. 가득 차 있으면 표본 제거 후 다시 시도합니다.
    fn reserve_slot(&self) {
        loop {
            let reserved = self
                .live
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < self.capacity).then_some(n + 1)
                })
                .is_ok();
            if reserved {
                return;
            }
            if !self.evict_oldest() {
                // 남은 슬롯이 모두 진행 중인 삽입에 예약된 상태
                std::hint::spin_loop();
            }
        }
    }

    /// 값을 복사해 반환합니다.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.map.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.live.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// 현재 엔트리 수
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 지금까지 제거된 엔트리 수 (유휴 만료 + 용량 압박)
    pub fn evictions(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// `idle`보다 오래 갱신되지 않은 엔트리를 제거하고 제거 수를 반환합니다.
    pub fn evict_idle(&self, now: Timestamp, idle: Duration) -> usize {
        let mut removed = 0usize;
        self.map.retain(|_, value| {
            let stale = now.saturating_since(value.last_touched()) > idle;
            if stale {
                removed += 1;
            }
            !stale
        });
        if removed > 0 {
            self.live.fetch_sub(removed, Ordering::AcqRel);
            self.evicted.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// 모든 엔트리를 제거합니다.
    pub fn clear(&self) {
        let mut removed = 0usize;
        self.map.retain(|_, _| {
            removed += 1;
            false
        });
        self.live.fetch_sub(removed, Ordering::AcqRel);
    }

    /// 표본 중 가장 오래된 엔트리 하나를 제거하고 성공 여부를 반환합니다.
    fn evict_oldest(&self) -> bool {
        let victim = self
            .map
            .iter()
            .take(EVICTION_SAMPLE)
            .min_by_key(|entry| entry.value().last_touched())
            .map(|entry| (*entry.key(), entry.value().last_touched()));

        let Some((key, seen)) = victim else {
            return false;
        };

        // 표본을 고른 뒤 갱신된 엔트리는 건드리지 않음
        let removed = self
            .map
            .remove_if(&key, |_, value| value.last_touched() == seen)
            .is_some();
        if removed {
            self.live.fetch_sub(1, Ordering::AcqRel);
            self.evicted.fetch_add(1, Ordering::Relaxed);
            trace!(capacity = self.capacity, "evicted oldest sampled entry");
        }
        removed
    }
}
