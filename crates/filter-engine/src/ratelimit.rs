//! 고정 윈도우 속도 제한
//!
//! 키마다 `(window_start, packet_count)`를 두고, 윈도우 길이 `W`가 지나면
//! 카운터를 1로 되돌립니다. 윈도우 경계 직전과 직후에 몰린 버스트는 명목
//! 한도의 최대 2배까지 통과할 수 있습니다.
//!
//! ICMP와 SYN은 [`RateKey`]의 별도 변형으로 구분되어 같은 출발지의 일반
//! 트래픽과 예산을 공유하지 않으며, 각자의 임계값을 가집니다.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::table::{BoundedTable, Touched};
use crate::types::Timestamp;

/// 속도 제한 버킷 구분
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateClass {
    /// 출발지 주소 단위 일반 트래픽
    General,
    /// ICMP 전용 버킷
    Icmp,
    /// TCP SYN 전용 버킷
    Syn,
}

impl RateClass {
    fn index(self) -> usize {
        match self {
            Self::General => 0,
            Self::Icmp => 1,
            Self::Syn => 2,
        }
    }
}

/// 속도 제한 키
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub class: RateClass,
    pub src: Ipv4Addr,
}

impl RateKey {
    pub fn general(src: Ipv4Addr) -> Self {
        Self {
            class: RateClass::General,
            src,
        }
    }

    pub fn icmp(src: Ipv4Addr) -> Self {
        Self {
            class: RateClass::Icmp,
            src,
        }
    }

    pub fn syn(src: Ipv4Addr) -> Self {
        Self {
            class: RateClass::Syn,
            src,
        }
    }
}

/// 키별 윈도우 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRecord {
    pub window_start: Timestamp,
    pub packet_count: u64,
}

impl Touched for RateRecord {
    fn last_touched(&self) -> Timestamp {
        self.window_start
    }
}

/// 속도 검사 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Limited,
}

/// 고정 윈도우 속도 제한기
pub struct RateLimiter {
    table: BoundedTable<RateKey, RateRecord>,
    window: Duration,
    thresholds: [AtomicU64; 3],
}

impl RateLimiter {
    /// 새 속도 제한기를 생성합니다.
    ///
    /// `thresholds`는 일반, ICMP, SYN 순서입니다.
    pub fn new(window: Duration, general: u64, icmp: u64, syn: u64, capacity: usize) -> Self {
        Self {
            table: BoundedTable::new(capacity),
            window,
            thresholds: [
                AtomicU64::new(general),
                AtomicU64::new(icmp),
                AtomicU64::new(syn),
            ],
        }
    }

    /// 패킷 하나를 집계하고 한도 초과 여부를 반환합니다.
    ///
    /// 한도를 넘은 패킷도 카운트는 올라갑니다.
    pub fn check(&self, key: RateKey, now: Timestamp) -> RateDecision {
        let threshold = self.threshold(key.class);
        let window = self.window;

        let count = self.table.upsert(
            key,
            |record| {
                if now.saturating_since(record.window_start) > window {
                    record.window_start = now;
                    record.packet_count = 1;
                } else {
                    record.packet_count = record.packet_count.saturating_add(1);
                }
                record.packet_count
            },
            || {
                let record = RateRecord {
                    window_start: now,
                    packet_count: 1,
                };
                (record, 1)
            },
        );

        if count > threshold {
            RateDecision::Limited
        } else {
            RateDecision::Allow
        }
    }

    /// 구분별 임계값을 바꿉니다. 다음 패킷부터 적용됩니다.
    pub fn set_threshold(&self, class: RateClass, value: u64) {
        self.thresholds[class.index()].store(value, Ordering::Relaxed);
    }

    pub fn threshold(&self, class: RateClass) -> u64 {
        self.thresholds[class.index()].load(Ordering::Relaxed)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 키의 현재 윈도우 상태
    pub fn record(&self, key: &RateKey) -> Option<RateRecord> {
        self.table.get(key)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// 윈도우가 끝난 레코드를 제거합니다.
    ///
    /// 만료된 레코드는 다음 패킷에서 어차피 1로 재설정되므로 판정은 바뀌지 않습니다.
    pub fn evict_idle(&self, now: Timestamp) -> usize {
        self.table.evict_idle(now, self.window)
    }

    pub fn evictions(&self) -> u64 {
        self.table.evictions()
    }
}
