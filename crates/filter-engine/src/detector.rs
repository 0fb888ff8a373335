//! 탐지 로직: SYN flood
//!
//! 출발지마다 마지막 SYN 도착 시각을 기억하고, 같은 출발지의 다음 SYN이
//! 최소 간격보다 빨리 오면 차단합니다. SYN이 설정되고 ACK가 해제된 연결
//! 개시 패킷에만 적용됩니다.
//!
//! # 한계
//! 표본 하나(직전 SYN과의 간격)만 보는 거친 휴리스틱입니다.
//! - 정상 클라이언트가 병렬 연결을 여는 순간 오탐이 납니다.
//! - 간격을 최소값보다 살짝 넓힌 공격자는 탐지되지 않습니다.
//! - 주소를 위조해 분산된 SYN flood는 출발지당 간격이 넓어 통과합니다.
//!
//! 차단된 SYN은 타임스탬프를 갱신하지 않습니다. 따라서 마지막으로 허용된
//! SYN 이후 최소 간격이 지나면 다음 SYN은 다시 허용됩니다.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::table::{BoundedTable, Touched};
use crate::types::Timestamp;

// =============================================================================
// 탐지 설정
// =============================================================================

/// SYN flood 탐지 설정
#[derive(Debug, Clone)]
pub struct SynFloodConfig {
    /// 같은 출발지 SYN 사이 최소 간격
    pub min_gap: Duration,
    /// 추적할 출발지 최대 수
    pub capacity: usize,
}

impl Default for SynFloodConfig {
    fn default() -> Self {
        Self {
            min_gap: Duration::from_millis(1),
            capacity: 1_000_000,
        }
    }
}

// =============================================================================
// 내부 추적 상태
// =============================================================================

/// 출발지별 마지막 허용 SYN 시각
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynRecord {
    pub last_syn: Timestamp,
}

impl Touched for SynRecord {
    fn last_touched(&self) -> Timestamp {
        self.last_syn
    }
}

/// SYN 검사 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynVerdict {
    Allow,
    Flood,
}

// =============================================================================
// SYN Flood 탐지기
// =============================================================================

/// SYN flood 탐지기
pub struct SynFloodDetector {
    config: SynFloodConfig,
    table: BoundedTable<Ipv4Addr, SynRecord>,
}

impl SynFloodDetector {
    /// 새 SYN flood 탐지기를 생성합니다.
    pub fn new(config: SynFloodConfig) -> Self {
        let table = BoundedTable::new(config.capacity);
        Self { config, table }
    }

    /// 연결 개시 SYN 하나를 검사합니다.
    pub fn check(&self, src: Ipv4Addr, now: Timestamp) -> SynVerdict {
        let min_gap = self.config.min_gap;
        self.table.upsert(
            src,
            |record| {
                if now.saturating_since(record.last_syn) < min_gap {
                    SynVerdict::Flood
                } else {
                    record.last_syn = now;
                    SynVerdict::Allow
                }
            },
            || (SynRecord { last_syn: now }, SynVerdict::Allow),
        )
    }

    pub fn min_gap(&self) -> Duration {
        self.config.min_gap
    }

    pub fn record(&self, src: &Ipv4Addr) -> Option<SynRecord> {
        self.table.get(src)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// 최소 간격이 지난 레코드를 제거합니다.
    ///
    /// 만료된 레코드가 있든 없든 다음 SYN은 허용되므로 판정은 바뀌지 않습니다.
    pub fn evict_idle(&self, now: Timestamp) -> usize {
        self.table.evict_idle(now, self.config.min_gap)
    }

    pub fn evictions(&self) -> u64 {
        self.table.evictions()
    }
}

impl Default for SynFloodDetector {
    fn default() -> Self {
        Self::new(SynFloodConfig::default())
    }
}
