//! 블랙리스트: 출발지 주소 차단 목록
//!
//! 패킷 처리 경로에서는 읽기만 합니다. 관리 작업은 현재 스냅샷을 복사해
//! 고친 뒤 [`ArcSwap`]으로 통째로 교체하므로, 읽는 쪽은 절대 잠금을
//! 기다리지 않습니다.
//!
//! # 조회 순서
//! 1. 정확한 주소 엔트리 (O(1)). `blocked = false` 엔트리는 접두사 차단의 예외로 동작합니다.
//! 2. 접두사 엔트리 (선형 검색, 소수의 대역을 가정)

use std::collections::HashMap;
use std::net::Ipv4Addr;
#[cfg(test)]
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// 블랙리스트 엔트리 (정책 파일 형식)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// 주소 또는 대역 (`10.0.0.5/32`, `10.0.0.0/8`)
    pub addr: Ipv4Net,
    /// 차단 여부
    #[serde(default = "default_blocked")]
    pub blocked: bool,
}

fn default_blocked() -> bool {
    true
}

/// 불변 스냅샷
#[derive(Debug, Clone, Default)]
struct BlacklistSet {
    exact: HashMap<Ipv4Addr, bool>,
    prefixes: Vec<Ipv4Net>,
}

impl BlacklistSet {
    fn is_blocked(&self, addr: Ipv4Addr) -> bool {
        if let Some(&blocked) = self.exact.get(&addr) {
            return blocked;
        }
        self.prefixes.iter().any(|net| net.contains(&addr))
    }

    fn apply(&mut self, entry: &BlacklistEntry) {
        if entry.addr.prefix_len() == 32 {
            self.exact.insert(entry.addr.addr(), entry.blocked);
            return;
        }
        let net = entry.addr.trunc();
        self.prefixes.retain(|p| *p != net);
        if entry.blocked {
            self.prefixes.push(net);
        }
    }
}

/// 블랙리스트
pub struct Blacklist {
    snapshot: ArcSwap<BlacklistSet>,
    version: AtomicU64,
}

impl Blacklist {
    /// 빈 블랙리스트를 생성합니다.
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(BlacklistSet::default()),
            version: AtomicU64::new(0),
        }
    }

    /// 초기 엔트리로 생성합니다. 뒤쪽 엔트리가 앞쪽을 덮어씁니다.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = &'a BlacklistEntry>) -> Self {
        let mut set = BlacklistSet::default();
        for entry in entries {
            set.apply(entry);
        }
        Self {
            snapshot: ArcSwap::from_pointee(set),
            version: AtomicU64::new(1),
        }
    }

    /// 출발지가 차단 대상인지 확인합니다.
    #[inline]
    pub fn is_blocked(&self, addr: Ipv4Addr) -> bool {
        self.snapshot.load().is_blocked(addr)
    }

    /// 단일 주소의 차단 여부를 설정합니다.
    pub fn set(&self, addr: Ipv4Addr, blocked: bool) {
        self.update(BlacklistEntry {
            addr: Ipv4Net::from(addr),
            blocked,
        });
    }

    /// 대역 차단을 추가하거나(`blocked = true`) 제거합니다.
    pub fn set_prefix(&self, net: Ipv4Net, blocked: bool) {
        self.update(BlacklistEntry { addr: net, blocked });
    }

    fn update(&self, entry: BlacklistEntry) {
        self.snapshot.rcu(|current| {
            let mut next = BlacklistSet::clone(current);
            next.apply(&entry);
            next
        });
        self.version.fetch_add(1, Ordering::Release);
    }

    /// 정확한 주소 엔트리 수 (예외 엔트리 포함)
    pub fn exact_count(&self) -> usize {
        self.snapshot.load().exact.len()
    }

    /// 차단 대역 수
    pub fn prefix_count(&self) -> usize {
        self.snapshot.load().prefixes.len()
    }

    /// 변경 횟수
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// 현재 내용을 엔트리 목록으로 반환합니다.
    pub fn entries(&self) -> Vec<BlacklistEntry> {
        let set = self.snapshot.load_full();
        let mut entries: Vec<_> = set
            .exact
            .iter()
            .map(|(addr, blocked)| BlacklistEntry {
                addr: Ipv4Net::from(*addr),
                blocked: *blocked,
            })
            .chain(set.prefixes.iter().map(|net| BlacklistEntry {
                addr: *net,
                blocked: true,
            }))
            .collect();
        entries.sort_by_key(|e| (e.addr.network(), e.addr.prefix_len()));
        entries
    }

    /// 현재 스냅샷 참조 (테스트용)
    #[cfg(test)]
    fn snapshot(&self) -> Arc<BlacklistSet> {
        self.snapshot.load_full()
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new()
    }
}
